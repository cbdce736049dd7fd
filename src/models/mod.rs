/// `as_str`, `Display` and `FromStr` for a fieldless enum stored as text.
macro_rules! string_enum {
    ($ty:ty, $label:literal, { $($variant:path => $s:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok($variant),)+
                    other => Err(format!(
                        "Invalid {} '{}'. Must be one of: {}",
                        $label,
                        other,
                        [$($s),+].join(", ")
                    )),
                }
            }
        }
    };
}

pub mod proposal;
pub mod trip;
pub mod vote;
