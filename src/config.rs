//! Process configuration, read once from the environment at startup.
//!
//! `.env` files are honoured through `dotenvy` before any variable is read.

use std::env;
use std::str::FromStr;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_EXPIRY_DAYS: i64 = 7;
const DEFAULT_SWEEP_SECS: u64 = 300; // 5 minutes
const DEFAULT_RETRY_LIMIT: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub session_key: Option<String>,
    pub db_max_connections: u32,
    pub proposal_expiry_days: i64,
    /// Zero disables the background expiry sweep.
    pub expiry_sweep_secs: u64,
    pub itinerary_retry_limit: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set".to_string())?;

        Ok(Config {
            database_url,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            session_key: env::var("SESSION_KEY").ok(),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            proposal_expiry_days: parse_var("PROPOSAL_EXPIRY_DAYS", DEFAULT_EXPIRY_DAYS)?,
            expiry_sweep_secs: parse_var("EXPIRY_SWEEP_SECS", DEFAULT_SWEEP_SECS)?,
            itinerary_retry_limit: parse_var("ITINERARY_RETRY_LIMIT", DEFAULT_RETRY_LIMIT)?,
        })
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, String> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{name} must be a number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
