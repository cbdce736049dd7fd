use actix_session::Session;

use crate::errors::AppError;

const USER_ID_KEY: &str = "user_id";

/// Authenticated user id carried in the cookie session, if any.
pub fn get_user_id(session: &Session) -> Option<i64> {
    session.get::<i64>(USER_ID_KEY).unwrap_or(None)
}

pub fn require_user(session: &Session) -> Result<i64, AppError> {
    get_user_id(session).ok_or(AppError::Unauthenticated)
}

/// Binds a user to the session. Called by whatever front door
/// authenticates the user.
pub fn set_user_id(session: &Session, user_id: i64) -> Result<(), AppError> {
    session.renew();
    session
        .insert(USER_ID_KEY, user_id)
        .map_err(|e| AppError::Internal(format!("Session error: {e}")))
}
