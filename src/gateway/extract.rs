use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::AppState;
use super::error::ApiError;
use crate::auth::Caller;
use crate::notify::Notifier;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_TYPE_HEADER: &str = "x-user-type";

fn header_number<T: std::str::FromStr>(parts: &Parts, name: &str) -> Result<T, ApiError> {
    let raw = parts
        .headers
        .get(name)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {name} header")))?;
    raw.to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| ApiError::BadRequest(format!("invalid {name} header")))
}

/// Authenticated caller as forwarded by the auth proxy in front of us.
/// The numeric user type is resolved through the configured role ids.
impl<N: Notifier> FromRequestParts<AppState<N>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<N>,
    ) -> Result<Self, Self::Rejection> {
        let user_id = header_number(parts, USER_ID_HEADER)?;
        let user_type: u32 = header_number(parts, USER_TYPE_HEADER)?;
        let role = state
            .roles
            .resolve(user_type)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown user type {user_type}")))?;
        let caller = Caller::new(user_id, role);
        tracing::debug!(user_id, role = ?caller.role, "caller identified");
        Ok(caller)
    }
}
