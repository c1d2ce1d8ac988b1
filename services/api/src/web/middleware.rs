//! services/api/src/web/middleware.rs
//!
//! Identity middleware for protecting routes.
//!
//! Authentication happens upstream; the authenticated user id arrives in the
//! `x-user-id` header (or the `user_id` query parameter on WebSocket upgrades,
//! which cannot carry custom headers from a browser).

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::warn;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The id of the user making the request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserId(pub String);

fn user_id_from_query(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("user_id="))
        .map(str::to_string)
}

/// Resolves the caller's user id, or rejects the request with 401.
///
/// On success the `UserId` is inserted into the request extensions.
pub async fn require_user(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let from_header = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let user_id = from_header
        .or_else(|| user_id_from_query(req.uri().query()))
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            warn!(path = %req.uri().path(), "Request without a user id");
            StatusCode::UNAUTHORIZED
        })?;

    req.extensions_mut().insert(UserId(user_id));
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_user_id_is_found_among_other_params() {
        assert_eq!(
            user_id_from_query(Some("a=1&user_id=u_42")),
            Some("u_42".to_string())
        );
        assert_eq!(user_id_from_query(Some("a=1")), None);
        assert_eq!(user_id_from_query(None), None);
    }
}
