//! Bearer-token guard for the admin routes

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::admin::AdminState;
use crate::error::LiftClubError;
use crate::models::Caller;

/// Header naming the acting administrator, recorded in logs and audit notes
pub const ADMIN_ID_HEADER: &str = "x-admin-id";

const DEFAULT_ADMIN_ID: &str = "admin";

/// Extract the token from `Authorization: Bearer <token>`
pub fn get_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Resolve the calling administrator, if the token matches
pub fn authenticate(headers: &HeaderMap, admin_token: &str) -> Option<Caller> {
    let token = get_bearer_token(headers)?;
    if admin_token.is_empty() || token != admin_token {
        return None;
    }

    let id = headers
        .get(ADMIN_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_ADMIN_ID);
    Some(Caller::admin(id))
}

/// Middleware: reject non-admins, otherwise attach the [`Caller`]
pub async fn require_admin(
    State(state): State<AdminState>,
    mut request: Request,
    next: Next,
) -> Result<Response, LiftClubError> {
    let Some(caller) = authenticate(request.headers(), &state.admin_token) else {
        warn!(path = %request.uri().path(), "Rejected admin request without valid token");
        return Err(LiftClubError::PermissionDenied {
            message: "admin token required".to_string(),
        });
    };

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(auth: Option<&str>, admin_id: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(auth) = auth {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        }
        if let Some(id) = admin_id {
            headers.insert(ADMIN_ID_HEADER, HeaderValue::from_str(id).unwrap());
        }
        headers
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(get_bearer_token(&headers(Some("Bearer abc"), None)), Some("abc"));
        assert_eq!(get_bearer_token(&headers(Some("Basic abc"), None)), None);
        assert_eq!(get_bearer_token(&headers(Some("Bearer "), None)), None);
        assert_eq!(get_bearer_token(&headers(None, None)), None);
    }

    #[test]
    fn test_authenticate() {
        let caller =
            authenticate(&headers(Some("Bearer s3cret"), Some("ops-7")), "s3cret").unwrap();
        assert!(caller.is_admin());
        assert_eq!(caller.id, "ops-7");

        let caller = authenticate(&headers(Some("Bearer s3cret"), None), "s3cret").unwrap();
        assert_eq!(caller.id, "admin");

        assert!(authenticate(&headers(Some("Bearer wrong"), None), "s3cret").is_none());
        assert!(authenticate(&headers(Some("Bearer anything"), None), "").is_none());
    }
}
