//! Caller identity from trusted gateway headers.
//!
//! The sync gateway sits behind an authenticating proxy that resolves the
//! session and forwards `x-tenant-id`, `x-user-id`, and `x-role`. Missing
//! or malformed headers are rejected with 401; this layer performs no
//! authentication of its own.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use opsync_core::types::Role;
use opsync_engine::SyncContext;

/// Header carrying the tenant ID.
pub const TENANT_HEADER: &str = "x-tenant-id";
/// Header carrying the acting user's ID.
pub const USER_HEADER: &str = "x-user-id";
/// Header carrying the caller's role (`admin`, `manager`, or `staff`).
pub const ROLE_HEADER: &str = "x-role";

/// Extractor wrapper so handlers can take the caller context directly.
#[derive(Clone, Debug)]
pub struct Identity(pub SyncContext);

/// Rejection for missing/malformed identity headers.
#[derive(Debug)]
pub struct IdentityRejection(String);

impl IntoResponse for IdentityRejection {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.0, "code": "UNAUTHORIZED" }));
        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = IdentityRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        identity_from_headers(&parts.headers).map(Identity)
    }
}

fn identity_from_headers(headers: &HeaderMap) -> std::result::Result<SyncContext, IdentityRejection> {
    let tenant_id = require_header(headers, TENANT_HEADER)?;
    let user_id = require_header(headers, USER_HEADER)?;
    let role_str = require_header(headers, ROLE_HEADER)?;
    let role = Role::from_sql(&role_str)
        .ok_or_else(|| IdentityRejection(format!("unknown role '{role_str}'")))?;
    Ok(SyncContext { tenant_id, user_id, role })
}

fn require_header(
    headers: &HeaderMap,
    name: &str,
) -> std::result::Result<String, IdentityRejection> {
    let value = headers
        .get(name)
        .ok_or_else(|| IdentityRejection(format!("missing {name} header")))?;
    let value = value
        .to_str()
        .map_err(|_| IdentityRejection(format!("non-ASCII {name} header")))?
        .trim();
    if value.is_empty() {
        return Err(IdentityRejection(format!("empty {name} header")));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(tenant: &str, user: &str, role: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        let _ = map.insert(TENANT_HEADER, HeaderValue::from_str(tenant).unwrap());
        let _ = map.insert(USER_HEADER, HeaderValue::from_str(user).unwrap());
        let _ = map.insert(ROLE_HEADER, HeaderValue::from_str(role).unwrap());
        map
    }

    #[test]
    fn full_headers_resolve() {
        let ctx = identity_from_headers(&headers("t1", "u1", "manager")).unwrap();
        assert_eq!(ctx.tenant_id, "t1");
        assert_eq!(ctx.user_id, "u1");
        assert_eq!(ctx.role, Role::Manager);
    }

    #[test]
    fn missing_tenant_rejected() {
        let mut map = headers("t1", "u1", "staff");
        let _ = map.remove(TENANT_HEADER);
        assert!(identity_from_headers(&map).is_err());
    }

    #[test]
    fn unknown_role_rejected() {
        assert!(identity_from_headers(&headers("t1", "u1", "superuser")).is_err());
    }

    #[test]
    fn blank_user_rejected() {
        assert!(identity_from_headers(&headers("t1", "  ", "staff")).is_err());
    }
}
