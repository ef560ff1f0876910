use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use fiscalbridge_auth::BridgeHeartbeat;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::BridgeContext;

/// Resolve the bridge bearer token. Every authenticated call counts as a heartbeat.
pub async fn bridge_auth_middleware(
    State(services): State<Arc<AppServices>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer(req.headers()).map(str::to_owned) else {
        return errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid or revoked token");
    };

    let credential = match services
        .dispatch()
        .authenticate(&token, &BridgeHeartbeat::default())
        .await
    {
        Ok(credential) => credential,
        Err(err) => return errors::dispatch_error_to_response(err),
    };

    req.extensions_mut().insert(BridgeContext::new(
        credential.account_id,
        credential.id,
        token,
    ));

    next.run(req).await
}

#[derive(Clone)]
pub struct InternalAuthState {
    pub api_key: Option<Arc<str>>,
}

/// Guard for `/internal`: the caller must present the configured service key.
pub async fn internal_auth_middleware(
    State(state): State<InternalAuthState>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let authorized = match (state.api_key.as_deref(), extract_bearer(req.headers())) {
        (Some(expected), Some(presented)) => keys_match(expected, presented),
        _ => false,
    };

    if !authorized {
        return errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid service key");
    }

    next.run(req).await
}

fn keys_match(expected: &str, presented: &str) -> bool {
    let (a, b) = (expected.as_bytes(), presented.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();

    if token.is_empty() {
        return None;
    }
    Some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer(&headers).is_none());

        headers.insert(axum::http::header::AUTHORIZATION, "Bearer  fbt_abc ".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Some("fbt_abc"));

        headers.insert(axum::http::header::AUTHORIZATION, "Basic Zm9v".parse().unwrap());
        assert!(extract_bearer(&headers).is_none());
    }

    #[test]
    fn key_comparison() {
        assert!(keys_match("secret", "secret"));
        assert!(!keys_match("secret", "secreT"));
        assert!(!keys_match("secret", "secret2"));
    }
}
