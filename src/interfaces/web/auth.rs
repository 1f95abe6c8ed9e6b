use axum::http::{HeaderMap, header};

use super::AppState;
use crate::core::error::AuthError;

/// Name recorded for callers admitted without a token.
pub(crate) const LOCAL_CALLER: &str = "local";

pub(crate) fn is_loopback(host: &str) -> bool {
    host == "127.0.0.1" || host == "::1" || host == "localhost"
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolves the caller from `?token=` or an `Authorization: Bearer` header.
///
/// While no tokens exist the server is open on loopback only.
pub(crate) async fn resolve_caller(
    state: &AppState,
    query_token: Option<&str>,
    headers: &HeaderMap,
) -> Result<String, AuthError> {
    let raw_token = query_token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| bearer_token(headers));

    let any_tokens_exist = state
        .store
        .has_any_api_tokens()
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

    if !any_tokens_exist {
        if is_loopback(&state.api_host) {
            return Ok(LOCAL_CALLER.to_string());
        }
        return Err(AuthError::NoTokensConfigured);
    }

    let raw_token = raw_token.ok_or(AuthError::MissingToken)?;
    state
        .store
        .resolve_api_token(&raw_token)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?
        .ok_or(AuthError::InvalidToken)
}
