//! Owner token authentication.
//!
//! Tokens are opaque: a caller is authenticated when the presented token is
//! registered in the owner store.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Uri};
use serde::Deserialize;
use vprompt_models::OwnerToken;
use vprompt_store::OwnerStore;

use crate::error::ApiError;
use crate::state::AppState;

/// A caller whose token is registered.
#[derive(Debug, Clone)]
pub struct OwnerAuth(pub OwnerToken);

impl OwnerAuth {
    pub fn token(&self) -> &OwnerToken {
        &self.0
    }

    /// Whether this caller submitted the given task.
    pub fn owns(&self, owner_token: &OwnerToken) -> bool {
        &self.0 == owner_token
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Token from `Authorization: Bearer ...`, if present and non-blank.
pub fn bearer_token(headers: &HeaderMap) -> Option<OwnerToken> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(OwnerToken::from)
}

/// Token from the `token` query parameter, if present and non-blank.
pub fn query_token(uri: &Uri) -> Option<OwnerToken> {
    Query::<TokenQuery>::try_from_uri(uri)
        .ok()
        .and_then(|q| q.0.token)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .map(OwnerToken::from)
}

/// Header token first, then query token.
pub fn presented_token(headers: &HeaderMap, uri: &Uri) -> Option<OwnerToken> {
    bearer_token(headers).or_else(|| query_token(uri))
}

/// Check that a token is registered.
pub async fn authorize(state: &AppState, token: Option<OwnerToken>) -> Result<OwnerAuth, ApiError> {
    let token = token.ok_or_else(|| ApiError::unauthorized("Missing owner token"))?;
    if !state.store.is_registered(&token).await? {
        return Err(ApiError::unauthorized("Unknown owner token"));
    }
    Ok(OwnerAuth(token))
}

#[axum::async_trait]
impl FromRequestParts<AppState> for OwnerAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        authorize(state, presented_token(&parts.headers, &parts.uri)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert("Authorization", HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some(OwnerToken::from("abc")));

        headers.insert("Authorization", HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());

        headers.insert("Authorization", HeaderValue::from_static("Bearer   "));
        assert!(bearer_token(&headers).is_none());
    }

    #[test]
    fn test_query_token_and_precedence() {
        let uri: Uri = "/result/t1?token=q-token".parse().unwrap();
        assert_eq!(query_token(&uri), Some(OwnerToken::from("q-token")));

        let mut headers = HeaderMap::new();
        assert_eq!(presented_token(&headers, &uri), Some(OwnerToken::from("q-token")));

        headers.insert("Authorization", HeaderValue::from_static("Bearer h-token"));
        assert_eq!(presented_token(&headers, &uri), Some(OwnerToken::from("h-token")));

        let bare: Uri = "/result/t1".parse().unwrap();
        assert!(query_token(&bare).is_none());
    }
}
