//! Caller identity from `Authorization: Bearer <token>`.
//!
//! Tokens are opaque; the store maps them to a user id. Issuance happens
//! elsewhere.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};

use crate::{error::ApiError, state::AppState};

/// Authenticated caller id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = raw.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        st: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or(ApiError::Unauthenticated("missing bearer credential"))?;
        match st.repo.resolve_session(token).await {
            Ok(Some(user)) => Ok(Caller(user)),
            Ok(None) => Err(ApiError::Unauthenticated("unknown or expired credential")),
            Err(e) => Err(ApiError::Service(e.into())),
        }
    }
}
