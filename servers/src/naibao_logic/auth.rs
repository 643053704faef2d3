use super::error::ApiError;
use super::state::SharedState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use lib_naibao::models::UserId;
use tracing::debug;

/// The verified caller, placed in request extensions by [`require_auth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

/// The token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Resolves a raw token into a user or a 401.
pub fn authenticate(state: &SharedState, token: Option<&str>) -> Result<UserId, ApiError> {
    let token = token.ok_or_else(|| ApiError::unauthorized("missing token"))?;
    state.tokens.verify(token).map_err(|e| {
        debug!(error = %e, "rejected token");
        ApiError::unauthorized(e.to_string())
    })
}

/// Rejects requests without a valid bearer token.
pub async fn require_auth(State(state): State<SharedState>, mut request: Request, next: Next) -> Response {
    match authenticate(&state, bearer_token(request.headers())) {
        Ok(user_id) => {
            request.extensions_mut().insert(AuthUser(user_id));
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}
