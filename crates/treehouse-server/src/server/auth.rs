use std::collections::HashMap;

use axum::extract::{Query, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::errors::ApiError;
use crate::server::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated(String),
    Rejected,
}

/// Decides whether a bearer token grants access.
///
/// Token issuance lives outside this service; implementations only verify.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: Option<&str>) -> AuthOutcome;
}

/// Single shared token from `server.auth_token`.
///
/// With no token configured every request is accepted as the `local` user.
pub struct StaticToken {
    token: Option<String>,
}

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

impl Authenticator for StaticToken {
    fn authenticate(&self, token: Option<&str>) -> AuthOutcome {
        match (&self.token, token) {
            (None, _) => AuthOutcome::Authenticated("local".to_string()),
            (Some(expected), Some(given)) if constant_time_eq(expected.as_bytes(), given.as_bytes()) => {
                AuthOutcome::Authenticated("token".to_string())
            }
            _ => AuthOutcome::Rejected,
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// The authenticated user, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

/// Bearer header first; `?token=` for WebSocket clients that cannot set headers.
fn extract_token(request: &Request) -> Option<String> {
    if let Some(value) = request.headers().get(AUTHORIZATION)
        && let Ok(value) = value.to_str()
        && let Some(token) = value.strip_prefix("Bearer ")
    {
        return Some(token.trim().to_string());
    }

    Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(params)| params.get("token").cloned())
}

pub async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let token = extract_token(&request);
    match state.authenticator.authenticate(token.as_deref()) {
        AuthOutcome::Authenticated(user) => {
            request.extensions_mut().insert(AuthUser(user));
            next.run(request).await
        }
        AuthOutcome::Rejected => {
            warn!(
                event = "server.auth.rejected",
                path = %request.uri().path(),
                token_present = token.is_some(),
            );
            ApiError::unauthorized().into_response()
        }
    }
}
