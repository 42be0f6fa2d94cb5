use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::application::sessions::AuthError;
use crate::domain::types::Identity;
use crate::infra::http::AppState;

use super::error::ApiError;

/// The authenticated caller, inserted into request and response extensions.
#[derive(Debug, Clone)]
pub struct Principal {
    pub identity: Identity,
}

pub async fn api_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = match extract_token(request.headers().get(header::AUTHORIZATION)) {
        Some(value) => value,
        None => return ApiError::unauthorized().into_response(),
    };

    let identity = match state.sessions.verify(&token).await {
        Ok(identity) => identity,
        Err(AuthError::Missing) | Err(AuthError::Invalid) => {
            return ApiError::unauthorized().into_response();
        }
    };

    let principal = Principal { identity };
    request.extensions_mut().insert(principal.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(principal);
    response
}

fn extract_token(header: Option<&HeaderValue>) -> Option<String> {
    let raw = header?.to_str().ok()?;
    let bearer = raw.strip_prefix("Bearer ")?.trim();
    (!bearer.is_empty()).then(|| bearer.to_string())
}
