//! API middleware
//!
//! Authentication runs first and stores the verified claims on the
//! request; the audit layer then logs every call with the acting
//! principal, so collector submissions, admin adjudications, and device
//! sync traffic all leave the same trail.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{info, warn};

use crate::auth::Claims;
use crate::AppState;

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Validates the bearer token and attaches the claims to the request
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(token) = bearer_token(&request) else {
        warn!(path = %request.uri().path(), "missing or malformed Authorization header");
        return Err(StatusCode::UNAUTHORIZED);
    };

    match crate::auth::validate_token(token, &state.config.jwt_secret) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            Ok(next.run(request).await)
        }
        Err(e) => {
            warn!(path = %request.uri().path(), error = %e, "token rejected");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Logs every request with the acting principal and its roles
pub async fn audit_middleware(
    State(_state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let (actor, roles) = request
        .extensions()
        .get::<Claims>()
        .map(|c| (c.sub.clone(), c.roles.join(",")))
        .unwrap_or_else(|| ("anonymous".to_string(), String::new()));

    let start = Utc::now();
    let response = next.run(request).await;
    let duration = Utc::now() - start;

    info!(
        method = %method,
        uri = %uri,
        actor = %actor,
        roles = %roles,
        status = %response.status().as_u16(),
        duration_ms = duration.num_milliseconds(),
        "audit"
    );

    response
}
