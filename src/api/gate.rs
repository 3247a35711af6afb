/// Header gating for the customer API
///
/// Runs before any extractor so rejected requests never reach body or query
/// parsing. The session token is checked first, then the user agent.

use crate::api::{customers::AppState, error::ApiError};
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

/// Reject unauthenticated or bot traffic
pub fn check_headers(headers: &HeaderMap, session_token: &str) -> Result<(), ApiError> {
    if header_bytes(headers, SESSION_TOKEN_HEADER) != session_token.as_bytes() {
        return Err(ApiError::AuthenticationFailure);
    }

    // Raw bytes, so obs-text in the header cannot hide the match.
    let user_agent = header_bytes(headers, axum::http::header::USER_AGENT.as_str());
    if user_agent.to_ascii_lowercase().windows(3).any(|w| w == b"bot") {
        return Err(ApiError::BotRejected);
    }

    Ok(())
}

/// Middleware wrapper around [`check_headers`]
pub async fn gate_request(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Err(e) = check_headers(request.headers(), &state.auth.session_token) {
        tracing::warn!("🚫 Rejected {} {}: {}", request.method(), request.uri().path(), e);
        return Err(e);
    }
    Ok(next.run(request).await)
}

fn header_bytes<'a>(headers: &'a HeaderMap, name: &str) -> &'a [u8] {
    headers.get(name).map(|value| value.as_bytes()).unwrap_or_default()
}
