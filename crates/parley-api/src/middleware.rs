use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::warn;

use parley_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;

/// Extract and validate the bearer token, insert the claims as a request
/// extension, and refresh the caller's presence marker. Sitting on every
/// protected route, this is the anti-forgery gate in front of all side
/// effects.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthenticated)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthenticated)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthenticated)?;

    let claims = token_data.claims;

    // Presence refresh is best-effort; a failed write never fails the request.
    let db = state.clone();
    let uid = claims.sub.to_string();
    let now = chrono::Utc::now().timestamp();
    match tokio::task::spawn_blocking(move || db.db.touch_last_online(&uid, now)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Presence refresh failed: {}", e),
        Err(e) => warn!("spawn_blocking join error: {}", e),
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
