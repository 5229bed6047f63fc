use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use connect_types::api::Claims;

use crate::error::{ServiceError, ServiceResult};
use crate::state::AppState;

/// Extract and validate JWT from the Authorization header. The claims are
/// handed to handlers as a request extension.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(ServiceError::AuthRequired)?;
    let claims = decode_token(&state.jwt_secret, bearer.token())?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub fn decode_token(secret: &str, token: &str) -> ServiceResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        debug!("Rejected token: {}", e);
        ServiceError::AuthRequired
    })
}
