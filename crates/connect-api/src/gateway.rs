use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};
use serde::Deserialize;

use connect_gateway::handle_connection;

use crate::error::{ApiQuery, ServiceError, ServiceResult};
use crate::middleware::decode_token;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade. Browsers can't set headers on the handshake, so the
/// token rides in the query string and is checked before upgrading.
pub async fn gateway_upgrade(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> ServiceResult<Response> {
    let token = query.token.ok_or(ServiceError::AuthRequired)?;
    let claims = decode_token(&state.jwt_secret, &token)?;

    let dispatcher = state.dispatcher.clone();
    let db = state.store.db().clone();
    Ok(ws.on_upgrade(move |socket| handle_connection(socket, dispatcher, db, claims.sub, claims.role)))
}
