use axum::{Extension, Json, extract::State, http::StatusCode};
use uuid::Uuid;

use connect_types::api::{
    Claims, ConnectionRequestsResponse, CreateConnectionRequest, CreateInvestmentRequest,
    InvestmentRequestsResponse, MessageResponse, RequestCreatedResponse, UpdateRequestStatus, UserQuery,
};
use connect_types::models::RequestStatus;

use crate::error::{ApiJson, ApiQuery, ServiceError, ServiceResult};
use crate::state::AppState;

pub async fn create_connection(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateConnectionRequest>,
) -> ServiceResult<(StatusCode, Json<RequestCreatedResponse>)> {
    let sender_id = req.sender_id.ok_or_else(|| ServiceError::missing("senderId"))?;
    let receiver_id = req.receiver_id.ok_or_else(|| ServiceError::missing("receiverId"))?;
    if sender_id != claims.sub {
        return Err(ServiceError::forbidden("senderId must be the signed-in user"));
    }

    let request = state.ledger.create_connection(sender_id, receiver_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(RequestCreatedResponse {
            request_id: request.id,
            message: "Connection request sent".into(),
        }),
    ))
}

pub async fn list_connections(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> ServiceResult<Json<ConnectionRequestsResponse>> {
    let user_id = own_user_id(&claims, query.user_id)?;
    Ok(Json(state.ledger.list_connections(user_id).await?))
}

pub async fn update_connection(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UpdateRequestStatus>,
) -> ServiceResult<Json<MessageResponse>> {
    let (request_id, status) = parse_update(req)?;
    state.ledger.respond_connection(claims.sub, request_id, status).await?;
    Ok(Json(MessageResponse {
        message: format!("Request {}", status),
    }))
}

pub async fn create_investment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateInvestmentRequest>,
) -> ServiceResult<(StatusCode, Json<RequestCreatedResponse>)> {
    let startup_id = req.startup_id.ok_or_else(|| ServiceError::missing("startupId"))?;
    let investor_id = req.investor_id.ok_or_else(|| ServiceError::missing("investorId"))?;
    let owner_id = req.owner_id.ok_or_else(|| ServiceError::missing("ownerId"))?;
    if investor_id != claims.sub {
        return Err(ServiceError::forbidden("investorId must be the signed-in user"));
    }

    let request = state.ledger.create_investment(startup_id, investor_id, owner_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(RequestCreatedResponse {
            request_id: request.id,
            message: "Investment request sent".into(),
        }),
    ))
}

pub async fn list_investments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> ServiceResult<Json<InvestmentRequestsResponse>> {
    let owner_id = own_user_id(&claims, query.user_id)?;
    Ok(Json(state.ledger.list_investments(owner_id).await?))
}

pub async fn update_investment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UpdateRequestStatus>,
) -> ServiceResult<Json<MessageResponse>> {
    let (request_id, status) = parse_update(req)?;
    state.ledger.respond_investment(claims.sub, request_id, status).await?;
    Ok(Json(MessageResponse {
        message: format!("Investment request {}", status),
    }))
}

/// The `userId` query parameter defaults to the caller. Only admins may
/// read somebody else's lists.
pub(crate) fn own_user_id(claims: &Claims, requested: Option<Uuid>) -> ServiceResult<Uuid> {
    match requested {
        None => Ok(claims.sub),
        Some(id) if id == claims.sub || claims.role.is_admin() => Ok(id),
        Some(_) => Err(ServiceError::forbidden("cannot read another user's data")),
    }
}

fn parse_update(req: UpdateRequestStatus) -> ServiceResult<(Uuid, RequestStatus)> {
    let request_id = req.request_id.ok_or_else(|| ServiceError::missing("requestId"))?;
    let raw = req.status.ok_or_else(|| ServiceError::missing("status"))?;
    let status: RequestStatus = raw
        .parse()
        .map_err(|_| ServiceError::validation(format!("invalid status '{}'", raw)))?;
    Ok((request_id, status))
}
