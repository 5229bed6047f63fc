use axum::{Json, extract::State, http::StatusCode};

use connect_types::api::{
    ActivateRequest, LoginRequest, OtpIssuedResponse, RegisterRequest, RegisterResponse, ResendOtpRequest,
    SessionResponse,
};
use connect_types::models::Role;

use crate::accounts::NewAccount;
use crate::error::{ApiJson, ServiceError, ServiceResult};
use crate::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ServiceResult<(StatusCode, Json<RegisterResponse>)> {
    let raw_role = req.role.ok_or_else(|| ServiceError::missing("role"))?;
    let role: Role = raw_role
        .parse()
        .map_err(|_| ServiceError::validation(format!("invalid role '{}'", raw_role)))?;

    let account = NewAccount {
        first_name: req.first_name.ok_or_else(|| ServiceError::missing("firstName"))?,
        last_name: req.last_name.ok_or_else(|| ServiceError::missing("lastName"))?,
        email: req.email.ok_or_else(|| ServiceError::missing("email"))?,
        password: req.password.ok_or_else(|| ServiceError::missing("password"))?,
        role,
    };

    let (user, issued) = state.accounts.register(account).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.id,
            otp_expires_at: issued.expires_at,
        }),
    ))
}

pub async fn activate(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ActivateRequest>,
) -> ServiceResult<Json<SessionResponse>> {
    let email = req.email.ok_or_else(|| ServiceError::missing("email"))?;
    let otp = req.otp.ok_or_else(|| ServiceError::missing("otp"))?;
    Ok(Json(state.accounts.activate(&email, &otp).await?))
}

pub async fn resend_otp(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResendOtpRequest>,
) -> ServiceResult<Json<OtpIssuedResponse>> {
    let email = req.email.ok_or_else(|| ServiceError::missing("email"))?;
    let issued = state.accounts.resend(&email).await?;
    Ok(Json(OtpIssuedResponse {
        email: issued.email,
        expires_at: issued.expires_at,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ServiceResult<Json<SessionResponse>> {
    let email = req.email.ok_or_else(|| ServiceError::missing("email"))?;
    let password = req.password.ok_or_else(|| ServiceError::missing("password"))?;
    Ok(Json(state.accounts.login(&email, &password).await?))
}
