use axum::{Extension, Json, extract::State};
use uuid::Uuid;

use connect_types::api::{Claims, MessageResponse, UpdateProfileRequest};
use connect_types::models::{Profile, User};

use crate::accounts::ProfileChanges;
use crate::error::{ApiJson, ApiPath, ServiceResult};
use crate::state::AppState;

pub async fn get_profile(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> ServiceResult<Json<Profile>> {
    Ok(Json(state.identity.require(user_id).await?))
}

pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ServiceResult<Json<Profile>> {
    Ok(Json(state.identity.require(claims.sub).await?))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> ServiceResult<Json<User>> {
    let changes = ProfileChanges {
        first_name: req.first_name,
        last_name: req.last_name,
        photo_url: req.photo_url,
    };
    Ok(Json(state.accounts.update_profile(claims.sub, changes).await?))
}

// -- Admin --

pub async fn admin_list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ServiceResult<Json<Vec<User>>> {
    Ok(Json(state.accounts.list_users(&claims).await?))
}

pub async fn admin_delete_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> ServiceResult<Json<MessageResponse>> {
    state.accounts.delete_user(&claims, user_id).await?;
    Ok(Json(MessageResponse {
        message: "User deleted".into(),
    }))
}
