use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Chat, ConnectionRequest, InvestmentRequest, ItemType, NotificationKind, Post, Role,
};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the WebSocket upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --
//
// Request bodies keep required fields optional so a missing field is
// reported as a 400 with the field name instead of a generic body rejection.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub otp_expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ActivateRequest {
    pub email: Option<String>,
    pub otp: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResendOtpRequest {
    pub email: Option<String>,
}

/// Only the expiry is returned; the code itself travels by mail.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpIssuedResponse {
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub role: Role,
    pub token: String,
}

// -- Requests --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConnectionRequest {
    pub sender_id: Option<Uuid>,
    pub receiver_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvestmentRequest {
    pub startup_id: Option<Uuid>,
    pub investor_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCreatedResponse {
    pub request_id: Uuid,
    pub message: String,
}

/// `status` stays a string so an unknown value is a 400, not a body rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequestStatus {
    pub request_id: Option<Uuid>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionRequestsResponse {
    pub sent: Vec<ConnectionRequest>,
    pub received: Vec<ConnectionRequest>,
}

#[derive(Debug, Serialize)]
pub struct InvestmentRequestsResponse {
    pub received: Vec<InvestmentRequest>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// -- Favorites --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFavoriteRequest {
    pub user_id: Option<Uuid>,
    pub startup_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteCreatedResponse {
    pub favorite_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveFavoriteRequest {
    pub favorite_id: Option<Uuid>,
}

// -- Startups --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateStartupRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub pitch_deck: Option<String>,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub funding_stage: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupQuery {
    pub owner_id: Option<Uuid>,
}

// -- Posts --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreatePostRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PostQuery {
    pub limit: Option<usize>,
}

/// A feed entry with its author resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub user_name: String,
    #[serde(rename = "userPhotoURL", skip_serializing_if = "Option::is_none")]
    pub user_photo_url: Option<String>,
}

// -- Profiles --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
}

// -- Notifications --

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

/// A notification with the sender's display name resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}

// -- Chats --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OpenChatRequest {
    pub participant_id: Option<Uuid>,
    pub item_id: Option<String>,
    pub item_type: Option<ItemType>,
    /// Optional first message, sent right after the chat is opened.
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChatResponse {
    pub chat_id: Uuid,
    pub created: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub text: Option<String>,
}

/// One row of a user's chat list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    #[serde(flatten)]
    pub chat: Chat,
    pub other_participant_id: Uuid,
    pub other_participant_name: String,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
