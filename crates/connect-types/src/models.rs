use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A stored string did not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseVariantError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseVariantError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// -- Roles --

/// Account role. Every capability check in the service layer goes through
/// the methods below instead of comparing roles ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Entrepreneur,
    Investor,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entrepreneur => "entrepreneur",
            Self::Investor => "investor",
            Self::Admin => "admin",
        }
    }

    /// Entrepreneurs and investors network with each other; admins don't.
    pub fn may_connect(self) -> bool {
        matches!(self, Self::Entrepreneur | Self::Investor)
    }

    pub fn may_request_investment(self) -> bool {
        matches!(self, Self::Investor)
    }

    pub fn may_own_startups(self) -> bool {
        matches!(self, Self::Entrepreneur)
    }

    /// Startup posts come with a startup; investors post offers directly.
    pub fn may_post_investments(self) -> bool {
        matches!(self, Self::Investor)
    }

    /// Admin accounts are provisioned out of band.
    pub fn may_self_register(self) -> bool {
        !self.is_admin()
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entrepreneur" => Ok(Self::Entrepreneur),
            "investor" => Ok(Self::Investor),
            "admin" => Ok(Self::Admin),
            _ => Err(ParseVariantError::new("role", s)),
        }
    }
}

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    #[serde(rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

/// Minimal view of a user used wherever a name has to be displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub display_name: String,
    pub role: Option<Role>,
    pub verified: bool,
    #[serde(rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

// -- Requests --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            _ => Err(ParseVariantError::new("request status", s)),
        }
    }
}

/// Entrepreneur/investor networking request, independent of any startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    #[serde(rename = "requestId")]
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

/// Investor interest in a specific startup, addressed to its owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentRequest {
    #[serde(rename = "requestId")]
    pub id: Uuid,
    pub startup_id: Uuid,
    pub investor_id: Uuid,
    pub owner_id: Uuid,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

// -- Startups & favorites --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Startup {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub pitch_deck: Option<String>,
    pub owner_id: Uuid,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub funding_stage: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub id: Uuid,
    pub user_id: Uuid,
    pub startup_id: Uuid,
    pub created_at: DateTime<Utc>,
}

// -- Posts --

/// Newsfeed entry. Chats opened from the feed are anchored on a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: ItemType,
    pub title: String,
    pub description: String,
    /// Set on posts written together with a startup listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// -- Chats --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Startup,
    Investment,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Investment => "investment",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "startup" => Ok(Self::Startup),
            "investment" => Ok(Self::Investment),
            _ => Err(ParseVariantError::new("item type", s)),
        }
    }
}

/// The post a chat was started from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatItem {
    pub item_id: String,
    pub item_type: ItemType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: Uuid,
    pub participants: [Uuid; 2],
    #[serde(flatten)]
    pub item: Option<ChatItem>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    /// The participant that isn't `user_id`. Self-chats are never created,
    /// so for a participant this is always the counterpart.
    pub fn other_participant(&self, user_id: Uuid) -> Uuid {
        if self.participants[0] == user_id {
            self.participants[1]
        } else {
            self.participants[0]
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

// -- Notifications --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RequestReceived,
    RequestAccepted,
    RequestRejected,
    InvestmentRequestReceived,
    InvestmentRequestAccepted,
    InvestmentRequestRejected,
    Chat,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RequestReceived => "request_received",
            Self::RequestAccepted => "request_accepted",
            Self::RequestRejected => "request_rejected",
            Self::InvestmentRequestReceived => "investment_request_received",
            Self::InvestmentRequestAccepted => "investment_request_accepted",
            Self::InvestmentRequestRejected => "investment_request_rejected",
            Self::Chat => "chat",
        }
    }

    /// Kind sent to the original sender when a connection request settles.
    /// `None` for `Pending`, which is not a transition target.
    pub fn connection_outcome(status: RequestStatus) -> Option<Self> {
        match status {
            RequestStatus::Pending => None,
            RequestStatus::Accepted => Some(Self::RequestAccepted),
            RequestStatus::Rejected => Some(Self::RequestRejected),
        }
    }

    pub fn investment_outcome(status: RequestStatus) -> Option<Self> {
        match status {
            RequestStatus::Pending => None,
            RequestStatus::Accepted => Some(Self::InvestmentRequestAccepted),
            RequestStatus::Rejected => Some(Self::InvestmentRequestRejected),
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "request_received" => Ok(Self::RequestReceived),
            "request_accepted" => Ok(Self::RequestAccepted),
            "request_rejected" => Ok(Self::RequestRejected),
            "investment_request_received" => Ok(Self::InvestmentRequestReceived),
            "investment_request_accepted" => Ok(Self::InvestmentRequestAccepted),
            "investment_request_rejected" => Ok(Self::InvestmentRequestRejected),
            "chat" => Ok(Self::Chat),
            _ => Err(ParseVariantError::new("notification type", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub sender_id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}
