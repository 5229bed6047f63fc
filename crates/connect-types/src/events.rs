use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, Notification, Role};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is authenticated
    Ready { user_id: Uuid, role: Role },

    /// A message was appended to a chat
    MessageCreate { message: Message },

    /// A notification landed in the recipient's inbox
    NotificationCreate { notification: Notification },

    /// Acknowledges the chats this connection now receives messages for
    Subscribed { chat_ids: Vec<Uuid> },
}

impl GatewayEvent {
    /// Returns the chat_id if this event is scoped to a specific chat.
    /// Events that return `None` are delivered through per-user channels.
    pub fn chat_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { message } => Some(message.chat_id),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Start receiving live messages for these chats.
    /// Chats the caller doesn't participate in are ignored.
    Subscribe { chat_ids: Vec<Uuid> },

    /// Stop receiving live messages for these chats
    Unsubscribe { chat_ids: Vec<Uuid> },
}
