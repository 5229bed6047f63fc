//! Database row types. These map directly to SQLite rows and are converted
//! into the connect-types models at the edge of this crate.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use connect_types::models::{
    Chat, ChatItem, ConnectionRequest, Favorite, InvestmentRequest, Message, Notification, Post,
    Startup, User,
};

/// Fixed-width RFC 3339 so that text order is time order.
pub fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_ts(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by hand in the sqlite3 shell use datetime('now'),
            // which has no timezone. Treat it as UTC.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("corrupt timestamp '{}'", raw))
}

pub(crate) fn decode_id(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("corrupt id '{}'", raw))
}

pub struct UserRow {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub photo_url: Option<String>,
    pub verified: bool,
    pub created_at: String,
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: decode_id(&self.id)?,
            role: self.role.parse().map_err(|e| anyhow!("user {}: {}", self.id, e))?,
            created_at: decode_ts(&self.created_at)?,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            photo_url: self.photo_url,
            verified: self.verified,
        })
    }
}

pub struct StartupRow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub pitch_deck: Option<String>,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub funding_stage: Option<String>,
    pub created_at: String,
}

impl StartupRow {
    pub fn into_startup(self) -> Result<Startup> {
        Ok(Startup {
            id: decode_id(&self.id)?,
            owner_id: decode_id(&self.owner_id)?,
            created_at: decode_ts(&self.created_at)?,
            name: self.name,
            description: self.description,
            pitch_deck: self.pitch_deck,
            industry: self.industry,
            location: self.location,
            funding_stage: self.funding_stage,
        })
    }
}

pub struct PostRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub description: String,
    pub startup_id: Option<String>,
    pub created_at: String,
}

impl PostRow {
    pub fn into_post(self) -> Result<Post> {
        Ok(Post {
            id: decode_id(&self.id)?,
            user_id: decode_id(&self.user_id)?,
            kind: self.kind.parse().map_err(|e| anyhow!("post {}: {}", self.id, e))?,
            startup_id: self.startup_id.as_deref().map(decode_id).transpose()?,
            created_at: decode_ts(&self.created_at)?,
            title: self.title,
            description: self.description,
        })
    }
}

pub struct ConnectionRequestRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub status: String,
    pub created_at: String,
}

impl ConnectionRequestRow {
    pub fn into_request(self) -> Result<ConnectionRequest> {
        Ok(ConnectionRequest {
            id: decode_id(&self.id)?,
            sender_id: decode_id(&self.sender_id)?,
            receiver_id: decode_id(&self.receiver_id)?,
            status: self.status.parse().map_err(|e| anyhow!("request {}: {}", self.id, e))?,
            created_at: decode_ts(&self.created_at)?,
        })
    }
}

pub struct InvestmentRequestRow {
    pub id: String,
    pub startup_id: String,
    pub investor_id: String,
    pub owner_id: String,
    pub status: String,
    pub created_at: String,
}

impl InvestmentRequestRow {
    pub fn into_request(self) -> Result<InvestmentRequest> {
        Ok(InvestmentRequest {
            id: decode_id(&self.id)?,
            startup_id: decode_id(&self.startup_id)?,
            investor_id: decode_id(&self.investor_id)?,
            owner_id: decode_id(&self.owner_id)?,
            status: self.status.parse().map_err(|e| anyhow!("request {}: {}", self.id, e))?,
            created_at: decode_ts(&self.created_at)?,
        })
    }
}

pub struct ChatRow {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub item_id: Option<String>,
    pub item_type: Option<String>,
    pub created_at: String,
}

impl ChatRow {
    pub fn into_chat(self) -> Result<Chat> {
        let item = match (self.item_id, self.item_type) {
            (Some(item_id), Some(item_type)) => Some(ChatItem {
                item_id,
                item_type: item_type.parse().map_err(|e| anyhow!("chat {}: {}", self.id, e))?,
            }),
            _ => None,
        };

        Ok(Chat {
            id: decode_id(&self.id)?,
            participants: [decode_id(&self.participant_a)?, decode_id(&self.participant_b)?],
            item,
            created_at: decode_ts(&self.created_at)?,
        })
    }
}

pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub text: String,
    pub created_at: String,
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        Ok(Message {
            id: decode_id(&self.id)?,
            chat_id: decode_id(&self.chat_id)?,
            sender_id: decode_id(&self.sender_id)?,
            timestamp: decode_ts(&self.created_at)?,
            text: self.text,
        })
    }
}

pub struct NotificationRow {
    pub id: String,
    pub recipient_id: String,
    pub kind: String,
    pub sender_id: String,
    pub message: String,
    pub created_at: String,
    pub read: bool,
}

impl NotificationRow {
    pub fn into_notification(self) -> Result<Notification> {
        Ok(Notification {
            id: decode_id(&self.id)?,
            recipient_id: decode_id(&self.recipient_id)?,
            kind: self.kind.parse().map_err(|e| anyhow!("notification {}: {}", self.id, e))?,
            sender_id: decode_id(&self.sender_id)?,
            created_at: decode_ts(&self.created_at)?,
            message: self.message,
            read: self.read,
        })
    }
}

/// The stored half of an OTP: only the digest of the code is kept.
pub struct OtpRow {
    pub email: String,
    pub code_hash: String,
    pub expires_at: String,
    pub created_at: String,
    pub verified_at: Option<String>,
}

pub struct FavoriteRow {
    pub id: String,
    pub user_id: String,
    pub startup_id: String,
    pub created_at: String,
}

impl FavoriteRow {
    pub fn into_favorite(self) -> Result<Favorite> {
        Ok(Favorite {
            id: decode_id(&self.id)?,
            user_id: decode_id(&self.user_id)?,
            startup_id: decode_id(&self.startup_id)?,
            created_at: decode_ts(&self.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn encoded_timestamps_sort_chronologically() {
        let early = Utc.with_ymd_and_hms(2026, 1, 9, 23, 59, 59).unwrap();
        let late = early + chrono::Duration::microseconds(1);
        assert!(encode_ts(early) < encode_ts(late));
        assert_eq!(decode_ts(&encode_ts(late)).unwrap(), late);
    }

    #[test]
    fn decodes_sqlite_naive_timestamps() {
        let ts = decode_ts("2026-03-01 12:30:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap());
        assert!(decode_ts("yesterday").is_err());
    }
}
