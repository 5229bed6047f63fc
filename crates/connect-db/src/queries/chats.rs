use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use connect_types::models::{Chat, ChatItem, Message};

use super::{ChatOutcome, OptionalExt};
use crate::Database;
use crate::models::{ChatRow, MessageRow, encode_ts};

const CHAT_COLUMNS: &str = "id, participant_a, participant_b, item_id, item_type, created_at";
const MESSAGE_COLUMNS: &str = "id, chat_id, sender_id, text, created_at";

impl Database {
    // -- Chats --

    /// Returns the chat between `user_a` and `user_b` anchored to `item`,
    /// creating it if none exists. Participant order doesn't matter, and a
    /// missing item only matches chats without one.
    pub fn open_or_reuse_chat(
        &self,
        id: Uuid,
        user_a: Uuid,
        user_b: Uuid,
        item: Option<&ChatItem>,
        created_at: DateTime<Utc>,
    ) -> Result<ChatOutcome> {
        let item_id = item.map(|i| i.item_id.clone());
        let item_type = item.map(|i| i.item_type.as_str());

        self.with_conn_mut(|conn| {
            let sql = format!(
                "SELECT {CHAT_COLUMNS} FROM chats
                 WHERE ((participant_a = ?1 AND participant_b = ?2)
                     OR (participant_a = ?2 AND participant_b = ?1))
                   AND item_id IS ?3 AND item_type IS ?4
                 ORDER BY created_at, rowid
                 LIMIT 1"
            );
            let existing = conn
                .query_row(
                    &sql,
                    rusqlite::params![user_a.to_string(), user_b.to_string(), item_id, item_type],
                    chat_from_row,
                )
                .optional()?;

            if let Some(row) = existing {
                return Ok(ChatOutcome::Reused(row.into_chat()?));
            }

            conn.execute(
                "INSERT INTO chats (id, participant_a, participant_b, item_id, item_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.to_string(),
                    user_a.to_string(),
                    user_b.to_string(),
                    item_id,
                    item_type,
                    encode_ts(created_at),
                ],
            )?;

            Ok(ChatOutcome::Created(Chat {
                id,
                participants: [user_a, user_b],
                item: item.cloned(),
                created_at,
            }))
        })
    }

    pub fn get_chat(&self, id: Uuid) -> Result<Option<Chat>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?1");
            conn.query_row(&sql, [id.to_string()], chat_from_row)
                .optional()?
                .map(ChatRow::into_chat)
                .transpose()
        })
    }

    pub fn is_chat_participant(&self, chat_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM chats
                 WHERE id = ?1 AND (participant_a = ?2 OR participant_b = ?2))",
                [chat_id.to_string(), user_id.to_string()],
                |r| r.get(0),
            )?;
            Ok(found)
        })
    }

    /// Every chat `user_id` takes part in, paired with its latest message.
    /// Ordered by latest activity (last message, or creation if empty).
    pub fn list_chats_for_user(&self, user_id: Uuid) -> Result<Vec<(Chat, Option<Message>)>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CHAT_COLUMNS} FROM chats
                 WHERE participant_a = ?1 OR participant_b = ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], chat_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut chats = Vec::with_capacity(rows.len());
            for row in rows {
                let chat = row.into_chat()?;
                let last = query_last_message(conn, chat.id)?;
                chats.push((chat, last));
            }

            chats.sort_by(|(a_chat, a_last), (b_chat, b_last)| {
                let a_time = a_last.as_ref().map_or(a_chat.created_at, |m| m.timestamp);
                let b_time = b_last.as_ref().map_or(b_chat.created_at, |m| m.timestamp);
                b_time.cmp(&a_time)
            });
            Ok(chats)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: Uuid,
        chat_id: Uuid,
        sender_id: Uuid,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Message> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, chat_id, sender_id, text, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    id.to_string(),
                    chat_id.to_string(),
                    sender_id.to_string(),
                    text,
                    encode_ts(timestamp),
                ],
            )?;
            Ok(Message {
                id,
                chat_id,
                sender_id,
                text: text.to_string(),
                timestamp,
            })
        })
    }

    /// All messages of a chat, oldest first. Equal timestamps keep insertion order.
    pub fn list_messages(&self, chat_id: Uuid) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE chat_id = ?1
                 ORDER BY created_at ASC, rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([chat_id.to_string()], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(MessageRow::into_message).collect()
        })
    }
}

fn query_last_message(conn: &Connection, chat_id: Uuid) -> Result<Option<Message>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE chat_id = ?1
         ORDER BY created_at DESC, rowid DESC
         LIMIT 1"
    );
    conn.query_row(&sql, [chat_id.to_string()], message_from_row)
        .optional()?
        .map(MessageRow::into_message)
        .transpose()
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<ChatRow> {
    Ok(ChatRow {
        id: row.get(0)?,
        participant_a: row.get(1)?,
        participant_b: row.get(2)?,
        item_id: row.get(3)?,
        item_type: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        text: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{seed_user, t0};
    use connect_types::models::{ItemType, Role};

    #[test]
    fn reuse_ignores_participant_order() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, Role::Entrepreneur);
        let b = seed_user(&db, Role::Investor);

        let first = db.open_or_reuse_chat(Uuid::new_v4(), a, b, None, t0()).unwrap();
        assert!(first.created());

        let again = db.open_or_reuse_chat(Uuid::new_v4(), b, a, None, t0()).unwrap();
        assert!(!again.created());
        assert_eq!(again.chat().id, first.chat().id);
    }

    #[test]
    fn different_items_get_different_chats() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, Role::Entrepreneur);
        let b = seed_user(&db, Role::Investor);
        let item = ChatItem {
            item_id: "startup-1".into(),
            item_type: ItemType::Startup,
        };

        let plain = db.open_or_reuse_chat(Uuid::new_v4(), a, b, None, t0()).unwrap();
        let anchored = db.open_or_reuse_chat(Uuid::new_v4(), a, b, Some(&item), t0()).unwrap();
        assert!(anchored.created());
        assert_ne!(plain.chat().id, anchored.chat().id);

        let reused = db.open_or_reuse_chat(Uuid::new_v4(), a, b, Some(&item), t0()).unwrap();
        assert_eq!(reused.chat().id, anchored.chat().id);
        assert_eq!(reused.chat().item.as_ref(), Some(&item));
    }

    #[test]
    fn messages_with_equal_timestamps_keep_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, Role::Entrepreneur);
        let b = seed_user(&db, Role::Investor);
        let chat = db.open_or_reuse_chat(Uuid::new_v4(), a, b, None, t0()).unwrap().into_chat();

        for text in ["one", "two", "three"] {
            db.insert_message(Uuid::new_v4(), chat.id, a, text, t0()).unwrap();
        }

        let texts: Vec<String> = db.list_messages(chat.id).unwrap().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, ["one", "two", "three"]);
    }

    #[test]
    fn chat_list_carries_last_message() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, Role::Entrepreneur);
        let b = seed_user(&db, Role::Investor);
        let c = seed_user(&db, Role::Investor);

        let quiet = db.open_or_reuse_chat(Uuid::new_v4(), a, b, None, t0()).unwrap().into_chat();
        let busy = db.open_or_reuse_chat(Uuid::new_v4(), a, c, None, t0()).unwrap().into_chat();
        db.insert_message(Uuid::new_v4(), busy.id, c, "hello", t0() + chrono::Duration::minutes(5))
            .unwrap();

        let chats = db.list_chats_for_user(a).unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].0.id, busy.id);
        assert_eq!(chats[0].1.as_ref().map(|m| m.text.as_str()), Some("hello"));
        assert_eq!(chats[1].0.id, quiet.id);
        assert!(chats[1].1.is_none());

        assert!(db.is_chat_participant(busy.id, c).unwrap());
        assert!(!db.is_chat_participant(busy.id, b).unwrap());
    }
}
