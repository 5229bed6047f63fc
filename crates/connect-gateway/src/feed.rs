//! Gap-free chat delivery on top of the shared broadcast channel.
//!
//! Appends are broadcast in log order while the append lock is held, so a
//! live message is either one the reader already got from the store or newer
//! than everything it got from the store. The cursor relies on that.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use connect_db::Database;
use connect_types::events::GatewayEvent;
use connect_types::models::Message;

/// Delivery position in one chat.
#[derive(Debug, Default)]
pub struct ChatCursor {
    /// Delivered from a store read and possibly still queued on the broadcast channel.
    from_store: HashSet<Uuid>,
    last: Option<(Uuid, DateTime<Utc>)>,
}

impl ChatCursor {
    /// Cursor just past `backlog`. The backlog must be read after the
    /// broadcast receiver was created.
    pub fn after_backlog(backlog: &[Message]) -> Self {
        let mut cursor = Self::default();
        cursor.record_store_read(backlog);
        cursor
    }

    /// Whether a live message still has to be delivered.
    pub fn accept(&mut self, message: &Message) -> bool {
        if self.from_store.remove(&message.id) {
            return false;
        }
        // Nothing queued behind a fresh message can predate the last store read.
        self.from_store.clear();
        self.last = Some((message.id, message.timestamp));
        true
    }

    /// Picks the messages past the cursor out of a fresh read of the whole
    /// log. Used after the broadcast receiver lagged.
    pub fn catch_up(&mut self, log: Vec<Message>) -> Vec<Message> {
        let missed: Vec<Message> = match self.last {
            None => log,
            Some((last_id, last_ts)) => match log.iter().position(|m| m.id == last_id) {
                Some(i) => log.into_iter().skip(i + 1).collect(),
                None => log.into_iter().filter(|m| m.timestamp > last_ts).collect(),
            },
        };
        self.record_store_read(&missed);
        missed
    }

    fn record_store_read(&mut self, messages: &[Message]) {
        self.from_store.extend(messages.iter().map(|m| m.id));
        if let Some(m) = messages.last() {
            self.last = Some((m.id, m.timestamp));
        }
    }
}

/// The chats one gateway connection follows.
pub struct ChatFeeds {
    db: Arc<Database>,
    user_id: Uuid,
    chats: HashMap<Uuid, ChatCursor>,
}

impl ChatFeeds {
    pub fn new(db: Arc<Database>, user_id: Uuid) -> Self {
        Self {
            db,
            user_id,
            chats: HashMap::new(),
        }
    }

    /// Follows the chats of `chat_ids` the user takes part in. Returns each
    /// newly followed chat's backlog as `MessageCreate` events, then the
    /// `Subscribed` acknowledgement.
    pub async fn subscribe(&mut self, chat_ids: Vec<Uuid>) -> Vec<GatewayEvent> {
        let fresh: Vec<Uuid> = chat_ids
            .into_iter()
            .filter(|id| !self.chats.contains_key(id))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let user_id = self.user_id;
        let backlogs = blocking(&self.db, move |db| {
            let mut allowed = Vec::with_capacity(fresh.len());
            for chat_id in fresh {
                if db.is_chat_participant(chat_id, user_id)? {
                    allowed.push((chat_id, db.list_messages(chat_id)?));
                } else {
                    debug!("{} is not in chat {}, ignoring subscription", user_id, chat_id);
                }
            }
            Ok(allowed)
        })
        .await
        .unwrap_or_else(|e| {
            warn!("Subscription lookup failed for {}: {}", user_id, e);
            Vec::new()
        });

        let mut events = Vec::new();
        for (chat_id, backlog) in backlogs {
            self.chats.insert(chat_id, ChatCursor::after_backlog(&backlog));
            events.extend(backlog.into_iter().map(|message| GatewayEvent::MessageCreate { message }));
        }
        debug!("{} follows {} chats", user_id, self.chats.len());

        events.push(self.ack());
        events
    }

    pub fn unsubscribe(&mut self, chat_ids: &[Uuid]) -> GatewayEvent {
        for chat_id in chat_ids {
            self.chats.remove(chat_id);
        }
        self.ack()
    }

    /// Whether a broadcast event goes out on this connection.
    pub fn accept(&mut self, event: &GatewayEvent) -> bool {
        let GatewayEvent::MessageCreate { message } = event else {
            return false;
        };
        self.chats
            .get_mut(&message.chat_id)
            .is_some_and(|cursor| cursor.accept(message))
    }

    /// Re-reads every followed chat and returns what the connection missed.
    pub async fn catch_up(&mut self) -> anyhow::Result<Vec<GatewayEvent>> {
        let chat_ids: Vec<Uuid> = self.chats.keys().copied().collect();
        let logs = blocking(&self.db, move |db| {
            chat_ids
                .into_iter()
                .map(|chat_id| Ok((chat_id, db.list_messages(chat_id)?)))
                .collect::<anyhow::Result<Vec<_>>>()
        })
        .await?;

        let mut events = Vec::new();
        for (chat_id, log) in logs {
            if let Some(cursor) = self.chats.get_mut(&chat_id) {
                events.extend(
                    cursor
                        .catch_up(log)
                        .into_iter()
                        .map(|message| GatewayEvent::MessageCreate { message }),
                );
            }
        }
        Ok(events)
    }

    fn ack(&self) -> GatewayEvent {
        let mut chat_ids: Vec<Uuid> = self.chats.keys().copied().collect();
        chat_ids.sort();
        GatewayEvent::Subscribed { chat_ids }
    }
}

async fn blocking<T, F>(db: &Arc<Database>, f: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(db.as_ref())).await?
}
