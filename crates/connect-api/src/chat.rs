use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

use connect_db::ChatOutcome;
use connect_gateway::{ChatCursor, Dispatcher};
use connect_types::api::ChatSummary;
use connect_types::events::GatewayEvent;
use connect_types::models::{Chat, ChatItem, Message, NotificationKind};

use crate::clock::SharedClock;
use crate::error::{ServiceError, ServiceResult};
use crate::identity::IdentityResolver;
use crate::notifications::NotificationSink;
use crate::store::Store;

/// Two-party chats and their append-only message logs.
#[derive(Clone)]
pub struct ChatChannel {
    store: Store,
    identity: IdentityResolver,
    notifications: NotificationSink,
    dispatcher: Dispatcher,
    clock: SharedClock,
    /// Serializes appends so timestamp order, insertion order and broadcast
    /// order agree.
    append_lock: Arc<Mutex<()>>,
}

impl ChatChannel {
    pub fn new(
        store: Store,
        identity: IdentityResolver,
        notifications: NotificationSink,
        dispatcher: Dispatcher,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            identity,
            notifications,
            dispatcher,
            clock,
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Returns the chat between the two users about `item`, creating it on
    /// first use. Calling it again with the same arguments, in either
    /// participant order, yields the same chat.
    ///
    /// An item must name a feed post of the given type written by one of
    /// the two participants.
    pub async fn open_or_reuse(&self, user_a: Uuid, user_b: Uuid, item: Option<ChatItem>) -> ServiceResult<ChatOutcome> {
        if user_a == user_b {
            return Err(ServiceError::InvalidOperation("cannot open a chat with yourself".into()));
        }
        self.identity.require(user_b).await?;
        let item = match item {
            Some(item) => Some(self.anchor(item, user_a, user_b).await?),
            None => None,
        };

        let id = Uuid::new_v4();
        let now = self.clock.now();
        let outcome = self
            .store
            .run(move |db| db.open_or_reuse_chat(id, user_a, user_b, item.as_ref(), now))
            .await?;

        if outcome.created() {
            info!("Opened chat {} between {} and {}", outcome.chat().id, user_a, user_b);
        }
        Ok(outcome)
    }

    pub async fn send(&self, chat_id: Uuid, sender_id: Uuid, text: &str) -> ServiceResult<Message> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ServiceError::EmptyMessage);
        }

        let chat = self.participant_chat(chat_id, sender_id).await?;

        let message = {
            let _guard = self.append_lock.lock().await;
            let id = Uuid::new_v4();
            let now = self.clock.now();
            let body = text.to_string();
            let message = self
                .store
                .run(move |db| db.insert_message(id, chat_id, sender_id, &body, now))
                .await?;
            self.dispatcher.broadcast(GatewayEvent::MessageCreate {
                message: message.clone(),
            });
            message
        };
        debug!("Message {} appended to chat {}", message.id, chat_id);

        let recipient = chat.other_participant(sender_id);
        let sender_name = self.identity.name_or_fallback(sender_id).await;
        self.notifications
            .notify_best_effort(
                recipient,
                NotificationKind::Chat,
                sender_id,
                format!("New message from {}", sender_name),
            )
            .await;

        Ok(message)
    }

    /// All messages, oldest first. Participants only.
    pub async fn list(&self, chat_id: Uuid, requester_id: Uuid) -> ServiceResult<Vec<Message>> {
        self.participant_chat(chat_id, requester_id).await?;
        self.store.run(move |db| db.list_messages(chat_id)).await
    }

    /// Every chat of `user_id` with its counterpart and latest message,
    /// most recently active first.
    pub async fn list_chats(&self, user_id: Uuid) -> ServiceResult<Vec<ChatSummary>> {
        let chats = self.store.run(move |db| db.list_chats_for_user(user_id)).await?;

        let mut summaries = Vec::with_capacity(chats.len());
        for (chat, last) in chats {
            let other = chat.other_participant(user_id);
            summaries.push(ChatSummary {
                other_participant_id: other,
                other_participant_name: self.identity.display_name(other).await?,
                last_message: last.as_ref().map(|m| m.text.clone()),
                last_message_time: last.map(|m| m.timestamp),
                chat,
            });
        }
        Ok(summaries)
    }

    /// The current log of the chat plus a live feed of later messages.
    pub async fn subscribe(&self, chat_id: Uuid, requester_id: Uuid) -> ServiceResult<ChatSubscription> {
        self.participant_chat(chat_id, requester_id).await?;

        // Subscribe before reading the log so nothing falls between the two.
        let rx = self.dispatcher.subscribe();
        let backlog = self.store.run(move |db| db.list_messages(chat_id)).await?;
        let cursor = ChatCursor::after_backlog(&backlog);

        Ok(ChatSubscription {
            chat_id,
            store: self.store.clone(),
            backlog,
            cursor,
            missed: VecDeque::new(),
            rx,
        })
    }

    /// Checks `item` against the post it names and returns it in canonical form.
    async fn anchor(&self, item: ChatItem, user_a: Uuid, user_b: Uuid) -> ServiceResult<ChatItem> {
        let post_id: Uuid = item
            .item_id
            .trim()
            .parse()
            .map_err(|_| ServiceError::validation("itemId must be a post id"))?;
        let post = self
            .store
            .run(move |db| db.get_post(post_id))
            .await?
            .ok_or(ServiceError::NotFound("post"))?;

        if post.kind != item.item_type {
            return Err(ServiceError::validation(format!(
                "post {} is a {} post, not {}",
                post.id, post.kind, item.item_type
            )));
        }
        if post.user_id != user_a && post.user_id != user_b {
            return Err(ServiceError::validation("the post's author must take part in the chat"));
        }

        Ok(ChatItem {
            item_id: post.id.to_string(),
            item_type: post.kind,
        })
    }

    async fn participant_chat(&self, chat_id: Uuid, user_id: Uuid) -> ServiceResult<Chat> {
        let chat = self
            .store
            .run(move |db| db.get_chat(chat_id))
            .await?
            .ok_or(ServiceError::NotFound("chat"))?;
        if !chat.has_participant(user_id) {
            return Err(ServiceError::forbidden("not a participant of this chat"));
        }
        Ok(chat)
    }
}

/// Ordered view of one chat. Dropping it ends the subscription.
pub struct ChatSubscription {
    chat_id: Uuid,
    store: Store,
    backlog: Vec<Message>,
    cursor: ChatCursor,
    /// Read back from the store after the receiver lagged, not yet handed out.
    missed: VecDeque<Message>,
    rx: broadcast::Receiver<GatewayEvent>,
}

impl ChatSubscription {
    pub fn chat_id(&self) -> Uuid {
        self.chat_id
    }

    /// Messages that existed when the subscription started.
    pub fn backlog(&self) -> &[Message] {
        &self.backlog
    }

    /// Next live message of this chat. `None` once the feed closes, or when
    /// messages missed during a lag can't be read back.
    pub async fn next(&mut self) -> Option<Message> {
        loop {
            if let Some(message) = self.missed.pop_front() {
                return Some(message);
            }
            match self.rx.recv().await {
                Ok(GatewayEvent::MessageCreate { message }) if message.chat_id == self.chat_id => {
                    if self.cursor.accept(&message) {
                        return Some(message);
                    }
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Chat {} subscription lagged by {} events, reading missed messages", self.chat_id, n);
                    let chat_id = self.chat_id;
                    match self.store.run(move |db| db.list_messages(chat_id)).await {
                        Ok(log) => self.missed.extend(self.cursor.catch_up(log)),
                        Err(e) => {
                            warn!("Chat {} catch-up failed, closing subscription: {}", chat_id, e);
                            return None;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use connect_types::models::{ItemType, Role};

    async fn chat_between(fx: &Fixture, a: Uuid, b: Uuid) -> Chat {
        fx.chats.open_or_reuse(a, b, None).await.unwrap().into_chat()
    }

    #[tokio::test]
    async fn open_or_reuse_is_idempotent() {
        let fx = Fixture::new();
        let ada = fx.user("Ada", "Lovelace", Role::Entrepreneur);
        let grace = fx.user("Grace", "Hopper", Role::Investor);
        let post = fx.post(ada, ItemType::Startup);
        let item = ChatItem {
            item_id: post.to_string(),
            item_type: ItemType::Startup,
        };

        let first = fx.chats.open_or_reuse(grace, ada, Some(item.clone())).await.unwrap();
        assert!(first.created());
        let second = fx.chats.open_or_reuse(ada, grace, Some(item)).await.unwrap();
        assert!(!second.created());
        assert_eq!(first.chat().id, second.chat().id);

        // The same post spelled differently still finds the chat.
        let shouted = ChatItem {
            item_id: format!(" {} ", post.to_string().to_uppercase()),
            item_type: ItemType::Startup,
        };
        let third = fx.chats.open_or_reuse(grace, ada, Some(shouted)).await.unwrap();
        assert_eq!(third.chat().id, first.chat().id);

        assert!(matches!(
            fx.chats.open_or_reuse(ada, ada, None).await,
            Err(ServiceError::InvalidOperation(_))
        ));
        assert!(matches!(
            fx.chats.open_or_reuse(ada, Uuid::new_v4(), None).await,
            Err(ServiceError::NotFound("user"))
        ));
    }

    #[tokio::test]
    async fn chat_items_must_name_a_matching_post() {
        let fx = Fixture::new();
        let ada = fx.user("Ada", "Lovelace", Role::Entrepreneur);
        let grace = fx.user("Grace", "Hopper", Role::Investor);
        let eve = fx.user("Eve", "Dropper", Role::Investor);
        let offer = fx.post(grace, ItemType::Investment);
        let item = |item_id: String, item_type| Some(ChatItem { item_id, item_type });

        assert!(matches!(
            fx.chats.open_or_reuse(ada, grace, item("deck-42".into(), ItemType::Startup)).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            fx.chats
                .open_or_reuse(ada, grace, item(Uuid::new_v4().to_string(), ItemType::Investment))
                .await,
            Err(ServiceError::NotFound("post"))
        ));
        assert!(matches!(
            fx.chats.open_or_reuse(ada, grace, item(offer.to_string(), ItemType::Startup)).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            fx.chats.open_or_reuse(ada, eve, item(offer.to_string(), ItemType::Investment)).await,
            Err(ServiceError::Validation(_))
        ));

        let chat = fx
            .chats
            .open_or_reuse(ada, grace, item(offer.to_string(), ItemType::Investment))
            .await
            .unwrap()
            .into_chat();
        let anchored = chat.item.unwrap();
        assert_eq!(anchored.item_id, offer.to_string());
        assert_eq!(anchored.item_type, ItemType::Investment);
    }

    #[tokio::test]
    async fn send_succeeds_when_the_notification_cannot_be_stored() {
        let fx = Fixture::new();
        let ada = fx.user("Ada", "Lovelace", Role::Entrepreneur);
        let grace = fx.user("Grace", "Hopper", Role::Investor);
        let chat = chat_between(&fx, ada, grace).await;
        fx.break_notification_writes();

        let sent = fx.chats.send(chat.id, ada, "still delivered").await.unwrap();
        let messages = fx.chats.list(chat.id, grace).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, sent.id);
    }

    #[tokio::test]
    async fn empty_message_is_rejected_and_text_appears_once() {
        let fx = Fixture::new();
        let ada = fx.user("Ada", "Lovelace", Role::Entrepreneur);
        let grace = fx.user("Grace", "Hopper", Role::Investor);
        let chat = chat_between(&fx, ada, grace).await;

        assert!(matches!(fx.chats.send(chat.id, ada, "").await, Err(ServiceError::EmptyMessage)));
        assert!(matches!(fx.chats.send(chat.id, ada, "   ").await, Err(ServiceError::EmptyMessage)));

        fx.chats.send(chat.id, ada, "hi").await.unwrap();
        let messages = fx.chats.list(chat.id, grace).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "hi");

        let inbox = fx.notifications.list(grace, true).await.unwrap();
        assert_eq!(inbox[0].kind, NotificationKind::Chat);
        assert_eq!(inbox[0].message, "New message from Ada Lovelace");
    }

    #[tokio::test]
    async fn outsiders_cannot_read_or_write() {
        let fx = Fixture::new();
        let ada = fx.user("Ada", "Lovelace", Role::Entrepreneur);
        let grace = fx.user("Grace", "Hopper", Role::Investor);
        let eve = fx.user("Eve", "Dropper", Role::Investor);
        let chat = chat_between(&fx, ada, grace).await;

        assert!(matches!(fx.chats.send(chat.id, eve, "psst").await, Err(ServiceError::Forbidden(_))));
        assert!(matches!(fx.chats.list(chat.id, eve).await, Err(ServiceError::Forbidden(_))));
        assert!(matches!(
            fx.chats.send(Uuid::new_v4(), ada, "hello?").await,
            Err(ServiceError::NotFound("chat"))
        ));
    }

    #[tokio::test]
    async fn messages_are_ordered_even_with_a_frozen_clock() {
        let fx = Fixture::new();
        let ada = fx.user("Ada", "Lovelace", Role::Entrepreneur);
        let grace = fx.user("Grace", "Hopper", Role::Investor);
        let chat = chat_between(&fx, ada, grace).await;

        for text in ["one", "two", "three", "four"] {
            fx.chats.send(chat.id, ada, text).await.unwrap();
        }

        let messages = fx.chats.list(chat.id, ada).await.unwrap();
        let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["one", "two", "three", "four"]);
        assert!(messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn subscription_yields_backlog_then_live_messages() {
        let fx = Fixture::new();
        let ada = fx.user("Ada", "Lovelace", Role::Entrepreneur);
        let grace = fx.user("Grace", "Hopper", Role::Investor);
        let chat = chat_between(&fx, ada, grace).await;
        let other_chat = chat_between(&fx, grace, fx.user("Eve", "Dropper", Role::Investor)).await;

        fx.chats.send(chat.id, ada, "before").await.unwrap();
        let mut sub = fx.chats.subscribe(chat.id, grace).await.unwrap();
        assert_eq!(sub.backlog().len(), 1);

        fx.chats.send(other_chat.id, grace, "elsewhere").await.unwrap();
        fx.chats.send(chat.id, grace, "after").await.unwrap();

        let live = sub.next().await.unwrap();
        assert_eq!(live.text, "after");
        assert_eq!(live.chat_id, sub.chat_id());
    }

    #[tokio::test]
    async fn lagging_subscription_reads_missed_messages_back() {
        let fx = Fixture::new();
        let ada = fx.user("Ada", "Lovelace", Role::Entrepreneur);
        let grace = fx.user("Grace", "Hopper", Role::Investor);
        let chat = chat_between(&fx, ada, grace).await;

        let mut sub = fx.chats.subscribe(chat.id, grace).await.unwrap();
        // More than the broadcast channel holds, so the receiver lags.
        for i in 0..1100 {
            fx.chats.send(chat.id, ada, &format!("m{i}")).await.unwrap();
        }

        for i in 0..1100 {
            let message = sub.next().await.unwrap();
            assert_eq!(message.text, format!("m{i}"));
        }

        // What is still queued was already handed out; the next one is new.
        fx.chats.send(chat.id, ada, "fresh").await.unwrap();
        assert_eq!(sub.next().await.unwrap().text, "fresh");
    }

    #[tokio::test]
    async fn chat_list_shows_counterpart_and_last_message() {
        let fx = Fixture::new();
        let ada = fx.user("Ada", "Lovelace", Role::Entrepreneur);
        let grace = fx.user("Grace", "Hopper", Role::Investor);
        let chat = chat_between(&fx, ada, grace).await;
        fx.chats.send(chat.id, grace, "ping").await.unwrap();

        let summaries = fx.chats.list_chats(ada).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].other_participant_id, grace);
        assert_eq!(summaries[0].other_participant_name, "Grace Hopper");
        assert_eq!(summaries[0].last_message.as_deref(), Some("ping"));
    }
}
