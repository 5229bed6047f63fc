use std::collections::HashMap;

use axum::{Extension, Json, extract::State};
use tracing::{debug, warn};
use uuid::Uuid;

use connect_gateway::Dispatcher;
use connect_types::api::{Claims, MarkReadResponse, NotificationQuery, NotificationView};
use connect_types::events::GatewayEvent;
use connect_types::models::{Notification, NotificationKind};

use crate::clock::SharedClock;
use crate::error::{ApiQuery, ServiceResult};
use crate::identity::IdentityResolver;
use crate::state::AppState;
use crate::store::Store;

/// Per-user inboxes. New entries are also pushed to the recipient's live
/// gateway connection, if there is one.
#[derive(Clone)]
pub struct NotificationSink {
    store: Store,
    dispatcher: Dispatcher,
    identity: IdentityResolver,
    clock: SharedClock,
}

impl NotificationSink {
    pub fn new(store: Store, dispatcher: Dispatcher, identity: IdentityResolver, clock: SharedClock) -> Self {
        Self {
            store,
            dispatcher,
            identity,
            clock,
        }
    }

    pub async fn notify(
        &self,
        recipient_id: Uuid,
        kind: NotificationKind,
        sender_id: Uuid,
        message: impl Into<String>,
    ) -> ServiceResult<Notification> {
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_id,
            kind,
            sender_id,
            message: message.into(),
            created_at: self.clock.now(),
            read: false,
        };

        let row = notification.clone();
        self.store.run(move |db| db.insert_notification(&row)).await?;

        let pushed = self
            .dispatcher
            .send_to_user(
                recipient_id,
                GatewayEvent::NotificationCreate {
                    notification: notification.clone(),
                },
            )
            .await;
        debug!("Notified {} ({}), live push: {}", recipient_id, kind, pushed);

        Ok(notification)
    }

    /// Side-effect delivery for ledger and chat operations: a failure is
    /// logged and swallowed.
    pub async fn notify_best_effort(
        &self,
        recipient_id: Uuid,
        kind: NotificationKind,
        sender_id: Uuid,
        message: impl Into<String>,
    ) {
        if let Err(e) = self.notify(recipient_id, kind, sender_id, message).await {
            warn!("Failed to deliver {} notification to {}: {}", kind, recipient_id, e);
        }
    }

    /// Newest first, with sender names resolved.
    pub async fn list(&self, user_id: Uuid, unread_only: bool) -> ServiceResult<Vec<NotificationView>> {
        let notifications = self
            .store
            .run(move |db| db.list_notifications(user_id, unread_only))
            .await?;

        let mut names: HashMap<Uuid, String> = HashMap::new();
        let mut views = Vec::with_capacity(notifications.len());
        for n in notifications {
            let sender_name = match names.get(&n.sender_id) {
                Some(name) => name.clone(),
                None => {
                    let name = self.identity.display_name(n.sender_id).await?;
                    names.insert(n.sender_id, name.clone());
                    name
                }
            };
            views.push(NotificationView {
                id: n.id,
                kind: n.kind,
                sender_id: n.sender_id,
                sender_name,
                message: n.message,
                created_at: n.created_at,
                read: n.read,
            });
        }
        Ok(views)
    }

    /// Marks every currently unread notification as read.
    pub async fn mark_all_read(&self, user_id: Uuid) -> ServiceResult<usize> {
        let updated = self
            .store
            .run(move |db| db.mark_all_notifications_read(user_id))
            .await?;
        debug!("Marked {} notifications read for {}", updated, user_id);
        Ok(updated)
    }
}

// -- Handlers --

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiQuery(query): ApiQuery<NotificationQuery>,
) -> ServiceResult<Json<Vec<NotificationView>>> {
    let views = state.notifications.list(claims.sub, query.unread).await?;
    Ok(Json(views))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ServiceResult<Json<MarkReadResponse>> {
    let updated = state.notifications.mark_all_read(claims.sub).await?;
    Ok(Json(MarkReadResponse { updated }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use chrono::Duration;
    use connect_types::models::Role;

    #[tokio::test]
    async fn notify_stores_unread_and_pushes_live() {
        let fx = Fixture::new();
        let owner = fx.user("Ada", "Lovelace", Role::Entrepreneur);
        let investor = fx.user("Grace", "Hopper", Role::Investor);
        let (_conn, mut rx) = fx.dispatcher.register_user_channel(owner).await;

        let stored = fx
            .notifications
            .notify(owner, NotificationKind::Chat, investor, "New message from Grace Hopper")
            .await
            .unwrap();
        assert!(!stored.read);

        match rx.recv().await.unwrap() {
            GatewayEvent::NotificationCreate { notification } => assert_eq!(notification.id, stored.id),
            other => panic!("unexpected event: {other:?}"),
        }

        let inbox = fx.notifications.list(owner, true).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].sender_name, "Grace Hopper");
    }

    #[tokio::test]
    async fn mark_all_read_empties_unread_view() {
        let fx = Fixture::new();
        let me = fx.user("Ada", "Lovelace", Role::Entrepreneur);
        let other = fx.user("Grace", "Hopper", Role::Investor);

        for i in 0..3 {
            fx.clock.advance(Duration::seconds(1));
            fx.notifications
                .notify(me, NotificationKind::RequestReceived, other, format!("n{i}"))
                .await
                .unwrap();
        }

        let inbox = fx.notifications.list(me, false).await.unwrap();
        let texts: Vec<&str> = inbox.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(texts, ["n2", "n1", "n0"]);

        assert_eq!(fx.notifications.mark_all_read(me).await.unwrap(), 3);
        assert!(fx.notifications.list(me, true).await.unwrap().is_empty());
        assert_eq!(fx.notifications.list(me, false).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unknown_sender_gets_placeholder_name() {
        let fx = Fixture::new();
        let me = fx.user("Ada", "Lovelace", Role::Entrepreneur);
        let ghost = Uuid::new_v4();

        fx.notifications
            .notify(me, NotificationKind::Chat, ghost, "hello")
            .await
            .unwrap();

        let inbox = fx.notifications.list(me, false).await.unwrap();
        assert_eq!(inbox[0].sender_name, crate::identity::fallback_name(ghost));
    }
}
