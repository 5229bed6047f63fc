use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

use connect_db::Database;
use connect_types::events::{GatewayCommand, GatewayEvent};
use connect_types::models::Role;

use crate::dispatcher::Dispatcher;
use crate::feed::ChatFeeds;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drives one authenticated WebSocket connection. The token was checked at
/// the HTTP upgrade, so the client gets `Ready` straight away.
///
/// Commands are handed from the receive task to the send task, which owns
/// the chat feeds, so a subscription's backlog always goes out before the
/// live messages that follow it.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
    role: Role,
) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} ({}) connected to gateway", user_id, role);

    if !send_event(&mut sender, &GatewayEvent::Ready { user_id, role }).await {
        return;
    }

    let (conn_id, mut user_rx) = dispatcher.register_user_channel(user_id).await;
    // Subscribed before any backlog read so nothing falls between the two.
    let mut broadcast_rx = dispatcher.subscribe();
    let mut feeds = ChatFeeds::new(db, user_id);
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<GatewayCommand>();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let events = match result {
                        Ok(event) => {
                            if !feeds.accept(&event) {
                                continue;
                            }
                            vec![event]
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("{} broadcast receiver lagged by {} events, reading missed messages", user_id, n);
                            match feeds.catch_up().await {
                                Ok(events) => events,
                                Err(e) => {
                                    warn!("Catch-up failed for {}, dropping connection: {}", user_id, e);
                                    break;
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };

                    if !send_events(&mut sender, &events).await {
                        break;
                    }
                }
                Some(cmd) = cmd_rx.recv() => {
                    let events = match cmd {
                        GatewayCommand::Subscribe { chat_ids } => feeds.subscribe(chat_ids).await,
                        GatewayCommand::Unsubscribe { chat_ids } => vec![feeds.unsubscribe(&chat_ids)],
                    };
                    if !send_events(&mut sender, &events).await {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    // None means a newer connection took over the user channel.
                    let Some(event) = result else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        if cmd_tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister_user_channel(user_id, conn_id).await;
    info!("{} disconnected from gateway", user_id);
}

async fn send_events(sender: &mut SplitSink<WebSocket, Message>, events: &[GatewayEvent]) -> bool {
    for event in events {
        if !send_event(sender, event).await {
            return false;
        }
    }
    true
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &GatewayEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode gateway event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}
