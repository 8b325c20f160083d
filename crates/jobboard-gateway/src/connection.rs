use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use jobboard_types::events::GatewayEvent;

use crate::gate::Identity;
use crate::registry::GroupRegistry;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle one admitted WebSocket connection.
///
/// The credential was already checked at the HTTP upgrade layer, so the
/// identity here is final. The connection joins its user's group, receives
/// `Ready`, then gets every event emitted to that group until it closes.
pub async fn handle_connection(socket: WebSocket, registry: GroupRegistry, identity: Identity) {
    let conn_id = Uuid::new_v4();
    let (mut sender, receiver) = socket.split();

    // Join before Ready so nothing emitted after Ready can be missed.
    let Some(user_rx) = registry.join(conn_id, identity.user_id).await else {
        warn!("Connection {} was already joined, closing", conn_id);
        return;
    };

    info!("{} ({}) connected to gateway [conn={}]", identity.email, identity.user_id, conn_id);

    let ready = GatewayEvent::Ready {
        user_id: identity.user_id,
        role: identity.role,
    };
    if send_event(&mut sender, &ready).await.is_err() {
        registry.leave(conn_id).await;
        return;
    }

    run_connection_loop(sender, receiver, user_rx, conn_id).await;

    registry.leave(conn_id).await;
    info!("{} ({}) disconnected from gateway [conn={}]", identity.email, identity.user_id, conn_id);
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut user_rx: tokio::sync::mpsc::UnboundedReceiver<GatewayEvent>,
    conn_id: Uuid,
) {
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = user_rx.recv() => {
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout on conn {} (missed {} pongs), dropping", conn_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }

        let _ = sender.close().await;
    });

    // The channel is push-only. Client frames only matter for liveness.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                Message::Text(text) => {
                    let preview: String = text.chars().take(200).collect();
                    debug!("Ignoring client frame on conn {}: {}", conn_id, preview);
                }
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialize {} event: {}", event.name(), e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}
