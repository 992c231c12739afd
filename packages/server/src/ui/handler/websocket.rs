//! WebSocket connection handlers.
//!
//! Each socket gets three tasks: a reader that queues text frames for the
//! connection's dispatcher worker, the worker itself, and a pusher that drains
//! the bounded outbound queue into the socket. The inbound queue is bounded as
//! well; frames arriving while it is full are dropped with an `error` event.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::ui::state::AppState;

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Spawns a task that receives messages from the rx channel and pushes them to the WebSocket sender.
///
/// This function handles the outbound message flow: responses and broadcasts queued for
/// this connection are written to its socket in queue order.
fn pusher_loop(
    mut rx: mpsc::Receiver<String>,
    mut sender: SplitSink<WebSocket, Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    })
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();

    // Outbound queue; the pusher starts first so the welcome event is flushed
    let (tx, rx) = mpsc::channel(state.outbound_buffer);
    let mut send_task = pusher_loop(rx, sender);

    let connection_id = state.connect_usecase.execute(tx).await;
    let (inbound, worker) = state
        .dispatcher
        .spawn_worker(connection_id, state.inbound_buffer);

    // Spawn a task to receive frames from this client
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!("WebSocket error on '{}': {}", connection_id, e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    tracing::debug!("Received frame from '{}': {}", connection_id, text.as_str());
                    if !inbound.push(text.as_str().to_string()).await {
                        break;
                    }
                }
                Message::Binary(_) => {
                    tracing::debug!("Ignoring binary frame from '{}'", connection_id);
                }
                Message::Close(_) => {
                    tracing::info!("Connection '{}' requested close", connection_id);
                    break;
                }
                // Ping/pong is handled automatically by the WebSocket protocol
                _ => {}
            }
        }
    });

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    // The worker stops once the reader (and its queue handle) is gone
    if let Err(e) = worker.await {
        tracing::error!("Worker for connection '{}' failed: {}", connection_id, e);
    }

    state.disconnect_usecase.execute(connection_id).await;
}
