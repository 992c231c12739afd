//! WebSocket を使った MessagePusher 実装（Broadcast Router）
//!
//! ## 責務
//!
//! - 単一接続への送信（`send_to_connection`）
//! - 会議のオーディエンスの算出とブロードキャスト（`broadcast_to_meeting`）
//!
//! ## 設計ノート
//!
//! WebSocket の生成と送信キューの作成は UI 層（`ui/handler/websocket.rs`）で行われ、
//! キューの送信側は Connection Registry に登録されます。この実装は Registry から
//! 送信側を取り出して配送します。Registry のガードを保持したまま待機することはありません。
//!
//! オーディエンスはイベントごとに「会議に紐付いた開いている接続」と「会議の現在の参加者」の
//! 積集合として再計算されます。

use std::{collections::HashSet, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::mpsc::error::SendTimeoutError;

use crate::domain::{
    ConnectionId, ConnectionRegistry, MeetingId, MessagePushError, MessagePusher, PersonId,
    PusherChannel, RecordStore,
};

/// WebSocket を使った MessagePusher 実装
pub struct WebSocketMessagePusher {
    /// 接続と送信キューの管理
    registry: Arc<ConnectionRegistry>,
    /// 参加者の照会に使う Record Store
    store: Arc<dyn RecordStore>,
    /// 受信者ごとの配送タイムアウト
    delivery_timeout: Duration,
}

impl WebSocketMessagePusher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn RecordStore>,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            delivery_timeout,
        }
    }

    /// 会議のオーディエンス（開いている・紐付いている・参加している接続）を算出
    async fn resolve_audience(
        &self,
        meeting_id: MeetingId,
        excluding: &HashSet<ConnectionId>,
    ) -> Vec<(ConnectionId, PusherChannel)> {
        let candidates = self.registry.list_by_meeting(meeting_id);
        if candidates.is_empty() {
            return Vec::new();
        }

        let participants: HashSet<PersonId> =
            match self.store.list_participants(meeting_id).await {
                Ok(participants) => participants.into_iter().collect(),
                Err(e) => {
                    tracing::error!(
                        "Failed to resolve participants of meeting {} for broadcast: {}",
                        meeting_id,
                        e
                    );
                    return Vec::new();
                }
            };

        candidates
            .into_iter()
            .filter(|id| !excluding.contains(id))
            .filter_map(|id| {
                let connection = self.registry.get(id)?;
                let in_audience = connection.open
                    && connection.meeting_id == Some(meeting_id)
                    && connection
                        .person_id()
                        .is_some_and(|person_id| participants.contains(&person_id));
                if !in_audience {
                    tracing::debug!(
                        "Connection '{}' is attached to meeting {} but not in its audience",
                        id,
                        meeting_id
                    );
                    return None;
                }
                Some((id, self.registry.sender(id)?))
            })
            .collect()
    }
}

/// 有界キューへ 1 件配送する。タイムアウトを超えたら諦める
async fn deliver(
    connection_id: ConnectionId,
    sender: PusherChannel,
    payload: String,
    timeout: Duration,
) -> Result<(), MessagePushError> {
    sender
        .send_timeout(payload, timeout)
        .await
        .map_err(|e| match e {
            SendTimeoutError::Timeout(_) => MessagePushError::Timeout(connection_id),
            SendTimeoutError::Closed(_) => MessagePushError::ConnectionClosed(connection_id),
        })
}

#[async_trait]
impl MessagePusher for WebSocketMessagePusher {
    async fn send_to_connection(
        &self,
        connection_id: ConnectionId,
        payload: &str,
    ) -> Result<(), MessagePushError> {
        let connection = self
            .registry
            .get(connection_id)
            .ok_or(MessagePushError::ConnectionNotFound(connection_id))?;
        if !connection.open {
            return Err(MessagePushError::ConnectionClosed(connection_id));
        }
        let sender = self
            .registry
            .sender(connection_id)
            .ok_or(MessagePushError::ConnectionNotFound(connection_id))?;

        deliver(
            connection_id,
            sender,
            payload.to_string(),
            self.delivery_timeout,
        )
        .await?;
        tracing::debug!("Pushed message to connection '{}'", connection_id);
        Ok(())
    }

    async fn broadcast_to_meeting(
        &self,
        meeting_id: MeetingId,
        payload: &str,
        excluding: &HashSet<ConnectionId>,
    ) -> usize {
        let audience = self.resolve_audience(meeting_id, excluding).await;
        let count = audience.len();

        // 受信者ごとに独立して配送し、一部の失敗は許容する
        let deliveries = audience.into_iter().map(|(connection_id, sender)| {
            let payload = payload.to_string();
            let timeout = self.delivery_timeout;
            async move {
                match deliver(connection_id, sender, payload, timeout).await {
                    Ok(()) => tracing::debug!(
                        "Broadcasted message to connection '{}'",
                        connection_id
                    ),
                    Err(e) => tracing::warn!(
                        "Failed to deliver broadcast for meeting {}: {}",
                        meeting_id,
                        e
                    ),
                }
            }
        });
        join_all(deliveries).await;

        count
    }
}
