//! UseCase: 接続処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - ConnectUseCase::execute() メソッド
//! - 接続の登録と welcome イベントの送信
//!
//! ### どのような状況を想定しているか
//! - 正常系：新規接続の登録
//! - エッジケース：送信キューの受信側が既に閉じている接続

use std::sync::Arc;

use parole_shared::time::{Clock, timestamp_to_rfc3339};

use crate::{
    domain::{Connection, ConnectionId, ConnectionRegistry, MessagePusher, PusherChannel, Timestamp},
    infrastructure::dto::websocket::ServerEvent,
};

/// 接続のユースケース
pub struct ConnectUseCase {
    /// Connection Registry（接続の管理）
    registry: Arc<ConnectionRegistry>,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
    clock: Arc<dyn Clock>,
}

impl ConnectUseCase {
    /// 新しい ConnectUseCase を作成
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        message_pusher: Arc<dyn MessagePusher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            message_pusher,
            clock,
        }
    }

    /// 接続を実行
    ///
    /// 接続 ID を採番して Registry に登録し、welcome イベントを送る。
    ///
    /// # Arguments
    ///
    /// * `sender` - 接続への送信キュー
    ///
    /// # Returns
    ///
    /// 採番した接続 ID
    pub async fn execute(&self, sender: PusherChannel) -> ConnectionId {
        let connection_id = ConnectionId::generate();
        let connected_at = Timestamp::new(self.clock.now_millis());
        self.registry
            .register(Connection::new(connection_id, connected_at), sender);

        let welcome = ServerEvent::Welcome {
            connection_id: connection_id.to_string(),
            timestamp: timestamp_to_rfc3339(connected_at.value()),
        };
        match serde_json::to_string(&welcome) {
            Ok(payload) => {
                if let Err(e) = self
                    .message_pusher
                    .send_to_connection(connection_id, &payload)
                    .await
                {
                    tracing::warn!("Failed to send welcome: {}", e);
                }
            }
            Err(e) => tracing::error!("Failed to serialize welcome event: {}", e),
        }

        tracing::info!(
            "Connection '{}' opened ({} connection(s) live)",
            connection_id,
            self.registry.len()
        );
        connection_id
    }
}
