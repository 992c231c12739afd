//! UseCase: 切断処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - DisconnectUseCase::execute() メソッド
//! - 接続の登録解除とオンライン状態の更新
//!
//! ### なぜこのテストが必要か
//! - 切断しても参加（Participation）は残ることを保証
//! - 同じ人物の最後の接続が閉じたときだけオフラインになることを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：ログイン済みの接続の切断
//! - エッジケース：同じ人物が別の接続を持っている場合
//! - 異常系：未登録の接続の切断

use std::sync::Arc;

use crate::domain::{Connection, ConnectionId, ConnectionRegistry, RecordStore};

/// 切断のユースケース
pub struct DisconnectUseCase {
    /// Connection Registry（接続の管理）
    registry: Arc<ConnectionRegistry>,
    /// Record Store（オンライン状態の更新）
    store: Arc<dyn RecordStore>,
}

impl DisconnectUseCase {
    /// 新しい DisconnectUseCase を作成
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<dyn RecordStore>) -> Self {
        Self { registry, store }
    }

    /// 切断を実行
    ///
    /// 接続を閉じた状態にしてから登録解除する。会議の紐付けは黙って解除され、
    /// 参加は変更しない。同じ人物の接続が他に残っていなければオフラインにする。
    ///
    /// # Returns
    ///
    /// * `Some(Connection)` - 登録解除した接続
    /// * `None` - 未登録の接続
    pub async fn execute(&self, connection_id: ConnectionId) -> Option<Connection> {
        self.registry.mark_closed(connection_id);
        let connection = self.registry.unregister(connection_id)?;

        if let Some(identity) = &connection.identity {
            if !self
                .registry
                .is_person_connected(identity.person_id, connection_id)
            {
                if let Err(e) = self.store.set_online(identity.person_id, false).await {
                    tracing::error!(
                        "Failed to mark person {} offline: {}",
                        identity.person_id,
                        e
                    );
                }
            }
        }

        tracing::info!(
            "Connection '{}' closed ({} connection(s) live)",
            connection_id,
            self.registry.len()
        );
        Some(connection)
    }
}
