//! MessagePusher trait 定義
//!
//! 接続へのメッセージ配送（単一接続への送信と、会議単位のブロードキャスト）を抽象化します。
//! 具体的な実装は Infrastructure 層が提供します。

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ConnectionId, MeetingId, MessagePushError};

/// 接続ごとの送信キュー（有界）
pub type PusherChannel = mpsc::Sender<String>;

/// メッセージ配送の抽象化（Broadcast Router）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagePusher: Send + Sync {
    /// 単一の接続へ送信する
    async fn send_to_connection(
        &self,
        connection_id: ConnectionId,
        payload: &str,
    ) -> Result<(), MessagePushError>;

    /// 会議のオーディエンスへブロードキャストする
    ///
    /// オーディエンスはイベントごとに再計算される。配送は受信者ごとに独立した
    /// ベストエフォートで、呼び出し側は配送完了を待たない。
    ///
    /// # Returns
    ///
    /// 配送を試みる受信者の数
    async fn broadcast_to_meeting(
        &self,
        meeting_id: MeetingId,
        payload: &str,
        excluding: &HashSet<ConnectionId>,
    ) -> usize;
}
