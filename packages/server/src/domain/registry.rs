//! Connection Registry
//!
//! ライブ接続と、接続に付与された識別情報・会議を管理します。
//!
//! ## 並行性
//!
//! 接続表と「会議 → 接続」索引はそれぞれシャード化された `DashMap` で保持し、
//! ロックは単一の接続または単一の会議の範囲に限られる。2 つの表のガードを
//! 同時に保持することはない。

use std::collections::HashSet;

use dashmap::DashMap;

use super::{
    Connection, ConnectionId, Identity, MeetingId, PersonId, PusherChannel, RegistryError,
};

struct Entry {
    connection: Connection,
    sender: PusherChannel,
}

/// ライブ接続のレジストリ
///
/// サーバーの生存期間に所有される明示的なインスタンスとして使う。
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Entry>,
    by_meeting: DashMap<MeetingId, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接続を登録
    pub fn register(&self, connection: Connection, sender: PusherChannel) {
        let id = connection.id;
        self.connections.insert(id, Entry { connection, sender });
        tracing::debug!("Connection '{}' registered", id);
    }

    /// 認証済みの識別情報を接続に付与
    pub fn attach_identity(
        &self,
        id: ConnectionId,
        identity: Identity,
    ) -> Result<(), RegistryError> {
        let mut entry = self
            .connections
            .get_mut(&id)
            .ok_or(RegistryError::UnknownConnection(id))?;
        entry.connection.identity = Some(identity);
        Ok(())
    }

    /// 接続を会議に紐付ける。以前の会議があればそれを返す
    pub fn attach_meeting(
        &self,
        id: ConnectionId,
        meeting_id: MeetingId,
    ) -> Result<Option<MeetingId>, RegistryError> {
        let previous = {
            let mut entry = self
                .connections
                .get_mut(&id)
                .ok_or(RegistryError::UnknownConnection(id))?;
            entry.connection.meeting_id.replace(meeting_id)
        };

        if let Some(previous) = previous.filter(|previous| *previous != meeting_id) {
            self.remove_from_index(previous, id);
        }
        self.by_meeting.entry(meeting_id).or_default().insert(id);

        // 並行した unregister で接続が消えていたら索引を戻す
        if !self.connections.contains_key(&id) {
            self.remove_from_index(meeting_id, id);
        }

        Ok(previous)
    }

    /// 接続の会議の紐付けを解除。解除した会議を返す
    pub fn detach_meeting(&self, id: ConnectionId) -> Result<Option<MeetingId>, RegistryError> {
        let previous = {
            let mut entry = self
                .connections
                .get_mut(&id)
                .ok_or(RegistryError::UnknownConnection(id))?;
            entry.connection.meeting_id.take()
        };

        if let Some(previous) = previous {
            self.remove_from_index(previous, id);
        }
        Ok(previous)
    }

    /// 接続を閉じた状態にする（以後ブロードキャスト対象外）
    pub fn mark_closed(&self, id: ConnectionId) {
        if let Some(mut entry) = self.connections.get_mut(&id) {
            entry.connection.open = false;
        }
    }

    /// 接続を登録解除
    ///
    /// 会議の紐付けも黙って解除する。参加（Participation）には触れない。
    pub fn unregister(&self, id: ConnectionId) -> Option<Connection> {
        let (_, entry) = self.connections.remove(&id)?;
        if let Some(meeting_id) = entry.connection.meeting_id {
            self.remove_from_index(meeting_id, id);
        }
        tracing::debug!("Connection '{}' unregistered", id);
        Some(entry.connection)
    }

    /// 会議に紐付いた接続 ID のスナップショット
    pub fn list_by_meeting(&self, meeting_id: MeetingId) -> HashSet<ConnectionId> {
        self.by_meeting
            .get(&meeting_id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default()
    }

    /// 接続のスナップショット
    pub fn get(&self, id: ConnectionId) -> Option<Connection> {
        self.connections
            .get(&id)
            .map(|entry| entry.connection.clone())
    }

    /// 接続の送信キュー
    pub fn sender(&self, id: ConnectionId) -> Option<PusherChannel> {
        self.connections.get(&id).map(|entry| entry.sender.clone())
    }

    /// 指定の人物が（`except` 以外の）接続を持っているか
    pub fn is_person_connected(&self, person_id: PersonId, except: ConnectionId) -> bool {
        self.connections.iter().any(|entry| {
            *entry.key() != except && entry.connection.person_id() == Some(person_id)
        })
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn remove_from_index(&self, meeting_id: MeetingId, id: ConnectionId) {
        if let Some(mut ids) = self.by_meeting.get_mut(&meeting_id) {
            ids.remove(&id);
        }
        self.by_meeting
            .remove_if(&meeting_id, |_, ids| ids.is_empty());
    }
}
