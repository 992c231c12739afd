//! Domain entities

use super::{
    error::MeetingError,
    value_object::{
        ConnectionId, FloorRequestId, MeetingId, MeetingTitle, MessageContent, MessageId,
        PersonId, Timestamp,
    },
};

/// 人物（ユーザー）
///
/// 正本は Record Store にあり、接続側は ID と表示名だけをキャッシュする。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub id: PersonId,
    pub login: String,
    pub first_name: String,
    pub last_name: String,
    pub online: bool,
}

impl Person {
    /// 表示名。氏名が未設定ならログイン名を使う
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.login.clone()
        } else {
            full.to_string()
        }
    }

    /// 接続にキャッシュする識別情報を作る
    pub fn identity(&self) -> Identity {
        Identity {
            person_id: self.id,
            login: self.login.clone(),
            display_name: self.display_name(),
        }
    }
}

/// Record Store への人物の登録内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPerson {
    pub login: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// 会議の公開種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeetingKind {
    Standard,
    Private,
    Democratic,
}

/// 会議のライフサイクル状態（PLANNED → OPEN → CLOSED の一方向）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeetingStatus {
    Planned,
    Open,
    Closed,
}

/// 会議
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meeting {
    pub id: MeetingId,
    pub title: MeetingTitle,
    pub subject: String,
    pub agenda: String,
    pub starts_at: Timestamp,
    pub duration_minutes: u32,
    pub kind: MeetingKind,
    pub organizer_id: PersonId,
    pub moderator_id: Option<PersonId>,
    pub status: MeetingStatus,
}

impl Meeting {
    pub fn is_organizer(&self, person_id: PersonId) -> bool {
        self.organizer_id == person_id
    }

    /// 状態遷移・発言許可の権限（主催者またはモデレーター）
    pub fn can_moderate(&self, person_id: PersonId) -> bool {
        self.is_organizer(person_id) || self.moderator_id == Some(person_id)
    }

    pub fn is_closed(&self) -> bool {
        self.status == MeetingStatus::Closed
    }

    /// 遷移先の状態を検証して返す
    ///
    /// 許可されるのは PLANNED → OPEN と OPEN → CLOSED のみ。
    pub fn transition_to(&self, target: MeetingStatus) -> Result<MeetingStatus, MeetingError> {
        match (self.status, target) {
            (MeetingStatus::Planned, MeetingStatus::Open)
            | (MeetingStatus::Open, MeetingStatus::Closed) => Ok(target),
            (from, to) => Err(MeetingError::InvalidTransition { from, to }),
        }
    }
}

/// Record Store への会議の登録内容（ID と状態はストアが決める）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMeeting {
    pub title: MeetingTitle,
    pub subject: String,
    pub agenda: String,
    pub starts_at: Timestamp,
    pub duration_minutes: u32,
    pub kind: MeetingKind,
    pub organizer_id: PersonId,
    pub moderator_id: Option<PersonId>,
}

/// 発言要求の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloorRequestStatus {
    Pending,
    Granted,
    Denied,
    /// 要求者が会議から退出して取り下げられた
    Withdrawn,
}

/// 発言要求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloorRequest {
    pub id: FloorRequestId,
    pub requester_id: PersonId,
    pub meeting_id: MeetingId,
    pub requested_at: Timestamp,
    pub status: FloorRequestStatus,
}

impl FloorRequest {
    pub fn is_pending(&self) -> bool {
        self.status == FloorRequestStatus::Pending
    }
}

/// 永続化済みのチャットメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub author_id: PersonId,
    pub meeting_id: MeetingId,
    pub content: MessageContent,
    /// Record Store が挿入時に採番する送信時刻
    pub sent_at: Timestamp,
}

/// Record Store へのメッセージの登録内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChatMessage {
    pub author_id: PersonId,
    pub meeting_id: MeetingId,
    pub content: MessageContent,
}

/// 認証後に接続へ付与される識別情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub person_id: PersonId,
    pub login: String,
    pub display_name: String,
}

/// ライブ接続
///
/// Connection Registry が排他的に所有する。open で生成、ログイン・参加で更新、close で破棄。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub identity: Option<Identity>,
    pub meeting_id: Option<MeetingId>,
    pub open: bool,
    pub connected_at: Timestamp,
}

impl Connection {
    pub fn new(id: ConnectionId, connected_at: Timestamp) -> Self {
        Self {
            id,
            identity: None,
            meeting_id: None,
            open: true,
            connected_at,
        }
    }

    pub fn person_id(&self) -> Option<PersonId> {
        self.identity.as_ref().map(|identity| identity.person_id)
    }
}
