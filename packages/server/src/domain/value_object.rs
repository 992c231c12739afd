//! Value objects
//!
//! 識別子やメッセージ本文など、不変で値として比較されるドメインの型。
//! 生成時にバリデーションを行い、不正な値を持つインスタンスは作れない。

use std::fmt;

use uuid::Uuid;

use super::error::ValueObjectError;

/// メッセージ本文の最大文字数
pub const MAX_MESSAGE_CONTENT_CHARS: usize = 2000;

/// 会議タイトルの最大文字数
pub const MAX_MEETING_TITLE_CHARS: usize = 200;

/// WebSocket 接続の識別子（接続ごとにサーバーが採番する）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// 新しい ConnectionId を生成
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn value(&self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

numeric_id!(
    /// 人物（ユーザー）の識別子
    PersonId
);
numeric_id!(
    /// 会議の識別子
    MeetingId
);
numeric_id!(
    /// チャットメッセージの識別子（Record Store が採番）
    MessageId
);
numeric_id!(
    /// 発言要求の識別子（採番順に単調増加）
    FloorRequestId
);

/// Unix タイムスタンプ（ミリ秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> i64 {
        self.0
    }
}

/// チャットメッセージの本文
///
/// 空白のみの本文と、`MAX_MESSAGE_CONTENT_CHARS` を超える本文は拒否する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent(String);

impl MessageContent {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        if value.trim().is_empty() {
            return Err(ValueObjectError::Empty("contenu"));
        }
        if value.chars().count() > MAX_MESSAGE_CONTENT_CHARS {
            return Err(ValueObjectError::TooLong {
                field: "contenu",
                max: MAX_MESSAGE_CONTENT_CHARS,
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for MessageContent {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// 会議のタイトル（会議の自然キー）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MeetingTitle(String);

impl MeetingTitle {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ValueObjectError::Empty("titre"));
        }
        if trimmed.chars().count() > MAX_MEETING_TITLE_CHARS {
            return Err(ValueObjectError::TooLong {
                field: "titre",
                max: MAX_MEETING_TITLE_CHARS,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MeetingTitle {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
