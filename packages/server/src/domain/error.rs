//! Domain errors

use thiserror::Error;

use super::{
    entity::{FloorRequestStatus, MeetingStatus},
    value_object::{ConnectionId, FloorRequestId, MeetingId},
};

/// 値オブジェクト生成時のバリデーションエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("field '{0}' must not be empty")]
    Empty(&'static str),

    #[error("field '{field}' exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
}

/// Record Store のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// 自然キー（ログイン名・会議タイトル）の重複
    #[error("duplicate key: {0}")]
    Duplicate(String),

    /// 更新対象のレコードが存在しない
    #[error("record not found: {0}")]
    NotFound(String),

    /// ストア自体が利用できない
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

/// メッセージ配送のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagePushError {
    #[error("connection '{0}' not found")]
    ConnectionNotFound(ConnectionId),

    #[error("connection '{0}' is closed")]
    ConnectionClosed(ConnectionId),

    #[error("delivery to connection '{0}' timed out")]
    Timeout(ConnectionId),
}

/// Connection Registry のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("connection '{0}' is not registered")]
    UnknownConnection(ConnectionId),
}

/// 発言要求キューのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FloorError {
    #[error("floor request {0} not found")]
    RequestNotFound(FloorRequestId),

    #[error("floor request {id} is {status:?}, not pending")]
    NotPending {
        id: FloorRequestId,
        status: FloorRequestStatus,
    },

    #[error("meeting {0} is closed")]
    MeetingClosed(MeetingId),
}

/// 会議ライフサイクルのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeetingError {
    #[error("meeting cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        from: MeetingStatus,
        to: MeetingStatus,
    },
}
