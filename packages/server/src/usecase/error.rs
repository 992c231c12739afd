//! UseCase errors
//!
//! アクションの失敗分類。`Store` と `Internal` 以外は要求元にそのまま伝える。

use thiserror::Error;

use crate::domain::{FloorError, MeetingError, RegistryError, RepositoryError, ValueObjectError};

/// 内部エラー時に要求元へ返す汎用メッセージ
pub const GENERIC_FAILURE_MESSAGE: &str = "Une erreur interne est survenue, veuillez réessayer";

/// アクション処理のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// 必須フィールドの欠落・不正（Record Store を呼ぶ前に拒否）
    #[error("{0}")]
    Validation(String),

    /// 必要な役割を持たない
    #[error("{0}")]
    NotAuthorized(String),

    /// 参照した会議・人物・要求が存在しない
    #[error("{0}")]
    NotFound(String),

    /// 許可されない状態遷移
    #[error("{0}")]
    Conflict(String),

    /// 認証済みの識別情報が必要
    #[error("Authentification requise")]
    Unauthenticated,

    /// Record Store の失敗
    #[error("record store failure: {0}")]
    Store(#[from] RepositoryError),

    /// 想定外の失敗
    #[error("internal failure: {0}")]
    Internal(String),
}

impl ActionError {
    /// ワイヤ上のエラーコード（`erreur` フィールド）
    pub fn code(&self) -> &'static str {
        match self {
            ActionError::Validation(_) => "VALIDATION",
            ActionError::NotAuthorized(_) => "NOT_AUTHORIZED",
            ActionError::NotFound(_) => "NOT_FOUND",
            ActionError::Conflict(_) => "CONFLICT",
            ActionError::Unauthenticated => "UNAUTHENTICATED",
            ActionError::Store(_) => "STORE",
            ActionError::Internal(_) => "INTERNAL",
        }
    }

    /// 要求元に見せるメッセージ。内部の詳細は漏らさない
    pub fn user_message(&self) -> String {
        match self {
            ActionError::Store(_) | ActionError::Internal(_) => {
                GENERIC_FAILURE_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn meeting_not_found() -> Self {
        ActionError::NotFound("Réunion introuvable".to_string())
    }
}

impl From<ValueObjectError> for ActionError {
    fn from(e: ValueObjectError) -> Self {
        ActionError::Validation(format!("Champ invalide: {}", e))
    }
}

impl From<FloorError> for ActionError {
    fn from(e: FloorError) -> Self {
        match e {
            FloorError::RequestNotFound(id) => {
                ActionError::NotFound(format!("Demande de parole {} introuvable", id))
            }
            FloorError::NotPending { id, .. } => {
                ActionError::NotFound(format!("Demande de parole {} déjà traitée", id))
            }
            FloorError::MeetingClosed(_) => {
                ActionError::Conflict("La réunion est clôturée".to_string())
            }
        }
    }
}

impl From<MeetingError> for ActionError {
    fn from(e: MeetingError) -> Self {
        ActionError::Conflict(format!("Transition interdite: {}", e))
    }
}

impl From<RegistryError> for ActionError {
    fn from(e: RegistryError) -> Self {
        ActionError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(e: serde_json::Error) -> Self {
        ActionError::Internal(e.to_string())
    }
}
