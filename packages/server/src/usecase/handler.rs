//! アクションハンドラの共通定義
//!
//! 各ドメイン（`authentification` / `reunion` / `chat`）のハンドラは
//! [`ActionHandler`] を実装し、Dispatcher に一度だけ登録される。
//! ハンドラは応答ペイロードと任意のブロードキャストを [`Outcome`] として返し、
//! 実際の送信は Dispatcher がまとめて行う。

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    domain::{ConnectionId, Identity, MeetingId},
    infrastructure::dto::websocket::ServerEvent,
};

use super::error::ActionError;

/// ハンドラに渡される要求元の情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub connection_id: ConnectionId,
    /// 認証済みなら識別情報
    pub identity: Option<Identity>,
    /// 接続が紐付いている会議
    pub meeting_id: Option<MeetingId>,
}

impl RequestContext {
    /// 認証済みの識別情報を要求する
    pub fn require_identity(&self) -> Result<&Identity, ActionError> {
        self.identity.as_ref().ok_or(ActionError::Unauthenticated)
    }
}

/// 会議のオーディエンスへのブロードキャスト
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    pub meeting_id: MeetingId,
    pub event: ServerEvent,
    pub excluding: HashSet<ConnectionId>,
}

/// ハンドラの処理結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    /// 応答エンベロープに展開されるペイロード
    pub payload: Map<String, Value>,
    pub broadcast: Option<Broadcast>,
}

impl Outcome {
    pub fn new() -> Self {
        Self::default()
    }

    /// 応答ペイロードにフィールドを追加する
    pub fn with<T: Serialize>(mut self, key: &str, value: T) -> Result<Self, ActionError> {
        self.payload
            .insert(key.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// 会議全体へのブロードキャストを付ける（要求元にも届く）
    pub fn broadcast_to(mut self, meeting_id: MeetingId, event: ServerEvent) -> Self {
        self.broadcast = Some(Broadcast {
            meeting_id,
            event,
            excluding: HashSet::new(),
        });
        self
    }
}

/// ドメイン単位のアクションハンドラ
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// 担当するドメインタグ（`modele`）
    fn modele(&self) -> &'static str;

    /// アクションを検証して実行する
    ///
    /// 検証エラーは Record Store を呼ぶ前に返すこと。
    async fn handle(
        &self,
        ctx: &RequestContext,
        action: &str,
        payload: &Map<String, Value>,
    ) -> Result<Outcome, ActionError>;
}

/// 要求ペイロードの読み取りヘルパー
#[derive(Debug, Clone, Copy)]
pub struct Payload<'a>(&'a Map<String, Value>);

impl<'a> Payload<'a> {
    pub fn new(map: &'a Map<String, Value>) -> Self {
        Self(map)
    }

    /// 空でない文字列フィールド（前後の空白は除去）
    pub fn required_str(&self, field: &str) -> Result<&'a str, ActionError> {
        self.optional_str(field)?
            .ok_or_else(|| ActionError::Validation(format!("Champ '{}' requis", field)))
    }

    /// 任意の文字列フィールド。空文字列は未指定とみなす
    pub fn optional_str(&self, field: &str) -> Result<Option<&'a str>, ActionError> {
        match self.0.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                Ok((!trimmed.is_empty()).then_some(trimmed))
            }
            Some(_) => Err(ActionError::Validation(format!(
                "Champ '{}' doit être une chaîne",
                field
            ))),
        }
    }

    /// 生の文字列フィールド（空白を除去しない）
    pub fn raw_str(&self, field: &str) -> Result<&'a str, ActionError> {
        match self.0.get(field) {
            Some(Value::String(s)) => Ok(s.as_str()),
            None | Some(Value::Null) => {
                Err(ActionError::Validation(format!("Champ '{}' requis", field)))
            }
            Some(_) => Err(ActionError::Validation(format!(
                "Champ '{}' doit être une chaîne",
                field
            ))),
        }
    }

    /// 数値 ID フィールド。数字だけの文字列も受け付ける
    pub fn required_id(&self, field: &str) -> Result<u64, ActionError> {
        self.optional_id(field)?
            .ok_or_else(|| ActionError::Validation(format!("Champ '{}' requis", field)))
    }

    pub fn optional_id(&self, field: &str) -> Result<Option<u64>, ActionError> {
        let invalid = || ActionError::Validation(format!("Champ '{}' doit être un identifiant", field));
        match self.0.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(invalid),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => s.trim().parse::<u64>().map(Some).map_err(|_| invalid()),
            Some(_) => Err(invalid()),
        }
    }
}
