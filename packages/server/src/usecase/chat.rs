//! UseCase: チャット（`chat` ドメイン）
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - `envoyerMessage`：メッセージの永続化とブロードキャストの指定
//! - `historiqueMessages`：履歴の取得（要求元にだけ返す）
//!
//! ### なぜこのテストが必要か
//! - ブロードキャストされるメッセージが Record Store の採番した ID と時刻を持つことを保証
//! - 送信者自身もブロードキャストを受け取る（エコー）ことを確認
//! - 送信直後の履歴取得に送信したメッセージが含まれることを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：参加者によるメッセージ送信と履歴取得
//! - 異常系：空のメッセージ、参加していない会議への送信
//! - エッジケース：接続の紐付いた会議を暗黙の宛先とする送信

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parole_shared::time::timestamp_to_rfc3339;
use serde_json::{Map, Value};

use crate::{
    domain::{ChatMessage, MeetingId, MessageContent, NewChatMessage, PersonId, RecordStore},
    infrastructure::dto::{
        conversion::chat_message_dto,
        websocket::{ChatMessageDto, ServerEvent, modele},
    },
};

use super::{
    error::ActionError,
    handler::{ActionHandler, Outcome, Payload, RequestContext},
    meeting::{ensure_not_closed, ensure_participant, load_meeting},
};

const ACTION_SEND: &str = "envoyerMessage";
const ACTION_HISTORY: &str = "historiqueMessages";

/// チャットハンドラ
pub struct ChatHandler {
    store: Arc<dyn RecordStore>,
}

impl ChatHandler {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// 宛先の会議（省略時は接続の紐付いた会議）
    fn target_meeting(ctx: &RequestContext, payload: Payload<'_>) -> Result<MeetingId, ActionError> {
        payload
            .optional_id("reunionId")?
            .map(MeetingId::new)
            .or(ctx.meeting_id)
            .ok_or_else(|| ActionError::Validation("Champ 'reunionId' requis".to_string()))
    }

    /// メッセージを送信する
    ///
    /// Record Store に保存してから、保存されたメッセージを会議の全オーディエンス
    /// （送信者を含む）にブロードキャストする。
    async fn send(
        &self,
        ctx: &RequestContext,
        meeting_id: MeetingId,
        content: MessageContent,
    ) -> Result<Outcome, ActionError> {
        let identity = ctx.require_identity()?;
        let meeting = load_meeting(self.store.as_ref(), meeting_id).await?;
        ensure_not_closed(&meeting)?;
        ensure_participant(self.store.as_ref(), &meeting, identity.person_id).await?;

        let message = self
            .store
            .insert_message(NewChatMessage {
                author_id: identity.person_id,
                meeting_id: meeting.id,
                content,
            })
            .await?;

        tracing::debug!(
            "Message {} stored for meeting {} by person {}",
            message.id,
            meeting.id,
            identity.person_id
        );

        let event = ServerEvent::NewMessage {
            reunion_id: meeting.id.value(),
            message_id: message.id.value(),
            sender: identity.login.clone(),
            sender_id: identity.person_id.value(),
            sender_name: identity.display_name.clone(),
            content: message.content.as_str().to_string(),
            timestamp: timestamp_to_rfc3339(message.sent_at.value()),
        };
        Ok(Outcome::new()
            .with("messageEnvoye", chat_message_dto(&message, &identity.login))?
            .broadcast_to(meeting.id, event))
    }

    /// 履歴を取得する（送信時刻の昇順）
    async fn history(
        &self,
        ctx: &RequestContext,
        meeting_id: MeetingId,
    ) -> Result<Outcome, ActionError> {
        let identity = ctx.require_identity()?;
        let meeting = load_meeting(self.store.as_ref(), meeting_id).await?;
        if !meeting.can_moderate(identity.person_id) {
            ensure_participant(self.store.as_ref(), &meeting, identity.person_id).await?;
        }

        let messages = self.store.list_messages(meeting.id).await?;
        let messages = self.with_author_logins(&messages).await?;
        Outcome::new()
            .with("reunionId", meeting.id.value())?
            .with("messages", messages)
    }

    async fn with_author_logins(
        &self,
        messages: &[ChatMessage],
    ) -> Result<Vec<ChatMessageDto>, ActionError> {
        let mut logins: HashMap<PersonId, String> = HashMap::new();
        let mut dtos = Vec::with_capacity(messages.len());
        for message in messages {
            if !logins.contains_key(&message.author_id) {
                let login = self
                    .store
                    .find_person(message.author_id)
                    .await?
                    .map(|person| person.login)
                    .unwrap_or_else(|| message.author_id.to_string());
                logins.insert(message.author_id, login);
            }
            let login = logins
                .get(&message.author_id)
                .map(String::as_str)
                .unwrap_or_default();
            dtos.push(chat_message_dto(message, login));
        }
        Ok(dtos)
    }
}

#[async_trait]
impl ActionHandler for ChatHandler {
    fn modele(&self) -> &'static str {
        modele::CHAT
    }

    async fn handle(
        &self,
        ctx: &RequestContext,
        action: &str,
        payload: &Map<String, Value>,
    ) -> Result<Outcome, ActionError> {
        let payload = Payload::new(payload);
        match action {
            ACTION_SEND => {
                let content = MessageContent::new(payload.raw_str("contenu")?.to_string())?;
                let meeting_id = Self::target_meeting(ctx, payload)?;
                self.send(ctx, meeting_id, content).await
            }
            ACTION_HISTORY => {
                let meeting_id = Self::target_meeting(ctx, payload)?;
                self.history(ctx, meeting_id).await
            }
            other => Err(ActionError::Validation(format!("Action inconnue: {}", other))),
        }
    }
}
