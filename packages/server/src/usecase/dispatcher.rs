//! Action Dispatcher
//!
//! 受信したエンベロープを `modele` に登録されたハンドラへ振り分ける。
//!
//! ## 設計ノート
//!
//! - ハンドラは起動時に一度だけ登録される。新しいドメインの追加はハンドラの登録で行う
//! - 応答とブロードキャストの送信はここ（[`ActionDispatcher::dispatch`]）に集約され、
//!   要求元は 1 つの要求に対して必ず 1 つの終端応答を受け取る
//! - ハンドラ内の panic はここで捕捉し、汎用の `echec` 応答に変換する
//! - 接続ごとのワーカー（[`ActionDispatcher::spawn_worker`]）が受信順にエンベロープを処理する
//! - ワーカーへの受信キューは有界。満杯のときフレームは破棄され、その接続に `error` イベントが返る

use std::{any::Any, collections::HashMap, panic::AssertUnwindSafe, sync::Arc};

use futures_util::FutureExt;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};

use crate::{
    domain::{ConnectionId, ConnectionRegistry, MessagePusher},
    infrastructure::dto::websocket::{RequestEnvelope, ResponseEnvelope, ServerEvent},
};

use super::{
    error::ActionError,
    handler::{ActionHandler, Broadcast, RequestContext},
};

/// 接続のワーカーへの受信キュー（有界）
///
/// 受信側のタスクを待たせないよう、`push` は空きがなければフレームを破棄して
/// その接続に `error` イベントを返す。
pub struct InboundQueue {
    connection_id: ConnectionId,
    sender: mpsc::Sender<String>,
    message_pusher: Arc<dyn MessagePusher>,
}

impl InboundQueue {
    /// フレームをワーカーに渡す
    ///
    /// ワーカーが停止していれば `false`。満杯で破棄した場合は `true` を返す。
    pub async fn push(&self, text: String) -> bool {
        match self.sender.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    "Inbound queue of connection '{}' is full, frame dropped",
                    self.connection_id
                );
                let event = ServerEvent::Error {
                    message: "Trop de requêtes en attente, message ignoré".to_string(),
                };
                match serde_json::to_string(&event) {
                    Ok(payload) => {
                        if let Err(e) = self
                            .message_pusher
                            .send_to_connection(self.connection_id, &payload)
                            .await
                        {
                            tracing::warn!("Failed to deliver overflow notice: {}", e);
                        }
                    }
                    Err(e) => tracing::error!("Failed to serialize overflow notice: {}", e),
                }
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// `modele` ごとのハンドラ表
pub struct ActionDispatcher {
    handlers: HashMap<&'static str, Arc<dyn ActionHandler>>,
    registry: Arc<ConnectionRegistry>,
    message_pusher: Arc<dyn MessagePusher>,
}

impl ActionDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>, message_pusher: Arc<dyn MessagePusher>) -> Self {
        Self {
            handlers: HashMap::new(),
            registry,
            message_pusher,
        }
    }

    /// ハンドラを登録する
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        let modele = handler.modele();
        if self.handlers.insert(modele, handler).is_some() {
            tracing::warn!("Handler for modele '{}' replaced", modele);
        }
    }

    /// 登録済みの `modele`（昇順）
    pub fn modeles(&self) -> Vec<&'static str> {
        let mut modeles: Vec<&'static str> = self.handlers.keys().copied().collect();
        modeles.sort_unstable();
        modeles
    }

    /// 接続のワーカーを起動する
    ///
    /// 返されたキューに入れたテキストフレームは受信順に 1 つずつ処理される。
    /// キューには最大 `capacity` 件まで溜まる。キューが破棄されるとワーカーは終了する。
    pub fn spawn_worker(
        self: &Arc<Self>,
        connection_id: ConnectionId,
        capacity: usize,
    ) -> (InboundQueue, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<String>(capacity.max(1));
        let dispatcher = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                dispatcher.dispatch_text(connection_id, &text).await;
            }
            tracing::debug!("Worker for connection '{}' stopped", connection_id);
        });
        let queue = InboundQueue {
            connection_id,
            sender: tx,
            message_pusher: self.message_pusher.clone(),
        };
        (queue, handle)
    }

    /// テキストフレームを処理する
    ///
    /// エンベロープとして解釈できないフレームには、その接続にだけ `error` イベントを返す。
    pub async fn dispatch_text(
        &self,
        connection_id: ConnectionId,
        text: &str,
    ) -> Option<ResponseEnvelope> {
        match serde_json::from_str::<RequestEnvelope>(text) {
            Ok(envelope) => Some(self.dispatch(envelope, connection_id).await),
            Err(e) => {
                tracing::warn!(
                    "Invalid envelope from connection '{}': {}",
                    connection_id,
                    e
                );
                let event = ServerEvent::Error {
                    message: format!("Message invalide: {}", e),
                };
                self.emit(connection_id, &event).await;
                None
            }
        }
    }

    /// エンベロープを処理し、応答と（あれば）ブロードキャストを送信する
    pub async fn dispatch(
        &self,
        envelope: RequestEnvelope,
        connection_id: ConnectionId,
    ) -> ResponseEnvelope {
        let (response, broadcast) = self.execute(&envelope, connection_id).await;

        self.emit(connection_id, &response).await;
        if let Some(broadcast) = broadcast {
            match serde_json::to_string(&broadcast.event) {
                Ok(payload) => {
                    let recipients = self
                        .message_pusher
                        .broadcast_to_meeting(broadcast.meeting_id, &payload, &broadcast.excluding)
                        .await;
                    tracing::debug!(
                        "Broadcast for {}/{} sent to {} connection(s) of meeting {}",
                        envelope.modele,
                        envelope.action,
                        recipients,
                        broadcast.meeting_id
                    );
                }
                Err(e) => tracing::error!("Failed to serialize broadcast event: {}", e),
            }
        }

        response
    }

    async fn execute(
        &self,
        envelope: &RequestEnvelope,
        connection_id: ConnectionId,
    ) -> (ResponseEnvelope, Option<Broadcast>) {
        let failure = |error: &ActionError| {
            ResponseEnvelope::failure(
                &envelope.modele,
                &envelope.action,
                error.code(),
                error.user_message(),
            )
        };

        let Some(handler) = self.handlers.get(envelope.modele.as_str()) else {
            tracing::warn!(
                "Unknown modele '{}' from connection '{}'",
                envelope.modele,
                connection_id
            );
            let error = ActionError::Validation(format!("Modèle inconnu: {}", envelope.modele));
            return (failure(&error), None);
        };

        let Some(connection) = self.registry.get(connection_id) else {
            let error = ActionError::Internal(format!("connection '{}' not registered", connection_id));
            return (failure(&error), None);
        };
        let ctx = RequestContext {
            connection_id,
            identity: connection.identity,
            meeting_id: connection.meeting_id,
        };

        let result = AssertUnwindSafe(handler.handle(&ctx, &envelope.action, &envelope.payload))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(outcome)) => {
                tracing::debug!(
                    "{}/{} succeeded for connection '{}'",
                    envelope.modele,
                    envelope.action,
                    connection_id
                );
                (
                    ResponseEnvelope::success(&envelope.modele, &envelope.action, outcome.payload),
                    outcome.broadcast,
                )
            }
            Ok(Err(error)) => {
                match &error {
                    ActionError::Store(_) | ActionError::Internal(_) => tracing::error!(
                        "{}/{} failed for connection '{}' (person {:?}): {}",
                        envelope.modele,
                        envelope.action,
                        connection_id,
                        ctx.identity.as_ref().map(|identity| identity.person_id.value()),
                        error
                    ),
                    _ => tracing::info!(
                        "{}/{} rejected for connection '{}': {}",
                        envelope.modele,
                        envelope.action,
                        connection_id,
                        error
                    ),
                }
                (failure(&error), None)
            }
            Err(panic) => {
                tracing::error!(
                    "Handler for {}/{} panicked on connection '{}': {}",
                    envelope.modele,
                    envelope.action,
                    connection_id,
                    panic_message(panic.as_ref())
                );
                let error = ActionError::Internal("handler panicked".to_string());
                (failure(&error), None)
            }
        }
    }

    async fn emit<T: serde::Serialize>(&self, connection_id: ConnectionId, message: &T) {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Failed to serialize message for '{}': {}", connection_id, e);
                return;
            }
        };
        if let Err(e) = self
            .message_pusher
            .send_to_connection(connection_id, &payload)
            .await
        {
            tracing::warn!("Failed to deliver response: {}", e);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            Connection, MeetingId, MessagePushError, MockMessagePusher, RepositoryError, Timestamp,
        },
        usecase::{error::GENERIC_FAILURE_MESSAGE, handler::Outcome},
    };
    use async_trait::async_trait;
    use serde_json::{Map, Value, json};
    use std::sync::Mutex;

    /// アクション名で振る舞いを切り替えるテスト用ハンドラ
    struct StubHandler;

    #[async_trait]
    impl ActionHandler for StubHandler {
        fn modele(&self) -> &'static str {
            "stub"
        }

        async fn handle(
            &self,
            _ctx: &RequestContext,
            action: &str,
            payload: &Map<String, Value>,
        ) -> Result<Outcome, ActionError> {
            match action {
                "echo" => Ok(Outcome {
                    payload: payload.clone(),
                    broadcast: None,
                }),
                "announce" => Ok(Outcome::new().broadcast_to(
                    MeetingId::new(1),
                    ServerEvent::Error {
                        message: "announcement".to_string(),
                    },
                )),
                "store" => Err(ActionError::Store(RepositoryError::Unavailable(
                    "db-host-7 unreachable".to_string(),
                ))),
                "forbidden" => Err(ActionError::NotAuthorized("Interdit".to_string())),
                _ => panic!("boom"),
            }
        }
    }

    /// 送信された payload を記録する MockMessagePusher
    fn recording_pusher(
        sent: Arc<Mutex<Vec<String>>>,
        broadcasts: Arc<Mutex<Vec<String>>>,
    ) -> MockMessagePusher {
        let mut pusher = MockMessagePusher::new();
        pusher
            .expect_send_to_connection()
            .returning(move |_, payload| {
                sent.lock().unwrap().push(payload.to_string());
                Ok(())
            });
        pusher
            .expect_broadcast_to_meeting()
            .returning(move |_, payload, _| {
                broadcasts.lock().unwrap().push(payload.to_string());
                1
            });
        pusher
    }

    struct Fixture {
        dispatcher: Arc<ActionDispatcher>,
        connection_id: ConnectionId,
        sent: Arc<Mutex<Vec<String>>>,
        broadcasts: Arc<Mutex<Vec<String>>>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(ConnectionRegistry::new());
        let connection_id = ConnectionId::generate();
        let (tx, _rx) = mpsc::channel(8);
        registry.register(Connection::new(connection_id, Timestamp::new(0)), tx);

        let sent = Arc::new(Mutex::new(Vec::new()));
        let broadcasts = Arc::new(Mutex::new(Vec::new()));
        let pusher = recording_pusher(sent.clone(), broadcasts.clone());
        let mut dispatcher = ActionDispatcher::new(registry, Arc::new(pusher));
        dispatcher.register(Arc::new(StubHandler));
        Fixture {
            dispatcher: Arc::new(dispatcher),
            connection_id,
            sent,
            broadcasts,
        }
    }

    fn envelope(modele: &str, action: &str) -> RequestEnvelope {
        RequestEnvelope {
            modele: modele.to_string(),
            action: action.to_string(),
            payload: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_success_response_echoes_tags_and_payload() {
        // テスト項目: 成功応答は modele と action を返し、ペイロードを展開する
        // given (前提条件):
        let f = fixture();
        let text = r#"{"modele":"stub","action":"echo","reunionId":7}"#;

        // when (操作):
        let response = f
            .dispatcher
            .dispatch_text(f.connection_id, text)
            .await
            .unwrap();

        // then (期待する結果):
        assert!(response.is_success());
        let sent = f.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        let sent: Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(sent["modele"], json!("stub"));
        assert_eq!(sent["actionOriginale"], json!("echo"));
        assert_eq!(sent["statut"], json!("succes"));
        assert_eq!(sent["reunionId"], json!(7));
    }

    #[tokio::test]
    async fn test_unknown_modele_gets_failure_tagged_with_modele() {
        // テスト項目: 未登録の modele には、その modele を付けた失敗応答が要求元にだけ返る
        // given (前提条件):
        let f = fixture();

        // when (操作):
        let response = f
            .dispatcher
            .dispatch(envelope("sondage", "voter"), f.connection_id)
            .await;

        // then (期待する結果):
        assert!(!response.is_success());
        assert_eq!(response.modele, "sondage");
        assert_eq!(response.erreur.as_deref(), Some("VALIDATION"));
        assert_eq!(f.sent.lock().unwrap().len(), 1);
        assert!(f.broadcasts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_error_is_reported_generically() {
        // テスト項目: Store エラーは汎用メッセージで返り、内部の詳細は漏れない
        // given (前提条件):
        let f = fixture();

        // when (操作):
        let response = f
            .dispatcher
            .dispatch(envelope("stub", "store"), f.connection_id)
            .await;

        // then (期待する結果):
        assert_eq!(response.erreur.as_deref(), Some("STORE"));
        assert_eq!(response.message.as_deref(), Some(GENERIC_FAILURE_MESSAGE));
        assert!(!f.sent.lock().unwrap()[0].contains("db-host-7"));
    }

    #[tokio::test]
    async fn test_panicking_handler_yields_generic_failure() {
        // テスト項目: ハンドラの panic は捕捉され、汎用の失敗応答になる
        // given (前提条件):
        let f = fixture();

        // when (操作):
        let response = f
            .dispatcher
            .dispatch(envelope("stub", "explode"), f.connection_id)
            .await;
        let after = f
            .dispatcher
            .dispatch(envelope("stub", "echo"), f.connection_id)
            .await;

        // then (期待する結果):
        assert_eq!(response.erreur.as_deref(), Some("INTERNAL"));
        assert_eq!(response.message.as_deref(), Some(GENERIC_FAILURE_MESSAGE));
        assert!(after.is_success());
    }

    #[tokio::test]
    async fn test_response_is_sent_before_broadcast() {
        // テスト項目: 応答が送られ、続いてブロードキャストが送られる
        // given (前提条件):
        let f = fixture();

        // when (操作):
        let response = f
            .dispatcher
            .dispatch(envelope("stub", "announce"), f.connection_id)
            .await;

        // then (期待する結果):
        assert!(response.is_success());
        assert_eq!(f.sent.lock().unwrap().len(), 1);
        let broadcasts = f.broadcasts.lock().unwrap().clone();
        assert_eq!(broadcasts.len(), 1);
        assert!(broadcasts[0].contains("announcement"));
    }

    #[tokio::test]
    async fn test_failed_action_does_not_broadcast() {
        // テスト項目: 失敗したアクションは要求元にだけ応答し、ブロードキャストしない
        // given (前提条件):
        let f = fixture();

        // when (操作):
        let response = f
            .dispatcher
            .dispatch(envelope("stub", "forbidden"), f.connection_id)
            .await;

        // then (期待する結果):
        assert_eq!(response.erreur.as_deref(), Some("NOT_AUTHORIZED"));
        assert_eq!(response.message.as_deref(), Some("Interdit"));
        assert!(f.broadcasts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_json_yields_error_event() {
        // テスト項目: エンベロープとして解釈できないフレームには error イベントが返る
        // given (前提条件):
        let f = fixture();

        // when (操作):
        let response = f
            .dispatcher
            .dispatch_text(f.connection_id, r#"{"action":"echo"}"#)
            .await;

        // then (期待する結果):
        assert!(response.is_none());
        let sent = f.sent.lock().unwrap().clone();
        let event: Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(event["type"], json!("error"));
    }

    #[tokio::test]
    async fn test_undeliverable_response_does_not_fail_dispatch() {
        // テスト項目: 応答を配送できなくても処理は完了する
        // given (前提条件):
        let registry = Arc::new(ConnectionRegistry::new());
        let connection_id = ConnectionId::generate();
        let (tx, _rx) = mpsc::channel(8);
        registry.register(Connection::new(connection_id, Timestamp::new(0)), tx);
        let mut pusher = MockMessagePusher::new();
        pusher
            .expect_send_to_connection()
            .times(1)
            .returning(|id, _| Err(MessagePushError::ConnectionClosed(id)));
        let mut dispatcher = ActionDispatcher::new(registry, Arc::new(pusher));
        dispatcher.register(Arc::new(StubHandler));

        // when (操作):
        let response = dispatcher
            .dispatch(envelope("stub", "echo"), connection_id)
            .await;

        // then (期待する結果):
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_worker_processes_frames_in_arrival_order() {
        // テスト項目: ワーカーは同じ接続のフレームを受信順に処理する
        // given (前提条件):
        let f = fixture();
        let (queue, handle) = f.dispatcher.spawn_worker(f.connection_id, 32);

        // when (操作):
        for i in 0..20 {
            assert!(
                queue
                    .push(format!(r#"{{"modele":"stub","action":"echo","seq":{}}}"#, i))
                    .await
            );
        }
        drop(queue);
        handle.await.unwrap();

        // then (期待する結果):
        let seqs: Vec<u64> = f
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|text| serde_json::from_str::<Value>(text).unwrap()["seq"].as_u64().unwrap())
            .collect();
        assert_eq!(seqs, (0..20).collect::<Vec<u64>>());
    }

    #[test]
    fn test_registered_modeles() {
        // テスト項目: 登録した modele が一覧に現れる
        // given (前提条件):
        let f = fixture();

        // when (操作) / then (期待する結果):
        assert_eq!(f.dispatcher.modeles(), vec!["stub"]);
    }

    #[tokio::test]
    async fn test_full_inbound_queue_drops_frame_with_error_event() {
        // テスト項目: 受信キューが満杯のときフレームは破棄され、その接続に error イベントが返る
        // given (前提条件): 容量 1 のキュー。current_thread ランタイムなのでワーカーはまだ動かない
        let f = fixture();
        let (queue, handle) = f.dispatcher.spawn_worker(f.connection_id, 1);

        // when (操作):
        let mut accepted = Vec::new();
        for i in 0..3 {
            accepted.push(
                queue
                    .push(format!(r#"{{"modele":"stub","action":"echo","seq":{}}}"#, i))
                    .await,
            );
        }
        drop(queue);
        handle.await.unwrap();

        // then (期待する結果):
        assert_eq!(accepted, vec![true, true, true]);
        let sent: Vec<Value> = f
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect();
        let errors = sent.iter().filter(|v| v["type"] == json!("error")).count();
        let responses: Vec<&Value> = sent.iter().filter(|v| v["statut"] == json!("succes")).collect();
        assert_eq!(errors, 2);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["seq"], json!(0));
    }

    #[tokio::test]
    async fn test_push_reports_stopped_worker() {
        // テスト項目: ワーカーが停止したキューへの push は false を返す
        // given (前提条件):
        let f = fixture();
        let (queue, handle) = f.dispatcher.spawn_worker(f.connection_id, 4);
        handle.abort();
        let _ = handle.await;

        // when (操作):
        let accepted = queue.push(r#"{"modele":"stub","action":"echo"}"#.to_string()).await;

        // then (期待する結果):
        assert!(!accepted);
    }
}
