//! UseCase: 認証（`authentification` ドメイン）
//!
//! ### どのような状況を想定しているか
//! - 正常系：正しい資格情報でのログイン
//! - 異常系：誤った資格情報、欠落したフィールド
//! - エッジケース：同じ接続での別人物への再ログイン

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{
    domain::{ConnectionRegistry, RecordStore},
    infrastructure::dto::websocket::{PersonDto, modele},
};

use super::{
    error::ActionError,
    handler::{ActionHandler, Outcome, Payload, RequestContext},
};

const ACTION_LOGIN: &str = "connexion";

/// 認証ハンドラ
pub struct AuthenticationHandler {
    store: Arc<dyn RecordStore>,
    registry: Arc<ConnectionRegistry>,
}

impl AuthenticationHandler {
    pub fn new(store: Arc<dyn RecordStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { store, registry }
    }

    /// ログイン
    ///
    /// 資格情報を照合し、成功したら接続に識別情報を紐付けてオンラインにする。
    /// 別の人物として再ログインした場合、接続の会議への紐付けは解除される。
    async fn login(
        &self,
        ctx: &RequestContext,
        login: &str,
        password: &str,
    ) -> Result<Outcome, ActionError> {
        let Some(mut person) = self.store.verify_credentials(login, password).await? else {
            tracing::info!(
                "Login failed for '{}' on connection {}",
                login,
                ctx.connection_id
            );
            return Err(ActionError::NotAuthorized(
                "Identifiants invalides".to_string(),
            ));
        };

        let switching = ctx
            .identity
            .as_ref()
            .is_some_and(|identity| identity.person_id != person.id);
        if switching {
            self.registry.detach_meeting(ctx.connection_id)?;
        }
        self.registry
            .attach_identity(ctx.connection_id, person.identity())?;
        self.store.set_online(person.id, true).await?;
        person.online = true;

        tracing::info!(
            "Person {} ({}) logged in on connection {}",
            person.id,
            person.login,
            ctx.connection_id
        );
        Outcome::new().with("personne", PersonDto::from(&person))
    }
}

#[async_trait]
impl ActionHandler for AuthenticationHandler {
    fn modele(&self) -> &'static str {
        modele::AUTHENTIFICATION
    }

    async fn handle(
        &self,
        ctx: &RequestContext,
        action: &str,
        payload: &Map<String, Value>,
    ) -> Result<Outcome, ActionError> {
        let payload = Payload::new(payload);
        match action {
            ACTION_LOGIN => {
                let login = payload.required_str("login")?;
                let password = payload.raw_str("password")?;
                if password.is_empty() {
                    return Err(ActionError::Validation("Champ 'password' requis".to_string()));
                }
                self.login(ctx, login, password).await
            }
            other => Err(ActionError::Validation(format!("Action inconnue: {}", other))),
        }
    }
}
