//! UseCase: 会議のライフサイクル（`reunion` ドメイン）
//!
//! ## 何をテストしているか
//! - 作成・参加・退出・詳細・一覧・招待・開始・終了の各アクション
//! - 発言要求アクション（`demanderParole` など）の委譲
//!
//! ## どのような状況を想定しているか
//! - 正常系：主催者による作成と開始、参加者の参加
//! - 異常系：非公開会議への未認可の参加、主催者以外による招待、不正な状態遷移
//! - エッジケース：重複したタイトル、終了済みの会議への参加、繰り返しの参加
//! - 並行性：同じ会議への開始・終了の同時実行、終了と競合する発言要求

use std::sync::Arc;

use async_trait::async_trait;
use parole_shared::time::parse_iso8601_millis;
use serde_json::{Map, Value};

use crate::{
    domain::{
        ConnectionRegistry, Meeting, MeetingError, MeetingId, MeetingKind, MeetingStatus,
        MeetingTitle, NewMeeting, PersonId, RecordStore, RepositoryError, Timestamp,
    },
    infrastructure::dto::{
        conversion::meeting_kind_from_wire,
        websocket::{FloorRequestDto, MeetingDto, PersonDto, modele},
    },
};

use super::{
    error::ActionError,
    floor::FloorRequestHandler,
    floor_coordinator::FloorRequestCoordinator,
    handler::{ActionHandler, Outcome, Payload, RequestContext},
};

const ACTION_CREATE: &str = "creation";
const ACTION_JOIN: &str = "rejoindre";
const ACTION_LEAVE: &str = "quitter";
const ACTION_DETAILS: &str = "details";
const ACTION_LIST: &str = "lister";
const ACTION_INVITE: &str = "inviterMembre";
const ACTION_OPEN: &str = "ouvrir";
const ACTION_CLOSE: &str = "cloturer";

/// 会議作成の入力（検証済み）
#[derive(Debug, Clone, PartialEq, Eq)]
struct CreateMeeting {
    title: MeetingTitle,
    subject: String,
    agenda: String,
    starts_at: Timestamp,
    duration_minutes: u32,
    kind: MeetingKind,
    organizer_id: Option<PersonId>,
    moderator_id: Option<PersonId>,
}

/// 検証済みのアクション
#[derive(Debug, Clone, PartialEq, Eq)]
enum MeetingCommand {
    Create(CreateMeeting),
    Join(MeetingId),
    Leave(MeetingId),
    Details(MeetingId),
    List,
    Invite { meeting_id: MeetingId, login: String },
    Open(MeetingId),
    Close(MeetingId),
}

impl MeetingCommand {
    fn parse(action: &str, payload: Payload<'_>) -> Result<Self, ActionError> {
        let meeting_id = || payload.required_id("reunionId").map(MeetingId::new);
        let command = match action {
            ACTION_CREATE => MeetingCommand::Create(parse_create(payload)?),
            ACTION_JOIN => MeetingCommand::Join(meeting_id()?),
            ACTION_LEAVE => MeetingCommand::Leave(meeting_id()?),
            ACTION_DETAILS => MeetingCommand::Details(meeting_id()?),
            ACTION_LIST => MeetingCommand::List,
            ACTION_INVITE => MeetingCommand::Invite {
                meeting_id: meeting_id()?,
                login: payload.required_str("usernameToInvite")?.to_string(),
            },
            ACTION_OPEN => MeetingCommand::Open(meeting_id()?),
            ACTION_CLOSE => MeetingCommand::Close(meeting_id()?),
            other => {
                return Err(ActionError::Validation(format!("Action inconnue: {}", other)));
            }
        };
        Ok(command)
    }
}

fn parse_create(payload: Payload<'_>) -> Result<CreateMeeting, ActionError> {
    let title = MeetingTitle::new(payload.required_str("titre")?.to_string())?;

    let debut = payload.required_str("debut")?;
    let starts_at = parse_iso8601_millis(debut).ok_or_else(|| {
        ActionError::Validation(format!("Champ 'debut' invalide: '{}'", debut))
    })?;

    let duration_minutes = payload
        .required_id("duree")
        .ok()
        .and_then(|minutes| u32::try_from(minutes).ok())
        .filter(|minutes| *minutes > 0)
        .ok_or_else(|| {
            ActionError::Validation("Champ 'duree' doit être un nombre de minutes positif".to_string())
        })?;

    let kind = match payload.optional_str("type")? {
        None => MeetingKind::Standard,
        Some(value) => meeting_kind_from_wire(value).ok_or_else(|| {
            ActionError::Validation(format!("Type de réunion inconnu: '{}'", value))
        })?,
    };

    Ok(CreateMeeting {
        title,
        subject: payload.optional_str("sujet")?.unwrap_or_default().to_string(),
        agenda: payload.optional_str("agenda")?.unwrap_or_default().to_string(),
        starts_at: Timestamp::new(starts_at),
        duration_minutes,
        kind,
        organizer_id: payload.optional_id("idOrganisateur")?.map(PersonId::new),
        moderator_id: payload.optional_id("idAnimateur")?.map(PersonId::new),
    })
}

/// 会議を取得する（なければ NotFound）
pub(super) async fn load_meeting(
    store: &dyn RecordStore,
    meeting_id: MeetingId,
) -> Result<Meeting, ActionError> {
    store
        .find_meeting(meeting_id)
        .await?
        .ok_or_else(ActionError::meeting_not_found)
}

/// 終了済みの会議への操作を拒否する
pub(super) fn ensure_not_closed(meeting: &Meeting) -> Result<(), ActionError> {
    if meeting.is_closed() {
        return Err(ActionError::Conflict(format!(
            "La réunion '{}' est clôturée",
            meeting.title.as_str()
        )));
    }
    Ok(())
}

/// 会議の現在の参加者であることを要求する
pub(super) async fn ensure_participant(
    store: &dyn RecordStore,
    meeting: &Meeting,
    person_id: PersonId,
) -> Result<(), ActionError> {
    if !store.is_participant(person_id, meeting.id).await? {
        return Err(ActionError::NotAuthorized(format!(
            "Vous ne participez pas à la réunion '{}'",
            meeting.title.as_str()
        )));
    }
    Ok(())
}

/// 人物が会議を閲覧できるか
///
/// 非公開でない会議は誰でも閲覧できる。非公開の会議は主催者・司会者・
/// 認可された人物・参加者のみ。
async fn can_view(
    store: &dyn RecordStore,
    meeting: &Meeting,
    person_id: PersonId,
) -> Result<bool, ActionError> {
    if meeting.kind != MeetingKind::Private || meeting.can_moderate(person_id) {
        return Ok(true);
    }
    if store.is_authorized(person_id, meeting.id).await? {
        return Ok(true);
    }
    Ok(store.is_participant(person_id, meeting.id).await?)
}

/// 会議ライフサイクルのハンドラ
pub struct MeetingLifecycleHandler {
    store: Arc<dyn RecordStore>,
    registry: Arc<ConnectionRegistry>,
    coordinator: Arc<FloorRequestCoordinator>,
    floor: FloorRequestHandler,
}

impl MeetingLifecycleHandler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        registry: Arc<ConnectionRegistry>,
        coordinator: Arc<FloorRequestCoordinator>,
    ) -> Self {
        let floor = FloorRequestHandler::new(store.clone(), coordinator.clone());
        Self {
            store,
            registry,
            coordinator,
            floor,
        }
    }

    async fn create(
        &self,
        ctx: &RequestContext,
        request: CreateMeeting,
    ) -> Result<Outcome, ActionError> {
        let identity = ctx.require_identity()?;
        if request
            .organizer_id
            .is_some_and(|organizer_id| organizer_id != identity.person_id)
        {
            return Err(ActionError::NotAuthorized(
                "Vous ne pouvez créer une réunion qu'en votre propre nom".to_string(),
            ));
        }
        if let Some(moderator_id) = request.moderator_id {
            if self.store.find_person(moderator_id).await?.is_none() {
                return Err(ActionError::NotFound(format!(
                    "Animateur {} introuvable",
                    moderator_id
                )));
            }
        }

        let title = request.title.clone();
        let meeting = match self
            .store
            .insert_meeting(NewMeeting {
                title: request.title,
                subject: request.subject,
                agenda: request.agenda,
                starts_at: request.starts_at,
                duration_minutes: request.duration_minutes,
                kind: request.kind,
                organizer_id: identity.person_id,
                moderator_id: request.moderator_id,
            })
            .await
        {
            Ok(meeting) => meeting,
            Err(RepositoryError::Duplicate(_)) => {
                return Err(ActionError::Conflict(format!(
                    "Une réunion nommée '{}' existe déjà",
                    title.as_str()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        self.store
            .add_participation(identity.person_id, meeting.id)
            .await?;
        self.registry.attach_meeting(ctx.connection_id, meeting.id)?;

        tracing::info!(
            "Meeting {} ('{}') created by person {}",
            meeting.id,
            meeting.title.as_str(),
            identity.person_id
        );
        Outcome::new().with("reunion", MeetingDto::from(&meeting))
    }

    async fn join(&self, ctx: &RequestContext, meeting_id: MeetingId) -> Result<Outcome, ActionError> {
        let identity = ctx.require_identity()?;
        let meeting = load_meeting(self.store.as_ref(), meeting_id).await?;
        ensure_not_closed(&meeting)?;

        if meeting.kind == MeetingKind::Private
            && !meeting.can_moderate(identity.person_id)
            && !self
                .store
                .is_authorized(identity.person_id, meeting.id)
                .await?
        {
            return Err(ActionError::NotAuthorized(format!(
                "La réunion '{}' est privée: une invitation est requise",
                meeting.title.as_str()
            )));
        }

        self.store
            .add_participation(identity.person_id, meeting.id)
            .await?;
        self.registry.attach_meeting(ctx.connection_id, meeting.id)?;

        tracing::info!(
            "Person {} joined meeting {} on connection {}",
            identity.person_id,
            meeting.id,
            ctx.connection_id
        );
        Outcome::new().with("reunion", MeetingDto::from(&meeting))
    }

    async fn leave(&self, ctx: &RequestContext, meeting_id: MeetingId) -> Result<Outcome, ActionError> {
        let identity = ctx.require_identity()?;
        let meeting = load_meeting(self.store.as_ref(), meeting_id).await?;

        if !self
            .store
            .remove_participation(identity.person_id, meeting.id)
            .await?
        {
            return Err(ActionError::Conflict(format!(
                "Vous ne participez pas à la réunion '{}'",
                meeting.title.as_str()
            )));
        }
        self.coordinator
            .withdraw(meeting.id, identity.person_id)
            .await;
        if ctx.meeting_id == Some(meeting.id) {
            self.registry.detach_meeting(ctx.connection_id)?;
        }

        tracing::info!("Person {} left meeting {}", identity.person_id, meeting.id);
        Outcome::new().with("reunionId", meeting.id.value())
    }

    async fn details(
        &self,
        ctx: &RequestContext,
        meeting_id: MeetingId,
    ) -> Result<Outcome, ActionError> {
        let identity = ctx.require_identity()?;
        let meeting = load_meeting(self.store.as_ref(), meeting_id).await?;
        if !can_view(self.store.as_ref(), &meeting, identity.person_id).await? {
            return Err(ActionError::NotAuthorized(format!(
                "La réunion '{}' est privée",
                meeting.title.as_str()
            )));
        }

        let mut participants = Vec::new();
        for person_id in self.store.list_participants(meeting.id).await? {
            if let Some(person) = self.store.find_person(person_id).await? {
                participants.push(PersonDto::from(&person));
            }
        }
        let pending: Vec<FloorRequestDto> = self
            .coordinator
            .pending(meeting.id)
            .await
            .iter()
            .map(FloorRequestDto::from)
            .collect();
        let speaker = self
            .coordinator
            .current_speaker(meeting.id)
            .await
            .as_ref()
            .map(FloorRequestDto::from);

        Outcome::new()
            .with("reunion", MeetingDto::from(&meeting))?
            .with("participants", participants)?
            .with("demandesParole", pending)?
            .with("orateur", speaker)
    }

    async fn list(&self, ctx: &RequestContext) -> Result<Outcome, ActionError> {
        let identity = ctx.require_identity()?;
        let mut visible = Vec::new();
        for meeting in self.store.list_meetings().await? {
            if can_view(self.store.as_ref(), &meeting, identity.person_id).await? {
                visible.push(MeetingDto::from(&meeting));
            }
        }
        Outcome::new().with("reunions", visible)
    }

    async fn invite(
        &self,
        ctx: &RequestContext,
        meeting_id: MeetingId,
        login: &str,
    ) -> Result<Outcome, ActionError> {
        let identity = ctx.require_identity()?;
        let meeting = load_meeting(self.store.as_ref(), meeting_id).await?;
        if !meeting.is_organizer(identity.person_id) {
            return Err(ActionError::NotAuthorized(
                "Seul l'organisateur peut inviter des membres".to_string(),
            ));
        }
        ensure_not_closed(&meeting)?;

        let invitee = self
            .store
            .find_person_by_login(login)
            .await?
            .ok_or_else(|| ActionError::NotFound(format!("Personne '{}' introuvable", login)))?;

        if meeting.kind == MeetingKind::Private {
            self.store.add_authorization(invitee.id, meeting.id).await?;
        }
        self.store.add_participation(invitee.id, meeting.id).await?;

        tracing::info!(
            "Person {} invited to meeting {} by person {}",
            invitee.id,
            meeting.id,
            identity.person_id
        );
        Outcome::new()
            .with("reunionId", meeting.id.value())?
            .with("invite", PersonDto::from(&invitee))
    }

    /// 会議の状態遷移（開始・終了）
    ///
    /// 書き込みは Record Store の compare-and-set で行い、並行した遷移のうち
    /// 読み取った状態から進められた 1 つだけが成功する。
    async fn transition(
        &self,
        ctx: &RequestContext,
        meeting_id: MeetingId,
        target: MeetingStatus,
    ) -> Result<Outcome, ActionError> {
        let identity = ctx.require_identity()?;
        let mut meeting = load_meeting(self.store.as_ref(), meeting_id).await?;
        if !meeting.can_moderate(identity.person_id) {
            return Err(ActionError::NotAuthorized(
                "Seuls l'organisateur et l'animateur peuvent ouvrir ou clôturer la réunion"
                    .to_string(),
            ));
        }

        let status = meeting.transition_to(target)?;
        if !self
            .store
            .transition_meeting_status(meeting.id, meeting.status, status)
            .await?
        {
            let current = load_meeting(self.store.as_ref(), meeting.id).await?;
            return Err(MeetingError::InvalidTransition {
                from: current.status,
                to: target,
            }
            .into());
        }
        if status == MeetingStatus::Closed {
            self.coordinator.close_meeting(meeting.id).await;
        }
        meeting.status = status;

        tracing::info!(
            "Meeting {} moved to {:?} by person {}",
            meeting.id,
            status,
            identity.person_id
        );
        Outcome::new().with("reunion", MeetingDto::from(&meeting))
    }
}

#[async_trait]
impl ActionHandler for MeetingLifecycleHandler {
    fn modele(&self) -> &'static str {
        modele::REUNION
    }

    async fn handle(
        &self,
        ctx: &RequestContext,
        action: &str,
        payload: &Map<String, Value>,
    ) -> Result<Outcome, ActionError> {
        if FloorRequestHandler::supports(action) {
            return self.floor.handle(ctx, action, payload).await;
        }

        match MeetingCommand::parse(action, Payload::new(payload))? {
            MeetingCommand::Create(request) => self.create(ctx, request).await,
            MeetingCommand::Join(meeting_id) => self.join(ctx, meeting_id).await,
            MeetingCommand::Leave(meeting_id) => self.leave(ctx, meeting_id).await,
            MeetingCommand::Details(meeting_id) => self.details(ctx, meeting_id).await,
            MeetingCommand::List => self.list(ctx).await,
            MeetingCommand::Invite { meeting_id, login } => {
                self.invite(ctx, meeting_id, &login).await
            }
            MeetingCommand::Open(meeting_id) => {
                self.transition(ctx, meeting_id, MeetingStatus::Open).await
            }
            MeetingCommand::Close(meeting_id) => {
                self.transition(ctx, meeting_id, MeetingStatus::Closed).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            ChatMessage, Connection, ConnectionId, FloorRequest, Identity, NewChatMessage,
            NewPerson, Person,
        },
        infrastructure::repository::InMemoryRecordStore,
    };
    use parole_shared::time::FixedClock;
    use serde_json::json;
    use std::time::Duration;

    /// `find_meeting` の応答を遅らせる Record Store
    ///
    /// 並行した状態遷移が同じ状態を読み取ってから書き込む状況を作る。
    struct SlowMeetingReads {
        inner: Arc<InMemoryRecordStore>,
        delay: Duration,
    }

    #[async_trait]
    impl RecordStore for SlowMeetingReads {
        async fn insert_person(&self, person: NewPerson) -> Result<Person, RepositoryError> {
            self.inner.insert_person(person).await
        }

        async fn verify_credentials(
            &self,
            login: &str,
            password: &str,
        ) -> Result<Option<Person>, RepositoryError> {
            self.inner.verify_credentials(login, password).await
        }

        async fn find_person(&self, id: PersonId) -> Result<Option<Person>, RepositoryError> {
            self.inner.find_person(id).await
        }

        async fn find_person_by_login(
            &self,
            login: &str,
        ) -> Result<Option<Person>, RepositoryError> {
            self.inner.find_person_by_login(login).await
        }

        async fn set_online(&self, id: PersonId, online: bool) -> Result<(), RepositoryError> {
            self.inner.set_online(id, online).await
        }

        async fn insert_meeting(&self, meeting: NewMeeting) -> Result<Meeting, RepositoryError> {
            self.inner.insert_meeting(meeting).await
        }

        async fn find_meeting(&self, id: MeetingId) -> Result<Option<Meeting>, RepositoryError> {
            let meeting = self.inner.find_meeting(id).await;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            meeting
        }

        async fn list_meetings(&self) -> Result<Vec<Meeting>, RepositoryError> {
            self.inner.list_meetings().await
        }

        async fn transition_meeting_status(
            &self,
            id: MeetingId,
            from: MeetingStatus,
            to: MeetingStatus,
        ) -> Result<bool, RepositoryError> {
            self.inner.transition_meeting_status(id, from, to).await
        }

        async fn add_participation(
            &self,
            person_id: PersonId,
            meeting_id: MeetingId,
        ) -> Result<(), RepositoryError> {
            self.inner.add_participation(person_id, meeting_id).await
        }

        async fn remove_participation(
            &self,
            person_id: PersonId,
            meeting_id: MeetingId,
        ) -> Result<bool, RepositoryError> {
            self.inner.remove_participation(person_id, meeting_id).await
        }

        async fn is_participant(
            &self,
            person_id: PersonId,
            meeting_id: MeetingId,
        ) -> Result<bool, RepositoryError> {
            self.inner.is_participant(person_id, meeting_id).await
        }

        async fn list_participants(
            &self,
            meeting_id: MeetingId,
        ) -> Result<Vec<PersonId>, RepositoryError> {
            self.inner.list_participants(meeting_id).await
        }

        async fn add_authorization(
            &self,
            person_id: PersonId,
            meeting_id: MeetingId,
        ) -> Result<(), RepositoryError> {
            self.inner.add_authorization(person_id, meeting_id).await
        }

        async fn is_authorized(
            &self,
            person_id: PersonId,
            meeting_id: MeetingId,
        ) -> Result<bool, RepositoryError> {
            self.inner.is_authorized(person_id, meeting_id).await
        }

        async fn save_floor_request(&self, request: FloorRequest) -> Result<(), RepositoryError> {
            self.inner.save_floor_request(request).await
        }

        async fn insert_message(
            &self,
            message: NewChatMessage,
        ) -> Result<ChatMessage, RepositoryError> {
            self.inner.insert_message(message).await
        }

        async fn list_messages(
            &self,
            meeting_id: MeetingId,
        ) -> Result<Vec<ChatMessage>, RepositoryError> {
            self.inner.list_messages(meeting_id).await
        }
    }

    struct Fixture {
        store: Arc<InMemoryRecordStore>,
        registry: Arc<ConnectionRegistry>,
        coordinator: Arc<FloorRequestCoordinator>,
        handler: Arc<MeetingLifecycleHandler>,
    }

    impl Fixture {
        async fn new() -> Self {
            Self::with_read_delay(Duration::ZERO).await
        }

        /// 会議の読み取りに遅延を入れた Record Store で組み立てる
        async fn with_read_delay(delay: Duration) -> Self {
            let store = Arc::new(InMemoryRecordStore::new());
            let handler_store: Arc<dyn RecordStore> = Arc::new(SlowMeetingReads {
                inner: store.clone(),
                delay,
            });
            let registry = Arc::new(ConnectionRegistry::new());
            let coordinator = Arc::new(FloorRequestCoordinator::new(
                store.clone(),
                Arc::new(FixedClock::new(0)),
            ));
            let handler = Arc::new(MeetingLifecycleHandler::new(
                handler_store,
                registry.clone(),
                coordinator.clone(),
            ));
            Self {
                store,
                registry,
                coordinator,
                handler,
            }
        }

        /// 人物を登録し、ログイン済みの接続を作る
        async fn login(&self, login: &str) -> (Person, ConnectionId) {
            let person = self
                .store
                .insert_person(NewPerson {
                    login: login.to_string(),
                    password: "pw".to_string(),
                    first_name: String::new(),
                    last_name: String::new(),
                })
                .await
                .unwrap();
            let connection_id = ConnectionId::generate();
            let (tx, _rx) = tokio::sync::mpsc::channel(8);
            self.registry
                .register(Connection::new(connection_id, Timestamp::new(0)), tx);
            self.registry
                .attach_identity(connection_id, person.identity())
                .unwrap();
            (person, connection_id)
        }

        fn ctx(&self, connection_id: ConnectionId) -> RequestContext {
            let connection = self.registry.get(connection_id).unwrap();
            RequestContext {
                connection_id,
                identity: connection.identity,
                meeting_id: connection.meeting_id,
            }
        }

        async fn call(
            &self,
            connection_id: ConnectionId,
            action: &str,
            payload: Value,
        ) -> Result<Outcome, ActionError> {
            let payload = payload.as_object().cloned().unwrap_or_default();
            self.handler
                .handle(&self.ctx(connection_id), action, &payload)
                .await
        }

        async fn create(&self, connection_id: ConnectionId, title: &str, kind: &str) -> MeetingId {
            let outcome = self
                .call(
                    connection_id,
                    "creation",
                    json!({
                        "titre": title,
                        "sujet": "daily",
                        "debut": "2024-05-01T09:30:00",
                        "duree": 15,
                        "type": kind,
                    }),
                )
                .await
                .unwrap();
            MeetingId::new(outcome.payload["reunion"]["id"].as_u64().unwrap())
        }
    }

    #[tokio::test]
    async fn test_create_meeting_records_organizer_as_participant() {
        // テスト項目: 会議を作成すると PLANNED で登録され、主催者が参加者になる
        // given (前提条件):
        let f = Fixture::new().await;
        let (alice, conn) = f.login("alice").await;

        // when (操作):
        let outcome = f
            .call(
                conn,
                "creation",
                json!({
                    "titre": "Standup",
                    "debut": "2024-05-01T09:30:00Z",
                    "duree": "15",
                    "type": "STANDARD",
                    "idOrganisateur": alice.id.value(),
                }),
            )
            .await
            .unwrap();

        // then (期待する結果):
        let reunion = &outcome.payload["reunion"];
        assert_eq!(reunion["statut"], json!("PLANNED"));
        assert_eq!(reunion["idOrganisateur"], json!(alice.id.value()));
        assert_eq!(reunion["debut"], json!("2024-05-01T09:30:00.000Z"));
        let meeting_id = MeetingId::new(reunion["id"].as_u64().unwrap());
        assert!(f.store.is_participant(alice.id, meeting_id).await.unwrap());
        assert!(f.registry.list_by_meeting(meeting_id).contains(&conn));
    }

    #[tokio::test]
    async fn test_create_validation_errors() {
        // テスト項目: 作成の入力不備は Validation エラーになる
        // given (前提条件):
        let f = Fixture::new().await;
        let (_, conn) = f.login("alice").await;

        // when (操作):
        let missing_title = f
            .call(conn, "creation", json!({"debut": "2024-05-01T09:30", "duree": 15}))
            .await;
        let bad_date = f
            .call(conn, "creation", json!({"titre": "X", "debut": "demain", "duree": 15}))
            .await;
        let zero_duration = f
            .call(conn, "creation", json!({"titre": "X", "debut": "2024-05-01T09:30", "duree": 0}))
            .await;
        let bad_kind = f
            .call(
                conn,
                "creation",
                json!({"titre": "X", "debut": "2024-05-01T09:30", "duree": 5, "type": "SECRET"}),
            )
            .await;

        // then (期待する結果):
        for result in [missing_title, bad_date, zero_duration, bad_kind] {
            assert!(matches!(result, Err(ActionError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn test_create_requires_login_and_own_name() {
        // テスト項目: 未認証の作成と他人名義の作成は拒否される
        // given (前提条件):
        let f = Fixture::new().await;
        let (_, conn) = f.login("alice").await;
        let anonymous = ConnectionId::generate();
        let (tx, _rx) = tokio::sync::mpsc::channel(8);
        f.registry
            .register(Connection::new(anonymous, Timestamp::new(0)), tx);

        // when (操作):
        let body = json!({"titre": "X", "debut": "2024-05-01T09:30", "duree": 5});
        let unauthenticated = f.call(anonymous, "creation", body).await;
        let other_name = f
            .call(
                conn,
                "creation",
                json!({"titre": "X", "debut": "2024-05-01T09:30", "duree": 5, "idOrganisateur": 99}),
            )
            .await;

        // then (期待する結果):
        assert_eq!(unauthenticated, Err(ActionError::Unauthenticated));
        assert!(matches!(other_name, Err(ActionError::NotAuthorized(_))));
    }

    #[tokio::test]
    async fn test_duplicate_title_is_conflict() {
        // テスト項目: 同じタイトルの会議の作成は Conflict
        // given (前提条件):
        let f = Fixture::new().await;
        let (_, conn) = f.login("alice").await;
        f.create(conn, "Standup", "STANDARD").await;

        // when (操作):
        let result = f
            .call(
                conn,
                "creation",
                json!({"titre": "Standup", "debut": "2024-05-01T09:30", "duree": 5}),
            )
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(ActionError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_repeated_join_keeps_single_audience_entry() {
        // テスト項目: 繰り返し参加しても会議の接続一覧に一度だけ現れる
        // given (前提条件):
        let f = Fixture::new().await;
        let (_, alice) = f.login("alice").await;
        let (bob, bob_conn) = f.login("bob").await;
        let meeting_id = f.create(alice, "Standup", "STANDARD").await;

        // when (操作):
        for _ in 0..3 {
            f.call(bob_conn, "rejoindre", json!({"reunionId": meeting_id.value()}))
                .await
                .unwrap();
        }

        // then (期待する結果):
        let audience = f.registry.list_by_meeting(meeting_id);
        assert_eq!(audience.len(), 2);
        assert!(audience.contains(&bob_conn));
        assert_eq!(
            f.store.list_participants(meeting_id).await.unwrap(),
            vec![PersonId::new(1), bob.id]
        );
    }

    #[tokio::test]
    async fn test_private_meeting_requires_invitation() {
        // テスト項目: 非公開会議は招待（認可）されるまで参加できない
        // given (前提条件):
        let f = Fixture::new().await;
        let (_, alice) = f.login("alice").await;
        let (_, bob_conn) = f.login("bob").await;
        let meeting_id = f.create(alice, "Board", "PRIVEE").await;

        // when (操作):
        let before = f
            .call(bob_conn, "rejoindre", json!({"reunionId": meeting_id.value()}))
            .await;
        f.call(
            alice,
            "inviterMembre",
            json!({"reunionId": meeting_id.value(), "usernameToInvite": "bob"}),
        )
        .await
        .unwrap();
        let after = f
            .call(bob_conn, "rejoindre", json!({"reunionId": meeting_id.value()}))
            .await;

        // then (期待する結果):
        assert!(matches!(before, Err(ActionError::NotAuthorized(_))));
        assert!(after.is_ok());
    }

    #[tokio::test]
    async fn test_invite_by_non_organizer_is_rejected() {
        // テスト項目: 主催者以外による招待は NotAuthorized で、招待された人物には何も起きない
        // given (前提条件):
        let f = Fixture::new().await;
        let (_, alice) = f.login("alice").await;
        let (_, carol) = f.login("carol").await;
        let (dave, _) = f.login("dave").await;
        let meeting_id = f.create(alice, "Board", "PRIVATE").await;

        // when (操作):
        let result = f
            .call(
                carol,
                "inviterMembre",
                json!({"reunionId": meeting_id.value(), "usernameToInvite": "dave"}),
            )
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(ActionError::NotAuthorized(_))));
        assert!(!f.store.is_authorized(dave.id, meeting_id).await.unwrap());
        assert!(!f.store.is_participant(dave.id, meeting_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_invite_unknown_person_is_not_found() {
        // テスト項目: 存在しない人物の招待は NotFound
        // given (前提条件):
        let f = Fixture::new().await;
        let (_, alice) = f.login("alice").await;
        let meeting_id = f.create(alice, "Standup", "STANDARD").await;

        // when (操作):
        let result = f
            .call(
                alice,
                "inviterMembre",
                json!({"reunionId": meeting_id.value(), "usernameToInvite": "nobody"}),
            )
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(ActionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        // テスト項目: PLANNED → OPEN → CLOSED の遷移と、不正な遷移の拒否
        // given (前提条件):
        let f = Fixture::new().await;
        let (_, alice) = f.login("alice").await;
        let (_, bob) = f.login("bob").await;
        let meeting_id = f.create(alice, "Standup", "STANDARD").await;
        let id = json!({"reunionId": meeting_id.value()});

        // when (操作):
        let by_member = f.call(bob, "ouvrir", id.clone()).await;
        let close_planned = f.call(alice, "cloturer", id.clone()).await;
        let opened = f.call(alice, "ouvrir", id.clone()).await.unwrap();
        let closed = f.call(alice, "cloturer", id.clone()).await.unwrap();
        let close_again = f.call(alice, "cloturer", id.clone()).await;
        let join_closed = f.call(bob, "rejoindre", id).await;

        // then (期待する結果):
        assert!(matches!(by_member, Err(ActionError::NotAuthorized(_))));
        assert!(matches!(close_planned, Err(ActionError::Conflict(_))));
        assert_eq!(opened.payload["reunion"]["statut"], json!("OPEN"));
        assert_eq!(closed.payload["reunion"]["statut"], json!("CLOSED"));
        assert!(matches!(close_again, Err(ActionError::Conflict(_))));
        assert!(matches!(join_closed, Err(ActionError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_leave_detaches_connection() {
        // テスト項目: 退出すると参加が削除され、接続の会議の紐付けが解除される
        // given (前提条件):
        let f = Fixture::new().await;
        let (_, alice) = f.login("alice").await;
        let (bob, bob_conn) = f.login("bob").await;
        let meeting_id = f.create(alice, "Standup", "STANDARD").await;
        let id = json!({"reunionId": meeting_id.value()});
        f.call(bob_conn, "rejoindre", id.clone()).await.unwrap();

        // when (操作):
        let left = f.call(bob_conn, "quitter", id.clone()).await;
        let left_again = f.call(bob_conn, "quitter", id).await;

        // then (期待する結果):
        assert!(left.is_ok());
        assert!(matches!(left_again, Err(ActionError::Conflict(_))));
        assert!(!f.store.is_participant(bob.id, meeting_id).await.unwrap());
        assert!(!f.registry.list_by_meeting(meeting_id).contains(&bob_conn));
    }

    #[tokio::test]
    async fn test_list_hides_private_meetings_from_outsiders() {
        // テスト項目: 一覧には非公開会議が関係者にだけ表示される
        // given (前提条件):
        let f = Fixture::new().await;
        let (_, alice) = f.login("alice").await;
        let (_, bob) = f.login("bob").await;
        f.create(alice, "Standup", "STANDARD").await;
        f.create(alice, "Board", "PRIVATE").await;

        // when (操作):
        let for_alice = f.call(alice, "lister", json!({})).await.unwrap();
        let for_bob = f.call(bob, "lister", json!({})).await.unwrap();

        // then (期待する結果):
        assert_eq!(for_alice.payload["reunions"].as_array().unwrap().len(), 2);
        let bob_titles: Vec<&str> = for_bob.payload["reunions"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|m| m["titre"].as_str())
            .collect();
        assert_eq!(bob_titles, vec!["Standup"]);
    }

    #[tokio::test]
    async fn test_details_lists_participants() {
        // テスト項目: 詳細には参加者の一覧が含まれる
        // given (前提条件):
        let f = Fixture::new().await;
        let (_, alice) = f.login("alice").await;
        let (_, bob) = f.login("bob").await;
        let meeting_id = f.create(alice, "Standup", "STANDARD").await;
        let id = json!({"reunionId": meeting_id.value()});
        f.call(bob, "rejoindre", id.clone()).await.unwrap();

        // when (操作):
        let outcome = f.call(bob, "details", id).await.unwrap();

        // then (期待する結果):
        let logins: Vec<&str> = outcome.payload["participants"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|p| p["login"].as_str())
            .collect();
        assert_eq!(logins, vec!["alice", "bob"]);
        assert_eq!(outcome.payload["orateur"], Value::Null);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_store_error() {
        // テスト項目: Record Store の失敗は Store エラーとして返る
        // given (前提条件):
        let mut store = crate::domain::MockRecordStore::new();
        store
            .expect_find_meeting()
            .returning(|_| Err(RepositoryError::Unavailable("timeout".to_string())));
        let store: Arc<dyn RecordStore> = Arc::new(store);
        let handler = MeetingLifecycleHandler::new(
            store.clone(),
            Arc::new(ConnectionRegistry::new()),
            Arc::new(FloorRequestCoordinator::new(
                store,
                Arc::new(FixedClock::new(0)),
            )),
        );
        let ctx = RequestContext {
            connection_id: ConnectionId::generate(),
            identity: Some(Identity {
                person_id: PersonId::new(1),
                login: "alice".to_string(),
                display_name: "alice".to_string(),
            }),
            meeting_id: None,
        };
        let payload = json!({"reunionId": 1}).as_object().cloned().unwrap();

        // when (操作):
        let result = handler.handle(&ctx, "rejoindre", &payload).await;

        // then (期待する結果):
        assert!(matches!(result, Err(ActionError::Store(_))));
    }

    #[tokio::test]
    async fn test_concurrent_close_has_single_winner() {
        // テスト項目: 同じ会議への並行した終了は 1 つだけ成功し、残りは Conflict
        // given (前提条件):
        let f = Fixture::with_read_delay(Duration::from_millis(20)).await;
        let (_, organizer) = f.login("alice").await;
        let meeting_id = f.create(organizer, "Standup", "STANDARD").await;
        let id = json!({"reunionId": meeting_id.value()});
        f.call(organizer, "ouvrir", id.clone()).await.unwrap();

        // when (操作):
        let (first, second, third) = tokio::join!(
            f.call(organizer, "cloturer", id.clone()),
            f.call(organizer, "cloturer", id.clone()),
            f.call(organizer, "cloturer", id.clone()),
        );

        // then (期待する結果):
        let results = [first, second, third];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(ActionError::Conflict(_))))
                .count(),
            2
        );
        assert_eq!(
            f.store.find_meeting(meeting_id).await.unwrap().map(|m| m.status),
            Some(MeetingStatus::Closed)
        );
    }

    #[tokio::test]
    async fn test_racing_open_never_reopens_closed_meeting() {
        // テスト項目: 並行した開始と「開始→終了」が交差しても、終了した会議が OPEN に戻らない
        // given (前提条件):
        let f = Fixture::with_read_delay(Duration::from_millis(20)).await;
        let (_, alice) = f.login("alice").await;
        let meeting_id = f.create(alice, "Standup", "STANDARD").await;
        let id = json!({"reunionId": meeting_id.value()});

        // when (操作):
        let (x_open, (y_open, y_close)) = tokio::join!(f.call(alice, "ouvrir", id.clone()), async {
            let opened = f.call(alice, "ouvrir", id.clone()).await;
            let closed = f.call(alice, "cloturer", id.clone()).await;
            (opened, closed)
        });

        // then (期待する結果):
        assert_eq!([&x_open, &y_open].iter().filter(|r| r.is_ok()).count(), 1);
        assert!(y_close.is_ok());
        assert_eq!(
            f.store.find_meeting(meeting_id).await.unwrap().map(|m| m.status),
            Some(MeetingStatus::Closed)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_transitions_follow_lifecycle_order() {
        // テスト項目: 複数スレッドからの開始・終了の同時実行でも、開始と終了はそれぞれ高々 1 回だけ成功する
        // given (前提条件):
        let f = Fixture::new().await;
        let (_, alice) = f.login("alice").await;
        let meeting_id = f.create(alice, "Standup", "STANDARD").await;
        let ctx = f.ctx(alice);

        // when (操作):
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let handler = f.handler.clone();
                let ctx = ctx.clone();
                let action = if i % 2 == 0 { "ouvrir" } else { "cloturer" };
                let payload = json!({"reunionId": meeting_id.value()})
                    .as_object()
                    .cloned()
                    .unwrap();
                tokio::spawn(async move {
                    (action, handler.handle(&ctx, action, &payload).await.is_ok())
                })
            })
            .collect();
        let mut opened = 0;
        let mut closed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                ("ouvrir", true) => opened += 1,
                ("cloturer", true) => closed += 1,
                _ => {}
            }
        }

        // then (期待する結果):
        let status = f
            .store
            .find_meeting(meeting_id)
            .await
            .unwrap()
            .map(|m| m.status);
        assert_eq!(opened, 1);
        assert!(closed <= 1);
        let expected = if closed == 1 {
            MeetingStatus::Closed
        } else {
            MeetingStatus::Open
        };
        assert_eq!(status, Some(expected));
    }

    #[tokio::test]
    async fn test_floor_request_racing_with_close_is_discarded() {
        // テスト項目: 終了と並行した発言要求は、終了後のキューに残らない
        // given (前提条件):
        let f = Fixture::with_read_delay(Duration::from_millis(20)).await;
        let (_, alice) = f.login("alice").await;
        let (_, bob) = f.login("bob").await;
        let meeting_id = f.create(alice, "Standup", "STANDARD").await;
        let id = json!({"reunionId": meeting_id.value()});
        f.call(alice, "ouvrir", id.clone()).await.unwrap();
        f.call(bob, "rejoindre", id.clone()).await.unwrap();

        // when (操作):
        let (request, close) = tokio::join!(
            f.call(bob, "demanderParole", id.clone()),
            f.call(alice, "cloturer", id.clone()),
        );

        // then (期待する結果):
        assert!(close.is_ok());
        assert!(matches!(request, Ok(_) | Err(ActionError::Conflict(_))));
        assert!(f.coordinator.pending(meeting_id).await.is_empty());
        assert!(f.coordinator.peek_next(meeting_id).await.is_none());
    }

    #[tokio::test]
    async fn test_leave_withdraws_pending_floor_request() {
        // テスト項目: 退出した参加者の保留中の発言要求は取り下げられ、許可できない
        // given (前提条件):
        let f = Fixture::new().await;
        let (_, alice) = f.login("alice").await;
        let (bob, bob_conn) = f.login("bob").await;
        let meeting_id = f.create(alice, "Standup", "STANDARD").await;
        let id = json!({"reunionId": meeting_id.value()});
        f.call(alice, "ouvrir", id.clone()).await.unwrap();
        f.call(bob_conn, "rejoindre", id.clone()).await.unwrap();
        let requested = f
            .call(bob_conn, "demanderParole", id.clone())
            .await
            .unwrap();
        let demande_id = requested.payload["demandeParole"]["id"].as_u64().unwrap();

        // when (操作):
        f.call(bob_conn, "quitter", id.clone()).await.unwrap();
        let grant = f
            .call(
                alice,
                "accorderParole",
                json!({"reunionId": meeting_id.value(), "demandeId": demande_id}),
            )
            .await;

        // then (期待する結果):
        assert!(f.coordinator.peek_next(meeting_id).await.is_none());
        assert!(
            f.coordinator
                .pending(meeting_id)
                .await
                .iter()
                .all(|r| r.requester_id != bob.id)
        );
        assert!(matches!(grant, Err(ActionError::NotFound(_))));
    }
}
