//! UseCase: 発言要求（`reunion` ドメインの `demanderParole` / `accorderParole` / `refuserParole`）
//!
//! 要求・許可・却下は Floor-Request Coordinator に対応付けられる。
//! 許可と却下の結果は会議全体にブロードキャストされ、要求の失敗は要求元にだけ返る。

use std::sync::Arc;

use parole_shared::time::timestamp_to_rfc3339;
use serde_json::{Map, Value};

use crate::{
    domain::{FloorRequest, FloorRequestId, MeetingId, PersonId, RecordStore},
    infrastructure::dto::websocket::{FloorRequestDto, ServerEvent},
};

use super::{
    error::ActionError,
    floor_coordinator::FloorRequestCoordinator,
    handler::{Outcome, Payload, RequestContext},
    meeting::{ensure_not_closed, ensure_participant, load_meeting},
};

const ACTION_REQUEST: &str = "demanderParole";
const ACTION_GRANT: &str = "accorderParole";
const ACTION_DENY: &str = "refuserParole";

/// 決定の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Grant,
    Deny,
}

/// 発言要求のハンドラ
pub struct FloorRequestHandler {
    store: Arc<dyn RecordStore>,
    coordinator: Arc<FloorRequestCoordinator>,
}

impl FloorRequestHandler {
    pub fn new(store: Arc<dyn RecordStore>, coordinator: Arc<FloorRequestCoordinator>) -> Self {
        Self { store, coordinator }
    }

    /// このハンドラが扱うアクションか
    pub fn supports(action: &str) -> bool {
        matches!(action, ACTION_REQUEST | ACTION_GRANT | ACTION_DENY)
    }

    pub async fn handle(
        &self,
        ctx: &RequestContext,
        action: &str,
        payload: &Map<String, Value>,
    ) -> Result<Outcome, ActionError> {
        let payload = Payload::new(payload);
        let meeting_id = MeetingId::new(payload.required_id("reunionId")?);
        match action {
            ACTION_REQUEST => self.request(ctx, meeting_id).await,
            ACTION_GRANT | ACTION_DENY => {
                let request_id = FloorRequestId::new(payload.required_id("demandeId")?);
                let decision = if action == ACTION_GRANT {
                    Decision::Grant
                } else {
                    Decision::Deny
                };
                self.decide(ctx, meeting_id, request_id, decision).await
            }
            other => Err(ActionError::Validation(format!("Action inconnue: {}", other))),
        }
    }

    async fn request(
        &self,
        ctx: &RequestContext,
        meeting_id: MeetingId,
    ) -> Result<Outcome, ActionError> {
        let identity = ctx.require_identity()?;
        let meeting = load_meeting(self.store.as_ref(), meeting_id).await?;
        ensure_not_closed(&meeting)?;
        ensure_participant(self.store.as_ref(), &meeting, identity.person_id).await?;

        let (request, _) = self
            .coordinator
            .request(meeting.id, identity.person_id)
            .await?;
        Outcome::new().with("demandeParole", FloorRequestDto::from(&request))
    }

    async fn decide(
        &self,
        ctx: &RequestContext,
        meeting_id: MeetingId,
        request_id: FloorRequestId,
        decision: Decision,
    ) -> Result<Outcome, ActionError> {
        let identity = ctx.require_identity()?;
        let meeting = load_meeting(self.store.as_ref(), meeting_id).await?;
        ensure_not_closed(&meeting)?;

        let decided = match decision {
            Decision::Grant => {
                self.coordinator
                    .grant(meeting.id, request_id, identity.person_id)
                    .await?
            }
            Decision::Deny => {
                self.coordinator
                    .deny(meeting.id, request_id, identity.person_id)
                    .await?
            }
        };

        let event = self
            .decision_event(&decided, identity.person_id, decision)
            .await?;
        Ok(Outcome::new()
            .with("demandeParole", FloorRequestDto::from(&decided))?
            .broadcast_to(meeting.id, event))
    }

    async fn decision_event(
        &self,
        request: &FloorRequest,
        decided_by: PersonId,
        decision: Decision,
    ) -> Result<ServerEvent, ActionError> {
        let (login, display_name) = match self.store.find_person(request.requester_id).await? {
            Some(person) => {
                let display_name = person.display_name();
                (person.login, display_name)
            }
            None => (
                request.requester_id.to_string(),
                request.requester_id.to_string(),
            ),
        };

        let reunion_id = request.meeting_id.value();
        let demande_id = request.id.value();
        let person_id = request.requester_id.value();
        let decided_by = decided_by.value();
        let timestamp = timestamp_to_rfc3339(self.coordinator.now().value());
        Ok(match decision {
            Decision::Grant => ServerEvent::FloorGranted {
                reunion_id,
                demande_id,
                person_id,
                login,
                display_name,
                decided_by,
                timestamp,
            },
            Decision::Deny => ServerEvent::FloorDenied {
                reunion_id,
                demande_id,
                person_id,
                login,
                display_name,
                decided_by,
                timestamp,
            },
        })
    }
}
