//! Floor-Request Coordinator
//!
//! 会議ごとの発言要求キューを管理する。
//!
//! ## 設計ノート
//!
//! - キューは会議単位の `Mutex` で保護され、同じ会議への操作は直列化される。
//!   異なる会議への操作は互いに待たない
//! - 許可・却下の権限確認（Record Store の照会）はロックを取る前に行う
//! - 永続化はロックを外してから行う。Record Store の `save_floor_request` は
//!   単調な upsert なので、書き込み順が前後しても決着済みの状態は失われない
//! - 終了した会議のキューは空の閉じた状態で残す。終了と競合した要求が
//!   新しいキューを作り直すことはない

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use parole_shared::time::Clock;
use tokio::sync::Mutex;

use crate::domain::{
    FloorQueue, FloorRequest, FloorRequestId, MeetingId, PersonId, RecordStore, Timestamp,
};

use super::error::ActionError;

/// 会議ごとの発言要求キューの調停役
pub struct FloorRequestCoordinator {
    queues: DashMap<MeetingId, Arc<Mutex<FloorQueue>>>,
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    last_id: AtomicU64,
}

impl FloorRequestCoordinator {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            queues: DashMap::new(),
            store,
            clock,
            last_id: AtomicU64::new(0),
        }
    }

    /// 会議のキューを取得（なければ作成）
    ///
    /// キューは会議ごとに一度だけ作られ、以後は同じものが返る。
    /// DashMap のガードは返す前に解放される。
    fn queue(&self, meeting_id: MeetingId) -> Arc<Mutex<FloorQueue>> {
        self.queues.entry(meeting_id).or_default().value().clone()
    }

    /// 発言を要求する
    ///
    /// 同じ人物の保留中の要求があればそれを返す。終了済みの会議では Conflict。
    ///
    /// # Returns
    ///
    /// `(要求, 新規作成したか)`
    pub async fn request(
        &self,
        meeting_id: MeetingId,
        person_id: PersonId,
    ) -> Result<(FloorRequest, bool), ActionError> {
        let queue = self.queue(meeting_id);
        let (request, created) = {
            let mut queue = queue.lock().await;
            let now = self.now();
            queue.request(meeting_id, person_id, now, || {
                FloorRequestId::new(self.last_id.fetch_add(1, Ordering::Relaxed) + 1)
            })?
        };

        if created {
            tracing::info!(
                "Floor request {} created by person {} in meeting {}",
                request.id,
                person_id,
                meeting_id
            );
            self.persist(&request).await;
        }

        Ok((request, created))
    }

    /// 発言を許可する（主催者または司会者のみ）
    pub async fn grant(
        &self,
        meeting_id: MeetingId,
        request_id: FloorRequestId,
        granter_id: PersonId,
    ) -> Result<FloorRequest, ActionError> {
        self.authorize(meeting_id, granter_id).await?;

        let granted = {
            let queue = self.queue(meeting_id);
            let mut queue = queue.lock().await;
            queue.grant(request_id)?
        };

        tracing::info!(
            "Floor request {} granted by person {} in meeting {}",
            request_id,
            granter_id,
            meeting_id
        );
        self.persist(&granted).await;
        Ok(granted)
    }

    /// 発言要求を却下する（主催者または司会者のみ）
    pub async fn deny(
        &self,
        meeting_id: MeetingId,
        request_id: FloorRequestId,
        denier_id: PersonId,
    ) -> Result<FloorRequest, ActionError> {
        self.authorize(meeting_id, denier_id).await?;

        let denied = {
            let queue = self.queue(meeting_id);
            let mut queue = queue.lock().await;
            queue.deny(request_id)?
        };

        tracing::info!(
            "Floor request {} denied by person {} in meeting {}",
            request_id,
            denier_id,
            meeting_id
        );
        self.persist(&denied).await;
        Ok(denied)
    }

    /// 退出した人物の保留中の要求を取り下げる
    pub async fn withdraw(&self, meeting_id: MeetingId, person_id: PersonId) -> Option<FloorRequest> {
        let queue = self.queues.get(&meeting_id)?.value().clone();
        let withdrawn = {
            let mut queue = queue.lock().await;
            queue.withdraw(person_id)
        }?;

        tracing::info!(
            "Floor request {} of person {} withdrawn from meeting {}",
            withdrawn.id,
            person_id,
            meeting_id
        );
        self.persist(&withdrawn).await;
        Some(withdrawn)
    }

    /// 次に許可されるべき要求
    pub async fn peek_next(&self, meeting_id: MeetingId) -> Option<FloorRequest> {
        let queue = self.queues.get(&meeting_id)?.value().clone();
        let queue = queue.lock().await;
        queue.peek_next().cloned()
    }

    /// 保留中の要求（要求時刻の昇順）
    pub async fn pending(&self, meeting_id: MeetingId) -> Vec<FloorRequest> {
        let Some(queue) = self.queues.get(&meeting_id).map(|q| q.value().clone()) else {
            return Vec::new();
        };
        let queue = queue.lock().await;
        queue.pending()
    }

    /// 現在の発言者の要求
    pub async fn current_speaker(&self, meeting_id: MeetingId) -> Option<FloorRequest> {
        let queue = self.queues.get(&meeting_id)?.value().clone();
        let queue = queue.lock().await;
        queue.current_speaker().cloned()
    }

    /// Coordinator から見た現在時刻
    pub fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_millis())
    }

    /// 会議の終了を記録し、保留中の要求と発言者を破棄する
    pub async fn close_meeting(&self, meeting_id: MeetingId) {
        let queue = self.queue(meeting_id);
        let mut queue = queue.lock().await;
        let discarded = queue.len();
        queue.close(meeting_id);
        tracing::debug!(
            "Floor queue of meeting {} closed ({} request(s) discarded)",
            meeting_id,
            discarded
        );
    }

    async fn authorize(&self, meeting_id: MeetingId, person_id: PersonId) -> Result<(), ActionError> {
        let meeting = self
            .store
            .find_meeting(meeting_id)
            .await?
            .ok_or_else(ActionError::meeting_not_found)?;
        if !meeting.can_moderate(person_id) {
            return Err(ActionError::NotAuthorized(
                "Seuls l'organisateur et l'animateur peuvent décider de la parole".to_string(),
            ));
        }
        Ok(())
    }

    async fn persist(&self, request: &FloorRequest) {
        if let Err(e) = self.store.save_floor_request(request.clone()).await {
            tracing::error!(
                "Failed to persist floor request {} of meeting {}: {}",
                request.id,
                request.meeting_id,
                e
            );
        }
    }
}
