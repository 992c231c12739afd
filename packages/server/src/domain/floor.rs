//! 会議ごとの発言要求キュー
//!
//! 保留中（PENDING）の要求を要求時刻の昇順（同時刻なら ID の昇順）で並べ、
//! 現在の発言者（最後に許可された要求）を保持する。
//! 決着した要求は現在の発言者を除いてキューから外す。
//! 排他制御は呼び出し側（Floor-Request Coordinator）が会議単位で行う。

use std::collections::HashMap;

use super::{
    FloorError, FloorRequest, FloorRequestId, FloorRequestStatus, MeetingId, PersonId, Timestamp,
};

/// 単一の会議の発言要求キュー
#[derive(Debug, Default)]
pub struct FloorQueue {
    /// 保留中の要求のみ
    pending: HashMap<FloorRequestId, FloorRequest>,
    current_speaker: Option<FloorRequest>,
    closed: Option<MeetingId>,
}

impl FloorQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 人物の保留中の要求
    pub fn pending_of(&self, person_id: PersonId) -> Option<&FloorRequest> {
        self.pending
            .values()
            .find(|request| request.requester_id == person_id)
    }

    /// 発言を要求する
    ///
    /// 同じ人物の保留中の要求があればそれを返し（`false`）、なければ `next_id` で
    /// 採番した要求を作成して返す（`true`）。終了済みの会議では `MeetingClosed`。
    pub fn request(
        &mut self,
        meeting_id: MeetingId,
        person_id: PersonId,
        requested_at: Timestamp,
        next_id: impl FnOnce() -> FloorRequestId,
    ) -> Result<(FloorRequest, bool), FloorError> {
        self.ensure_open()?;
        if let Some(existing) = self.pending_of(person_id) {
            return Ok((existing.clone(), false));
        }

        let request = FloorRequest {
            id: next_id(),
            requester_id: person_id,
            meeting_id,
            requested_at,
            status: FloorRequestStatus::Pending,
        };
        self.pending.insert(request.id, request.clone());
        Ok((request, true))
    }

    /// PENDING → GRANTED。許可された要求が現在の発言者になる
    pub fn grant(&mut self, id: FloorRequestId) -> Result<FloorRequest, FloorError> {
        let granted = self.decide(id, FloorRequestStatus::Granted)?;
        self.current_speaker = Some(granted.clone());
        Ok(granted)
    }

    /// PENDING → DENIED
    pub fn deny(&mut self, id: FloorRequestId) -> Result<FloorRequest, FloorError> {
        self.decide(id, FloorRequestStatus::Denied)
    }

    /// 退出した人物の保留中の要求を取り下げる
    ///
    /// その人物が現在の発言者であれば発言者も空にする。
    pub fn withdraw(&mut self, person_id: PersonId) -> Option<FloorRequest> {
        if self
            .current_speaker
            .as_ref()
            .is_some_and(|speaker| speaker.requester_id == person_id)
        {
            self.current_speaker = None;
        }

        let id = self.pending_of(person_id)?.id;
        let mut withdrawn = self.pending.remove(&id)?;
        withdrawn.status = FloorRequestStatus::Withdrawn;
        Some(withdrawn)
    }

    /// 会議の終了。以後の要求・決定は `MeetingClosed` になる
    pub fn close(&mut self, meeting_id: MeetingId) {
        self.pending.clear();
        self.current_speaker = None;
        self.closed = Some(meeting_id);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    /// 次に許可されるべき要求（最も早い保留中の要求）
    pub fn peek_next(&self) -> Option<&FloorRequest> {
        self.pending
            .values()
            .min_by_key(|request| (request.requested_at, request.id))
    }

    /// 保留中の要求を要求時刻の昇順で返す
    pub fn pending(&self) -> Vec<FloorRequest> {
        let mut pending: Vec<FloorRequest> = self.pending.values().cloned().collect();
        pending.sort_by_key(|request| (request.requested_at, request.id));
        pending
    }

    /// 現在の発言者の要求
    pub fn current_speaker(&self) -> Option<&FloorRequest> {
        self.current_speaker.as_ref()
    }

    /// 保持している要求の数（保留中と現在の発言者）
    pub fn len(&self) -> usize {
        self.pending.len() + usize::from(self.current_speaker.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_open(&self) -> Result<(), FloorError> {
        match self.closed {
            Some(meeting_id) => Err(FloorError::MeetingClosed(meeting_id)),
            None => Ok(()),
        }
    }

    fn decide(
        &mut self,
        id: FloorRequestId,
        status: FloorRequestStatus,
    ) -> Result<FloorRequest, FloorError> {
        self.ensure_open()?;
        let Some(mut request) = self.pending.remove(&id) else {
            return Err(match &self.current_speaker {
                Some(speaker) if speaker.id == id => FloorError::NotPending {
                    id,
                    status: speaker.status,
                },
                _ => FloorError::RequestNotFound(id),
            });
        };
        request.status = status;
        Ok(request)
    }
}
