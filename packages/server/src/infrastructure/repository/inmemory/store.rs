//! InMemory Record Store 実装
//!
//! ドメイン層が定義する RecordStore trait の具体的な実装。
//! BTreeMap / BTreeSet をインメモリ DB として使用します。
//!
//! 全ての書き込みは単一レコード単位で、同じインスタンスの次の読み取りから即座に見える。
//! 資格情報は平文で保持するため、開発・テスト用途に限る。

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use parole_shared::time::{Clock, SystemClock};
use tokio::sync::Mutex;

use crate::domain::{
    ChatMessage, FloorRequest, FloorRequestId, FloorRequestStatus, Meeting, MeetingId,
    MeetingStatus, MessageId, NewChatMessage, NewMeeting, NewPerson, Person, PersonId,
    RecordStore, RepositoryError, Timestamp,
};

struct StoredPerson {
    person: Person,
    password: String,
}

#[derive(Default)]
struct Tables {
    persons: BTreeMap<PersonId, StoredPerson>,
    meetings: BTreeMap<MeetingId, Meeting>,
    participations: BTreeSet<(MeetingId, PersonId)>,
    authorizations: BTreeSet<(MeetingId, PersonId)>,
    floor_requests: HashMap<FloorRequestId, FloorRequest>,
    messages: Vec<ChatMessage>,
    last_person_id: u64,
    last_meeting_id: u64,
    last_message_id: u64,
    last_message_at: i64,
}

/// インメモリ Record Store 実装
pub struct InMemoryRecordStore {
    tables: Mutex<Tables>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRecordStore {
    /// システム時刻を使う Record Store を作成
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// 時刻源を指定して作成（メッセージの送信時刻に使う）
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            clock,
        }
    }

    /// 保存済みの発言要求を取得
    pub async fn find_floor_request(&self, id: FloorRequestId) -> Option<FloorRequest> {
        self.tables.lock().await.floor_requests.get(&id).cloned()
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert_person(&self, person: NewPerson) -> Result<Person, RepositoryError> {
        let mut tables = self.tables.lock().await;
        if tables
            .persons
            .values()
            .any(|stored| stored.person.login == person.login)
        {
            return Err(RepositoryError::Duplicate(format!("login '{}'", person.login)));
        }

        tables.last_person_id += 1;
        let stored = Person {
            id: PersonId::new(tables.last_person_id),
            login: person.login,
            first_name: person.first_name,
            last_name: person.last_name,
            online: false,
        };
        tables.persons.insert(
            stored.id,
            StoredPerson {
                person: stored.clone(),
                password: person.password,
            },
        );
        Ok(stored)
    }

    async fn verify_credentials(
        &self,
        login: &str,
        password: &str,
    ) -> Result<Option<Person>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .persons
            .values()
            .find(|stored| stored.person.login == login && stored.password == password)
            .map(|stored| stored.person.clone()))
    }

    async fn find_person(&self, id: PersonId) -> Result<Option<Person>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.persons.get(&id).map(|stored| stored.person.clone()))
    }

    async fn find_person_by_login(&self, login: &str) -> Result<Option<Person>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .persons
            .values()
            .find(|stored| stored.person.login == login)
            .map(|stored| stored.person.clone()))
    }

    async fn set_online(&self, id: PersonId, online: bool) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        let stored = tables
            .persons
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("person {}", id)))?;
        stored.person.online = online;
        Ok(())
    }

    async fn insert_meeting(&self, meeting: NewMeeting) -> Result<Meeting, RepositoryError> {
        let mut tables = self.tables.lock().await;
        if tables
            .meetings
            .values()
            .any(|existing| existing.title == meeting.title)
        {
            return Err(RepositoryError::Duplicate(format!(
                "meeting '{}'",
                meeting.title.as_str()
            )));
        }

        tables.last_meeting_id += 1;
        let stored = Meeting {
            id: MeetingId::new(tables.last_meeting_id),
            title: meeting.title,
            subject: meeting.subject,
            agenda: meeting.agenda,
            starts_at: meeting.starts_at,
            duration_minutes: meeting.duration_minutes,
            kind: meeting.kind,
            organizer_id: meeting.organizer_id,
            moderator_id: meeting.moderator_id,
            status: MeetingStatus::Planned,
        };
        tables.meetings.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_meeting(&self, id: MeetingId) -> Result<Option<Meeting>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.meetings.get(&id).cloned())
    }

    async fn list_meetings(&self) -> Result<Vec<Meeting>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.meetings.values().cloned().collect())
    }

    async fn transition_meeting_status(
        &self,
        id: MeetingId,
        from: MeetingStatus,
        to: MeetingStatus,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let meeting = tables
            .meetings
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("meeting {}", id)))?;
        if meeting.status != from {
            return Ok(false);
        }
        meeting.status = to;
        Ok(true)
    }

    async fn add_participation(
        &self,
        person_id: PersonId,
        meeting_id: MeetingId,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        tables.participations.insert((meeting_id, person_id));
        Ok(())
    }

    async fn remove_participation(
        &self,
        person_id: PersonId,
        meeting_id: MeetingId,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.participations.remove(&(meeting_id, person_id)))
    }

    async fn is_participant(
        &self,
        person_id: PersonId,
        meeting_id: MeetingId,
    ) -> Result<bool, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.participations.contains(&(meeting_id, person_id)))
    }

    async fn list_participants(
        &self,
        meeting_id: MeetingId,
    ) -> Result<Vec<PersonId>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .participations
            .range((meeting_id, PersonId::new(0))..=(meeting_id, PersonId::new(u64::MAX)))
            .map(|(_, person_id)| *person_id)
            .collect())
    }

    async fn add_authorization(
        &self,
        person_id: PersonId,
        meeting_id: MeetingId,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        tables.authorizations.insert((meeting_id, person_id));
        Ok(())
    }

    async fn is_authorized(
        &self,
        person_id: PersonId,
        meeting_id: MeetingId,
    ) -> Result<bool, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.authorizations.contains(&(meeting_id, person_id)))
    }

    async fn save_floor_request(&self, request: FloorRequest) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        let stale = tables.floor_requests.get(&request.id).is_some_and(|existing| {
            existing.status != FloorRequestStatus::Pending
                && request.status == FloorRequestStatus::Pending
        });
        if stale {
            tracing::debug!("Ignoring stale pending write for floor request {}", request.id);
            return Ok(());
        }
        tables.floor_requests.insert(request.id, request);
        Ok(())
    }

    async fn insert_message(
        &self,
        message: NewChatMessage,
    ) -> Result<ChatMessage, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let sent_at = self.clock.now_millis().max(tables.last_message_at);
        tables.last_message_at = sent_at;
        tables.last_message_id += 1;

        let stored = ChatMessage {
            id: MessageId::new(tables.last_message_id),
            author_id: message.author_id,
            meeting_id: message.meeting_id,
            content: message.content,
            sent_at: Timestamp::new(sent_at),
        };
        tables.messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(
        &self,
        meeting_id: MeetingId,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let tables = self.tables.lock().await;
        let mut messages: Vec<ChatMessage> = tables
            .messages
            .iter()
            .filter(|message| message.meeting_id == meeting_id)
            .cloned()
            .collect();
        messages.sort_by_key(|message| (message.sent_at, message.id));
        Ok(messages)
    }
}
