//! Record Store trait 定義
//!
//! 人物・会議・参加・認可・発言要求・メッセージの永続化に対するインターフェース。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。
//!
//! ## 契約
//!
//! - 書き込みは単一レコード単位で、同じインスタンスの次の読み取りから即座に見える
//! - `add_participation` / `add_authorization` は冪等（既存のペアでも成功を返す）
//! - `transition_meeting_status` は compare-and-set（現在の状態が一致するときだけ書き込む）
//! - `save_floor_request` は単調な upsert（決着済みの要求を PENDING で上書きしない）
//! - メッセージの送信時刻と ID はストアが挿入時に採番する

use async_trait::async_trait;

use super::{
    ChatMessage, FloorRequest, Meeting, MeetingId, MeetingStatus, NewChatMessage, NewMeeting,
    NewPerson, Person, PersonId, RepositoryError,
};

/// Record Store trait
///
/// UseCase 層はこの trait に依存し、Infrastructure 層の具体的な実装には依存しない。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 人物を登録（ログイン名が重複する場合は `Duplicate`）
    async fn insert_person(&self, person: NewPerson) -> Result<Person, RepositoryError>;

    /// 資格情報を照合し、一致した人物を返す
    async fn verify_credentials(
        &self,
        login: &str,
        password: &str,
    ) -> Result<Option<Person>, RepositoryError>;

    /// ID で人物を取得
    async fn find_person(&self, id: PersonId) -> Result<Option<Person>, RepositoryError>;

    /// ログイン名で人物を取得
    async fn find_person_by_login(&self, login: &str) -> Result<Option<Person>, RepositoryError>;

    /// オンライン状態を更新
    async fn set_online(&self, id: PersonId, online: bool) -> Result<(), RepositoryError>;

    /// 会議を PLANNED で登録（タイトルが重複する場合は `Duplicate`）
    async fn insert_meeting(&self, meeting: NewMeeting) -> Result<Meeting, RepositoryError>;

    /// ID で会議を取得
    async fn find_meeting(&self, id: MeetingId) -> Result<Option<Meeting>, RepositoryError>;

    /// 全ての会議を ID 順に取得
    async fn list_meetings(&self) -> Result<Vec<Meeting>, RepositoryError>;

    /// 会議の状態を `from` から `to` へ更新する（compare-and-set）
    ///
    /// 現在の状態が `from` のときだけ書き込み `true` を返す。異なれば何もせず `false`。
    async fn transition_meeting_status(
        &self,
        id: MeetingId,
        from: MeetingStatus,
        to: MeetingStatus,
    ) -> Result<bool, RepositoryError>;

    /// 参加を登録（冪等）
    async fn add_participation(
        &self,
        person_id: PersonId,
        meeting_id: MeetingId,
    ) -> Result<(), RepositoryError>;

    /// 参加を削除。削除したら `true`
    async fn remove_participation(
        &self,
        person_id: PersonId,
        meeting_id: MeetingId,
    ) -> Result<bool, RepositoryError>;

    /// 参加しているか
    async fn is_participant(
        &self,
        person_id: PersonId,
        meeting_id: MeetingId,
    ) -> Result<bool, RepositoryError>;

    /// 会議の参加者 ID を昇順で取得
    async fn list_participants(
        &self,
        meeting_id: MeetingId,
    ) -> Result<Vec<PersonId>, RepositoryError>;

    /// 非公開会議への認可を登録（冪等）
    async fn add_authorization(
        &self,
        person_id: PersonId,
        meeting_id: MeetingId,
    ) -> Result<(), RepositoryError>;

    /// 認可されているか
    async fn is_authorized(
        &self,
        person_id: PersonId,
        meeting_id: MeetingId,
    ) -> Result<bool, RepositoryError>;

    /// 発言要求を保存（単調な upsert）
    async fn save_floor_request(&self, request: FloorRequest) -> Result<(), RepositoryError>;

    /// メッセージを登録し、ID と送信時刻が採番されたメッセージを返す
    async fn insert_message(&self, message: NewChatMessage)
    -> Result<ChatMessage, RepositoryError>;

    /// 会議のメッセージ履歴を送信時刻の昇順で取得
    async fn list_messages(
        &self,
        meeting_id: MeetingId,
    ) -> Result<Vec<ChatMessage>, RepositoryError>;
}
