//! Domain layer: entities, value objects, and the interfaces the use cases depend on.
//!
//! Infrastructure implements the traits declared here (`RecordStore`, `MessagePusher`);
//! the connection registry and the per-meeting floor queue are pure in-process state
//! and live here as well.

pub mod entity;
pub mod error;
pub mod floor;
pub mod message_pusher;
pub mod registry;
pub mod repository;
pub mod value_object;

pub use entity::{
    ChatMessage, Connection, FloorRequest, FloorRequestStatus, Identity, Meeting, MeetingKind,
    MeetingStatus, NewChatMessage, NewMeeting, NewPerson, Person,
};
pub use error::{
    FloorError, MeetingError, MessagePushError, RegistryError, RepositoryError, ValueObjectError,
};
pub use floor::FloorQueue;
pub use message_pusher::{MessagePusher, PusherChannel};
#[cfg(test)]
pub use message_pusher::MockMessagePusher;
pub use registry::ConnectionRegistry;
pub use repository::RecordStore;
#[cfg(test)]
pub use repository::MockRecordStore;
pub use value_object::{
    ConnectionId, FloorRequestId, MeetingId, MeetingTitle, MessageContent, MessageId, PersonId,
    Timestamp,
};
