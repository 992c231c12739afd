//! Conversion logic between domain entities and DTOs.

use parole_shared::time::timestamp_to_rfc3339;

use crate::domain::{
    ChatMessage, FloorRequest, FloorRequestStatus, Meeting, MeetingKind, MeetingStatus, Person,
};
use crate::infrastructure::dto::websocket as dto;

// ========================================
// Wire enumerations
// ========================================

pub fn meeting_kind_to_wire(kind: MeetingKind) -> &'static str {
    match kind {
        MeetingKind::Standard => "STANDARD",
        MeetingKind::Private => "PRIVATE",
        MeetingKind::Democratic => "DEMOCRATIC",
    }
}

/// Parse a meeting kind, accepting the French spellings as aliases.
pub fn meeting_kind_from_wire(value: &str) -> Option<MeetingKind> {
    match value.trim().to_ascii_uppercase().as_str() {
        "STANDARD" => Some(MeetingKind::Standard),
        "PRIVATE" | "PRIVEE" | "PRIVE" => Some(MeetingKind::Private),
        "DEMOCRATIC" | "DEMOCRATIQUE" => Some(MeetingKind::Democratic),
        _ => None,
    }
}

pub fn meeting_status_to_wire(status: MeetingStatus) -> &'static str {
    match status {
        MeetingStatus::Planned => "PLANNED",
        MeetingStatus::Open => "OPEN",
        MeetingStatus::Closed => "CLOSED",
    }
}

pub fn floor_status_to_wire(status: FloorRequestStatus) -> &'static str {
    match status {
        FloorRequestStatus::Pending => "PENDING",
        FloorRequestStatus::Granted => "GRANTED",
        FloorRequestStatus::Denied => "DENIED",
        FloorRequestStatus::Withdrawn => "WITHDRAWN",
    }
}

// ========================================
// Domain Entity → DTO
// ========================================

impl From<&Person> for dto::PersonDto {
    fn from(person: &Person) -> Self {
        Self {
            id: person.id.value(),
            login: person.login.clone(),
            nom: person.last_name.clone(),
            prenom: person.first_name.clone(),
            en_ligne: person.online,
        }
    }
}

impl From<&Meeting> for dto::MeetingDto {
    fn from(meeting: &Meeting) -> Self {
        Self {
            id: meeting.id.value(),
            titre: meeting.title.as_str().to_string(),
            sujet: meeting.subject.clone(),
            agenda: meeting.agenda.clone(),
            debut: timestamp_to_rfc3339(meeting.starts_at.value()),
            duree: meeting.duration_minutes,
            kind: meeting_kind_to_wire(meeting.kind).to_string(),
            statut: meeting_status_to_wire(meeting.status).to_string(),
            id_organisateur: meeting.organizer_id.value(),
            id_animateur: meeting.moderator_id.map(|id| id.value()),
        }
    }
}

impl From<&FloorRequest> for dto::FloorRequestDto {
    fn from(request: &FloorRequest) -> Self {
        Self {
            id: request.id.value(),
            reunion_id: request.meeting_id.value(),
            personne_id: request.requester_id.value(),
            timestamp: timestamp_to_rfc3339(request.requested_at.value()),
            statut: floor_status_to_wire(request.status).to_string(),
        }
    }
}

/// Build the wire form of a message; the author login is resolved by the caller.
pub fn chat_message_dto(message: &ChatMessage, author_login: &str) -> dto::ChatMessageDto {
    dto::ChatMessageDto {
        id: message.id.value(),
        reunion_id: message.meeting_id.value(),
        auteur_id: message.author_id.value(),
        auteur: author_login.to_string(),
        contenu: message.content.as_str().to_string(),
        timestamp: timestamp_to_rfc3339(message.sent_at.value()),
    }
}
