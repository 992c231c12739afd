//! WebSocket message DTOs.
//!
//! Field names follow the wire protocol (`modele`, `actionOriginale`, `reunionId`, ...).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Domain tags carried in `modele`.
pub mod modele {
    pub const AUTHENTIFICATION: &str = "authentification";
    pub const REUNION: &str = "reunion";
    pub const CHAT: &str = "chat";
}

/// Inbound request envelope: domain tag, action tag, and a free-form payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub modele: String,
    pub action: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// Terminal status of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statut {
    Succes,
    Echec,
}

/// Direct reply to the originating connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub modele: String,
    #[serde(rename = "actionOriginale")]
    pub action_originale: String,
    pub statut: Statut,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error class code, present on `echec`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub erreur: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl ResponseEnvelope {
    pub fn success(modele: &str, action: &str, payload: Map<String, Value>) -> Self {
        Self {
            modele: modele.to_string(),
            action_originale: action.to_string(),
            statut: Statut::Succes,
            message: None,
            erreur: None,
            payload,
        }
    }

    pub fn failure(modele: &str, action: &str, code: &str, message: String) -> Self {
        Self {
            modele: modele.to_string(),
            action_originale: action.to_string(),
            statut: Statut::Echec,
            message: Some(message),
            erreur: Some(code.to_string()),
            payload: Map::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.statut == Statut::Succes
    }
}

/// Server-initiated event, delivered to one or many connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    Welcome {
        connection_id: String,
        timestamp: String,
    },
    #[serde(rename_all = "camelCase")]
    NewMessage {
        reunion_id: u64,
        message_id: u64,
        /// Login of the author
        sender: String,
        sender_id: u64,
        sender_name: String,
        content: String,
        timestamp: String,
    },
    #[serde(rename_all = "camelCase")]
    FloorGranted {
        reunion_id: u64,
        demande_id: u64,
        person_id: u64,
        login: String,
        display_name: String,
        decided_by: u64,
        timestamp: String,
    },
    #[serde(rename_all = "camelCase")]
    FloorDenied {
        reunion_id: u64,
        demande_id: u64,
        person_id: u64,
        login: String,
        display_name: String,
        decided_by: u64,
        timestamp: String,
    },
    Error {
        message: String,
    },
}

/// Person record as exposed on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonDto {
    pub id: u64,
    pub login: String,
    pub nom: String,
    pub prenom: String,
    pub en_ligne: bool,
}

/// Meeting record as exposed on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingDto {
    pub id: u64,
    pub titre: String,
    pub sujet: String,
    pub agenda: String,
    /// RFC 3339
    pub debut: String,
    /// Minutes
    pub duree: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub statut: String,
    pub id_organisateur: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_animateur: Option<u64>,
}

/// Persisted chat message as exposed on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageDto {
    pub id: u64,
    pub reunion_id: u64,
    pub auteur_id: u64,
    pub auteur: String,
    pub contenu: String,
    /// RFC 3339, assigned by the record store
    pub timestamp: String,
}

/// Floor request as exposed on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloorRequestDto {
    pub id: u64,
    pub reunion_id: u64,
    pub personne_id: u64,
    pub timestamp: String,
    pub statut: String,
}
