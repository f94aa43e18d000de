//! Inbound message vocabulary
//!
//! Everything the identity service emits, discriminated by the `msg` field.
//! Messages are parsed once at the channel boundary and are immutable
//! afterwards.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Result major code of a successful authentication.
pub const RESULT_MAJOR_OK: &str = "http://www.bsi.bund.de/ecard/api/1.1/resultmajor#ok";
/// Result major code of a failed authentication.
pub const RESULT_MAJOR_ERROR: &str = "http://www.bsi.bund.de/ecard/api/1.1/resultmajor#error";
/// Result minor code reported when the user aborted the workflow.
pub const RESULT_MINOR_CANCELLATION_BY_USER: &str =
    "http://www.bsi.bund.de/ecard/api/1.1/resultminor/sal#cancellationByUser";

/// Workflow name reported in STATUS messages during authentication.
pub const WORKFLOW_AUTH: &str = "AUTH";

/// Message received from the identity service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    AccessRights(AccessRightsMessage),
    ApiLevel(ApiLevelMessage),
    Auth(AuthMessage),
    BadState(ErrorNotice),
    Certificate(CertificateMessage),
    ChangePin(ChangePinMessage),
    EnterCan(ReaderPrompt),
    EnterPin(ReaderPrompt),
    EnterNewPin(ReaderPrompt),
    EnterPuk(ReaderPrompt),
    Info(InfoMessage),
    InsertCard(InsertCardMessage),
    InternalError(ErrorNotice),
    Invalid(ErrorNotice),
    Reader(Reader),
    ReaderList(ReaderListMessage),
    Status(StatusMessage),
    Pause(PauseMessage),
    UnknownCommand(ErrorNotice),
}

impl Message {
    /// Parse raw channel text.
    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(ProtocolError::Malformed)
    }

    /// The `msg` tag of raw channel text, even when the payload does not parse.
    pub fn peek_kind(raw: &str) -> Option<String> {
        #[derive(Deserialize)]
        struct Tag {
            msg: String,
        }

        serde_json::from_str::<Tag>(raw).ok().map(|tag| tag.msg)
    }

    /// Whether a message of this kind has to be acted on for the running
    /// workflow to make progress.
    pub fn is_actionable_kind(kind: &str) -> bool {
        matches!(
            kind,
            "ACCESS_RIGHTS" | "AUTH" | "ENTER_CAN" | "ENTER_PIN" | "ENTER_PUK"
        )
    }

    /// Wire discriminant of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::AccessRights(_) => "ACCESS_RIGHTS",
            Message::ApiLevel(_) => "API_LEVEL",
            Message::Auth(_) => "AUTH",
            Message::BadState(_) => "BAD_STATE",
            Message::Certificate(_) => "CERTIFICATE",
            Message::ChangePin(_) => "CHANGE_PIN",
            Message::EnterCan(_) => "ENTER_CAN",
            Message::EnterPin(_) => "ENTER_PIN",
            Message::EnterNewPin(_) => "ENTER_NEW_PIN",
            Message::EnterPuk(_) => "ENTER_PUK",
            Message::Info(_) => "INFO",
            Message::InsertCard(_) => "INSERT_CARD",
            Message::InternalError(_) => "INTERNAL_ERROR",
            Message::Invalid(_) => "INVALID",
            Message::Reader(_) => "READER",
            Message::ReaderList(_) => "READER_LIST",
            Message::Status(_) => "STATUS",
            Message::Pause(_) => "PAUSE",
            Message::UnknownCommand(_) => "UNKNOWN_COMMAND",
        }
    }
}

/// Requested and effective access rights (CHAT).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    #[serde(default)]
    pub effective: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
    #[serde(default)]
    pub required: Vec<String>,
}

/// Auxiliary data verified alongside the access rights.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuxiliaryData {
    pub age_verification_date: Option<String>,
    pub required_age: Option<String>,
    pub validity_date: Option<String>,
    pub community_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRightsMessage {
    pub error: Option<String>,
    pub chat: Chat,
    pub transaction_info: Option<String>,
    pub aux: Option<AuxiliaryData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiLevelMessage {
    pub error: Option<String>,
    #[serde(default)]
    pub available: Vec<u32>,
    pub current: Option<u32>,
}

/// Final result of an authentication workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResult {
    pub major: String,
    pub minor: Option<String>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub message: Option<String>,
    pub reason: Option<String>,
}

impl AuthResult {
    pub fn is_ok(&self) -> bool {
        self.major == RESULT_MAJOR_OK
    }

    pub fn is_cancelled_by_user(&self) -> bool {
        self.major == RESULT_MAJOR_ERROR
            && self.minor.as_deref() == Some(RESULT_MINOR_CANCELLATION_BY_USER)
    }
}

/// AUTH is emitted once as acknowledgement of RUN_AUTH (no result) and once
/// more when the workflow finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthMessage {
    pub error: Option<String>,
    pub result: Option<AuthResult>,
    pub url: Option<String>,
}

/// Protocol error notice (BAD_STATE, INTERNAL_ERROR, INVALID, UNKNOWN_COMMAND).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateDescription {
    pub issuer_name: String,
    pub issuer_url: Option<String>,
    pub subject_name: String,
    pub subject_url: Option<String>,
    pub terms_of_usage: Option<String>,
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateValidity {
    pub effective_date: String,
    pub expiration_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateMessage {
    pub description: CertificateDescription,
    pub validity: CertificateValidity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePinMessage {
    pub success: bool,
    pub reason: Option<String>,
}

/// Card state as reported inside a reader.
///
/// An empty object means a card is present but could not be identified.
/// The retry counter is taken as any integer; range checks belong to the
/// consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub inoperative: Option<bool>,
    pub deactivated: Option<bool>,
    pub retry_counter: Option<i64>,
    /// Keys this vocabulary does not model
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Card {
    /// Whether the service reported anything about the card.
    pub fn is_known(&self) -> bool {
        self.inoperative.is_some()
            || self.deactivated.is_some()
            || self.retry_counter.is_some()
            || !self.extra.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reader {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub insertable: bool,
    #[serde(default)]
    pub attached: bool,
    #[serde(default)]
    pub keypad: bool,
    pub card: Option<Card>,
}

impl Reader {
    /// A usable card is attached; unknown cards (`{}`) do not count.
    pub fn has_known_card(&self) -> bool {
        self.card.as_ref().is_some_and(Card::is_known)
    }
}

/// Payload of ENTER_PIN, ENTER_CAN, ENTER_PUK and ENTER_NEW_PIN.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderPrompt {
    pub error: Option<String>,
    #[serde(default)]
    pub reader: Reader,
}

impl ReaderPrompt {
    pub fn retry_counter(&self) -> Option<i64> {
        self.reader.card.as_ref().and_then(|card| card.retry_counter)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Implementation-Title")]
    pub implementation_title: Option<String>,
    #[serde(rename = "Implementation-Vendor")]
    pub implementation_vendor: Option<String>,
    #[serde(rename = "Implementation-Version")]
    pub implementation_version: Option<String>,
    #[serde(rename = "Specification-Title")]
    pub specification_title: Option<String>,
    #[serde(rename = "Specification-Vendor")]
    pub specification_vendor: Option<String>,
    #[serde(rename = "Specification-Version")]
    pub specification_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoMessage {
    #[serde(rename = "VersionInfo")]
    pub version_info: VersionInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertCardMessage {
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderListMessage {
    #[serde(default)]
    pub readers: Vec<Reader>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub workflow: Option<String>,
    pub progress: Option<f64>,
    pub state: Option<String>,
}

impl StatusMessage {
    /// Progress of the authentication workflow in percent, if this status
    /// reports one. Out-of-range values are clamped to 0..=100.
    pub fn auth_progress(&self) -> Option<u8> {
        match self.workflow.as_deref() {
            Some(WORKFLOW_AUTH) => self
                .progress
                .filter(|progress| progress.is_finite())
                .map(|progress| progress.clamp(0.0, 100.0).round() as u8),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseMessage {
    pub cause: String,
}
