//! Outbound command vocabulary
//!
//! Every command the identity service understands, encoded as a JSON object
//! discriminated by its `cmd` field.

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};

/// Placeholder written in place of secrets when a command is logged.
pub const REDACTED: &str = "<redacted>";

/// Status texts shown by the platform NFC dialog during a card session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMessages {
    /// Shown when the card session starts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_started: Option<String>,
    /// Shown when the card session fails
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_failed: Option<String>,
    /// Shown when the card session finishes successfully
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_succeeded: Option<String>,
    /// Shown while the card is being read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_in_progress: Option<String>,
}

/// Elementary file of a simulated card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorFile {
    /// File identifier (hex)
    pub file_id: String,
    /// Short file identifier (hex)
    pub short_file_id: String,
    /// File content (hex)
    pub content: String,
}

/// Key of a simulated card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorKey {
    /// Key reference
    pub id: u32,
    /// Key content (hex)
    pub content: String,
}

/// Content of a simulated card for `SET_CARD`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Simulator {
    /// Card files
    pub files: Vec<SimulatorFile>,
    /// Card keys
    pub keys: Vec<SimulatorKey>,
}

/// Command sent to the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Query installation information
    GetInfo,
    /// Query current workflow and state
    GetStatus,
    /// Query available and current API level
    GetApiLevel,
    /// Select the API level of the application
    SetApiLevel {
        /// Requested level
        level: u32,
    },
    /// Query a single reader
    GetReader {
        /// Reader name
        name: String,
    },
    /// Query all connected readers
    GetReaderList,
    /// Start an authentication
    #[serde(rename_all = "camelCase")]
    RunAuth {
        /// Relying-party TC token endpoint
        #[serde(rename = "tcTokenURL")]
        tc_token_url: String,
        /// Accept test certificates
        #[serde(skip_serializing_if = "Option::is_none")]
        developer_mode: Option<bool>,
        /// Let the application handle system dialog interrupts (iOS)
        #[serde(skip_serializing_if = "Option::is_none")]
        handle_interrupt: Option<bool>,
        /// Emit STATUS messages
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<bool>,
        /// NFC dialog texts
        #[serde(skip_serializing_if = "Option::is_none")]
        messages: Option<WorkflowMessages>,
    },
    /// Start a change-PIN workflow
    #[serde(rename_all = "camelCase")]
    RunChangePin {
        /// Let the application handle system dialog interrupts (iOS)
        #[serde(skip_serializing_if = "Option::is_none")]
        handle_interrupt: Option<bool>,
        /// Emit STATUS messages
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<bool>,
        /// NFC dialog texts
        #[serde(skip_serializing_if = "Option::is_none")]
        messages: Option<WorkflowMessages>,
    },
    /// Re-request the ACCESS_RIGHTS message
    GetAccessRights,
    /// Narrow the effective access rights
    SetAccessRights {
        /// Accepted right identifiers
        chat: Vec<String>,
    },
    /// Insert a virtual card
    SetCard {
        /// Reader name
        name: String,
        /// Simulated card content
        #[serde(skip_serializing_if = "Option::is_none")]
        simulator: Option<Simulator>,
    },
    /// Continue after PAUSE
    Continue,
    /// Query the relying party certificate
    GetCertificate,
    /// Abort the running workflow
    Cancel,
    /// Accept the current state (access rights)
    Accept,
    /// Interrupt the system dialog (iOS)
    Interrupt,
    /// Provide the card PIN; omitted for simulator cards
    SetPin {
        /// PIN digits
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    /// Provide a new PIN during change-PIN
    SetNewPin {
        /// New PIN digits
        value: String,
    },
    /// Provide the card access number
    SetCan {
        /// CAN digits
        value: String,
    },
    /// Provide the PIN unblocking key
    SetPuk {
        /// PUK digits
        value: String,
    },
}

impl Command {
    /// Wire verb of this command.
    pub fn name(&self) -> &'static str {
        match self {
            Command::GetInfo => "GET_INFO",
            Command::GetStatus => "GET_STATUS",
            Command::GetApiLevel => "GET_API_LEVEL",
            Command::SetApiLevel { .. } => "SET_API_LEVEL",
            Command::GetReader { .. } => "GET_READER",
            Command::GetReaderList => "GET_READER_LIST",
            Command::RunAuth { .. } => "RUN_AUTH",
            Command::RunChangePin { .. } => "RUN_CHANGE_PIN",
            Command::GetAccessRights => "GET_ACCESS_RIGHTS",
            Command::SetAccessRights { .. } => "SET_ACCESS_RIGHTS",
            Command::SetCard { .. } => "SET_CARD",
            Command::Continue => "CONTINUE",
            Command::GetCertificate => "GET_CERTIFICATE",
            Command::Cancel => "CANCEL",
            Command::Accept => "ACCEPT",
            Command::Interrupt => "INTERRUPT",
            Command::SetPin { .. } => "SET_PIN",
            Command::SetNewPin { .. } => "SET_NEW_PIN",
            Command::SetCan { .. } => "SET_CAN",
            Command::SetPuk { .. } => "SET_PUK",
        }
    }

    /// Encode as the JSON text expected by the channel.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Whether the command carries a PIN, CAN or PUK.
    pub fn carries_secret(&self) -> bool {
        matches!(
            self,
            Command::SetPin { value: Some(_) }
                | Command::SetNewPin { .. }
                | Command::SetCan { .. }
                | Command::SetPuk { .. }
        )
    }

    /// Copy of this command with secret values masked.
    pub fn redacted(&self) -> Command {
        match self {
            Command::SetPin { value: Some(_) } => Command::SetPin {
                value: Some(REDACTED.to_string()),
            },
            Command::SetNewPin { .. } => Command::SetNewPin {
                value: REDACTED.to_string(),
            },
            Command::SetCan { .. } => Command::SetCan {
                value: REDACTED.to_string(),
            },
            Command::SetPuk { .. } => Command::SetPuk {
                value: REDACTED.to_string(),
            },
            other => other.clone(),
        }
    }
}
