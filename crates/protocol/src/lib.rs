//! Command and message vocabulary of the local eID identity service.
//!
//! The identity service is driven exclusively through JSON text frames:
//! commands go out tagged with `cmd`, messages come back tagged with `msg`.
//! Both sides are modelled as closed sum types so that every new message kind
//! has to be handled explicitly where it is matched.

pub mod command;
pub mod error;
pub mod message;

pub use command::{Command, Simulator, SimulatorFile, SimulatorKey, WorkflowMessages, REDACTED};
pub use error::ProtocolError;
pub use message::{
    AccessRightsMessage, AuthMessage, AuthResult, Card, Chat, Message, Reader, ReaderPrompt,
    StatusMessage, RESULT_MAJOR_ERROR, RESULT_MAJOR_OK, RESULT_MINOR_CANCELLATION_BY_USER,
    WORKFLOW_AUTH,
};
