//! Error types for the authentication flow.
//!
//! Two families live here. [`ErrorDetails`] is the terminal artifact of a
//! failed ceremony and is only ever handed to the delegate's `on_error`.
//! [`FlowError`] reports misuse of the controller API itself (starting twice,
//! cancelling an idle flow) and is returned directly to the caller.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Why a flow terminated without success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    /// `cancel()` was called locally
    Cancelled,
    /// The user aborted in the identity service, or declined access rights
    UserCancelled,
    /// The card needs CAN or PUK unlocking first
    CardLocked,
    /// The channel to the identity service could not be brought up
    SdkInitializationFailed,
    /// Anything else
    Unknown,
}

impl ErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::Cancelled => "cancelled",
            ErrorReason::UserCancelled => "user_cancelled",
            ErrorReason::CardLocked => "card_locked",
            ErrorReason::SdkInitializationFailed => "sdk_initialization_failed",
            ErrorReason::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of an authentication flow.
#[derive(Debug, Clone)]
pub struct ErrorDetails {
    pub reason: ErrorReason,
    pub message: String,
    pub cause: Option<Arc<anyhow::Error>>,
}

impl ErrorDetails {
    pub fn new(reason: ErrorReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            cause: None,
        }
    }

    /// Attach the underlying error.
    pub fn with_cause(mut self, cause: impl Into<anyhow::Error>) -> Self {
        self.cause = Some(Arc::new(cause.into()));
        self
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.message)
    }
}

impl std::error::Error for ErrorDetails {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|cause| {
            let source: &(dyn std::error::Error + 'static) = cause.as_ref();
            source
        })
    }
}

/// Errors returned by the controller API.
#[derive(Debug, Error)]
pub enum FlowError {
    /// `start` called while a flow is active
    #[error("Auth flow already in progress. Only one auth flow can be active")]
    AlreadyInProgress,

    /// `cancel` called without an active flow
    #[error("Auth flow not in progress")]
    NotInProgress,

    /// `start` called outside of a tokio runtime
    #[error("No async runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Result type for controller operations.
pub type FlowResult<T> = Result<T, FlowError>;
