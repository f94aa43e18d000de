//! Classification of the terminal AUTH message.

use ausweis_protocol::AuthMessage;

use crate::error::{ErrorDetails, ErrorReason};

/// How an authentication ended, as reported by the identity service.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    Success { refresh_url: String },
    Failure(ErrorDetails),
}

impl AuthOutcome {
    /// `None` for the acknowledgement AUTH that carries no result.
    pub fn from_message(message: &AuthMessage) -> Option<Self> {
        let result = message.result.as_ref()?;

        if result.is_ok() {
            return Some(match &message.url {
                Some(url) => AuthOutcome::Success {
                    refresh_url: url.clone(),
                },
                None => AuthOutcome::Failure(ErrorDetails::new(
                    ErrorReason::Unknown,
                    "Missing 'url' parameter in successful 'AUTH' message.",
                )),
            });
        }

        if result.is_cancelled_by_user() {
            return Some(AuthOutcome::Failure(ErrorDetails::new(
                ErrorReason::UserCancelled,
                result.message.as_deref().unwrap_or("User cancelled"),
            )));
        }

        let detail = result
            .message
            .as_deref()
            .or(result.description.as_deref())
            .or(result.minor.as_deref())
            .unwrap_or(result.major.as_str());
        Some(AuthOutcome::Failure(ErrorDetails::new(
            ErrorReason::Unknown,
            format!("Unknown error occurred in auth flow. {}", detail),
        )))
    }
}
