//! Access-rights negotiation.
//!
//! Turns the relying party's CHAT request plus the delegate's decision into
//! the commands to send, or into a terminal error.

use ausweis_protocol::{AccessRightsMessage, Command};
use std::collections::HashSet;

use crate::error::{ErrorDetails, ErrorReason};

/// Delegate's answer to an access-rights request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessRightsDecision {
    /// Grant the effective rights as offered
    AcceptEffective,
    /// Refuse; the flow ends with `user_cancelled`
    Decline,
    /// Grant exactly these rights; must include every required right
    Accept(Vec<String>),
}

/// Derived view of an ACCESS_RIGHTS message. Right lists have set semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRightsRequest {
    pub effective: Vec<String>,
    pub required: Vec<String>,
    pub optional: Vec<String>,
    pub transaction_info: Option<String>,
}

impl From<&AccessRightsMessage> for AccessRightsRequest {
    fn from(message: &AccessRightsMessage) -> Self {
        Self {
            effective: message.chat.effective.clone(),
            required: message.chat.required.clone(),
            optional: message.chat.optional.clone(),
            transaction_info: message.transaction_info.clone(),
        }
    }
}

impl AccessRightsRequest {
    /// Required rights absent from `accepted`, in request order.
    pub fn missing_required(&self, accepted: &[String]) -> Vec<String> {
        let accepted: HashSet<&str> = accepted.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        self.required
            .iter()
            .filter(|right| !accepted.contains(right.as_str()))
            .filter(|right| seen.insert(right.as_str()))
            .cloned()
            .collect()
    }

    /// Commands answering this request, in send order.
    pub fn resolve(&self, decision: AccessRightsDecision) -> Result<Vec<Command>, ErrorDetails> {
        match decision {
            AccessRightsDecision::AcceptEffective => Ok(vec![Command::Accept]),
            AccessRightsDecision::Decline => Err(ErrorDetails::new(
                ErrorReason::UserCancelled,
                "Access rights were declined",
            )),
            AccessRightsDecision::Accept(accepted) => {
                let missing = self.missing_required(&accepted);
                if !missing.is_empty() {
                    return Err(ErrorDetails::new(
                        ErrorReason::UserCancelled,
                        format!(
                            "Not all required access rights were accepted. Missing {}, accepted are {}",
                            missing.join(", "),
                            accepted.join(", ")
                        ),
                    ));
                }

                let mut seen = HashSet::new();
                let chat = accepted
                    .into_iter()
                    .filter(|right| seen.insert(right.clone()))
                    .collect();
                Ok(vec![Command::SetAccessRights { chat }, Command::Accept])
            }
        }
    }
}
