//! Caller-supplied hooks of an authentication flow.

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::access_rights::{AccessRightsDecision, AccessRightsRequest};
use crate::error::ErrorDetails;
use crate::pin::PinChallenge;

/// Receives the flow's questions and notifications.
///
/// `enter_pin` and `request_access_rights` may take as long as they like;
/// the controller awaits each call exactly once, and abandons it if the flow
/// is cancelled in the meantime. Returning an error from either terminates
/// the flow with reason `unknown`.
///
/// Exactly one of `on_success` / `on_error` is called per `start`.
#[async_trait]
pub trait AuthFlowDelegate: Send + Sync {
    /// Supply the card PIN. Called again after every wrong attempt.
    async fn enter_pin(&self, challenge: PinChallenge) -> anyhow::Result<Zeroizing<String>>;

    /// Decide on the requested access rights. Accepts the effective rights
    /// unless overridden.
    async fn request_access_rights(
        &self,
        _request: AccessRightsRequest,
    ) -> anyhow::Result<AccessRightsDecision> {
        Ok(AccessRightsDecision::AcceptEffective)
    }

    fn on_card_attached_changed(&self, _attached: bool) {}

    /// Progress of the authentication workflow, 0 to 100.
    fn on_status_progress(&self, _progress: u8) {}

    /// The card should be placed on the reader.
    fn on_attach_card(&self) {}

    fn on_success(&self, refresh_url: String);

    fn on_error(&self, details: ErrorDetails);
}
