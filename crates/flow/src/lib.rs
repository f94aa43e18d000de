//! eID authentication flow against a local identity service.
//!
//! The identity service (an AusweisApp-style SDK) runs the cryptographic
//! protocol with the card and the relying party. This crate sequences it: it
//! starts the workflow, answers access-rights and PIN requests through a
//! caller-supplied [`AuthFlowDelegate`], and reduces every way the ceremony
//! can end to exactly one `on_success` or `on_error`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ausweis_core::FlowConfig;
//! use ausweis_flow::{AuthFlow, AuthFlowDelegate, ErrorDetails, MemoryChannel, PinChallenge};
//! use zeroize::Zeroizing;
//!
//! struct Terminal;
//!
//! #[async_trait::async_trait]
//! impl AuthFlowDelegate for Terminal {
//!     async fn enter_pin(&self, _challenge: PinChallenge) -> anyhow::Result<Zeroizing<String>> {
//!         Ok(Zeroizing::new("123456".to_string()))
//!     }
//!     fn on_success(&self, refresh_url: String) {
//!         println!("redirect to {refresh_url}");
//!     }
//!     fn on_error(&self, details: ErrorDetails) {
//!         eprintln!("{details}");
//!     }
//! }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let flow = AuthFlow::new(Arc::new(MemoryChannel::new()), Arc::new(Terminal), FlowConfig::default());
//! flow.start("https://test.governikus-eid.de/AusweisAuskunft/WebServiceRequesterServlet")?;
//! # Ok(())
//! # }
//! ```

pub mod access_rights;
pub mod channel;
pub mod controller;
pub mod delegate;
pub mod error;
pub mod outcome;
pub mod pin;
pub mod session;

pub use access_rights::{AccessRightsDecision, AccessRightsRequest};
pub use channel::{ChannelAdapter, ChannelError, MemoryChannel};
pub use controller::AuthFlow;
pub use delegate::AuthFlowDelegate;
pub use error::{ErrorDetails, ErrorReason, FlowError, FlowResult};
pub use outcome::AuthOutcome;
pub use pin::{PinChallenge, MAX_RETRY_COUNTER};
pub use session::FlowState;
