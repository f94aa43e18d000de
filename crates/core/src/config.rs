//! Configuration management for the authentication flow.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{CoreError, Result};

/// Top-level flow configuration, usually loaded from a TOML file.
///
/// ```toml
/// debug = true
/// developer_mode = false
/// negotiation_timeout_ms = 120000
///
/// [session_messages]
/// session_started = "Hold your ID card to the back of the device."
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Log every sent command and received message verbatim.
    pub debug: bool,
    /// Ask the identity service to accept test certificates.
    pub developer_mode: bool,
    /// Upper bound for a single PIN or access-rights request. `None` waits forever.
    pub negotiation_timeout_ms: Option<u64>,
    /// Status texts shown by the platform NFC sheet during the card session.
    pub session_messages: SessionMessages,
}

/// Human-readable texts passed along with the start-authentication command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionMessages {
    pub session_started: String,
    pub session_failed: String,
    pub session_succeeded: String,
    pub session_in_progress: String,
}

impl Default for SessionMessages {
    fn default() -> Self {
        Self {
            session_started: "Please place your ID card on the top of the device's back side."
                .to_string(),
            session_failed: "Scanning process failed.".to_string(),
            session_succeeded: "Scanning process has been finished successfully.".to_string(),
            session_in_progress: "Scanning process is in progress.".to_string(),
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            debug: false,
            developer_mode: false,
            negotiation_timeout_ms: None,
            session_messages: SessionMessages::default(),
        }
    }
}

impl FlowConfig {
    /// Load and validate a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "Loaded flow configuration");
        Ok(config)
    }

    /// Parse and validate TOML text. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: FlowConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.negotiation_timeout_ms == Some(0) {
            return Err(CoreError::InvalidConfig(
                "negotiation_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn negotiation_timeout(&self) -> Option<Duration> {
        self.negotiation_timeout_ms.map(Duration::from_millis)
    }
}
