//! Shared infrastructure for the Ausweis authentication flow.
//!
//! This crate provides the error type, logging bootstrap and configuration
//! used across the workspace.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{FlowConfig, SessionMessages};
pub use error::{CoreError, Result};
