//! # Error Handling for the Dialer Core
//!
//! Errors are split along the propagation policy of the dialer:
//!
//! - **Per-call problems** (a busy line, a rejected number, a stale callback)
//!   never surface here. They are absorbed by the orchestrator and show up
//!   only as a terminal session status and a broadcast event.
//! - **Campaign-level problems** (unknown campaign, wrong lifecycle state,
//!   invalid input) are returned to the caller as [`DialerError`].
//! - **Systemic gateway failures** (the provider cannot be reached, the
//!   credentials are refused) are returned as [`DialerError::Gateway`] and
//!   end the affected campaign.
//!
//! ```rust
//! use dialer_core::error::{DialerError, Result};
//!
//! fn check_batch(count: usize) -> Result<usize> {
//!     if count == 0 {
//!         return Err(DialerError::validation("batch size must be greater than 0"));
//!     }
//!     Ok(count)
//! }
//!
//! assert!(check_batch(0).is_err());
//! ```

use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors surfaced by dialer operations
#[derive(Error, Debug)]
pub enum DialerError {
    /// The telephony gateway failed in a way that affects the whole campaign
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Campaign error: {0}")]
    Campaign(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The operation is not valid for the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for DialerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl DialerError {
    pub fn campaign<S: Into<String>>(msg: S) -> Self {
        Self::Campaign(msg.into())
    }

    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn already_exists<S: Into<String>>(msg: S) -> Self {
        Self::AlreadyExists(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether this error means the campaign cannot continue
    pub fn is_fatal_for_campaign(&self) -> bool {
        match self {
            DialerError::Gateway(e) => e.is_systemic(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DialerError>;
