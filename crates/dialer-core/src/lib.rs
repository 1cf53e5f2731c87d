//! # Outbound Campaign Dialer
//!
//! This crate drives outbound calling campaigns for a single agent: it dials
//! batches of contacts through a telephony provider, holds answered calls in
//! a wait queue while answering-machine detection runs, drops calls answered
//! by voicemail, and puts live humans through to the agent one at a time.
//!
//! ## Features
//!
//! - **Campaign Lifecycle**: create, start, batch dial, end, removal, dispositions
//! - **Contact Pools**: atomic claiming with a wrapping cursor, shareable across campaigns
//! - **Call Sessions**: guarded status transitions that tolerate late and duplicate callbacks
//! - **Wait Queue**: FIFO per campaign or global, with hold-music instructions
//! - **Detection Routing**: HUMAN connects, MACHINE rejects, UNKNOWN per policy
//! - **Live Events**: per-campaign and per-agent broadcast channels
//!
//! ## Architecture
//!
//! - [`orchestrator`]: the [`DialerEngine`] tying everything together
//! - [`campaign`]: campaign state, agent slot and snapshots
//! - [`contacts`]: contact normalisation and the shared dial ledger
//! - [`session`]: per-call state machine and the session store
//! - [`queue`]: wait queues for answered calls
//! - [`gateway`]: the provider interface and an in-memory loopback gateway
//! - [`events`]: event types and the broadcaster
//! - [`config`] and [`logging`]: ambient setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dialer_core::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let gateway = Arc::new(LoopbackGateway::new());
//!     let engine = DialerEngine::new(DialerConfig::default(), gateway)?;
//!
//!     let campaign = engine.create_campaign(
//!         AgentId::from("agent-alice"),
//!         ["+15550000001", "+15550000002", "+15550000003"],
//!     )?;
//!     let mut events = engine.subscribe(&campaign)?;
//!
//!     let sessions = engine.start_campaign(&campaign).await?;
//!     println!("dialing {} contacts", sessions.len());
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("{} for {}", event.kind(), event.campaign_id());
//!     }
//!     Ok(())
//! }
//! ```

// Core modules
pub mod error;
pub mod config;
pub mod logging;
pub mod types;

// Dialing domain
pub mod campaign;
pub mod contacts;
pub mod session;
pub mod queue;
pub mod orchestrator;

// External interfaces
pub mod gateway;
pub mod events;

// Re-exports for convenience
pub use config::DialerConfig;
pub use error::{DialerError, Result};
pub use orchestrator::DialerEngine;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::campaign::{CampaignSnapshot, ContactStatus, DialerStats, Disposition};
    pub use crate::config::{
        AgentConnection, ConnectPolicy, DialerConfig, QueueScope, UnknownOutcomePolicy,
    };
    pub use crate::contacts::{normalize_phone, ContactList, ContactPool, ContactSource};
    pub use crate::error::{DialerError, Result};
    pub use crate::events::{ChannelKey, DialerEvent, EventBroadcaster};
    pub use crate::gateway::{
        CallbackKind, DialAck, DialRequest, GatewayClient, GatewayError, LoopbackGateway,
        ProviderCallStatus, ProviderCallback,
    };
    pub use crate::orchestrator::DialerEngine;
    pub use crate::queue::{QueueInstructions, QueuedCall};
    pub use crate::session::CallSession;
    pub use crate::types::{
        AgentId, CallId, CallStatus, CampaignId, CampaignState, DetectionOutcome, PhoneNumber,
        SessionId, TerminationReason,
    };
}
