//! Real-time events for campaign and agent listeners.
//!
//! Events serialize as `{"type": "...", ...payload}`, which is what the
//! transport layer forwards to browsers as-is.

pub mod broadcaster;
pub mod types;

pub use broadcaster::EventBroadcaster;
pub use types::{ChannelKey, DialerEvent};
