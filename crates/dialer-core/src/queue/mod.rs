//! Wait queue for answered calls awaiting the campaign's agent.

pub mod manager;

pub use manager::{CallQueueManager, QueueKey, QueueStats, QueuedCall};

use serde::{Deserialize, Serialize};

/// What the transport layer needs to park a call that just joined the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueInstructions {
    /// Provider-side queue name
    pub queue_name: String,
    /// Looping hold signal played while waiting
    pub hold_music_url: String,
    /// 1-based position at join time
    pub position: usize,
}
