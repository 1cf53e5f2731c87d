use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::types::{ChannelKey, DialerEvent};
use crate::types::{AgentId, CampaignId};

/// Fan-out of [`DialerEvent`]s to campaign and agent listeners.
///
/// Delivery is best effort: an event published while nobody listens on a
/// key is dropped, and nothing is replayed to late subscribers.
#[derive(Debug)]
pub struct EventBroadcaster {
    channels: DashMap<ChannelKey, broadcast::Sender<DialerEvent>>,
    capacity: usize,
    /// Number of events published (for monitoring)
    event_count: AtomicU64,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
            event_count: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self, key: ChannelKey) -> broadcast::Receiver<DialerEvent> {
        let receiver = self
            .channels
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        debug!("New listener on {:?}", key);
        receiver
    }

    pub fn subscribe_campaign(&self, campaign_id: &CampaignId) -> broadcast::Receiver<DialerEvent> {
        self.subscribe(ChannelKey::Campaign(campaign_id.clone()))
    }

    pub fn subscribe_agent(&self, agent_id: &AgentId) -> broadcast::Receiver<DialerEvent> {
        self.subscribe(ChannelKey::Agent(agent_id.clone()))
    }

    /// Deliver to the listeners of `key`.
    ///
    /// Returns the number of listeners that received the event. A channel
    /// whose listeners have all gone is dropped here.
    pub fn publish(&self, key: &ChannelKey, event: DialerEvent) -> usize {
        self.event_count.fetch_add(1, Ordering::Relaxed);
        let Some(sender) = self.channels.get(key).map(|s| s.clone()) else {
            trace!("No listeners on {:?} for {}", key, event.kind());
            return 0;
        };

        match sender.send(event) {
            Ok(delivered) => delivered,
            Err(_) => {
                self.channels.remove_if(key, |_, s| s.receiver_count() == 0);
                debug!("Dropped idle channel {:?}", key);
                0
            }
        }
    }

    /// Publish a campaign event to the campaign and to its agent
    pub fn publish_campaign(&self, campaign_id: &CampaignId, agent_id: &AgentId, event: DialerEvent) -> usize {
        let to_campaign = self.publish(&ChannelKey::Campaign(campaign_id.clone()), event.clone());
        to_campaign + self.publish(&ChannelKey::Agent(agent_id.clone()), event)
    }

    /// Drop the channel for `key`. Its listeners receive whatever is still
    /// buffered and then see the channel closed.
    pub fn close(&self, key: &ChannelKey) -> bool {
        let closed = self.channels.remove(key).is_some();
        if closed {
            debug!("Closed channel {:?}", key);
        }
        closed
    }

    pub fn listener_count(&self, key: &ChannelKey) -> usize {
        self.channels.get(key).map_or(0, |s| s.receiver_count())
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Get the total number of events published
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::Relaxed)
    }
}
