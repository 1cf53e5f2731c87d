//! In-memory gateway that accepts every command and remembers it.
//!
//! Used by the integration tests and the simulation example. Failures can be
//! scripted per phone number or for the whole gateway, and dial
//! acknowledgements can be held back to reproduce acks racing other events.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::debug;

use super::{DialAck, DialRequest, GatewayClient, GatewayError};
use crate::types::{AgentId, CallId, PhoneNumber};

/// A command received by the loopback gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCommand {
    Dial { request: DialRequest, call_id: CallId },
    Hangup(CallId),
    Redirect { call_id: CallId, conference: String },
    ConnectToAgent { call_id: CallId, agent: AgentId },
}

#[derive(Debug)]
pub struct LoopbackGateway {
    commands: Mutex<Vec<GatewayCommand>>,
    rejected_phones: Mutex<HashSet<PhoneNumber>>,
    outage: Mutex<Option<GatewayError>>,
    next_call: AtomicU64,
    release_tx: watch::Sender<bool>,
}

impl Default for LoopbackGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackGateway {
    pub fn new() -> Self {
        let (release_tx, _) = watch::channel(true);
        Self {
            commands: Mutex::new(Vec::new()),
            rejected_phones: Mutex::new(HashSet::new()),
            outage: Mutex::new(None),
            next_call: AtomicU64::new(1),
            release_tx,
        }
    }

    /// Reject every dial to `phone` as a per-call failure
    pub fn reject_phone(&self, phone: impl Into<PhoneNumber>) {
        self.rejected_phones.lock().insert(phone.into());
    }

    /// Fail every following command with a systemic error
    pub fn set_outage(&self, error: GatewayError) {
        *self.outage.lock() = Some(error);
    }

    pub fn clear_outage(&self) {
        *self.outage.lock() = None;
    }

    /// Hold dial acknowledgements until [`release_dials`](Self::release_dials)
    pub fn hold_dials(&self) {
        self.release_tx.send_replace(false);
    }

    pub fn release_dials(&self) {
        self.release_tx.send_replace(true);
    }

    pub fn commands(&self) -> Vec<GatewayCommand> {
        self.commands.lock().clone()
    }

    pub fn dials(&self) -> Vec<(DialRequest, CallId)> {
        self.commands
            .lock()
            .iter()
            .filter_map(|c| match c {
                GatewayCommand::Dial { request, call_id } => Some((request.clone(), call_id.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn hangups(&self) -> Vec<CallId> {
        self.commands
            .lock()
            .iter()
            .filter_map(|c| match c {
                GatewayCommand::Hangup(call_id) => Some(call_id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn redirects(&self) -> Vec<(CallId, String)> {
        self.commands
            .lock()
            .iter()
            .filter_map(|c| match c {
                GatewayCommand::Redirect { call_id, conference } => Some((call_id.clone(), conference.clone())),
                _ => None,
            })
            .collect()
    }

    /// Call id handed out for the dial to `phone`, most recent first
    pub fn call_id_for(&self, phone: &str) -> Option<CallId> {
        self.commands.lock().iter().rev().find_map(|c| match c {
            GatewayCommand::Dial { request, call_id } if request.phone == phone => Some(call_id.clone()),
            _ => None,
        })
    }

    fn check_outage(&self) -> Result<(), GatewayError> {
        match self.outage.lock().as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn record(&self, command: GatewayCommand) {
        debug!("Loopback gateway received {:?}", command);
        self.commands.lock().push(command);
    }
}

#[async_trait]
impl GatewayClient for LoopbackGateway {
    async fn dial(&self, request: DialRequest) -> Result<DialAck, GatewayError> {
        let mut released = self.release_tx.subscribe();
        // A closed channel cannot happen while `self` is alive.
        let _ = released.wait_for(|open| *open).await;

        self.check_outage()?;
        if self.rejected_phones.lock().contains(&request.phone) {
            return Err(GatewayError::Rejected(format!("invalid number {}", request.phone)));
        }

        let call_id = CallId::from(format!("CA{:08}", self.next_call.fetch_add(1, Ordering::SeqCst)));
        self.record(GatewayCommand::Dial {
            request,
            call_id: call_id.clone(),
        });
        Ok(DialAck { call_id })
    }

    async fn hangup(&self, call_id: &CallId) -> Result<(), GatewayError> {
        self.check_outage()?;
        self.record(GatewayCommand::Hangup(call_id.clone()));
        Ok(())
    }

    async fn redirect_to_conference(&self, call_id: &CallId, conference: &str) -> Result<(), GatewayError> {
        self.check_outage()?;
        self.record(GatewayCommand::Redirect {
            call_id: call_id.clone(),
            conference: conference.to_string(),
        });
        Ok(())
    }

    async fn connect_to_agent(&self, call_id: &CallId, agent: &AgentId) -> Result<(), GatewayError> {
        self.check_outage()?;
        self.record(GatewayCommand::ConnectToAgent {
            call_id: call_id.clone(),
            agent: agent.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::CallbackUrls;
    use crate::types::{CampaignId, SessionId};

    fn request(phone: &str) -> DialRequest {
        let campaign_id = CampaignId::from("cmp-1");
        let session_id = SessionId::new();
        DialRequest {
            phone: phone.to_string(),
            callbacks: CallbackUrls::build("http://localhost:8000", &campaign_id, &session_id),
            campaign_id,
            session_id,
            caller_id: "+15550100000".to_string(),
            detection_requested: true,
        }
    }

    #[tokio::test]
    async fn test_dials_are_recorded_with_distinct_call_ids() {
        let gateway = LoopbackGateway::new();
        let a = gateway.dial(request("+1555001")).await.unwrap();
        let b = gateway.dial(request("+1555002")).await.unwrap();
        assert_ne!(a.call_id, b.call_id);
        assert_eq!(gateway.dials().len(), 2);
        assert_eq!(gateway.call_id_for("+1555002"), Some(b.call_id));
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let gateway = LoopbackGateway::new();
        gateway.reject_phone("+1555001");
        let err = gateway.dial(request("+1555001")).await.unwrap_err();
        assert!(!err.is_systemic());

        gateway.set_outage(GatewayError::Unavailable("maintenance".into()));
        let err = gateway.dial(request("+1555002")).await.unwrap_err();
        assert!(err.is_systemic());
        assert!(gateway.hangup(&CallId::from("CA1")).await.is_err());

        gateway.clear_outage();
        assert!(gateway.dial(request("+1555002")).await.is_ok());
    }

    #[tokio::test]
    async fn test_held_dials_wait_for_release() {
        let gateway = std::sync::Arc::new(LoopbackGateway::new());
        gateway.hold_dials();

        let pending = {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.dial(request("+1555003")).await })
        };
        tokio::task::yield_now().await;
        assert!(gateway.dials().is_empty());

        gateway.release_dials();
        assert!(pending.await.unwrap().is_ok());
        assert_eq!(gateway.dials().len(), 1);
    }
}
