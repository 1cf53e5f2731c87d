//! Shared setup for the dialer integration tests

#![allow(dead_code)]

use dialer_core::prelude::*;
use std::sync::Arc;
use tokio::sync::broadcast;

pub const AGENT: &str = "agent-test";

pub fn contacts(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("+1555000{:04}", i)).collect()
}

pub fn test_config() -> DialerConfig {
    let mut config = DialerConfig::default();
    config.gateway.callback_base_url = "http://dialer.test".to_string();
    config
}

pub fn create_engine(config: DialerConfig) -> (Arc<DialerEngine>, Arc<LoopbackGateway>) {
    let gateway = Arc::new(LoopbackGateway::new());
    let engine = DialerEngine::new(config, gateway.clone()).expect("engine creation failed");
    (Arc::new(engine), gateway)
}

/// Engine with one ACTIVE campaign that has dialed its first batch
pub async fn started_campaign(
    config: DialerConfig,
    contact_count: usize,
) -> (Arc<DialerEngine>, Arc<LoopbackGateway>, CampaignId, Vec<SessionId>) {
    let (engine, gateway) = create_engine(config);
    let campaign_id = engine
        .create_campaign(AgentId::from(AGENT), contacts(contact_count))
        .expect("campaign creation failed");
    let sessions = engine
        .start_campaign(&campaign_id)
        .await
        .expect("campaign start failed");
    (engine, gateway, campaign_id, sessions)
}

pub fn call_id(engine: &DialerEngine, session_id: &SessionId) -> Option<CallId> {
    engine.session(session_id).and_then(|s| s.call_id)
}

pub async fn answer(engine: &DialerEngine, session_id: &SessionId) -> Option<QueueInstructions> {
    let call_id = call_id(engine, session_id);
    engine
        .handle_callback(ProviderCallback::answered(session_id.clone(), call_id))
        .await
}

pub async fn detect(engine: &DialerEngine, session_id: &SessionId, outcome: DetectionOutcome) {
    let call_id = call_id(engine, session_id);
    engine
        .handle_callback(ProviderCallback::detection(session_id.clone(), call_id, outcome))
        .await;
}

pub async fn report(engine: &DialerEngine, session_id: &SessionId, status: ProviderCallStatus) {
    let call_id = call_id(engine, session_id);
    engine
        .handle_callback(ProviderCallback::status(session_id.clone(), call_id, status))
        .await;
}

/// Everything already sitting in the receiver
pub fn drain(receiver: &mut broadcast::Receiver<DialerEvent>) -> Vec<DialerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

pub fn count_kind(events: &[DialerEvent], kind: &str) -> usize {
    events.iter().filter(|e| e.kind() == kind).count()
}

pub fn phone_of(engine: &DialerEngine, session_id: &SessionId) -> PhoneNumber {
    engine
        .session(session_id)
        .map(|s| s.phone)
        .expect("session should still be live")
}
