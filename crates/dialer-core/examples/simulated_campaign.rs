//! Simulated Campaign Example
//!
//! Runs a whole campaign against the in-memory loopback gateway and plays
//! the provider's part by feeding callbacks back into the engine. Contacts
//! cycle through a fixed pattern of outcomes: a live human, a voicemail
//! box, a busy line and a call nobody picks up.
//!
//! ```text
//! cargo run -p dialer-core --example simulated_campaign -- --contacts 12 --batch 4
//! ```

use anyhow::Result;
use clap::Parser;
use dialer_core::logging::{parse_log_level, setup_logging, LoggingConfig};
use dialer_core::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Simulated outbound dialing campaign")]
struct Args {
    /// Number of contacts in the campaign
    #[arg(short = 'n', long, default_value = "12")]
    contacts: usize,

    /// Contacts dialed per batch
    #[arg(short, long, default_value = "4")]
    batch: usize,

    /// Stop after this many batches; failed contacts are retried on later passes
    #[arg(short, long, default_value = "6")]
    max_batches: usize,

    /// Reject calls whose detection comes back UNKNOWN
    #[arg(long)]
    reject_unknown: bool,

    /// Optional YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

/// What the simulated far end does with a call
#[derive(Debug, Clone, Copy)]
enum Scenario {
    Human,
    Voicemail,
    Busy,
    NoAnswer,
}

impl Scenario {
    fn for_index(index: usize) -> Self {
        match index % 4 {
            0 => Scenario::Human,
            1 => Scenario::Voicemail,
            2 => Scenario::Busy,
            _ => Scenario::NoAnswer,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut logging = LoggingConfig::new(parse_log_level(&args.log_level)?, "simulated_campaign");
    if args.json {
        logging = logging.with_json();
    }
    setup_logging(logging)?;

    let mut config = match &args.config {
        Some(path) => DialerConfig::from_file(path)?,
        None => DialerConfig::default(),
    };
    config.dialing.batch_dial_count = args.batch;
    if args.reject_unknown {
        config.detection.unknown_outcome = UnknownOutcomePolicy::Reject;
    }

    let gateway = Arc::new(LoopbackGateway::new());
    let engine = Arc::new(DialerEngine::new(config, gateway.clone())?);

    let contacts: Vec<String> = (0..args.contacts).map(|i| format!("+1555{:07}", i)).collect();
    let campaign_id = engine.create_campaign(AgentId::from("agent-demo"), &contacts)?;

    let (initial, mut events) = engine.subscribe_with_snapshot(&campaign_id)?;
    info!("📡 {}", initial.to_json()?);
    let listener = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event.to_json() {
                Ok(json) => info!("📡 {}", json),
                Err(e) => warn!("Could not serialise event: {}", e),
            }
            if matches!(event, DialerEvent::CampaignEnded { .. }) {
                break;
            }
        }
    });

    let mut batch = engine.start_campaign(&campaign_id).await?;
    let mut rounds = 1;
    while !batch.is_empty() {
        for session_id in &batch {
            play_far_end(&engine, &contacts, session_id).await;
        }
        // The agent wraps up whoever they talked to, then takes the next caller.
        finish_connected_call(&engine, &campaign_id).await?;
        if rounds >= args.max_batches {
            break;
        }
        batch = engine.dial_next_batch(&campaign_id, args.batch).await?;
        rounds += 1;
    }

    let stats = engine.stats();
    info!(
        "📊 Dials: {}, connected: {}, still queued: {}",
        stats.total_dials, stats.total_connected, stats.queued_calls
    );

    let snapshot = engine.snapshot(&campaign_id)?;
    for contact in &snapshot.contacts {
        let status = contact.status.map_or("never dialed".to_string(), |s| s.to_string());
        info!("   {} -> {}", contact.phone, status);
    }

    engine.end_campaign(&campaign_id, "simulation finished").await?;
    let _ = tokio::time::timeout(Duration::from_secs(1), listener).await;
    info!("🔌 {} gateway commands issued", gateway.commands().len());
    Ok(())
}

async fn play_far_end(engine: &DialerEngine, contacts: &[String], session_id: &SessionId) {
    let Some(session) = engine.session(session_id) else {
        return;
    };
    let index = contacts.iter().position(|c| c == &session.phone).unwrap_or(0);
    let call_id = session.call_id.clone();
    let id = session_id.clone();

    engine
        .handle_callback(ProviderCallback::status(id.clone(), call_id.clone(), ProviderCallStatus::Ringing))
        .await;

    match Scenario::for_index(index) {
        Scenario::Human | Scenario::Voicemail => {
            if let Some(instructions) = engine
                .handle_callback(ProviderCallback::answered(id.clone(), call_id.clone()))
                .await
            {
                info!(
                    "🎵 {} waits in {} at position {}",
                    session.phone, instructions.queue_name, instructions.position
                );
            }
            let answered_by = match Scenario::for_index(index) {
                Scenario::Human => "human",
                _ => "machine_end_beep",
            };
            engine
                .handle_callback(ProviderCallback::answered_by(id, call_id, answered_by))
                .await;
        }
        Scenario::Busy => {
            engine
                .handle_callback(ProviderCallback::status(id, call_id, ProviderCallStatus::Busy))
                .await;
        }
        Scenario::NoAnswer => {
            engine
                .handle_callback(ProviderCallback::status(id, call_id, ProviderCallStatus::NoAnswer))
                .await;
        }
    }
}

async fn finish_connected_call(engine: &DialerEngine, campaign_id: &CampaignId) -> Result<()> {
    let snapshot = engine.snapshot(campaign_id)?;
    let Some(phone) = snapshot.connected_phone else {
        return Ok(());
    };

    if let Some(session) = engine
        .sessions()
        .sessions_for_campaign(campaign_id)
        .into_iter()
        .find(|s| s.phone == phone && s.status == CallStatus::Connected)
    {
        engine
            .handle_callback(ProviderCallback::status(
                session.session_id,
                session.call_id,
                ProviderCallStatus::Completed,
            ))
            .await;
    }
    engine.save_disposition(campaign_id, &phone, "interested", Some("call back next week".to_string()))?;

    if let Some(next) = engine.agent_ready(campaign_id).await? {
        info!("👤 Agent picked up waiting call {}", next);
    }
    Ok(())
}
