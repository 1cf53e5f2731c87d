//! Integration tests for provider callbacks and human/machine routing
//!
//! Callbacks are fed in the orders a real provider produces them: late,
//! duplicated, and racing each other.

mod common;

use common::*;
use dialer_core::gateway::GatewayCommand;
use dialer_core::prelude::*;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_answered_call_gets_queue_instructions() {
    let (engine, _, campaign_id, sessions) = started_campaign(test_config(), 2).await;

    let first = answer(&engine, &sessions[0]).await.unwrap();
    let second = answer(&engine, &sessions[1]).await.unwrap();

    assert_eq!(first.queue_name, format!("campaign_{}", campaign_id));
    assert_eq!(first.hold_music_url, engine.config().queue.hold_music_url);
    assert_eq!(first.position, 1);
    assert_eq!(second.position, 2);

    // A repeated queue join keeps its place and announces nothing new.
    let mut events = engine.subscribe(&campaign_id).unwrap();
    let again = answer(&engine, &sessions[0]).await.unwrap();
    assert_eq!(again.position, 1);
    assert!(drain(&mut events).is_empty());

    let session = engine.session(&sessions[1]).unwrap();
    assert_eq!(session.status, CallStatus::Queued);
    assert_eq!(session.queue_position, Some(2));
}

#[tokio::test]
async fn test_human_connects_and_ringing_call_is_superseded() {
    let (engine, gateway, campaign_id, sessions) = started_campaign(test_config(), 2).await;
    let (a, b) = (sessions[0].clone(), sessions[1].clone());
    let phone_a = phone_of(&engine, &a);
    let phone_b = phone_of(&engine, &b);
    let call_a = call_id(&engine, &a).unwrap();
    let call_b = call_id(&engine, &b).unwrap();
    let mut events = engine.subscribe(&campaign_id).unwrap();

    report(&engine, &b, ProviderCallStatus::Ringing).await;
    answer(&engine, &a).await;
    detect(&engine, &a, DetectionOutcome::Human).await;

    assert_eq!(engine.session(&a).unwrap().status, CallStatus::Connected);
    assert!(engine.session(&b).is_none());
    assert_eq!(
        engine.contact_status(&campaign_id, &phone_b).unwrap(),
        Some(CallStatus::Terminated(TerminationReason::Superseded))
    );

    let events = drain(&mut events);
    let connected: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            DialerEvent::CustomerConnected { phone, call_id, .. } => Some((phone.clone(), call_id.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(connected, vec![(phone_a.clone(), Some(call_a.clone()))]);

    assert_eq!(
        gateway.redirects(),
        vec![(call_a, engine.config().gateway.conference_for(&campaign_id))]
    );
    assert_eq!(gateway.hangups(), vec![call_b]);
    assert_eq!(
        engine.snapshot(&campaign_id).unwrap().connected_phone,
        Some(phone_a)
    );
}

#[tokio::test]
async fn test_duplicate_detection_connects_once() {
    let (engine, gateway, campaign_id, sessions) = started_campaign(test_config(), 1).await;
    let mut events = engine.subscribe(&campaign_id).unwrap();

    answer(&engine, &sessions[0]).await;
    detect(&engine, &sessions[0], DetectionOutcome::Human).await;
    detect(&engine, &sessions[0], DetectionOutcome::Human).await;
    detect(&engine, &sessions[0], DetectionOutcome::Machine).await;

    let events = drain(&mut events);
    assert_eq!(count_kind(&events, "customer_connected"), 1);
    assert_eq!(count_kind(&events, "call_rejected"), 0);
    assert_eq!(gateway.redirects().len(), 1);
    assert_eq!(engine.session(&sessions[0]).unwrap().status, CallStatus::Connected);
    assert_eq!(engine.stats().total_connected, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_detection_connects_once() {
    let (engine, gateway, campaign_id, sessions) = started_campaign(test_config(), 1).await;
    let mut events = engine.subscribe(&campaign_id).unwrap();
    answer(&engine, &sessions[0]).await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        let session_id = sessions[0].clone();
        tasks.push(tokio::spawn(async move {
            detect(&engine, &session_id, DetectionOutcome::Human).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(count_kind(&drain(&mut events), "customer_connected"), 1);
    assert_eq!(gateway.redirects().len(), 1);
}

#[tokio::test]
async fn test_detection_before_queue_join_is_applied_on_join() {
    let (engine, _, campaign_id, sessions) = started_campaign(test_config(), 1).await;
    let mut events = engine.subscribe(&campaign_id).unwrap();

    report(&engine, &sessions[0], ProviderCallStatus::Ringing).await;
    detect(&engine, &sessions[0], DetectionOutcome::Human).await;
    assert_eq!(engine.session(&sessions[0]).unwrap().status, CallStatus::Ringing);
    assert_eq!(engine.session(&sessions[0]).unwrap().detection, DetectionOutcome::Human);

    assert!(answer(&engine, &sessions[0]).await.is_some());
    assert_eq!(engine.session(&sessions[0]).unwrap().status, CallStatus::Connected);
    assert_eq!(count_kind(&drain(&mut events), "customer_connected"), 1);
}

#[tokio::test]
async fn test_hangup_while_queued_beats_later_detection() {
    let (engine, gateway, campaign_id, sessions) = started_campaign(test_config(), 1).await;
    let phone = phone_of(&engine, &sessions[0]);
    let mut events = engine.subscribe(&campaign_id).unwrap();

    answer(&engine, &sessions[0]).await;
    report(&engine, &sessions[0], ProviderCallStatus::Completed).await;
    detect(&engine, &sessions[0], DetectionOutcome::Human).await;

    assert_eq!(
        engine.contact_status(&campaign_id, &phone).unwrap(),
        Some(CallStatus::Terminated(TerminationReason::HungUp))
    );
    assert_eq!(engine.queue().len(&campaign_id), 0);
    assert!(gateway.redirects().is_empty());

    let events = drain(&mut events);
    assert_eq!(count_kind(&events, "customer_connected"), 0);
    assert_eq!(count_kind(&events, "call_ended"), 0);
    assert_eq!(count_kind(&events, "auto_dial_next"), 0);
}

#[tokio::test]
async fn test_hangup_after_connect_ends_the_call() {
    let (engine, _, campaign_id, sessions) = started_campaign(test_config(), 1).await;
    let phone = phone_of(&engine, &sessions[0]);
    let mut events = engine.subscribe(&campaign_id).unwrap();

    answer(&engine, &sessions[0]).await;
    detect(&engine, &sessions[0], DetectionOutcome::Human).await;
    report(&engine, &sessions[0], ProviderCallStatus::Completed).await;
    // A second final status for the same call is a no-op.
    report(&engine, &sessions[0], ProviderCallStatus::Completed).await;

    assert_eq!(
        engine.contact_status(&campaign_id, &phone).unwrap(),
        Some(CallStatus::Completed)
    );
    let snapshot = engine.snapshot(&campaign_id).unwrap();
    assert_eq!(snapshot.connected_phone, None);

    let events = drain(&mut events);
    let ended: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            DialerEvent::CallEnded { phone, status, .. } => Some((phone.clone(), *status)),
            _ => None,
        })
        .collect();
    assert_eq!(ended, vec![(phone, CallStatus::Completed)]);
}

#[tokio::test]
async fn test_busy_and_no_answer_ask_for_the_next_dial() {
    let (engine, _, campaign_id, sessions) = started_campaign(test_config(), 2).await;
    let busy_phone = phone_of(&engine, &sessions[0]);
    let silent_phone = phone_of(&engine, &sessions[1]);
    let mut events = engine.subscribe(&campaign_id).unwrap();

    report(&engine, &sessions[0], ProviderCallStatus::Busy).await;
    report(&engine, &sessions[1], ProviderCallStatus::Ringing).await;
    report(&engine, &sessions[1], ProviderCallStatus::NoAnswer).await;

    // Late answer and detection for a finished call change nothing.
    assert!(answer(&engine, &sessions[0]).await.is_none());
    detect(&engine, &sessions[0], DetectionOutcome::Human).await;

    assert_eq!(
        engine.contact_status(&campaign_id, &busy_phone).unwrap(),
        Some(CallStatus::Terminated(TerminationReason::Busy))
    );
    let reasons: Vec<String> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            DialerEvent::AutoDialNext { reason, .. } => Some(reason),
            _ => None,
        })
        .collect();
    assert_eq!(
        reasons,
        vec![
            format!("{} - busy", busy_phone),
            format!("{} - no-answer", silent_phone)
        ]
    );
}

#[tokio::test]
async fn test_voicemail_is_rejected_and_hung_up() {
    let (engine, gateway, campaign_id, sessions) = started_campaign(test_config(), 1).await;
    let phone = phone_of(&engine, &sessions[0]);
    let call = call_id(&engine, &sessions[0]).unwrap();
    let mut events = engine.subscribe(&campaign_id).unwrap();

    answer(&engine, &sessions[0]).await;
    detect(&engine, &sessions[0], DetectionOutcome::Machine).await;

    assert_eq!(
        engine.contact_status(&campaign_id, &phone).unwrap(),
        Some(CallStatus::Terminated(TerminationReason::Voicemail))
    );
    assert_eq!(engine.queue().len(&campaign_id), 0);
    assert_eq!(gateway.hangups(), vec![call]);

    let events = drain(&mut events);
    let rejected: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            DialerEvent::CallRejected { reason, .. } => Some(reason.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(rejected, vec!["Voicemail: machine".to_string()]);
    assert_eq!(count_kind(&events, "auto_dial_next"), 0);
    assert_eq!(count_kind(&events, "customer_connected"), 0);
}

#[tokio::test]
async fn test_unknown_outcome_follows_policy() {
    let (engine, _, _, sessions) = started_campaign(test_config(), 1).await;
    answer(&engine, &sessions[0]).await;
    detect(&engine, &sessions[0], DetectionOutcome::Unknown).await;
    assert_eq!(engine.session(&sessions[0]).unwrap().status, CallStatus::Connected);

    let mut config = test_config();
    config.detection.unknown_outcome = UnknownOutcomePolicy::Reject;
    let (engine, _, campaign_id, sessions) = started_campaign(config, 1).await;
    let phone = phone_of(&engine, &sessions[0]);
    answer(&engine, &sessions[0]).await;
    detect(&engine, &sessions[0], DetectionOutcome::Unknown).await;
    assert_eq!(
        engine.contact_status(&campaign_id, &phone).unwrap(),
        Some(CallStatus::Terminated(TerminationReason::Voicemail))
    );
}

#[tokio::test]
async fn test_without_detection_answered_calls_connect() {
    let mut config = test_config();
    config.gateway.detection_enabled = false;
    let (engine, gateway, _, sessions) = started_campaign(config, 1).await;

    assert!(gateway.dials().iter().all(|(request, _)| !request.detection_requested));
    answer(&engine, &sessions[0]).await;
    assert_eq!(engine.session(&sessions[0]).unwrap().status, CallStatus::Connected);
}

#[tokio::test]
async fn test_agent_ready_connects_oldest_waiting_call() {
    let mut config = test_config();
    config.detection.connect_policy = ConnectPolicy::HoldOthers;
    let (engine, _, campaign_id, sessions) = started_campaign(config, 3).await;
    let mut events = engine.subscribe(&campaign_id).unwrap();

    for session_id in &sessions {
        answer(&engine, session_id).await;
    }
    detect(&engine, &sessions[0], DetectionOutcome::Human).await;
    detect(&engine, &sessions[1], DetectionOutcome::Human).await;

    // The agent is busy, so the second human keeps waiting.
    assert_eq!(engine.session(&sessions[1]).unwrap().status, CallStatus::Queued);
    assert!(matches!(
        engine.agent_ready(&campaign_id).await,
        Err(DialerError::InvalidState(_))
    ));

    report(&engine, &sessions[0], ProviderCallStatus::Completed).await;
    let next = engine.agent_ready(&campaign_id).await.unwrap();
    assert_eq!(next, Some(sessions[1].clone()));
    assert_eq!(engine.session(&sessions[1]).unwrap().status, CallStatus::Connected);
    assert_eq!(engine.queue().len(&campaign_id), 1);

    let events = drain(&mut events);
    assert_eq!(count_kind(&events, "customer_connected"), 2);
    assert_eq!(count_kind(&events, "call_ended"), 1);
}

#[tokio::test]
async fn test_agent_ready_with_empty_queue() {
    let (engine, _, campaign_id, _) = started_campaign(test_config(), 1).await;
    assert_eq!(engine.agent_ready(&campaign_id).await.unwrap(), None);
}

#[tokio::test]
async fn test_direct_agent_connection() {
    let mut config = test_config();
    config.gateway.agent_connection = AgentConnection::DirectToAgent;
    let (engine, gateway, _, sessions) = started_campaign(config, 1).await;
    let call = call_id(&engine, &sessions[0]).unwrap();

    answer(&engine, &sessions[0]).await;
    detect(&engine, &sessions[0], DetectionOutcome::Human).await;

    assert!(gateway.redirects().is_empty());
    assert!(gateway.commands().contains(&GatewayCommand::ConnectToAgent {
        call_id: call,
        agent: AgentId::from(AGENT),
    }));
}

#[tokio::test]
async fn test_global_queue_is_shared_across_campaigns() {
    let mut config = test_config();
    config.queue.scope = QueueScope::Global;
    let (engine, _) = create_engine(config);

    let first = engine
        .create_campaign(AgentId::from("agent-a"), ["+15551000001"])
        .unwrap();
    let second = engine
        .create_campaign(AgentId::from("agent-b"), ["+15552000001"])
        .unwrap();
    let first_sessions = engine.start_campaign(&first).await.unwrap();
    let second_sessions = engine.start_campaign(&second).await.unwrap();

    let a = answer(&engine, &first_sessions[0]).await.unwrap();
    let b = answer(&engine, &second_sessions[0]).await.unwrap();
    assert_eq!(a.position, 1);
    assert_eq!(b.position, 2);
    assert_eq!(b.queue_name, "campaign_all");

    // Each agent still only takes its own campaign's callers.
    assert_eq!(
        engine.agent_ready(&second).await.unwrap(),
        Some(second_sessions[0].clone())
    );
    assert_eq!(engine.queue().len(&first), 1);
}

#[tokio::test]
async fn test_callbacks_for_unknown_sessions_are_ignored() {
    let (engine, gateway, campaign_id, _) = started_campaign(test_config(), 1).await;
    let mut events = engine.subscribe(&campaign_id).unwrap();
    let stranger = SessionId::new();

    assert!(engine
        .handle_callback(ProviderCallback::answered(stranger.clone(), None))
        .await
        .is_none());
    engine
        .handle_callback(ProviderCallback::status(stranger, None, ProviderCallStatus::Busy))
        .await;

    assert!(drain(&mut events).is_empty());
    assert_eq!(gateway.hangups().len(), 0);
}

#[tokio::test]
async fn test_callbacks_round_trip_from_wire_json() {
    let (engine, _, _, sessions) = started_campaign(test_config(), 1).await;
    let payload = format!(
        r#"{{"session_id":"{}","kind":"status","status":"ringing"}}"#,
        sessions[0]
    );
    let callback: ProviderCallback = serde_json::from_str(&payload).unwrap();
    engine.handle_callback(callback).await;
    assert_eq!(engine.session(&sessions[0]).unwrap().status, CallStatus::Ringing);
}

#[tokio::test]
async fn test_in_progress_status_then_human_connects_without_queue_join() {
    let (engine, gateway, campaign_id, sessions) = started_campaign(test_config(), 1).await;
    let call = call_id(&engine, &sessions[0]).unwrap();
    let mut events = engine.subscribe(&campaign_id).unwrap();

    report(&engine, &sessions[0], ProviderCallStatus::InProgress).await;
    assert_eq!(engine.session(&sessions[0]).unwrap().status, CallStatus::Answered);
    detect(&engine, &sessions[0], DetectionOutcome::Human).await;

    assert_eq!(engine.session(&sessions[0]).unwrap().status, CallStatus::Connected);
    assert_eq!(engine.queue().len(&campaign_id), 0);
    assert_eq!(
        gateway.redirects(),
        vec![(call, engine.config().gateway.conference_for(&campaign_id))]
    );
    let events = drain(&mut events);
    assert_eq!(count_kind(&events, "customer_connected"), 1);
    assert_eq!(count_kind(&events, "call_queued"), 0);

    // A queue join arriving after the connect gets no instructions.
    assert!(answer(&engine, &sessions[0]).await.is_none());
    assert_eq!(engine.session(&sessions[0]).unwrap().status, CallStatus::Connected);
}

#[tokio::test]
async fn test_detection_while_ringing_is_routed_when_in_progress_arrives() {
    let (engine, _, campaign_id, sessions) = started_campaign(test_config(), 2).await;
    let (human, machine) = (sessions[0].clone(), sessions[1].clone());
    let machine_phone = phone_of(&engine, &machine);
    let mut events = engine.subscribe(&campaign_id).unwrap();

    report(&engine, &machine, ProviderCallStatus::Ringing).await;
    let machine_call = call_id(&engine, &machine);
    engine
        .handle_callback(ProviderCallback::answered_by(machine.clone(), machine_call, "machine_end_beep"))
        .await;
    assert_eq!(engine.session(&machine).unwrap().status, CallStatus::Ringing);
    report(&engine, &machine, ProviderCallStatus::InProgress).await;

    assert_eq!(
        engine.contact_status(&campaign_id, &machine_phone).unwrap(),
        Some(CallStatus::Terminated(TerminationReason::Voicemail))
    );

    report(&engine, &human, ProviderCallStatus::Ringing).await;
    detect(&engine, &human, DetectionOutcome::Human).await;
    report(&engine, &human, ProviderCallStatus::InProgress).await;
    assert_eq!(engine.session(&human).unwrap().status, CallStatus::Connected);

    let events = drain(&mut events);
    let rejected: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            DialerEvent::CallRejected { reason, .. } => Some(reason.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(rejected, vec!["Voicemail: machine_end_beep".to_string()]);
    assert_eq!(count_kind(&events, "customer_connected"), 1);
}

#[tokio::test]
async fn test_leaving_the_queue_is_announced() {
    let (engine, _, campaign_id, sessions) = started_campaign(test_config(), 1).await;
    let phone = phone_of(&engine, &sessions[0]);
    answer(&engine, &sessions[0]).await;
    let mut events = engine.subscribe(&campaign_id).unwrap();

    let call = call_id(&engine, &sessions[0]);
    engine
        .handle_callback(ProviderCallback::queue_left(sessions[0].clone(), call.clone(), "hangup"))
        .await;

    assert_eq!(
        drain(&mut events),
        vec![DialerEvent::CallDequeued {
            campaign_id: campaign_id.clone(),
            session_id: sessions[0].clone(),
            phone,
            call_id: call,
            reason: "hangup".to_string(),
        }]
    );
    // The status callback that follows settles the call.
    assert_eq!(engine.session(&sessions[0]).unwrap().status, CallStatus::Queued);
    report(&engine, &sessions[0], ProviderCallStatus::Completed).await;
    assert!(engine.session(&sessions[0]).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_callbacks_publish_in_revision_order() {
    for _ in 0..50 {
        let (engine, _, campaign_id, sessions) = started_campaign(test_config(), 1).await;
        let session_id = sessions[0].clone();
        answer(&engine, &session_id).await;
        let mut events = engine.subscribe(&campaign_id).unwrap();

        let detecting = {
            let engine = engine.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move { detect(&engine, &session_id, DetectionOutcome::Human).await })
        };
        let hanging_up = {
            let engine = engine.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move { report(&engine, &session_id, ProviderCallStatus::Completed).await })
        };
        detecting.await.unwrap();
        hanging_up.await.unwrap();

        let events = drain(&mut events);
        let revisions: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                DialerEvent::StatusUpdate { revision, .. } => Some(*revision),
                _ => None,
            })
            .collect();
        assert!(revisions.windows(2).all(|w| w[0] < w[1]), "out of order: {:?}", revisions);

        let finished = events
            .iter()
            .position(|e| matches!(e, DialerEvent::StatusUpdate { status, .. } if status.is_terminal()))
            .expect("the call always ends");
        assert!(events[finished + 1..]
            .iter()
            .all(|e| !matches!(e, DialerEvent::StatusUpdate { .. } | DialerEvent::CustomerConnected { .. })));
    }
}
