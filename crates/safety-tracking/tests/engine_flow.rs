use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use geofence_core::{Coordinate, Priority, ResponderClass, Zone, ZoneKind, ZoneRegistry};
use safety_tracking::{
    ChannelSink, EngineConfig, EngineEvent, EscalationDispatcher, EscalationSink, SafetyEngine,
    SessionState,
};
use tokio::sync::{broadcast, mpsc};

fn danger_zone() -> Zone {
    Zone::rectangle(
        "danger-1",
        "Landslide corridor",
        ZoneKind::Danger,
        Coordinate::new(28.0, 77.0),
        Coordinate::new(28.1, 77.1),
        0,
    )
}

fn safe_zone() -> Zone {
    Zone::rectangle(
        "safe-1",
        "Visitor centre",
        ZoneKind::Safe,
        Coordinate::new(27.8, 77.0),
        Coordinate::new(27.9, 77.1),
        0,
    )
}

fn engine_with(zones: Vec<Zone>, ack_timeout: Duration) -> SafetyEngine {
    let registry = Arc::new(ZoneRegistry::with_zones(zones).unwrap());
    SafetyEngine::new(
        registry,
        EngineConfig::default().with_ack_timeout(ack_timeout),
    )
}

fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn test_panic_in_danger_zone_goes_to_rangers_critical() {
    let engine = engine_with(vec![danger_zone()], Duration::from_secs(30));
    let mut events = engine.subscribe();

    engine
        .location_update("t1", Coordinate::new(28.05, 77.05), Utc::now())
        .await
        .unwrap();
    let alert = engine.trigger_alert("t1", "panic").await.unwrap();

    assert_eq!(alert.decision.responder_class, ResponderClass::Ranger);
    assert_eq!(alert.decision.priority, Priority::Critical);

    let raised = drain(&mut events)
        .into_iter()
        .find(|e| matches!(e, EngineEvent::EscalationRaised { .. }))
        .expect("escalation event");
    match raised {
        EngineEvent::EscalationRaised {
            subject_id,
            alert_id,
            decision,
            ..
        } => {
            assert_eq!(subject_id, "t1");
            assert_eq!(alert_id, alert.alert_id);
            assert_eq!(decision.responder_class, ResponderClass::Ranger);
            assert_eq!(decision.priority, Priority::Critical);
        }
        _ => unreachable!(),
    }

    let subject = engine.subject("t1").await.unwrap();
    assert_eq!(subject.state, SessionState::SosActive);
}

#[tokio::test]
async fn test_transitions_in_order() {
    let engine = engine_with(vec![safe_zone(), danger_zone()], Duration::from_secs(30));
    let mut events = engine.subscribe();

    let path = [
        Coordinate::new(27.85, 77.05),
        Coordinate::new(28.05, 77.05),
        Coordinate::new(27.85, 77.05),
    ];
    for point in path {
        engine.location_update("t1", point, Utc::now()).await.unwrap();
    }

    let transitions: Vec<(Option<String>, Option<String>)> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::ZoneTransition {
                from_zone_id,
                to_zone_id,
                ..
            } => Some((from_zone_id, to_zone_id)),
            _ => None,
        })
        .collect();

    assert_eq!(
        transitions,
        vec![
            (Some("safe-1".to_string()), Some("danger-1".to_string())),
            (Some("danger-1".to_string()), Some("safe-1".to_string())),
        ]
    );
}

#[tokio::test]
async fn test_subjects_are_independent() {
    let engine = Arc::new(engine_with(vec![safe_zone(), danger_zone()], Duration::from_secs(30)));

    let mut tasks = Vec::new();
    for i in 0..8 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            let id = format!("t{}", i);
            for step in 0..20 {
                let point = if step % 2 == 0 {
                    Coordinate::new(27.85, 77.05)
                } else {
                    Coordinate::new(28.05, 77.05)
                };
                engine.location_update(&id, point, Utc::now()).await.unwrap();
            }
            engine.subject(&id).await.unwrap()
        }));
    }

    for task in tasks {
        let subject = task.await.unwrap();
        assert_eq!(subject.current_zone_id.as_deref(), Some("danger-1"));
    }
    assert_eq!(engine.subject_ids().len(), 8);
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_after_timeout() {
    let engine = engine_with(vec![safe_zone()], Duration::from_secs(30));
    let mut events = engine.subscribe();

    engine
        .location_update("t1", Coordinate::new(27.85, 77.05), Utc::now())
        .await
        .unwrap();
    let alert = engine.trigger_alert("t1", "medical").await.unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;

    let unacked: Vec<EngineEvent> = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::Unacknowledged { .. }))
        .collect();
    assert_eq!(unacked.len(), 1);
    match &unacked[0] {
        EngineEvent::Unacknowledged { alert_id, .. } => assert_eq!(*alert_id, alert.alert_id),
        _ => unreachable!(),
    }

    let subject = engine.subject("t1").await.unwrap();
    assert_eq!(subject.state, SessionState::Tracking);
    assert!(subject.active_alert.is_none());

    // Too late to acknowledge
    assert!(!engine.acknowledge("t1", alert.alert_id, "op-1").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_acknowledge_cancels_timer() {
    let engine = engine_with(vec![safe_zone()], Duration::from_secs(30));
    let mut events = engine.subscribe();

    let alert = engine.trigger_alert("t1", "panic").await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(engine.acknowledge("t1", alert.alert_id, "op-1").await.unwrap());

    tokio::time::sleep(Duration::from_secs(60)).await;

    let kinds: Vec<&'static str> = drain(&mut events).iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, vec!["escalation_raised", "acknowledged"]);

    let subject = engine.subject("t1").await.unwrap();
    assert_eq!(subject.state, SessionState::Uninitialized);
}

#[tokio::test(start_paused = true)]
async fn test_second_alert_restarts_timer() {
    let engine = engine_with(vec![safe_zone()], Duration::from_secs(30));
    let mut events = engine.subscribe();

    let first = engine.trigger_alert("t1", "other").await.unwrap();
    tokio::time::sleep(Duration::from_secs(20)).await;
    let second = engine.trigger_alert("t1", "panic").await.unwrap();

    // First deadline would have fired here
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert!(drain(&mut events)
        .iter()
        .all(|e| !matches!(e, EngineEvent::Unacknowledged { .. })));

    tokio::time::sleep(Duration::from_secs(20)).await;
    let unacked: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::Unacknowledged { alert_id, .. } => Some(alert_id),
            _ => None,
        })
        .collect();
    assert_eq!(unacked, vec![second.alert_id]);
    assert_ne!(first.alert_id, second.alert_id);
}

#[tokio::test(start_paused = true)]
async fn test_end_session_cancels_timer() {
    let engine = engine_with(vec![safe_zone()], Duration::from_secs(30));
    let mut events = engine.subscribe();

    engine.trigger_alert("t1", "panic").await.unwrap();
    assert!(engine.end_session("t1").await);
    tokio::time::sleep(Duration::from_secs(60)).await;

    let kinds: Vec<&'static str> = drain(&mut events).iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, vec!["escalation_raised", "session_ended"]);
}

#[tokio::test]
async fn test_dispatcher_receives_escalations() {
    let engine = engine_with(vec![danger_zone()], Duration::from_secs(30));
    let (tx, mut rx) = mpsc::channel(8);
    let _dispatcher = EscalationDispatcher::new()
        .with_sink(Arc::new(ChannelSink::new("pager", tx)))
        .spawn(engine.escalations());

    engine
        .location_update("t1", Coordinate::new(28.05, 77.05), Utc::now())
        .await
        .unwrap();
    engine.trigger_alert("t1", "panic").await.unwrap();

    let delivered = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(delivered, EngineEvent::EscalationRaised { .. }));
}

/// Pager that takes a while to accept each page
struct SlowPager {
    delay: Duration,
    tx: mpsc::Sender<EngineEvent>,
}

#[async_trait::async_trait]
impl EscalationSink for SlowPager {
    fn name(&self) -> &str {
        "slow-pager"
    }

    async fn deliver(&self, event: &EngineEvent) -> safety_tracking::Result<()> {
        tokio::time::sleep(self.delay).await;
        let _ = self.tx.send(event.clone()).await;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_sink_gets_every_escalation_under_location_traffic() {
    let registry = Arc::new(ZoneRegistry::with_zones(vec![safe_zone(), danger_zone()]).unwrap());
    let engine = SafetyEngine::new(registry, EngineConfig::default().with_event_capacity(16));
    let (tx, mut rx) = mpsc::channel(64);
    let _dispatcher = EscalationDispatcher::new()
        .with_sink(Arc::new(SlowPager {
            delay: Duration::from_millis(200),
            tx,
        }))
        .spawn(engine.escalations());

    for i in 0..3 {
        engine.trigger_alert(&format!("sos{}", i), "panic").await.unwrap();
    }
    for step in 0..40 {
        let point = if (step / 4) % 2 == 0 {
            Coordinate::new(27.85, 77.05)
        } else {
            Coordinate::new(28.05, 77.05)
        };
        engine
            .location_update(&format!("walker{}", step % 4), point, Utc::now())
            .await
            .unwrap();
    }

    let mut paged = Vec::new();
    for _ in 0..3 {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            EngineEvent::EscalationRaised { subject_id, .. } => paged.push(subject_id),
            other => panic!("unexpected {}", other.kind()),
        }
    }
    assert_eq!(paged, vec!["sos0", "sos1", "sos2"]);
}
