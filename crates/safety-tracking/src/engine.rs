//! Safety Engine
//!
//! Runs one actor task per tracked subject. All commands for a subject go
//! through its queue, so location updates and alerts for that subject are
//! applied strictly in arrival order while different subjects proceed in
//! parallel. Events are published on a broadcast channel; alert lifecycle
//! events are also pushed onto a bounded queue for the escalation
//! dispatcher, which never drops them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use geofence_core::{Coordinate, Zone, ZoneRegistry};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::dispatch::EscalationDispatcher;
use crate::error::{EngineError, Result};
use crate::events::EngineEvent;
use crate::session::{ActiveAlert, SessionState, TrackedSubject, TrackingSession};

type EscalationQueue = Arc<Mutex<Option<mpsc::Sender<EngineEvent>>>>;

enum Command {
    Location {
        point: Coordinate,
        at: DateTime<Utc>,
        reply: oneshot::Sender<Result<Option<EngineEvent>>>,
    },
    Alert {
        alert_type: String,
        reply: oneshot::Sender<Result<ActiveAlert>>,
    },
    Acknowledge {
        alert_id: Uuid,
        by: String,
        reply: oneshot::Sender<Result<bool>>,
    },
    Expire {
        alert_id: Uuid,
    },
    Snapshot {
        reply: oneshot::Sender<TrackedSubject>,
    },
    End {
        reply: oneshot::Sender<()>,
    },
}

/// Owns a session and its acknowledgement timer
struct SubjectActor {
    session: TrackingSession,
    registry: Arc<ZoneRegistry>,
    events: broadcast::Sender<EngineEvent>,
    escalations: EscalationQueue,
    ack_timeout: Duration,
    idle_timeout: Duration,
    // Weak so a pending timer never keeps the queue alive
    commands: mpsc::WeakSender<Command>,
    timer: Option<JoinHandle<()>>,
}

impl SubjectActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        loop {
            let command = match tokio::time::timeout(self.idle_timeout, rx.recv()).await {
                Ok(Some(command)) => command,
                Ok(None) => break,
                Err(_) if self.session.state() == SessionState::SosActive => continue,
                Err(_) => {
                    // Commands still buffered are dropped unanswered; callers retry
                    // against a fresh session
                    rx.close();
                    info!(subject_id = %self.session.subject_id(), "Idle tracking session closed");
                    if let Some(event) = self.session.end(Utc::now()) {
                        self.publish(event).await;
                    }
                    break;
                }
            };

            match command {
                Command::Location { point, at, reply } => {
                    let result = self.session.location_update(&self.registry, point, at);
                    if let Ok(Some(event)) = &result {
                        self.publish(event.clone()).await;
                    }
                    let _ = reply.send(result);
                }
                Command::Alert { alert_type, reply } => {
                    let result = self
                        .session
                        .trigger_alert(&self.registry, &alert_type, Utc::now());
                    if let Ok(alert) = &result {
                        self.arm_timer(alert.alert_id);
                        self.publish(EngineEvent::EscalationRaised {
                            subject_id: self.session.subject_id().to_string(),
                            alert_id: alert.alert_id,
                            decision: alert.decision.clone(),
                            at: alert.raised_at,
                        })
                        .await;
                    }
                    let _ = reply.send(result);
                }
                Command::Acknowledge {
                    alert_id,
                    by,
                    reply,
                } => {
                    let result = self.session.acknowledge(alert_id, &by, Utc::now());
                    let accepted = match result {
                        Ok(Some(event)) => {
                            self.cancel_timer();
                            self.publish(event).await;
                            Ok(true)
                        }
                        Ok(None) => Ok(false),
                        Err(e) => Err(e),
                    };
                    let _ = reply.send(accepted);
                }
                Command::Expire { alert_id } => {
                    if let Some(event) = self.session.expire(alert_id, Utc::now()) {
                        self.timer = None;
                        self.publish(event).await;
                    }
                }
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.session.snapshot());
                }
                Command::End { reply } => {
                    self.cancel_timer();
                    if let Some(event) = self.session.end(Utc::now()) {
                        self.publish(event).await;
                    }
                    let _ = reply.send(());
                    break;
                }
            }
        }
        self.cancel_timer();
        debug!(subject_id = %self.session.subject_id(), "Subject actor stopped");
    }

    async fn publish(&self, event: EngineEvent) {
        if EscalationDispatcher::is_dispatchable(&event) {
            let queue = self.escalations.lock().clone();
            if let Some(tx) = queue {
                // Waits for room rather than dropping an escalation
                if tx.send(event.clone()).await.is_err() {
                    warn!(
                        subject_id = %self.session.subject_id(),
                        kind = event.kind(),
                        "Escalation queue closed, event not dispatched"
                    );
                }
            }
        }
        // No subscribers is fine
        if self.events.send(event).is_err() {
            trace!(subject_id = %self.session.subject_id(), "Event dropped, no subscribers");
        }
    }

    /// Replace any pending deadline with one for `alert_id`
    fn arm_timer(&mut self, alert_id: Uuid) {
        self.cancel_timer();
        let commands = self.commands.clone();
        let timeout = self.ack_timeout;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(Command::Expire { alert_id }).await;
            }
        }));
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Entry point for tracking, alerts and zone administration.
///
/// A subject's session lives from its first location fix or alert until
/// [`end_session`](Self::end_session), or until it has been silent for
/// `idle_timeout` with no SOS open. Either way a `SessionEnded` event is
/// emitted and the next update starts a fresh session.
pub struct SafetyEngine {
    registry: Arc<ZoneRegistry>,
    config: EngineConfig,
    events: broadcast::Sender<EngineEvent>,
    escalations: EscalationQueue,
    subjects: Mutex<HashMap<String, mpsc::Sender<Command>>>,
}

impl SafetyEngine {
    pub fn new(registry: Arc<ZoneRegistry>, config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            registry,
            config,
            events,
            escalations: Arc::new(Mutex::new(None)),
            subjects: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ZoneRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Every engine event; slow receivers lag and lose events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Lossless queue of `EscalationRaised`, `Acknowledged` and
    /// `Unacknowledged` events for the escalation dispatcher.
    ///
    /// When the queue is full the raising subject waits instead of dropping
    /// the event. Only one queue is live; calling this again replaces it.
    pub fn escalations(&self) -> mpsc::Receiver<EngineEvent> {
        let (tx, rx) = mpsc::channel(self.config.escalation_capacity.max(1));
        *self.escalations.lock() = Some(tx);
        rx
    }

    /// Publisher handle for components emitting engine events, e.g. the refresher
    pub fn event_sender(&self) -> broadcast::Sender<EngineEvent> {
        self.events.clone()
    }

    pub fn subject_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .subjects
            .lock()
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn existing(&self, subject_id: &str) -> Option<mpsc::Sender<Command>> {
        self.subjects.lock().get(subject_id).cloned()
    }

    /// Queue for `subject_id`, starting a fresh session if none is live
    fn handle(&self, subject_id: &str) -> mpsc::Sender<Command> {
        let mut subjects = self.subjects.lock();
        if let Some(tx) = subjects.get(subject_id) {
            if !tx.is_closed() {
                return tx.clone();
            }
        }
        // Reclaim entries whose actors closed on idle
        subjects.retain(|_, tx| !tx.is_closed());

        let (tx, rx) = mpsc::channel(self.config.command_capacity.max(1));
        let actor = SubjectActor {
            session: TrackingSession::new(subject_id),
            registry: self.registry.clone(),
            events: self.events.clone(),
            escalations: self.escalations.clone(),
            ack_timeout: self.config.ack_timeout,
            idle_timeout: self.config.idle_timeout,
            commands: tx.downgrade(),
            timer: None,
        };
        tokio::spawn(actor.run(rx));
        subjects.insert(subject_id.to_string(), tx.clone());
        debug!(subject_id, "Subject session created");
        tx
    }

    async fn request<T>(
        &self,
        subject_id: &str,
        tx: mpsc::Sender<Command>,
        command: Command,
        reply: oneshot::Receiver<T>,
    ) -> Result<T> {
        tx.send(command)
            .await
            .map_err(|_| EngineError::SessionEnded(subject_id.to_string()))?;
        reply
            .await
            .map_err(|_| EngineError::SubjectUnavailable(subject_id.to_string()))
    }

    /// Run a command on the live session, opening a new one if the current
    /// actor stopped before taking it. An unanswered command was never applied.
    async fn call<T>(
        &self,
        subject_id: &str,
        command: impl Fn(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        for _ in 0..2 {
            let tx = self.handle(subject_id);
            let (reply, rx) = oneshot::channel();
            if tx.send(command(reply)).await.is_err() {
                continue;
            }
            if let Ok(result) = rx.await {
                return result;
            }
        }
        Err(EngineError::SubjectUnavailable(subject_id.to_string()))
    }

    /// Feed a location fix; returns the transition it caused, if any
    pub async fn location_update(
        &self,
        subject_id: &str,
        point: Coordinate,
        at: DateTime<Utc>,
    ) -> Result<Option<EngineEvent>> {
        if !point.is_valid() {
            return Err(EngineError::InvalidCoordinate {
                lat: point.lat,
                lng: point.lng,
            });
        }
        self.call(subject_id, |reply| Command::Location { point, at, reply })
            .await
    }

    /// Raise an SOS for the subject and start its acknowledgement timer
    pub async fn trigger_alert(&self, subject_id: &str, alert_type: &str) -> Result<ActiveAlert> {
        self.call(subject_id, |reply| Command::Alert {
            alert_type: alert_type.to_string(),
            reply,
        })
        .await
    }

    /// `Ok(false)` when the alert is no longer open or the subject is unknown
    pub async fn acknowledge(&self, subject_id: &str, alert_id: Uuid, by: &str) -> Result<bool> {
        let Some(tx) = self.existing(subject_id) else {
            return Ok(false);
        };
        let (reply, rx) = oneshot::channel();
        let command = Command::Acknowledge {
            alert_id,
            by: by.to_string(),
            reply,
        };
        match self.request(subject_id, tx, command, rx).await {
            Ok(result) => result,
            Err(EngineError::SessionEnded(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Close a session and cancel its timer; `false` if none was live
    pub async fn end_session(&self, subject_id: &str) -> bool {
        let removed = self.subjects.lock().remove(subject_id);
        let Some(tx) = removed else {
            return false;
        };
        let (reply, rx) = oneshot::channel();
        if tx.send(Command::End { reply }).await.is_err() {
            return false;
        }
        let ended = rx.await.is_ok();
        if ended {
            info!(subject_id, "Tracking session closed");
        }
        ended
    }

    pub async fn subject(&self, subject_id: &str) -> Option<TrackedSubject> {
        let tx = self.existing(subject_id)?;
        let (reply, rx) = oneshot::channel();
        self.request(subject_id, tx, Command::Snapshot { reply }, rx)
            .await
            .ok()
    }

    pub fn load_zones(&self, zones: Vec<Zone>) -> Result<u64> {
        Ok(self.registry.load(zones)?)
    }

    pub fn upsert_zone(&self, zone: Zone) -> Result<u64> {
        Ok(self.registry.upsert(zone)?)
    }

    pub fn remove_zone(&self, zone_id: &str) -> bool {
        self.registry.remove(zone_id)
    }
}

impl std::fmt::Debug for SafetyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyEngine")
            .field("registry", &self.registry)
            .field("subjects", &self.subjects.lock().len())
            .finish()
    }
}
