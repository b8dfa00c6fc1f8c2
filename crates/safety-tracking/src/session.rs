//! Tracking Session State Machine
//!
//! One session per tracked subject:
//!
//! ```text
//! Uninitialized -> Tracking -> (SosActive) -> Tracking -> Ended
//! ```
//!
//! The session is synchronous and owns no timers. The engine actor drives it
//! and schedules the acknowledgement deadline; a stale deadline is recognised
//! by its `alert_id` and ignored.

use chrono::{DateTime, Utc};
use geofence_core::{decide, Coordinate, EscalationDecision, ZoneRegistry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::events::EngineEvent;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No location received yet
    Uninitialized,
    Tracking,
    /// An SOS is open and waiting for acknowledgement
    SosActive,
    /// Terminal
    Ended,
}

/// Open SOS alert awaiting acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveAlert {
    pub alert_id: Uuid,
    pub alert_type: String,
    pub decision: EscalationDecision,
    pub raised_at: DateTime<Utc>,
}

/// Read-only view of a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedSubject {
    pub subject_id: String,
    pub state: SessionState,
    pub current_zone_id: Option<String>,
    pub last_location: Option<Coordinate>,
    pub last_update_at: Option<DateTime<Utc>>,
    pub last_transition_at: Option<DateTime<Utc>>,
    pub active_alert: Option<ActiveAlert>,
}

#[derive(Debug)]
pub struct TrackingSession {
    subject_id: String,
    state: SessionState,
    current_zone_id: Option<String>,
    last_location: Option<Coordinate>,
    last_update_at: Option<DateTime<Utc>>,
    last_transition_at: Option<DateTime<Utc>>,
    active_alert: Option<ActiveAlert>,
}

impl TrackingSession {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            state: SessionState::Uninitialized,
            current_zone_id: None,
            last_location: None,
            last_update_at: None,
            last_transition_at: None,
            active_alert: None,
        }
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_zone_id(&self) -> Option<&str> {
        self.current_zone_id.as_deref()
    }

    pub fn active_alert(&self) -> Option<&ActiveAlert> {
        self.active_alert.as_ref()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == SessionState::Ended {
            return Err(EngineError::SessionEnded(self.subject_id.clone()));
        }
        Ok(())
    }

    /// State to fall back to once an alert closes
    fn settled_state(&self) -> SessionState {
        if self.last_location.is_some() {
            SessionState::Tracking
        } else {
            SessionState::Uninitialized
        }
    }

    /// Apply a location fix
    ///
    /// The first fix yields `TrackingStarted`; later fixes yield a
    /// `ZoneTransition` only when the resolved zone differs. This is the
    /// only path that changes `current_zone_id`.
    pub fn location_update(
        &mut self,
        registry: &ZoneRegistry,
        point: Coordinate,
        at: DateTime<Utc>,
    ) -> Result<Option<EngineEvent>> {
        self.ensure_open()?;
        if !point.is_valid() {
            return Err(EngineError::InvalidCoordinate {
                lat: point.lat,
                lng: point.lng,
            });
        }

        let zone_id = registry.lookup(&point).map(|z| z.id.clone());
        let first_fix = self.last_location.is_none();
        self.last_location = Some(point);
        self.last_update_at = Some(at);
        if self.state == SessionState::Uninitialized {
            self.state = SessionState::Tracking;
        }

        if first_fix {
            info!(subject_id = %self.subject_id, zone_id = ?zone_id, "Tracking started");
            self.current_zone_id = zone_id.clone();
            self.last_transition_at = Some(at);
            return Ok(Some(EngineEvent::TrackingStarted {
                subject_id: self.subject_id.clone(),
                zone_id,
                at,
            }));
        }

        if zone_id == self.current_zone_id {
            return Ok(None);
        }

        let from_zone_id = std::mem::replace(&mut self.current_zone_id, zone_id.clone());
        self.last_transition_at = Some(at);
        info!(
            subject_id = %self.subject_id,
            from = ?from_zone_id,
            to = ?zone_id,
            "Zone transition"
        );
        Ok(Some(EngineEvent::ZoneTransition {
            subject_id: self.subject_id.clone(),
            from_zone_id,
            to_zone_id: zone_id,
            at,
        }))
    }

    /// Raise an SOS from the subject's current zone
    ///
    /// A zone removed since the last fix resolves as open area. A second
    /// alert while one is open supersedes it.
    pub fn trigger_alert(
        &mut self,
        registry: &ZoneRegistry,
        alert_type: &str,
        at: DateTime<Utc>,
    ) -> Result<ActiveAlert> {
        self.ensure_open()?;

        let zone = self
            .current_zone_id
            .as_deref()
            .and_then(|id| registry.get(id));
        let decision = decide(zone.as_deref(), alert_type);

        if let Some(previous) = &self.active_alert {
            debug!(
                subject_id = %self.subject_id,
                superseded = %previous.alert_id,
                "Open alert superseded"
            );
        }

        let alert = ActiveAlert {
            alert_id: Uuid::new_v4(),
            alert_type: alert_type.to_string(),
            decision,
            raised_at: at,
        };
        info!(
            subject_id = %self.subject_id,
            alert_id = %alert.alert_id,
            responder = %alert.decision.responder_class,
            priority = %alert.decision.priority,
            "SOS raised"
        );
        self.active_alert = Some(alert.clone());
        self.state = SessionState::SosActive;
        Ok(alert)
    }

    /// Close the open alert on operator acknowledgement
    ///
    /// Returns `None` when `alert_id` is not the open alert, e.g. after the
    /// timer already fired.
    pub fn acknowledge(
        &mut self,
        alert_id: Uuid,
        by: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<EngineEvent>> {
        self.ensure_open()?;
        if !self.is_open_alert(alert_id) {
            debug!(subject_id = %self.subject_id, %alert_id, "Acknowledgement for closed alert ignored");
            return Ok(None);
        }

        self.active_alert = None;
        self.state = self.settled_state();
        info!(subject_id = %self.subject_id, %alert_id, by, "SOS acknowledged");
        Ok(Some(EngineEvent::Acknowledged {
            subject_id: self.subject_id.clone(),
            alert_id,
            by: by.to_string(),
            at,
        }))
    }

    /// Acknowledgement deadline elapsed; no-op unless `alert_id` is still open
    pub fn expire(&mut self, alert_id: Uuid, at: DateTime<Utc>) -> Option<EngineEvent> {
        if self.state == SessionState::Ended || !self.is_open_alert(alert_id) {
            return None;
        }

        let alert = self.active_alert.take()?;
        self.state = self.settled_state();
        warn!(subject_id = %self.subject_id, %alert_id, "SOS unacknowledged");
        Some(EngineEvent::Unacknowledged {
            subject_id: self.subject_id.clone(),
            alert_id,
            decision: alert.decision,
            at,
        })
    }

    /// Close the session; ending twice yields nothing the second time
    pub fn end(&mut self, at: DateTime<Utc>) -> Option<EngineEvent> {
        if self.state == SessionState::Ended {
            return None;
        }
        self.state = SessionState::Ended;
        self.active_alert = None;
        info!(subject_id = %self.subject_id, "Session ended");
        Some(EngineEvent::SessionEnded {
            subject_id: self.subject_id.clone(),
            at,
        })
    }

    fn is_open_alert(&self, alert_id: Uuid) -> bool {
        self.active_alert
            .as_ref()
            .map(|a| a.alert_id == alert_id)
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> TrackedSubject {
        TrackedSubject {
            subject_id: self.subject_id.clone(),
            state: self.state,
            current_zone_id: self.current_zone_id.clone(),
            last_location: self.last_location,
            last_update_at: self.last_update_at,
            last_transition_at: self.last_transition_at,
            active_alert: self.active_alert.clone(),
        }
    }
}
