//! Outbound engine events
//!
//! Every event serializes to a flat JSON record tagged by `type`, so the
//! data-store and notification collaborators can persist them unchanged.

use chrono::{DateTime, Utc};
use geofence_core::EscalationDecision;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// First location fix of a session; `zone_id` is `None` in open area
    TrackingStarted {
        subject_id: String,
        zone_id: Option<String>,
        at: DateTime<Utc>,
    },
    ZoneTransition {
        subject_id: String,
        from_zone_id: Option<String>,
        to_zone_id: Option<String>,
        at: DateTime<Utc>,
    },
    EscalationRaised {
        subject_id: String,
        alert_id: Uuid,
        decision: EscalationDecision,
        at: DateTime<Utc>,
    },
    Acknowledged {
        subject_id: String,
        alert_id: Uuid,
        by: String,
        at: DateTime<Utc>,
    },
    /// Ack timer elapsed with the alert still open
    Unacknowledged {
        subject_id: String,
        alert_id: Uuid,
        decision: EscalationDecision,
        at: DateTime<Utc>,
    },
    SessionEnded {
        subject_id: String,
        at: DateTime<Utc>,
    },
    /// Refresh failed; lookups keep using `snapshot_version`
    StaleRegistryWarning {
        source: String,
        reason: String,
        snapshot_version: u64,
        at: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::TrackingStarted { .. } => "tracking_started",
            EngineEvent::ZoneTransition { .. } => "zone_transition",
            EngineEvent::EscalationRaised { .. } => "escalation_raised",
            EngineEvent::Acknowledged { .. } => "acknowledged",
            EngineEvent::Unacknowledged { .. } => "unacknowledged",
            EngineEvent::SessionEnded { .. } => "session_ended",
            EngineEvent::StaleRegistryWarning { .. } => "stale_registry_warning",
        }
    }

    /// Subject the event belongs to; registry warnings have none
    pub fn subject_id(&self) -> Option<&str> {
        match self {
            EngineEvent::TrackingStarted { subject_id, .. }
            | EngineEvent::ZoneTransition { subject_id, .. }
            | EngineEvent::EscalationRaised { subject_id, .. }
            | EngineEvent::Acknowledged { subject_id, .. }
            | EngineEvent::Unacknowledged { subject_id, .. }
            | EngineEvent::SessionEnded { subject_id, .. } => Some(subject_id),
            EngineEvent::StaleRegistryWarning { .. } => None,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            EngineEvent::TrackingStarted { at, .. }
            | EngineEvent::ZoneTransition { at, .. }
            | EngineEvent::EscalationRaised { at, .. }
            | EngineEvent::Acknowledged { at, .. }
            | EngineEvent::Unacknowledged { at, .. }
            | EngineEvent::SessionEnded { at, .. }
            | EngineEvent::StaleRegistryWarning { at, .. } => *at,
        }
    }
}
