//! Escalation Resolver
//!
//! Total decision table mapping (zone kind | open area, alert type) to a
//! responder class and priority.
//!
//! | Zone kind      | Responder | Priority |
//! |----------------|-----------|----------|
//! | `danger`       | ranger    | critical |
//! | `restricted`   | ranger    | high     |
//! | `tourist_zone` | police    | medium   |
//! | `safe`         | police    | low      |
//! | open area      | police    | medium   |
//!
//! A `panic` alert raises the priority one level, capped at critical.

use serde::{Deserialize, Serialize};

use crate::zone::{Zone, ZoneKind};

/// Alert type that escalates priority one level
pub const PANIC_ALERT: &str = "panic";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResponderClass {
    Police,
    Ranger,
}

impl std::fmt::Display for ResponderClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponderClass::Police => write!(f, "police"),
            ResponderClass::Ranger => write!(f, "ranger"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// One level up, saturating at `Critical`
    pub fn escalate(self) -> Self {
        match self {
            Priority::Low => Priority::Medium,
            Priority::Medium => Priority::High,
            Priority::High | Priority::Critical => Priority::Critical,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

/// What produced a decision, kept for audit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EscalationReason {
    /// `None` for open area
    pub zone_kind: Option<ZoneKind>,
    pub zone_id: Option<String>,
    pub alert_type: String,
}

/// Immutable escalation outcome for one alert
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EscalationDecision {
    pub responder_class: ResponderClass,
    pub priority: Priority,
    pub reason: EscalationReason,
}

/// Base row of the decision table
pub fn base_decision(kind: Option<ZoneKind>) -> (ResponderClass, Priority) {
    match kind {
        Some(ZoneKind::Danger) => (ResponderClass::Ranger, Priority::Critical),
        Some(ZoneKind::Restricted) => (ResponderClass::Ranger, Priority::High),
        Some(ZoneKind::TouristZone) => (ResponderClass::Police, Priority::Medium),
        Some(ZoneKind::Safe) => (ResponderClass::Police, Priority::Low),
        None => (ResponderClass::Police, Priority::Medium),
    }
}

pub fn is_panic(alert_type: &str) -> bool {
    alert_type.trim().eq_ignore_ascii_case(PANIC_ALERT)
}

/// Decide responder and priority for an alert raised in `zone`
pub fn decide(zone: Option<&Zone>, alert_type: &str) -> EscalationDecision {
    let (responder_class, base) = base_decision(zone.map(|z| z.kind));
    let priority = if is_panic(alert_type) { base.escalate() } else { base };

    EscalationDecision {
        responder_class,
        priority,
        reason: EscalationReason {
            zone_kind: zone.map(|z| z.kind),
            zone_id: zone.map(|z| z.id.clone()),
            alert_type: alert_type.to_string(),
        },
    }
}
