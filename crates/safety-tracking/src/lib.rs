//! Safety Tracking
//!
//! Tracks subjects against the zone registry and runs the SOS lifecycle:
//! - Per-subject sessions with ordered zone transitions
//! - Escalation decisions with a cancellable acknowledgement deadline
//! - Registry refresh with last-known-good fallback
//! - Dispatch of escalation events to notification sinks

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod refresh;
pub mod session;

pub use config::EngineConfig;
pub use dispatch::{ChannelSink, EscalationDispatcher, EscalationSink, LogSink};
pub use engine::SafetyEngine;
pub use error::{EngineError, Result};
pub use events::EngineEvent;
pub use refresh::{RefreshOutcome, RegistryRefresher, StaticZoneSource, ZoneSource};
pub use session::{ActiveAlert, SessionState, TrackedSubject, TrackingSession};
