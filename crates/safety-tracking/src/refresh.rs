//! Zone registry refresh
//!
//! Periodically pulls zone definitions from a [`ZoneSource`] and swaps them
//! into the registry. A fetch that fails, times out, or returns zones that do
//! not validate leaves the last-known-good snapshot in place and publishes a
//! `StaleRegistryWarning` instead.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use geofence_core::{Zone, ZoneRegistry};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::events::EngineEvent;

/// Provider of a complete zone set
#[async_trait::async_trait]
pub trait ZoneSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<Zone>>;
}

/// Fixed in-memory zone set
pub struct StaticZoneSource {
    zones: Vec<Zone>,
}

impl StaticZoneSource {
    pub fn new(zones: Vec<Zone>) -> Self {
        Self { zones }
    }
}

#[async_trait::async_trait]
impl ZoneSource for StaticZoneSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<Vec<Zone>> {
        Ok(self.zones.clone())
    }
}

/// Outcome of one refresh attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated { version: u64, zones: usize },
    /// Registry left on `version`
    Stale { version: u64 },
}

pub struct RegistryRefresher {
    source: Arc<dyn ZoneSource>,
    registry: Arc<ZoneRegistry>,
    events: broadcast::Sender<EngineEvent>,
    timeout: Duration,
}

impl RegistryRefresher {
    pub fn new(
        source: Arc<dyn ZoneSource>,
        registry: Arc<ZoneRegistry>,
        events: broadcast::Sender<EngineEvent>,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            registry,
            events,
            timeout,
        }
    }

    async fn fetch_bounded(&self) -> Result<Vec<Zone>> {
        match tokio::time::timeout(self.timeout, self.source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Source {
                name: self.source.name().to_string(),
                reason: format!("timed out after {:?}", self.timeout),
            }),
        }
    }

    /// Fetch and swap once; never fails, degrades to the current snapshot
    pub async fn refresh_once(&self) -> RefreshOutcome {
        let fetched = self.fetch_bounded().await;
        let applied = fetched.and_then(|zones| {
            let count = zones.len();
            self.registry
                .load(zones)
                .map(|version| (version, count))
                .map_err(EngineError::from)
        });

        match applied {
            Ok((version, zones)) => {
                info!(source = self.source.name(), version, zones, "Zone registry refreshed");
                RefreshOutcome::Updated { version, zones }
            }
            Err(e) => {
                let version = self.registry.version();
                warn!(
                    source = self.source.name(),
                    error = %e,
                    version,
                    "Zone refresh failed, serving last known snapshot"
                );
                let _ = self.events.send(EngineEvent::StaleRegistryWarning {
                    source: self.source.name().to_string(),
                    reason: e.to_string(),
                    snapshot_version: version,
                    at: Utc::now(),
                });
                RefreshOutcome::Stale { version }
            }
        }
    }

    /// Refresh every `interval`, starting one interval from now
    ///
    /// Call [`refresh_once`](Self::refresh_once) first for an initial load.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let outcome = self.refresh_once().await;
                debug!(?outcome, "Refresh tick");
            }
        })
    }
}
