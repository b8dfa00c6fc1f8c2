//! Zone feeds for the registry refresher
//!
//! | Source | Variable | Format |
//! |--------|----------|--------|
//! | File | `SAFETY_ZONES_PATH` | JSON records or GeoJSON |
//! | HTTP | `SAFETY_ZONES_URL` | JSON records or GeoJSON |

use std::path::PathBuf;

use geofence_core::Zone;
use safety_tracking::{EngineError, ZoneSource};
use tracing::debug;

fn source_error(name: &str, reason: impl ToString) -> EngineError {
    EngineError::Source {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Zone file re-read on every refresh
pub struct FileZoneSource {
    path: PathBuf,
}

impl FileZoneSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl ZoneSource for FileZoneSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch(&self) -> safety_tracking::Result<Vec<Zone>> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| source_error(self.name(), e))?;
        let report = zone_tools::parse_zones(&text).map_err(|e| source_error(self.name(), e))?;
        debug!(path = ?self.path, zones = report.zones.len(), skipped = report.skipped, "Zone file read");
        Ok(report.zones)
    }
}

/// Remote zone feed
pub struct HttpZoneSource {
    client: reqwest::Client,
    url: String,
}

impl HttpZoneSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait::async_trait]
impl ZoneSource for HttpZoneSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self) -> safety_tracking::Result<Vec<Zone>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| source_error(self.name(), e))?;
        let text = response
            .text()
            .await
            .map_err(|e| source_error(self.name(), e))?;
        let report = zone_tools::parse_zones(&text).map_err(|e| source_error(self.name(), e))?;
        debug!(url = %self.url, zones = report.zones.len(), skipped = report.skipped, "Zone feed fetched");
        Ok(report.zones)
    }
}
