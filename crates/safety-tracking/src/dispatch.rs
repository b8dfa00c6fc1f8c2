//! Escalation dispatch
//!
//! Forwards alert lifecycle events from the engine's escalation queue to
//! external notification sinks. The queue is separate from the broadcast
//! stream so a slow sink never loses an escalation to lag. A failing sink is
//! logged and skipped so the remaining sinks still see the event.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, Result};
use crate::events::EngineEvent;

/// Receiver of escalation-related events
#[async_trait::async_trait]
pub trait EscalationSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, event: &EngineEvent) -> Result<()>;
}

/// Writes escalations to the tracing log
pub struct LogSink;

#[async_trait::async_trait]
impl EscalationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, event: &EngineEvent) -> Result<()> {
        match event {
            EngineEvent::EscalationRaised {
                subject_id,
                alert_id,
                decision,
                ..
            } => warn!(
                subject_id = %subject_id,
                alert_id = %alert_id,
                responder = %decision.responder_class,
                priority = %decision.priority,
                "Escalation raised"
            ),
            EngineEvent::Unacknowledged {
                subject_id,
                alert_id,
                ..
            } => error!(subject_id = %subject_id, alert_id = %alert_id, "Escalation unacknowledged"),
            other => debug!(kind = other.kind(), "Escalation sink event"),
        }
        Ok(())
    }
}

/// Forwards events into an mpsc channel; used to bridge into other tasks
pub struct ChannelSink {
    name: String,
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelSink {
    pub fn new(name: impl Into<String>, tx: mpsc::Sender<EngineEvent>) -> Self {
        Self {
            name: name.into(),
            tx,
        }
    }
}

#[async_trait::async_trait]
impl EscalationSink for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, event: &EngineEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .await
            .map_err(|_| EngineError::Dispatch {
                sink: self.name.clone(),
                reason: "receiver closed".to_string(),
            })
    }
}

/// Fans escalation events out to every registered sink
#[derive(Default)]
pub struct EscalationDispatcher {
    sinks: Vec<Arc<dyn EscalationSink>>,
}

impl EscalationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn EscalationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Only alert lifecycle events are dispatched
    pub fn is_dispatchable(event: &EngineEvent) -> bool {
        matches!(
            event,
            EngineEvent::EscalationRaised { .. }
                | EngineEvent::Acknowledged { .. }
                | EngineEvent::Unacknowledged { .. }
        )
    }

    /// Deliver to all sinks; returns how many accepted the event
    pub async fn dispatch(&self, event: &EngineEvent) -> usize {
        let mut delivered = 0;
        for sink in &self.sinks {
            match sink.deliver(event).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(sink = sink.name(), error = %e, "Escalation sink failed"),
            }
        }
        delivered
    }

    /// Consume the engine's escalation queue until it closes
    pub fn spawn(self, mut events: mpsc::Receiver<EngineEvent>) -> JoinHandle<()> {
        info!(sinks = ?self.sink_names(), "Escalation dispatcher started");
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if Self::is_dispatchable(&event) {
                    self.dispatch(&event).await;
                }
            }
            debug!("Escalation dispatcher stopped");
        })
    }
}
