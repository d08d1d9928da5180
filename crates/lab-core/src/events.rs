//! Laboratory notifications
//!
//! The laboratory publishes a [`LabEvent`] at every lifecycle transition
//! through an injected [`EventSink`]. The default sink is an [`EventBus`]
//! backed by a tokio broadcast channel; publishing never blocks and events
//! sent with no subscriber are dropped.

use crate::types::{ExperimentId, ExperimentResult, LaboratoryStats};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default broadcast channel capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Event published by a laboratory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum LabEvent {
    /// Experiment added to the registry
    #[serde(rename = "experiment:registered")]
    ExperimentRegistered {
        /// Experiment ID
        experiment_id: ExperimentId,
    },
    /// Experiment removed from the registry
    #[serde(rename = "experiment:unregistered")]
    ExperimentUnregistered {
        /// Experiment ID
        experiment_id: ExperimentId,
    },
    /// `run_all` began
    #[serde(rename = "started")]
    Started {
        /// Laboratory name
        laboratory: String,
        /// Experiments scheduled
        experiments: usize,
    },
    /// One experiment began
    #[serde(rename = "experiment:started")]
    ExperimentStarted {
        /// Experiment ID
        experiment_id: ExperimentId,
    },
    /// Experiment settled on its own, passing or failing
    #[serde(rename = "experiment:completed")]
    ExperimentCompleted {
        /// Experiment ID
        experiment_id: ExperimentId,
        /// Recorded result
        result: ExperimentResult,
    },
    /// Experiment timed out or its task ended abnormally
    #[serde(rename = "experiment:failed")]
    ExperimentFailed {
        /// Experiment ID
        experiment_id: ExperimentId,
        /// Failure text
        error: String,
        /// Recorded result
        result: ExperimentResult,
    },
    /// `run_all` finished
    #[serde(rename = "completed")]
    Completed {
        /// Laboratory name
        laboratory: String,
        /// Final statistics
        stats: LaboratoryStats,
    },
    /// `run_all` hit an internal failure
    #[serde(rename = "failed")]
    Failed {
        /// Laboratory name
        laboratory: String,
        /// Failure text
        error: String,
    },
    /// Run paused
    #[serde(rename = "paused")]
    Paused {
        /// Laboratory name
        laboratory: String,
    },
    /// Run resumed
    #[serde(rename = "resumed")]
    Resumed {
        /// Laboratory name
        laboratory: String,
    },
    /// Run stopped
    #[serde(rename = "stopped")]
    Stopped {
        /// Laboratory name
        laboratory: String,
    },
    /// Registry and results cleared
    #[serde(rename = "cleared")]
    Cleared {
        /// Laboratory name
        laboratory: String,
    },
    /// Every idle experiment torn down and reset
    #[serde(rename = "cleaned-up")]
    CleanedUp {
        /// Laboratory name
        laboratory: String,
        /// Experiments skipped because they were still busy
        skipped: Vec<ExperimentId>,
    },
}

impl LabEvent {
    /// Topic name, as used on the wire
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            Self::ExperimentRegistered { .. } => "experiment:registered",
            Self::ExperimentUnregistered { .. } => "experiment:unregistered",
            Self::Started { .. } => "started",
            Self::ExperimentStarted { .. } => "experiment:started",
            Self::ExperimentCompleted { .. } => "experiment:completed",
            Self::ExperimentFailed { .. } => "experiment:failed",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Paused { .. } => "paused",
            Self::Resumed { .. } => "resumed",
            Self::Stopped { .. } => "stopped",
            Self::Cleared { .. } => "cleared",
            Self::CleanedUp { .. } => "cleaned-up",
        }
    }

    /// Experiment the event concerns, if any
    #[must_use]
    pub fn experiment_id(&self) -> Option<&str> {
        match self {
            Self::ExperimentRegistered { experiment_id }
            | Self::ExperimentUnregistered { experiment_id }
            | Self::ExperimentStarted { experiment_id }
            | Self::ExperimentCompleted { experiment_id, .. }
            | Self::ExperimentFailed { experiment_id, .. } => Some(experiment_id),
            _ => None,
        }
    }
}

/// Destination for laboratory events
pub trait EventSink: Send + Sync {
    /// Publish one event; must not block
    fn publish(&self, event: LabEvent);
}

/// Sink that discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: LabEvent) {}
}

/// Broadcast event bus
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LabEvent>,
}

impl EventBus {
    /// Create bus with default capacity
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create bus with `capacity` buffered events per subscriber
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LabEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: LabEvent) {
        tracing::trace!(topic = event.topic(), "publishing event");
        // No receivers is not an error
        let _ = self.sender.send(event);
    }
}
