//! # Lab Core
//!
//! Experiment state machine and laboratory scheduler.
//!
//! ## Architecture
//!
//! ```text
//! Laboratory::run_all
//!   ├── sequential: run_experiment(id) one at a time
//!   └── parallel:   batches of max_parallel, barrier between batches
//!         └── run_experiment(id)
//!               ├── tokio::spawn(Experiment::run_with(token))
//!               └── raced against the experiment timeout
//! ```
//!
//! Experiment failures are recorded as [`ExperimentResult`]s. Only registry
//! misuse and internal scheduler failures surface as [`LabError`].

pub mod cancel;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod experiment;
pub mod laboratory;
pub mod types;

pub use cancel::CancellationToken;
pub use config::{ConfigError, LaboratoryConfig};
pub use context::RunContext;
pub use error::{HookStage, LabError};
pub use events::{EventBus, EventSink, LabEvent, NullSink};
pub use experiment::{Experiment, HookFuture};
pub use laboratory::{ExperimentHandle, Laboratory};
pub use types::{
    ExperimentId, ExperimentResult, ExperimentState, LabReport, LaboratoryState, LaboratoryStats,
};

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::LaboratoryConfig;
    pub use crate::context::RunContext;
    pub use crate::error::LabError;
    pub use crate::events::{EventSink, LabEvent};
    pub use crate::experiment::Experiment;
    pub use crate::laboratory::Laboratory;
    pub use crate::types::{ExperimentResult, ExperimentState, LabReport, LaboratoryState};
    pub use lab_hypothesis::prelude::*;
}
