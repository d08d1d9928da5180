//! Laboratory scheduler
//!
//! Owns a registry of experiments (registration order preserved) and the
//! latest result per experiment. `run_all` drives every runnable experiment
//! either one at a time or in fixed-size batches separated by a barrier: a
//! slow experiment holds back the next batch even when other slots are idle.
//!
//! Every experiment runs on its own task raced against its timeout. A timeout
//! records a failed result and cancels the experiment's token; the task is
//! left to reach its next checkpoint on its own.
//!
//! `pause`, `resume` and `stop` are consulted between experiments (sequential)
//! or between batches (parallel), never mid-experiment.

use crate::cancel::CancellationToken;
use crate::config::LaboratoryConfig;
use crate::error::LabError;
use crate::events::{EventBus, EventSink, LabEvent};
use crate::experiment::{millis, Experiment};
use crate::types::{ExperimentId, ExperimentResult, LabReport, LaboratoryState, LaboratoryStats};
use dashmap::DashMap;
use futures::future::join_all;
use indexmap::IndexMap;
use lab_hypothesis::panic_message;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex as AsyncMutex, Notify};
use tokio::task::JoinError;
use tokio::time::Instant;

/// Shared, lockable experiment
pub type ExperimentHandle = Arc<AsyncMutex<Experiment>>;

struct Entry {
    name: String,
    only: bool,
    timeout: Option<Duration>,
    experiment: ExperimentHandle,
}

#[derive(Debug, Default, Clone, Copy)]
struct RunWindow {
    started: Option<Instant>,
    finished: Option<Instant>,
}

impl RunWindow {
    fn duration_ms(&self) -> u64 {
        match (self.started, self.finished) {
            (Some(started), Some(finished)) => millis(finished.duration_since(started)),
            (Some(started), None) => millis(started.elapsed()),
            _ => 0,
        }
    }
}

/// Experiment registry and scheduler
///
/// All operations take `&self`; share the laboratory behind an `Arc` to
/// pause or stop a run from another task.
pub struct Laboratory {
    config: LaboratoryConfig,
    registry: RwLock<IndexMap<ExperimentId, Entry>>,
    results: RwLock<HashMap<ExperimentId, ExperimentResult>>,
    state: RwLock<LaboratoryState>,
    resume: Notify,
    in_flight: DashMap<ExperimentId, CancellationToken>,
    window: Mutex<RunWindow>,
    events: Arc<dyn EventSink>,
    bus: Option<EventBus>,
}

impl Laboratory {
    /// Create laboratory publishing to its own [`EventBus`]
    #[must_use]
    pub fn new(config: LaboratoryConfig) -> Self {
        let bus = EventBus::new();
        let mut lab = Self::with_events(config, Arc::new(bus.clone()));
        lab.bus = Some(bus);
        lab
    }

    /// Create laboratory publishing to `events`
    #[must_use]
    pub fn with_events(config: LaboratoryConfig, events: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            registry: RwLock::new(IndexMap::new()),
            results: RwLock::new(HashMap::new()),
            state: RwLock::new(LaboratoryState::Idle),
            resume: Notify::new(),
            in_flight: DashMap::new(),
            window: Mutex::new(RunWindow::default()),
            events,
            bus: None,
        }
    }

    /// Get name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &LaboratoryConfig {
        &self.config
    }

    /// Get state
    #[must_use]
    pub fn state(&self) -> LaboratoryState {
        *self.state.read()
    }

    /// Subscribe to events, when publishing to the built-in bus
    #[must_use]
    pub fn subscribe(&self) -> Option<broadcast::Receiver<LabEvent>> {
        self.bus.as_ref().map(EventBus::subscribe)
    }

    /// Add experiment to the registry
    ///
    /// # Errors
    /// - `LabError::DuplicateRegistration` if the ID is taken; the registry is
    ///   left untouched
    pub fn register_experiment(&self, experiment: Experiment) -> Result<(), LabError> {
        let id = experiment.id().to_string();
        {
            let mut registry = self.registry.write();
            if registry.contains_key(&id) {
                return Err(LabError::DuplicateRegistration(id));
            }
            registry.insert(
                id.clone(),
                Entry {
                    name: experiment.name().to_string(),
                    only: experiment.is_only(),
                    timeout: experiment.timeout(),
                    experiment: Arc::new(AsyncMutex::new(experiment)),
                },
            );
        }

        tracing::debug!(laboratory = %self.config.name, experiment = %id, "experiment registered");
        self.events
            .publish(LabEvent::ExperimentRegistered { experiment_id: id });
        Ok(())
    }

    /// Remove experiment and its stored result
    ///
    /// # Errors
    /// - `LabError::UnknownExperiment` if no experiment has this ID
    pub fn unregister_experiment(&self, id: &str) -> Result<(), LabError> {
        if self.registry.write().shift_remove(id).is_none() {
            return Err(LabError::UnknownExperiment(id.to_string()));
        }
        self.results.write().remove(id);

        tracing::debug!(laboratory = %self.config.name, experiment = %id, "experiment unregistered");
        self.events.publish(LabEvent::ExperimentUnregistered {
            experiment_id: id.to_string(),
        });
        Ok(())
    }

    /// Run one experiment and store its result
    ///
    /// A timeout or an abnormal end of the experiment task is recorded as a
    /// failed result rather than returned as an error.
    ///
    /// # Errors
    /// - `LabError::UnknownExperiment` if no experiment has this ID
    pub async fn run_experiment(&self, id: &str) -> Result<ExperimentResult, LabError> {
        let (name, timeout, experiment) = self.lookup(id)?;
        let token = CancellationToken::new();
        self.in_flight.insert(id.to_string(), token.clone());

        tracing::debug!(experiment = %id, timeout_ms = millis(timeout), "experiment started");
        self.events.publish(LabEvent::ExperimentStarted {
            experiment_id: id.to_string(),
        });

        let task = tokio::spawn({
            let token = token.clone();
            async move { experiment.lock().await.run_with(token).await }
        });
        let outcome = tokio::time::timeout(timeout, task).await;
        self.in_flight.remove(id);

        let result = match outcome {
            Ok(Ok(result)) => {
                self.events.publish(LabEvent::ExperimentCompleted {
                    experiment_id: id.to_string(),
                    result: result.clone(),
                });
                result
            }
            Ok(Err(join_error)) => {
                let err = LabError::TaskAborted(describe_join_error(join_error));
                tracing::error!(experiment = %id, error = %err, "experiment task aborted");
                self.failed(id, &name, &err, 0)
            }
            Err(_elapsed) => {
                token.cancel();
                let err = LabError::ExperimentTimeout {
                    id: id.to_string(),
                    timeout_ms: millis(timeout),
                };
                tracing::warn!(experiment = %id, error = %err, "experiment timed out");
                self.failed(id, &name, &err, millis(timeout))
            }
        };

        self.results.write().insert(id.to_string(), result.clone());
        Ok(result)
    }

    /// Run every runnable experiment and build a report
    ///
    /// When any experiment is marked `only`, the others are left without a
    /// result and count as skipped. Results from a previous run are cleared.
    ///
    /// # Errors
    /// - `LabError::ReentrantRun` if a run is already in progress
    /// - Any internal scheduler failure; the laboratory is left `failed`
    pub async fn run_all(&self) -> Result<LabReport, LabError> {
        self.begin_run()?;
        let ids = self.runnable_ids();

        tracing::info!(
            laboratory = %self.config.name,
            experiments = ids.len(),
            parallel = self.config.parallel,
            "run started"
        );
        self.events.publish(LabEvent::Started {
            laboratory: self.config.name.clone(),
            experiments: ids.len(),
        });

        if let Err(err) = self.execute(&ids).await {
            self.window.lock().finished = Some(Instant::now());
            *self.state.write() = LaboratoryState::Failed;
            tracing::error!(laboratory = %self.config.name, error = %err, "run failed");
            self.events.publish(LabEvent::Failed {
                laboratory: self.config.name.clone(),
                error: err.to_string(),
            });
            return Err(err);
        }

        self.window.lock().finished = Some(Instant::now());
        let completed = self.finish_run();
        let report = self.report();

        if completed {
            tracing::info!(
                laboratory = %self.config.name,
                passed = report.stats.passed,
                failed = report.stats.failed,
                skipped = report.stats.skipped,
                duration_ms = report.duration_ms,
                "run completed"
            );
            self.events.publish(LabEvent::Completed {
                laboratory: self.config.name.clone(),
                stats: report.stats,
            });
            if self.config.auto_cleanup {
                self.cleanup().await;
            }
        } else {
            tracing::info!(laboratory = %self.config.name, "run stopped early");
        }
        Ok(report)
    }

    /// Suspend the current run at the next checkpoint
    ///
    /// # Errors
    /// - `LabError::InvalidState` unless the laboratory is running
    pub fn pause(&self) -> Result<(), LabError> {
        self.transition("pause", LaboratoryState::Running, LaboratoryState::Paused)?;
        tracing::info!(laboratory = %self.config.name, "run paused");
        self.events.publish(LabEvent::Paused {
            laboratory: self.config.name.clone(),
        });
        Ok(())
    }

    /// Continue a paused run
    ///
    /// # Errors
    /// - `LabError::InvalidState` unless the laboratory is paused
    pub fn resume(&self) -> Result<(), LabError> {
        self.transition("resume", LaboratoryState::Paused, LaboratoryState::Running)?;
        self.resume.notify_waiters();
        tracing::info!(laboratory = %self.config.name, "run resumed");
        self.events.publish(LabEvent::Resumed {
            laboratory: self.config.name.clone(),
        });
        Ok(())
    }

    /// Stop scheduling further experiments
    ///
    /// Experiments already executing finish normally.
    pub fn stop(&self) {
        *self.state.write() = LaboratoryState::Idle;
        self.in_flight.clear();
        self.resume.notify_waiters();
        tracing::info!(laboratory = %self.config.name, "run stopped");
        self.events.publish(LabEvent::Stopped {
            laboratory: self.config.name.clone(),
        });
    }

    /// Remove every experiment and result
    ///
    /// # Errors
    /// - `LabError::InvalidState` while a run is in progress
    pub fn clear(&self) -> Result<(), LabError> {
        let state = self.state();
        if matches!(state, LaboratoryState::Running | LaboratoryState::Paused) {
            return Err(LabError::InvalidState {
                action: "clear",
                state,
            });
        }
        self.registry.write().clear();
        self.results.write().clear();
        *self.window.lock() = RunWindow::default();

        self.events.publish(LabEvent::Cleared {
            laboratory: self.config.name.clone(),
        });
        Ok(())
    }

    /// Tear down and reset every experiment
    ///
    /// Experiments still locked by a running or timed-out task are skipped.
    /// Returns the IDs that were skipped.
    pub async fn cleanup(&self) -> Vec<ExperimentId> {
        let handles: Vec<(ExperimentId, ExperimentHandle)> = self
            .registry
            .read()
            .iter()
            .map(|(id, entry)| (id.clone(), Arc::clone(&entry.experiment)))
            .collect();

        let mut skipped = Vec::new();
        for (id, handle) in handles {
            match handle.try_lock() {
                Ok(mut experiment) => experiment.cleanup().await,
                Err(_) => {
                    tracing::warn!(experiment = %id, "experiment busy, skipping cleanup");
                    skipped.push(id);
                }
            }
        }

        tracing::debug!(laboratory = %self.config.name, skipped = skipped.len(), "cleanup finished");
        self.events.publish(LabEvent::CleanedUp {
            laboratory: self.config.name.clone(),
            skipped: skipped.clone(),
        });
        skipped
    }

    /// Derived statistics for the registry and stored results
    #[must_use]
    pub fn stats(&self) -> LaboratoryStats {
        let total = self.registry.read().len();
        let duration_ms = self.window.lock().duration_ms();
        let results = self.results.read();
        LaboratoryStats::derive(total, results.values(), duration_ms)
    }

    /// Report over the stored results
    #[must_use]
    pub fn report(&self) -> LabReport {
        LabReport::new(self.config.name.clone(), self.stats(), self.results())
    }

    /// Stored results in registration order
    #[must_use]
    pub fn results(&self) -> Vec<ExperimentResult> {
        let registry = self.registry.read();
        let results = self.results.read();
        registry
            .keys()
            .filter_map(|id| results.get(id).cloned())
            .collect()
    }

    /// Stored result for one experiment
    #[must_use]
    pub fn result(&self, id: &str) -> Option<ExperimentResult> {
        self.results.read().get(id).cloned()
    }

    /// Registered IDs in registration order
    #[must_use]
    pub fn experiment_ids(&self) -> Vec<ExperimentId> {
        self.registry.read().keys().cloned().collect()
    }

    /// Handle to a registered experiment
    #[must_use]
    pub fn experiment(&self, id: &str) -> Option<ExperimentHandle> {
        self.registry
            .read()
            .get(id)
            .map(|entry| Arc::clone(&entry.experiment))
    }

    /// IDs of experiments currently executing
    #[must_use]
    pub fn in_flight(&self) -> Vec<ExperimentId> {
        self.in_flight.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of registered experiments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.read().len()
    }

    /// Whether no experiment is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.read().is_empty()
    }

    fn lookup(&self, id: &str) -> Result<(String, Duration, ExperimentHandle), LabError> {
        let registry = self.registry.read();
        let entry = registry
            .get(id)
            .ok_or_else(|| LabError::UnknownExperiment(id.to_string()))?;
        Ok((
            entry.name.clone(),
            entry.timeout.unwrap_or_else(|| self.config.default_timeout()),
            Arc::clone(&entry.experiment),
        ))
    }

    fn runnable_ids(&self) -> Vec<ExperimentId> {
        let registry = self.registry.read();
        let focused = registry.values().any(|entry| entry.only);
        registry
            .iter()
            .filter(|(_, entry)| !focused || entry.only)
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn begin_run(&self) -> Result<(), LabError> {
        {
            let mut state = self.state.write();
            if matches!(*state, LaboratoryState::Running | LaboratoryState::Paused) {
                return Err(LabError::ReentrantRun);
            }
            *state = LaboratoryState::Running;
        }
        self.results.write().clear();
        *self.window.lock() = RunWindow {
            started: Some(Instant::now()),
            finished: None,
        };
        Ok(())
    }

    /// Returns false when the run was stopped
    ///
    /// A pause that arrives after the last checkpoint has nothing left to
    /// hold back, so the run still completes.
    fn finish_run(&self) -> bool {
        let mut state = self.state.write();
        if matches!(*state, LaboratoryState::Running | LaboratoryState::Paused) {
            *state = LaboratoryState::Completed;
            true
        } else {
            false
        }
    }

    fn transition(
        &self,
        action: &'static str,
        from: LaboratoryState,
        to: LaboratoryState,
    ) -> Result<(), LabError> {
        let mut state = self.state.write();
        if *state != from {
            return Err(LabError::InvalidState {
                action,
                state: *state,
            });
        }
        *state = to;
        Ok(())
    }

    async fn execute(&self, ids: &[ExperimentId]) -> Result<(), LabError> {
        if self.config.parallel {
            let batch_size = self.config.max_parallel.max(1);
            for (index, batch) in ids.chunks(batch_size).enumerate() {
                if !self.checkpoint().await {
                    break;
                }
                tracing::debug!(batch = index, size = batch.len(), "running batch");
                let outcomes = join_all(batch.iter().map(|id| self.run_experiment(id))).await;
                for outcome in outcomes {
                    outcome?;
                }
            }
        } else {
            for id in ids {
                if !self.checkpoint().await {
                    break;
                }
                self.run_experiment(id).await?;
            }
        }
        Ok(())
    }

    /// Wait out a pause; false once the run was stopped
    async fn checkpoint(&self) -> bool {
        loop {
            let resumed = self.resume.notified();
            match self.state() {
                LaboratoryState::Running => return true,
                LaboratoryState::Paused => {
                    tracing::debug!(laboratory = %self.config.name, "waiting for resume");
                }
                _ => return false,
            }
            resumed.await;
        }
    }

    fn failed(&self, id: &str, name: &str, err: &LabError, duration_ms: u64) -> ExperimentResult {
        let result = ExperimentResult::failure(id, name, err).with_duration_ms(duration_ms);
        self.events.publish(LabEvent::ExperimentFailed {
            experiment_id: id.to_string(),
            error: err.to_string(),
            result: result.clone(),
        });
        result
    }
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_panic() {
        panic_message(err.into_panic().as_ref())
    } else {
        err.to_string()
    }
}

impl std::fmt::Debug for Laboratory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Laboratory")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("experiments", &self.len())
            .field("results", &self.results.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExperimentState;
    use lab_hypothesis::{assertions, StaticSubject};
    use pretty_assertions::assert_eq;

    fn lab() -> Laboratory {
        Laboratory::new(LaboratoryConfig::new("unit"))
    }

    fn passing(id: &str) -> Experiment {
        Experiment::new(id, id)
            .with_subject(StaticSubject::new().into_ref())
            .with_hypothesis(assertions::to_be_mounted())
    }

    fn failing(id: &str) -> Experiment {
        Experiment::new(id, id)
            .with_subject(StaticSubject::new().with_state("value", 0).into_ref())
            .with_hypothesis(assertions::to_have_state("value", 999))
    }

    #[test]
    fn duplicate_registration_keeps_first() {
        let lab = lab();
        lab.register_experiment(passing("t1").with_description("first"))
            .unwrap();

        let err = lab.register_experiment(failing("t1")).unwrap_err();
        assert!(matches!(err, LabError::DuplicateRegistration(ref id) if id == "t1"));
        assert_eq!(lab.len(), 1);

        let handle = lab.experiment("t1").unwrap();
        let experiment = handle.try_lock().unwrap();
        assert_eq!(experiment.description(), Some("first"));
    }

    #[test]
    fn unregister_unknown_is_an_error() {
        let lab = lab();
        let err = lab.unregister_experiment("ghost").unwrap_err();
        assert!(matches!(err, LabError::UnknownExperiment(_)));
        assert!(err.is_misuse());
    }

    #[tokio::test]
    async fn unregister_discards_result() {
        let lab = lab();
        lab.register_experiment(passing("a")).unwrap();
        lab.run_experiment("a").await.unwrap();
        assert!(lab.result("a").is_some());

        lab.unregister_experiment("a").unwrap();
        assert!(lab.result("a").is_none());
        assert!(lab.is_empty());
    }

    #[tokio::test]
    async fn run_experiment_unknown_id() {
        let err = lab().run_experiment("nope").await.unwrap_err();
        assert!(matches!(err, LabError::UnknownExperiment(_)));
    }

    #[tokio::test]
    async fn run_all_derives_stats() {
        let lab = lab();
        lab.register_experiment(passing("pass")).unwrap();
        lab.register_experiment(failing("fail")).unwrap();

        let report = lab.run_all().await.unwrap();

        assert_eq!(report.stats.total_experiments, 2);
        assert_eq!(report.stats.passed, 1);
        assert_eq!(report.stats.failed, 1);
        assert_eq!(report.stats.skipped, 0);
        assert!((report.stats.success_rate - 0.5).abs() < f64::EPSILON);
        assert!(!report.success);
        assert_eq!(lab.state(), LaboratoryState::Completed);

        let ids: Vec<_> = report.results.iter().map(|r| r.experiment_id.as_str()).collect();
        assert_eq!(ids, vec!["pass", "fail"]);
    }

    #[tokio::test]
    async fn only_focus_leaves_others_skipped() {
        let lab = lab();
        lab.register_experiment(passing("a")).unwrap();
        lab.register_experiment(passing("b").with_only(true)).unwrap();
        lab.register_experiment(passing("c")).unwrap();

        let report = lab.run_all().await.unwrap();

        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].experiment_id, "b");
        assert_eq!(report.stats.skipped, 2);
        assert!(!report.success);
    }

    #[tokio::test]
    async fn auto_cleanup_resets_experiments() {
        let lab = lab();
        lab.register_experiment(passing("a")).unwrap();
        lab.run_all().await.unwrap();

        let handle = lab.experiment("a").unwrap();
        assert_eq!(handle.lock().await.state(), ExperimentState::Pending);
    }

    #[tokio::test]
    async fn without_auto_cleanup_states_are_kept() {
        let lab = Laboratory::new(LaboratoryConfig::new("keep").with_auto_cleanup(false));
        lab.register_experiment(failing("a")).unwrap();
        lab.run_all().await.unwrap();

        let handle = lab.experiment("a").unwrap();
        assert_eq!(handle.lock().await.state(), ExperimentState::Failed);
    }

    #[test]
    fn pause_and_resume_require_matching_state() {
        let lab = lab();
        let err = lab.pause().unwrap_err();
        assert!(matches!(
            err,
            LabError::InvalidState {
                action: "pause",
                state: LaboratoryState::Idle
            }
        ));
        assert!(lab.resume().is_err());

        lab.stop();
        assert_eq!(lab.state(), LaboratoryState::Idle);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let lab = lab();
        lab.register_experiment(passing("a")).unwrap();
        lab.run_all().await.unwrap();

        lab.clear().unwrap();
        assert!(lab.is_empty());
        assert!(lab.results().is_empty());
        assert_eq!(lab.stats(), LaboratoryStats::default());
    }

    #[tokio::test]
    async fn empty_laboratory_reports_success() {
        let report = lab().run_all().await.unwrap();
        assert_eq!(report.stats.total_experiments, 0);
        assert_eq!(report.stats.success_rate, 0.0);
        assert!(report.success);
    }

    #[tokio::test]
    async fn events_follow_the_run() {
        let lab = lab();
        let mut events = lab.subscribe().unwrap();
        lab.register_experiment(passing("a")).unwrap();
        lab.run_all().await.unwrap();

        let mut topics = Vec::new();
        while let Ok(event) = events.try_recv() {
            topics.push(event.topic());
        }
        assert_eq!(
            topics,
            vec![
                "experiment:registered",
                "started",
                "experiment:started",
                "experiment:completed",
                "completed",
                "cleaned-up",
            ]
        );
    }
}
