//! Testing utilities for the laboratory workspace
//!
//! Shared subjects, spies, hypothesis helpers, and event recorders.

#![allow(missing_docs)]

use futures::future::{ready, Ready};
use lab_core::{EventSink, LabEvent, RunContext};
use lab_hypothesis::{
    AssertionFailure, Hypothesis, Subject, SubjectError, SubjectRef, ValueMap,
};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};

pub type HookResult = Ready<anyhow::Result<()>>;

#[derive(Debug, Clone)]
struct MockState {
    props: ValueMap,
    state: ValueMap,
    render_output: String,
    mounted: bool,
    active: bool,
    render_count: u64,
    elements: BTreeMap<String, Vec<String>>,
}

/// Mutable subject with an interaction log
///
/// Every successful `interact` bumps the render count.
#[derive(Debug)]
pub struct MockSubject {
    inner: RwLock<MockState>,
    interactions: Mutex<Vec<String>>,
    reject_interactions: AtomicBool,
}

impl MockSubject {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MockState {
                props: ValueMap::new(),
                state: ValueMap::new(),
                render_output: String::new(),
                mounted: true,
                active: true,
                render_count: 0,
                elements: BTreeMap::new(),
            }),
            interactions: Mutex::new(Vec::new()),
            reject_interactions: AtomicBool::new(false),
        }
    }

    pub fn with_state(self, key: &str, value: impl Into<Value>) -> Self {
        self.set_state(key, value);
        self
    }

    pub fn with_prop(self, key: &str, value: impl Into<Value>) -> Self {
        self.inner.write().props.insert(key.to_string(), value.into());
        self
    }

    pub fn with_render_output(self, output: &str) -> Self {
        self.inner.write().render_output = output.to_string();
        self
    }

    pub fn with_element(self, selector: &str, markup: &str) -> Self {
        self.inner
            .write()
            .elements
            .entry(selector.to_string())
            .or_default()
            .push(markup.to_string());
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn set_state(&self, key: &str, value: impl Into<Value>) {
        self.inner.write().state.insert(key.to_string(), value.into());
    }

    pub fn render(&self, output: &str) {
        let mut inner = self.inner.write();
        inner.render_output = output.to_string();
        inner.render_count += 1;
    }

    pub fn set_mounted(&self, mounted: bool) {
        self.inner.write().mounted = mounted;
    }

    pub fn set_active(&self, active: bool) {
        self.inner.write().active = active;
    }

    pub fn reject_interactions(&self, reject: bool) {
        self.reject_interactions.store(reject, Ordering::SeqCst);
    }

    pub fn interactions(&self) -> Vec<String> {
        self.interactions.lock().clone()
    }
}

impl Default for MockSubject {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Subject for MockSubject {
    fn state(&self) -> ValueMap {
        self.inner.read().state.clone()
    }

    fn props(&self) -> ValueMap {
        self.inner.read().props.clone()
    }

    fn render_output(&self) -> String {
        self.inner.read().render_output.clone()
    }

    fn render_count(&self) -> u64 {
        self.inner.read().render_count
    }

    fn is_mounted(&self) -> bool {
        self.inner.read().mounted
    }

    fn is_active(&self) -> bool {
        self.inner.read().active
    }

    fn find_all(&self, selector: &str) -> Vec<String> {
        self.inner
            .read()
            .elements
            .get(selector)
            .cloned()
            .unwrap_or_default()
    }

    async fn interact(&self, description: &str) -> Result<(), SubjectError> {
        if !self.is_mounted() {
            return Err(SubjectError::NotMounted);
        }
        if self.reject_interactions.load(Ordering::SeqCst) {
            return Err(SubjectError::InteractionFailed(description.to_string()));
        }
        self.interactions.lock().push(description.to_string());
        self.inner.write().render_count += 1;
        Ok(())
    }
}

/// Shared call counter
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment, returning the count before the call
    pub fn tick(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Hook that counts and succeeds
    pub fn hook(&self) -> impl Fn(RunContext) -> HookResult + Send + Sync + 'static {
        let counter = self.clone();
        move |_| {
            counter.tick();
            ready(Ok(()))
        }
    }

    /// Test hook that fails the first `failures` calls
    pub fn flaky_test(
        &self,
        failures: usize,
    ) -> impl Fn(SubjectRef, RunContext) -> HookResult + Send + Sync + 'static {
        let counter = self.clone();
        move |_, _| {
            let call = counter.tick();
            if call < failures {
                ready(Err(anyhow::anyhow!("planned failure {}", call + 1)))
            } else {
                ready(Ok(()))
            }
        }
    }
}

pub fn passing(name: &str) -> Hypothesis {
    Hypothesis::check(name, |_| Ok(()))
}

pub fn failing(name: &str, message: &str) -> Hypothesis {
    let message = message.to_string();
    Hypothesis::check(name, move |_| Err(AssertionFailure::new(message.clone())))
}

/// Hypothesis that records each evaluation
pub fn counting(name: &str, counter: &CallCounter, passes: bool) -> Hypothesis {
    let counter = counter.clone();
    Hypothesis::check(name, move |_| {
        counter.tick();
        if passes {
            Ok(())
        } else {
            Err(AssertionFailure::new("counted failure"))
        }
    })
}

/// Event sink that keeps everything it receives
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LabEvent>>,
}

impl RecordingSink {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<LabEvent> {
        self.events.lock().clone()
    }

    pub fn topics(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(LabEvent::topic).collect()
    }

    /// Index of the first event with `topic` for `experiment_id`
    pub fn position(&self, topic: &str, experiment_id: &str) -> Option<usize> {
        self.events
            .lock()
            .iter()
            .position(|event| event.topic() == topic && event.experiment_id() == Some(experiment_id))
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: LabEvent) {
        self.events.lock().push(event);
    }
}

static TRACING: Once = Once::new();

/// Install a test-writer tracing subscriber once per process
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
