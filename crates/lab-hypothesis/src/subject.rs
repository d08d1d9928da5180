//! Subject-under-test contract
//!
//! The subject is an external collaborator: something stateful that renders
//! output and reacts to interactions. The orchestration engine only consumes
//! this trait; rendering and event dispatch belong to the implementor.

use crate::error::SubjectError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// String-keyed state or props mapping
pub type ValueMap = Map<String, Value>;

/// Shared handle to a subject
pub type SubjectRef = Arc<dyn Subject>;

/// Predicate evaluated against a subject snapshot
pub type SnapshotPredicate = dyn Fn(&Snapshot) -> bool + Send + Sync;

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

/// Strip markup tags from rendered output
#[must_use]
pub fn strip_tags(markup: &str) -> String {
    TAG.replace_all(markup, "").trim().to_string()
}

/// Point-in-time view of a subject
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Props at snapshot time
    pub props: ValueMap,
    /// State at snapshot time
    pub state: ValueMap,
    /// Raw render output
    pub render_output: String,
    /// Whether the subject was mounted
    pub mounted: bool,
    /// Whether the subject was active
    pub active: bool,
    /// Number of renders so far
    pub render_count: u64,
}

/// Polling options for [`Subject::wait_for`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Give up after this long
    pub timeout: Duration,
    /// Delay between predicate checks
    pub interval: Duration,
}

impl WaitOptions {
    /// Create options with timeout and interval
    #[inline]
    #[must_use]
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// With timeout
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// With interval
    #[inline]
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            interval: Duration::from_millis(50),
        }
    }
}

/// The subject under test
///
/// Accessors are synchronous views of current state. `interact` and
/// `wait_for` are suspension points.
#[async_trait::async_trait]
pub trait Subject: Send + Sync {
    /// Current state mapping
    fn state(&self) -> ValueMap;

    /// Current props mapping
    fn props(&self) -> ValueMap;

    /// Raw render output
    fn render_output(&self) -> String;

    /// Render output with markup stripped
    fn text(&self) -> String {
        strip_tags(&self.render_output())
    }

    /// Number of times the subject has rendered
    fn render_count(&self) -> u64;

    /// Whether the subject is mounted
    fn is_mounted(&self) -> bool;

    /// Whether the subject is active
    fn is_active(&self) -> bool;

    /// Whether any element matches `selector`
    fn find(&self, selector: &str) -> bool {
        !self.find_all(selector).is_empty()
    }

    /// Markup of every element matching `selector`
    fn find_all(&self, selector: &str) -> Vec<String>;

    /// Dispatch an interaction described in prose
    async fn interact(&self, description: &str) -> Result<(), SubjectError>;

    /// Capture current props, state and render facts
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            props: self.props(),
            state: self.state(),
            render_output: self.render_output(),
            mounted: self.is_mounted(),
            active: self.is_active(),
            render_count: self.render_count(),
        }
    }

    /// Poll until `predicate` holds or the timeout elapses
    ///
    /// # Errors
    /// - `SubjectError::WaitTimeout` if the predicate never held
    async fn wait_for(
        &self,
        predicate: &SnapshotPredicate,
        options: WaitOptions,
    ) -> Result<(), SubjectError> {
        let deadline = tokio::time::Instant::now() + options.timeout;
        loop {
            if predicate(&self.snapshot()) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SubjectError::WaitTimeout {
                    timeout_ms: u64::try_from(options.timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            tokio::time::sleep(options.interval).await;
        }
    }
}

/// Immutable, snapshot-backed subject
///
/// Useful as a fixture: every accessor answers from the captured data and
/// interactions are accepted but change nothing. Elements are looked up by
/// exact selector string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StaticSubject {
    /// Props
    pub props: ValueMap,
    /// State
    pub state: ValueMap,
    /// Raw render output
    pub render_output: String,
    /// Mounted flag
    pub mounted: bool,
    /// Active flag
    pub active: bool,
    /// Render count
    pub render_count: u64,
    /// Selector to element markup
    pub elements: BTreeMap<String, Vec<String>>,
}

impl StaticSubject {
    /// Create a mounted, active subject with no content
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With state entry
    #[must_use]
    pub fn with_state(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.state.insert(key.into(), value.into());
        self
    }

    /// With prop entry
    #[must_use]
    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    /// With render output
    #[must_use]
    pub fn with_render_output(mut self, output: impl Into<String>) -> Self {
        self.render_output = output.into();
        self
    }

    /// With an element matching `selector`
    #[must_use]
    pub fn with_element(mut self, selector: impl Into<String>, markup: impl Into<String>) -> Self {
        self.elements
            .entry(selector.into())
            .or_default()
            .push(markup.into());
        self
    }

    /// With render count
    #[inline]
    #[must_use]
    pub fn with_render_count(mut self, count: u64) -> Self {
        self.render_count = count;
        self
    }

    /// With mounted flag
    #[inline]
    #[must_use]
    pub fn with_mounted(mut self, mounted: bool) -> Self {
        self.mounted = mounted;
        self
    }

    /// With active flag
    #[inline]
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Wrap into a shared handle
    #[inline]
    #[must_use]
    pub fn into_ref(self) -> SubjectRef {
        Arc::new(self)
    }
}

impl Default for StaticSubject {
    fn default() -> Self {
        Self {
            props: ValueMap::new(),
            state: ValueMap::new(),
            render_output: String::new(),
            mounted: true,
            active: true,
            render_count: 0,
            elements: BTreeMap::new(),
        }
    }
}

#[async_trait::async_trait]
impl Subject for StaticSubject {
    fn state(&self) -> ValueMap {
        self.state.clone()
    }

    fn props(&self) -> ValueMap {
        self.props.clone()
    }

    fn render_output(&self) -> String {
        self.render_output.clone()
    }

    fn render_count(&self) -> u64 {
        self.render_count
    }

    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn find_all(&self, selector: &str) -> Vec<String> {
        self.elements.get(selector).cloned().unwrap_or_default()
    }

    async fn interact(&self, description: &str) -> Result<(), SubjectError> {
        if !self.mounted {
            return Err(SubjectError::NotMounted);
        }
        tracing::debug!(interaction = description, "static subject ignores interaction");
        Ok(())
    }
}
