//! Declarative suites
//!
//! A suite is a YAML document holding fixture subjects and experiments whose
//! hypotheses are written as data:
//!
//! ```yaml
//! name: Checkout
//! config:
//!   parallel: true
//! subjects:
//!   cart:
//!     state: { total: 42 }
//!     renderOutput: "<p>Total: 42</p>"
//! experiments:
//!   - id: totals
//!     subject: cart
//!     hypotheses:
//!       - assert: toHaveState
//!         key: total
//!         value: 42
//!       - assert: not
//!         hypothesis: { assert: toContainText, text: "Empty" }
//! ```

use lab_core::{ConfigError, Experiment, LabError, Laboratory, LaboratoryConfig};
use lab_hypothesis::{assertions, Hypothesis, HypothesisError, StaticSubject, SubjectRef, WaitOptions};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Suite loading errors
#[derive(Debug, thiserror::Error)]
pub enum SuiteError {
    /// Suite file could not be read
    #[error("failed to read suite {path}: {source}")]
    Read {
        /// File path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// YAML did not parse
    #[error("invalid suite: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// `toMatchOutput` pattern did not compile
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The pattern as written
        pattern: String,
        /// Compile error
        #[source]
        source: regex::Error,
    },

    /// `all` or `any` with nothing inside
    #[error("'{0}' needs at least one hypothesis")]
    EmptyComposition(&'static str),

    /// Experiment refers to a fixture that does not exist
    #[error("experiment {experiment} refers to unknown subject '{subject}'")]
    UnknownSubject {
        /// Experiment id
        experiment: String,
        /// Fixture name
        subject: String,
    },

    /// Two experiments share an id
    #[error("duplicate experiment id '{0}'")]
    DuplicateExperiment(String),

    /// Composition failed
    #[error(transparent)]
    Hypothesis(#[from] HypothesisError),

    /// Laboratory rejected the suite
    #[error(transparent)]
    Lab(#[from] LabError),

    /// Merged configuration is unusable
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Partial configuration layered over a base [`LaboratoryConfig`]
///
/// Unset fields leave the base value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    /// Laboratory name
    pub name: Option<String>,
    /// Batched parallel mode
    pub parallel: Option<bool>,
    /// Batch size
    pub max_parallel: Option<usize>,
    /// Default per-experiment timeout
    pub default_timeout_ms: Option<u64>,
    /// Teardown after a completed run
    pub auto_cleanup: Option<bool>,
}

impl ConfigOverrides {
    /// Layer these overrides over `base`
    #[must_use]
    pub fn apply(&self, mut base: LaboratoryConfig) -> LaboratoryConfig {
        if let Some(name) = &self.name {
            base.name.clone_from(name);
        }
        if let Some(parallel) = self.parallel {
            base.parallel = parallel;
        }
        if let Some(max_parallel) = self.max_parallel {
            base.max_parallel = max_parallel;
        }
        if let Some(timeout_ms) = self.default_timeout_ms {
            base.default_timeout_ms = timeout_ms;
        }
        if let Some(auto_cleanup) = self.auto_cleanup {
            base.auto_cleanup = auto_cleanup;
        }
        base
    }
}

/// Comparison used by `toSatisfy`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
}

impl Comparison {
    /// Compare `actual` against `expected`
    ///
    /// Ordering comparisons only hold between numbers.
    #[must_use]
    pub fn holds(self, actual: &Value, expected: &Value) -> bool {
        match self {
            Self::Eq => actual == expected,
            Self::Ne => actual != expected,
            _ => match (actual.as_f64(), expected.as_f64()) {
                (Some(a), Some(e)) => match self {
                    Self::Gt => a > e,
                    Self::Gte => a >= e,
                    Self::Lt => a < e,
                    _ => a <= e,
                },
                _ => false,
            },
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

/// A hypothesis written as data
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "assert", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HypothesisSpec {
    /// Render output contains `text`
    ToContainText { text: String },
    /// State entry equals `value`
    ToHaveState { key: String, value: Value },
    /// Prop equals `value`
    ToHaveProp { key: String, value: Value },
    /// Subject is mounted
    ToBeMounted,
    /// Subject is active
    ToBeActive,
    /// Subject rendered exactly `times`
    ToHaveRendered { times: u64 },
    /// Render output matches `pattern`
    ToMatchOutput { pattern: String },
    /// An element matches `selector`
    ToHaveElement { selector: String },
    /// Exactly `count` elements match `selector`
    ToHaveElementCount { selector: String, count: usize },
    /// Stripped text equals `text`
    ToHaveText { text: String },
    /// Some element matching `selector` contains `text`
    ToHaveTextContaining { selector: String, text: String },
    /// State entry compares against `value`
    ToSatisfy {
        key: String,
        op: Comparison,
        value: Value,
    },
    /// State entry eventually equals `value`
    ToEventually {
        key: String,
        value: Value,
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default)]
        interval_ms: Option<u64>,
    },
    /// Negation
    Not { hypothesis: Box<HypothesisSpec> },
    /// Conjunction of every entry
    All { hypotheses: Vec<HypothesisSpec> },
    /// Disjunction of every entry
    Any { hypotheses: Vec<HypothesisSpec> },
}

impl HypothesisSpec {
    /// Build the runnable hypothesis
    ///
    /// # Errors
    /// - `SuiteError::InvalidPattern` for a bad `toMatchOutput` regex
    /// - `SuiteError::EmptyComposition` for an empty `all` or `any`
    pub fn build(&self) -> Result<Hypothesis, SuiteError> {
        Ok(match self {
            Self::ToContainText { text } => assertions::to_contain_text(text.as_str()),
            Self::ToHaveState { key, value } => assertions::to_have_state(key.as_str(), value.clone()),
            Self::ToHaveProp { key, value } => assertions::to_have_prop(key.as_str(), value.clone()),
            Self::ToBeMounted => assertions::to_be_mounted(),
            Self::ToBeActive => assertions::to_be_active(),
            Self::ToHaveRendered { times } => assertions::to_have_rendered(*times),
            Self::ToMatchOutput { pattern } => {
                let regex = Regex::new(pattern).map_err(|source| SuiteError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?;
                assertions::to_match_output(regex)
            }
            Self::ToHaveElement { selector } => assertions::to_have_element(selector.as_str()),
            Self::ToHaveElementCount { selector, count } => {
                assertions::to_have_element_count(selector.as_str(), *count)
            }
            Self::ToHaveText { text } => assertions::to_have_text(text.as_str()),
            Self::ToHaveTextContaining { selector, text } => {
                assertions::to_have_text_containing(selector.as_str(), text.as_str())
            }
            Self::ToSatisfy { key, op, value } => {
                let op = *op;
                let getter_key = key.clone();
                assertions::to_satisfy(
                    format!("state.{key} {} {value}", op.symbol()),
                    move |subject: &SubjectRef| {
                        subject.state().get(&getter_key).cloned().unwrap_or(Value::Null)
                    },
                    move |actual: &Value, expected: &Value| op.holds(actual, expected),
                    value.clone(),
                )
            }
            Self::ToEventually {
                key,
                value,
                timeout_ms,
                interval_ms,
            } => {
                let mut options = WaitOptions::default();
                if let Some(ms) = timeout_ms {
                    options = options.with_timeout(Duration::from_millis(*ms));
                }
                if let Some(ms) = interval_ms {
                    options = options.with_interval(Duration::from_millis(*ms));
                }
                let expected = value.clone();
                let state_key = key.clone();
                assertions::to_eventually(
                    format!("have state {key} = {value}"),
                    move |snapshot| snapshot.state.get(&state_key) == Some(&expected),
                    options,
                )
            }
            Self::Not { hypothesis } => hypothesis.build()?.not()?,
            Self::All { hypotheses } => fold(hypotheses, "all", Hypothesis::and)?,
            Self::Any { hypotheses } => fold(hypotheses, "any", Hypothesis::or)?,
        })
    }
}

fn fold(
    specs: &[HypothesisSpec],
    combinator: &'static str,
    join: fn(&Hypothesis, &Hypothesis) -> Result<Hypothesis, HypothesisError>,
) -> Result<Hypothesis, SuiteError> {
    let (first, rest) = specs
        .split_first()
        .ok_or(SuiteError::EmptyComposition(combinator))?;
    let mut acc = first.build()?;
    for spec in rest {
        acc = join(&acc, &spec.build()?)?;
    }
    Ok(acc)
}

/// Subject reference: a fixture name or an inline snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubjectSpec {
    /// Name of an entry under `subjects`
    Fixture(String),
    /// Inline snapshot
    Inline(StaticSubject),
}

/// One experiment as written in a suite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExperimentSpec {
    /// Unique id
    pub id: String,
    /// Display name, defaults to the id
    #[serde(default)]
    pub name: Option<String>,
    /// Free text
    #[serde(default)]
    pub description: Option<String>,
    /// Subject under test
    #[serde(default)]
    pub subject: Option<SubjectSpec>,
    /// Interactions dispatched in order as the test body
    #[serde(default)]
    pub interactions: Vec<String>,
    /// Hypotheses validated after the test body
    #[serde(default)]
    pub hypotheses: Vec<HypothesisSpec>,
    /// Report as passed without running
    #[serde(default)]
    pub skip: bool,
    /// Focus this experiment
    #[serde(default)]
    pub only: bool,
    /// Per-experiment timeout
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Retry budget
    #[serde(default)]
    pub max_retries: u32,
}

/// A parsed suite file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Suite {
    /// Laboratory name
    pub name: Option<String>,
    /// Configuration layered over the base config
    pub config: ConfigOverrides,
    /// Named fixture subjects
    pub subjects: BTreeMap<String, StaticSubject>,
    /// Experiments in registration order
    pub experiments: Vec<ExperimentSpec>,
}

impl Suite {
    /// Parse a suite from YAML text
    ///
    /// # Errors
    /// - `SuiteError::Parse` if the YAML is malformed or has unknown fields
    pub fn from_yaml_str(text: &str) -> Result<Self, SuiteError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read and parse a suite file
    ///
    /// # Errors
    /// - `SuiteError::Read` if the file cannot be read
    /// - `SuiteError::Parse` if the YAML is malformed
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SuiteError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SuiteError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Build every experiment, checking ids and fixture references
    ///
    /// # Errors
    /// - `SuiteError::DuplicateExperiment` if two experiments share an id
    /// - `SuiteError::UnknownSubject` for a dangling fixture name
    /// - any hypothesis build error
    pub fn experiments(&self) -> Result<Vec<Experiment>, SuiteError> {
        let fixtures: BTreeMap<&str, SubjectRef> = self
            .subjects
            .iter()
            .map(|(name, subject)| (name.as_str(), subject.clone().into_ref()))
            .collect();
        let mut seen = HashSet::new();

        self.experiments
            .iter()
            .map(|spec| {
                if !seen.insert(spec.id.as_str()) {
                    return Err(SuiteError::DuplicateExperiment(spec.id.clone()));
                }
                build_experiment(spec, &fixtures)
            })
            .collect()
    }

    /// Merge configuration and register every experiment
    ///
    /// Layers, lowest first: `base`, the suite's `name` and `config`, then
    /// `overrides`.
    ///
    /// # Errors
    /// - `SuiteError::Config` if the merged configuration is invalid
    /// - any error from [`Suite::experiments`]
    pub fn laboratory(
        &self,
        base: LaboratoryConfig,
        overrides: &ConfigOverrides,
    ) -> Result<Laboratory, SuiteError> {
        let mut config = base;
        if let Some(name) = &self.name {
            config.name.clone_from(name);
        }
        let config = overrides.apply(self.config.apply(config));
        config.validate()?;

        let experiments = self.experiments()?;
        let lab = Laboratory::new(config);
        for experiment in experiments {
            lab.register_experiment(experiment)?;
        }
        tracing::debug!(laboratory = lab.name(), experiments = lab.len(), "suite loaded");
        Ok(lab)
    }
}

fn build_experiment(
    spec: &ExperimentSpec,
    fixtures: &BTreeMap<&str, SubjectRef>,
) -> Result<Experiment, SuiteError> {
    let name = spec.name.clone().unwrap_or_else(|| spec.id.clone());
    let mut experiment = Experiment::new(spec.id.as_str(), name)
        .with_skip(spec.skip)
        .with_only(spec.only)
        .with_max_retries(spec.max_retries);

    if let Some(description) = &spec.description {
        experiment = experiment.with_description(description.as_str());
    }
    if let Some(ms) = spec.timeout_ms {
        experiment = experiment.with_timeout(Duration::from_millis(ms));
    }
    match &spec.subject {
        Some(SubjectSpec::Fixture(name)) => {
            let subject = fixtures
                .get(name.as_str())
                .ok_or_else(|| SuiteError::UnknownSubject {
                    experiment: spec.id.clone(),
                    subject: name.clone(),
                })?;
            experiment = experiment.with_subject(Arc::clone(subject));
        }
        Some(SubjectSpec::Inline(subject)) => {
            experiment = experiment.with_subject(subject.clone().into_ref());
        }
        None => {}
    }
    if !spec.interactions.is_empty() {
        let interactions: Arc<[String]> = spec.interactions.clone().into();
        experiment = experiment.with_test(move |subject: SubjectRef, _ctx| {
            let interactions = Arc::clone(&interactions);
            async move {
                for interaction in interactions.iter() {
                    subject.interact(interaction).await?;
                }
                Ok::<(), anyhow::Error>(())
            }
        });
    }
    for hypothesis in &spec.hypotheses {
        experiment = experiment.with_hypothesis(hypothesis.build()?);
    }
    Ok(experiment)
}
