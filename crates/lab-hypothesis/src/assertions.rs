//! Built-in assertion factories
//!
//! Each factory returns a [`Hypothesis`] tagged with its [`AssertionKind`].
//! Factories capture only their operands; the subject is supplied when the
//! hypothesis is validated. Failures carry the expected and actual operands.

use crate::error::AssertionFailure;
use crate::hypothesis::{AssertionKind, Hypothesis};
use crate::subject::{strip_tags, Snapshot, SubjectRef, WaitOptions};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Subject text contains `text`
pub fn to_contain_text(text: impl Into<String>) -> Hypothesis {
    let text = text.into();
    let name = format!("should contain text \"{text}\"");
    Hypothesis::check(name, move |subject: &SubjectRef| {
        let actual = subject.text();
        if actual.contains(&text) {
            Ok(())
        } else {
            Err(AssertionFailure::mismatch(
                format!("Expected text to contain \"{text}\" but got \"{actual}\""),
                text.as_str(),
                actual,
            ))
        }
    })
    .with_kind(AssertionKind::ContainText)
}

/// State field `key` equals `expected`
///
/// A missing key compares as `null`.
pub fn to_have_state(key: impl Into<String>, expected: impl Into<Value>) -> Hypothesis {
    let key = key.into();
    let expected = expected.into();
    let name = format!("should have state {key} = {expected}");
    Hypothesis::check(name, move |subject: &SubjectRef| {
        let actual = subject.state().get(&key).cloned().unwrap_or(Value::Null);
        if actual == expected {
            Ok(())
        } else {
            Err(AssertionFailure::mismatch(
                format!("Expected state.{key} to be {expected} but got {actual}"),
                expected.clone(),
                actual,
            ))
        }
    })
    .with_kind(AssertionKind::HaveState)
}

/// Prop field `key` equals `expected`
///
/// A missing key compares as `null`.
pub fn to_have_prop(key: impl Into<String>, expected: impl Into<Value>) -> Hypothesis {
    let key = key.into();
    let expected = expected.into();
    let name = format!("should have prop {key} = {expected}");
    Hypothesis::check(name, move |subject: &SubjectRef| {
        let actual = subject.props().get(&key).cloned().unwrap_or(Value::Null);
        if actual == expected {
            Ok(())
        } else {
            Err(AssertionFailure::mismatch(
                format!("Expected props.{key} to be {expected} but got {actual}"),
                expected.clone(),
                actual,
            ))
        }
    })
    .with_kind(AssertionKind::HaveProp)
}

/// Subject is mounted
#[must_use]
pub fn to_be_mounted() -> Hypothesis {
    Hypothesis::check("should be mounted", |subject: &SubjectRef| {
        if subject.is_mounted() {
            Ok(())
        } else {
            Err(AssertionFailure::mismatch(
                "Expected subject to be mounted but it was not",
                true,
                false,
            ))
        }
    })
    .with_kind(AssertionKind::BeMounted)
}

/// Subject is active
#[must_use]
pub fn to_be_active() -> Hypothesis {
    Hypothesis::check("should be active", |subject: &SubjectRef| {
        if subject.is_active() {
            Ok(())
        } else {
            Err(AssertionFailure::mismatch(
                "Expected subject to be active but it was not",
                true,
                false,
            ))
        }
    })
    .with_kind(AssertionKind::BeActive)
}

/// Subject rendered exactly `times` times
#[must_use]
pub fn to_have_rendered(times: u64) -> Hypothesis {
    Hypothesis::check(
        format!("should have rendered {times} times"),
        move |subject: &SubjectRef| {
            let actual = subject.render_count();
            if actual == times {
                Ok(())
            } else {
                Err(AssertionFailure::mismatch(
                    format!("Expected {times} renders but got {actual}"),
                    times,
                    actual,
                ))
            }
        },
    )
    .with_kind(AssertionKind::HaveRendered)
}

/// Raw render output matches `pattern`
#[must_use]
pub fn to_match_output(pattern: Regex) -> Hypothesis {
    let name = format!("should match output /{}/", pattern.as_str());
    Hypothesis::check(name, move |subject: &SubjectRef| {
        let actual = subject.render_output();
        if pattern.is_match(&actual) {
            Ok(())
        } else {
            Err(AssertionFailure::mismatch(
                format!(
                    "Expected output to match /{}/ but got \"{actual}\"",
                    pattern.as_str()
                ),
                pattern.as_str(),
                actual,
            ))
        }
    })
    .with_kind(AssertionKind::MatchOutput)
}

/// At least one element matches `selector`
pub fn to_have_element(selector: impl Into<String>) -> Hypothesis {
    let selector = selector.into();
    let name = format!("should have element \"{selector}\"");
    Hypothesis::check(name, move |subject: &SubjectRef| {
        if subject.find(&selector) {
            Ok(())
        } else {
            Err(AssertionFailure::mismatch(
                format!("Expected element \"{selector}\" to exist but found none"),
                selector.as_str(),
                Value::Null,
            ))
        }
    })
    .with_kind(AssertionKind::HaveElement)
}

/// Exactly `count` elements match `selector`
pub fn to_have_element_count(selector: impl Into<String>, count: usize) -> Hypothesis {
    let selector = selector.into();
    let name = format!("should have {count} \"{selector}\" elements");
    Hypothesis::check(name, move |subject: &SubjectRef| {
        let actual = subject.find_all(&selector).len();
        if actual == count {
            Ok(())
        } else {
            Err(AssertionFailure::mismatch(
                format!("Expected {count} \"{selector}\" elements but found {actual}"),
                count,
                actual,
            ))
        }
    })
    .with_kind(AssertionKind::HaveElementCount)
}

/// Subject text equals `expected` exactly
pub fn to_have_text(expected: impl Into<String>) -> Hypothesis {
    let expected = expected.into();
    let name = format!("should have text \"{expected}\"");
    Hypothesis::check(name, move |subject: &SubjectRef| {
        let actual = subject.text();
        if actual == expected {
            Ok(())
        } else {
            Err(AssertionFailure::mismatch(
                format!("Expected text \"{expected}\" but got \"{actual}\""),
                expected.as_str(),
                actual,
            ))
        }
    })
    .with_kind(AssertionKind::HaveText)
}

/// Some element matching `selector` contains `text`
pub fn to_have_text_containing(selector: impl Into<String>, text: impl Into<String>) -> Hypothesis {
    let selector = selector.into();
    let text = text.into();
    let name = format!("\"{selector}\" should contain text \"{text}\"");
    Hypothesis::check(name, move |subject: &SubjectRef| {
        let texts: Vec<String> = subject
            .find_all(&selector)
            .iter()
            .map(|markup| strip_tags(markup))
            .collect();
        if texts.iter().any(|candidate| candidate.contains(&text)) {
            Ok(())
        } else {
            Err(AssertionFailure::mismatch(
                format!("Expected some \"{selector}\" to contain \"{text}\" but got {texts:?}"),
                text.as_str(),
                texts,
            ))
        }
    })
    .with_kind(AssertionKind::HaveTextContaining)
}

/// Generic comparator
///
/// `getter` extracts a value from the subject, `matcher` decides whether it
/// agrees with `expected`.
pub fn to_satisfy<T, G, M>(description: impl Into<String>, getter: G, matcher: M, expected: T) -> Hypothesis
where
    T: Serialize + Send + Sync + 'static,
    G: Fn(&SubjectRef) -> T + Send + Sync + 'static,
    M: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    let description = description.into();
    let name = description.clone();
    Hypothesis::check(name, move |subject: &SubjectRef| {
        let actual = getter(subject);
        if matcher(&actual, &expected) {
            Ok(())
        } else {
            let expected = to_value(&expected);
            let actual = to_value(&actual);
            Err(AssertionFailure::mismatch(
                format!("Expected {description} to satisfy {expected} but got {actual}"),
                expected,
                actual,
            ))
        }
    })
    .with_kind(AssertionKind::Satisfy)
}

/// Predicate eventually holds
///
/// Polls through [`Subject::wait_for`](crate::Subject::wait_for) and fails
/// with the wait error once `options.timeout` elapses.
pub fn to_eventually<P>(description: impl Into<String>, predicate: P, options: WaitOptions) -> Hypothesis
where
    P: Fn(&Snapshot) -> bool + Send + Sync + 'static,
{
    let description = description.into();
    let name = format!("should eventually {description}");
    let predicate = Arc::new(predicate);
    Hypothesis::new(name, move |subject: SubjectRef| {
        let predicate = Arc::clone(&predicate);
        let description = description.clone();
        async move {
            subject
                .wait_for(predicate.as_ref(), options)
                .await
                .map_err(|err| {
                    AssertionFailure::mismatch(
                        format!("Expected {description} eventually but {err}"),
                        true,
                        false,
                    )
                })
        }
    })
    .with_kind(AssertionKind::Eventually)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::StaticSubject;
    use serde_json::json;
    use std::time::Duration;

    fn fixture() -> SubjectRef {
        StaticSubject::new()
            .with_state("count", 0)
            .with_prop("label", "Save")
            .with_render_output("<div><button>Save</button> <span>draft</span></div>")
            .with_element("button", "<button>Save</button>")
            .with_element("li", "<li>alpha</li>")
            .with_element("li", "<li>beta</li>")
            .with_render_count(2)
            .into_ref()
    }

    #[tokio::test]
    async fn contain_text_checks_stripped_output() {
        let subject = fixture();
        assert!(to_contain_text("Save").validate(&subject).await.passed);

        let result = to_contain_text("Cancel").validate(&subject).await;
        assert!(!result.passed);
        assert_eq!(result.assertion_kind, AssertionKind::ContainText);
        assert_eq!(result.expected, Some(json!("Cancel")));
        assert_eq!(result.actual, Some(json!("Save draft")));
    }

    #[tokio::test]
    async fn have_state_reports_both_operands() {
        let result = to_have_state("count", 999).validate(&fixture()).await;
        assert!(!result.passed);
        assert_eq!(result.expected, Some(json!(999)));
        assert_eq!(result.actual, Some(json!(0)));
        assert_eq!(
            result.message.as_deref(),
            Some("Expected state.count to be 999 but got 0")
        );
    }

    #[tokio::test]
    async fn missing_state_key_compares_as_null() {
        let subject = fixture();
        assert!(to_have_state("absent", Value::Null).validate(&subject).await.passed);
        assert!(!to_have_state("absent", 1).validate(&subject).await.passed);
    }

    #[tokio::test]
    async fn have_prop_matches_exactly() {
        let subject = fixture();
        assert!(to_have_prop("label", "Save").validate(&subject).await.passed);
        assert!(!to_have_prop("label", "save").validate(&subject).await.passed);
    }

    #[tokio::test]
    async fn lifecycle_flags() {
        let live = fixture();
        let dormant = StaticSubject::new()
            .with_mounted(false)
            .with_active(false)
            .into_ref();

        assert!(to_be_mounted().validate(&live).await.passed);
        assert!(to_be_active().validate(&live).await.passed);
        assert!(!to_be_mounted().validate(&dormant).await.passed);
        assert!(!to_be_active().validate(&dormant).await.passed);
    }

    #[tokio::test]
    async fn render_count_and_output_pattern() {
        let subject = fixture();
        assert!(to_have_rendered(2).validate(&subject).await.passed);

        let result = to_have_rendered(3).validate(&subject).await;
        assert_eq!(result.message.as_deref(), Some("Expected 3 renders but got 2"));

        let pattern = Regex::new(r"<button>\w+</button>").unwrap();
        assert!(to_match_output(pattern).validate(&subject).await.passed);
        let miss = Regex::new(r"^<form").unwrap();
        assert!(!to_match_output(miss).validate(&subject).await.passed);
    }

    #[tokio::test]
    async fn element_queries() {
        let subject = fixture();
        assert!(to_have_element("button").validate(&subject).await.passed);
        assert!(!to_have_element("input").validate(&subject).await.passed);
        assert!(to_have_element_count("li", 2).validate(&subject).await.passed);

        let result = to_have_element_count("li", 3).validate(&subject).await;
        assert_eq!(result.expected, Some(json!(3)));
        assert_eq!(result.actual, Some(json!(2)));
    }

    #[tokio::test]
    async fn text_checks() {
        let subject = fixture();
        assert!(to_have_text("Save draft").validate(&subject).await.passed);
        assert!(!to_have_text("Save").validate(&subject).await.passed);
        assert!(to_have_text_containing("li", "bet").validate(&subject).await.passed);
        assert!(!to_have_text_containing("li", "gamma").validate(&subject).await.passed);
    }

    #[tokio::test]
    async fn satisfy_uses_custom_matcher() {
        let subject = fixture();
        let at_least_two = to_satisfy(
            "render count",
            |subject: &SubjectRef| subject.render_count(),
            |actual, expected| actual >= expected,
            2_u64,
        );
        assert!(at_least_two.validate(&subject).await.passed);

        let at_least_five = to_satisfy(
            "render count",
            |subject: &SubjectRef| subject.render_count(),
            |actual, expected| actual >= expected,
            5_u64,
        );
        let result = at_least_five.validate(&subject).await;
        assert!(!result.passed);
        assert_eq!(result.expected, Some(json!(5)));
        assert_eq!(result.actual, Some(json!(2)));
        assert_eq!(result.assertion_kind, AssertionKind::Satisfy);
    }

    #[tokio::test(start_paused = true)]
    async fn eventually_times_out_with_wait_error() {
        let options = WaitOptions::new(Duration::from_millis(100), Duration::from_millis(10));
        let hypothesis = to_eventually("count reaches 5", |s: &Snapshot| s.state.get("count") == Some(&json!(5)), options);

        let result = hypothesis.validate(&fixture()).await;
        assert!(!result.passed);
        assert_eq!(
            result.message.as_deref(),
            Some("Expected count reaches 5 eventually but condition not met within 100ms")
        );
    }

    #[tokio::test]
    async fn eventually_passes_when_predicate_holds() {
        let hypothesis = to_eventually(
            "be rendered",
            |s: &Snapshot| s.render_count > 0,
            WaitOptions::default(),
        );
        assert!(hypothesis.validate(&fixture()).await.passed);
    }
}
