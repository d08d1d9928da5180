//! Combinator algebra and factory behavior against mutable subjects.

use futures::executor::block_on;
use lab_hypothesis::prelude::*;
use lab_test_utils::{counting, failing, passing, CallCounter, MockSubject};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn subject() -> SubjectRef {
    MockSubject::new().shared()
}

fn operand(name: &str, passes: bool) -> Hypothesis {
    if passes {
        passing(name)
    } else {
        failing(name, &format!("{name} failed"))
    }
}

proptest! {
    /// `and` passes iff both pass; `b` only runs when `a` passed.
    #[test]
    fn and_truth_table(a in any::<bool>(), b in any::<bool>()) {
        let spy = CallCounter::new();
        let combined = operand("a", a).and(&counting("b", &spy, b)).unwrap();

        let result = block_on(combined.validate(&subject()));

        prop_assert_eq!(result.passed, a && b);
        prop_assert_eq!(spy.count(), usize::from(a));
        if !a {
            prop_assert_eq!(result.message.as_deref(), Some("a failed"));
        }
    }

    /// `or` passes iff either passes; `b` only runs when `a` failed.
    #[test]
    fn or_truth_table(a in any::<bool>(), b in any::<bool>()) {
        let spy = CallCounter::new();
        let combined = operand("a", a).or(&counting("b", &spy, b)).unwrap();

        let result = block_on(combined.validate(&subject()));

        prop_assert_eq!(result.passed, a || b);
        prop_assert_eq!(spy.count(), usize::from(!a));
        if !a && !b {
            prop_assert_eq!(result.message.as_deref(), Some("a failed"));
        }
    }

    /// `not` inverts; double negation restores the outcome.
    #[test]
    fn not_inverts(a in any::<bool>()) {
        let base = operand("a", a);
        let negated = base.not().unwrap();
        let restored = negated.not().unwrap();

        prop_assert_eq!(block_on(negated.validate(&subject())).passed, !a);
        prop_assert_eq!(block_on(restored.validate(&subject())).passed, a);
        prop_assert_eq!(restored.name(), "NOT NOT a");
    }

    /// De Morgan: NOT (a AND b) agrees with (NOT a) OR (NOT b).
    #[test]
    fn de_morgan(a in any::<bool>(), b in any::<bool>()) {
        let (x, y) = (operand("x", a), operand("y", b));
        let left = x.and(&y).unwrap().not().unwrap();
        let right = x.not().unwrap().or(&y.not().unwrap()).unwrap();

        let subject = subject();
        prop_assert_eq!(
            block_on(left.validate(&subject)).passed,
            block_on(right.validate(&subject)).passed
        );
    }
}

#[test]
fn nested_names_compose() {
    let combined = passing("a")
        .and(&passing("b"))
        .unwrap()
        .or(&passing("c").not().unwrap())
        .unwrap();
    assert_eq!(combined.name(), "a AND b OR NOT c");
    assert_eq!(combined.kind(), AssertionKind::Or);
}

#[tokio::test]
async fn factories_observe_subject_mutation() {
    let mock = MockSubject::new().with_state("count", 0).shared();
    let subject: SubjectRef = mock.clone();
    let hypothesis = assertions::to_have_state("count", 1);

    assert!(!hypothesis.validate(&subject).await.passed);
    mock.set_state("count", 1);
    assert!(hypothesis.validate(&subject).await.passed);
}

#[tokio::test]
async fn interactions_bump_render_count() {
    let mock = MockSubject::new().shared();
    let subject: SubjectRef = mock.clone();

    subject.interact("click save").await.unwrap();
    subject.interact("click save").await.unwrap();

    assert!(assertions::to_have_rendered(2).validate(&subject).await.passed);
    assert_eq!(mock.interactions(), vec!["click save", "click save"]);

    mock.reject_interactions(true);
    let err = subject.interact("type name").await.unwrap_err();
    assert_eq!(err, SubjectError::InteractionFailed("type name".into()));
}

#[tokio::test(start_paused = true)]
async fn eventually_sees_a_later_update() {
    let mock = MockSubject::new().with_state("ready", false).shared();
    let subject: SubjectRef = mock.clone();

    let updater = tokio::spawn({
        let mock = Arc::clone(&mock);
        async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            mock.set_state("ready", true);
        }
    });

    let hypothesis = assertions::to_eventually(
        "become ready",
        |snapshot: &Snapshot| snapshot.state.get("ready") == Some(&serde_json::json!(true)),
        WaitOptions::default().with_interval(Duration::from_millis(25)),
    );

    let result = hypothesis.validate(&subject).await;
    updater.await.unwrap();
    assert!(result.passed, "{:?}", result.message);
}

#[tokio::test]
async fn renders_and_activity_are_observed_live() {
    let mock = MockSubject::new().shared();
    let subject: SubjectRef = mock.clone();
    let settled = assertions::to_have_rendered(2)
        .and(&assertions::to_have_text("Saved"))
        .unwrap();

    mock.render("<p>Saving</p>");
    assert!(!settled.validate(&subject).await.passed);

    mock.render("<p>Saved</p>");
    assert!(settled.validate(&subject).await.passed);

    assert!(assertions::to_be_active().validate(&subject).await.passed);
    mock.set_active(false);
    let result = assertions::to_be_active().validate(&subject).await;
    assert!(!result.passed);
    assert_eq!(result.actual, Some(serde_json::json!(false)));
}

#[tokio::test]
async fn unmounted_subject_fails_lifecycle_checks() {
    let mock = MockSubject::new().shared();
    let subject: SubjectRef = mock.clone();
    let alive = assertions::to_be_mounted().and(&assertions::to_be_active()).unwrap();

    assert!(alive.validate(&subject).await.passed);

    mock.set_mounted(false);
    let result = alive.validate(&subject).await;
    assert!(!result.passed);
    assert_eq!(
        result.message.as_deref(),
        Some("Expected subject to be mounted but it was not")
    );
}
