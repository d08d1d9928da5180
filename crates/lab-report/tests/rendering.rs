//! Renderers and queries over reports produced by a real laboratory run.

use chrono::Utc;
use lab_core::prelude::*;
use lab_core::LaboratoryStats;
use lab_hypothesis::HypothesisResult;
use lab_report::{ReportFormat, Reporter};
use lab_test_utils::{failing, passing, CallCounter, MockSubject};
use pretty_assertions::assert_eq;

async fn mixed_report() -> LabReport {
    let lab = Laboratory::new(LaboratoryConfig::new("Checkout <suite>"));
    let subject: SubjectRef = MockSubject::new().with_state("total", 42).shared();
    let flaky = CallCounter::new();

    lab.register_experiment(
        Experiment::new("totals", "Totals | tax")
            .with_subject(subject.clone())
            .with_hypothesis(assertions::to_have_state("total", 42)),
    )
    .unwrap();
    lab.register_experiment(
        Experiment::new("discount", "Discount applies")
            .with_subject(subject.clone())
            .with_hypothesis(passing("code accepted"))
            .with_hypothesis(failing("price reduced", "Expected 37 but got 42")),
    )
    .unwrap();
    lab.register_experiment(
        Experiment::new("retry", "Eventually stable")
            .with_subject(subject)
            .with_test(flaky.flaky_test(1))
            .with_max_retries(2),
    )
    .unwrap();

    lab.run_all().await.unwrap()
}

fn result(id: &str, duration_ms: u64, success: bool) -> ExperimentResult {
    ExperimentResult {
        experiment_id: id.into(),
        experiment_name: id.into(),
        success,
        timestamp: Utc::now(),
        duration_ms,
        hypotheses: Vec::new(),
        error: None,
        retries: None,
    }
}

fn synthetic(results: Vec<ExperimentResult>) -> LabReport {
    let stats = LaboratoryStats::derive(results.len(), &results, 0);
    LabReport::new("synthetic", stats, results)
}

#[tokio::test]
async fn json_round_trip_preserves_name_and_stats() {
    let report = mixed_report().await;

    let json = Reporter::format(&report, ReportFormat::Json).unwrap();
    let parsed: LabReport = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed.laboratory_name, report.laboratory_name);
    assert_eq!(parsed.stats, report.stats);
    assert_eq!(parsed, report);
}

#[tokio::test]
async fn json_uses_camel_case_fields() {
    let report = mixed_report().await;
    let value: serde_json::Value = serde_json::from_str(&Reporter::to_json(&report).unwrap()).unwrap();

    assert_eq!(value["laboratoryName"], "Checkout <suite>");
    assert_eq!(value["stats"]["totalExperiments"], 3);
    assert_eq!(value["results"][1]["hypotheses"][1]["assertionKind"], "custom");
    assert_eq!(value["results"][2]["retries"], 1);
}

#[tokio::test]
async fn every_renderer_surfaces_the_same_facts() {
    let report = mixed_report().await;
    assert_eq!(report.stats.passed, 2);
    assert_eq!(report.stats.failed, 1);

    let text = Reporter::to_text(&report);
    assert!(text.contains("Passed:       2"));
    assert!(text.contains("Failed:       1"));
    assert!(text.contains("Success rate: 66.7%"));
    assert!(text.contains("[FAIL] Discount applies (discount)"));
    assert!(text.contains("✗ price reduced: Expected 37 but got 42"));
    assert!(text.contains("(retries: 1)"));
    assert!(text.trim_end().ends_with("RESULT: FAILED"));

    let html = Reporter::to_html(&report);
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("Checkout &lt;suite&gt;"));
    assert!(html.contains("<div class=\"experiment fail\">"));
    assert!(html.contains("price reduced: Expected 37 but got 42"));
    assert!(html.contains("retries: 1"));
    assert!(html.contains("66.7%"));

    let markdown = Reporter::to_markdown(&report);
    assert!(markdown.starts_with("# Laboratory Report: Checkout <suite>"));
    assert!(markdown.contains("| Failed | 1 |"));
    assert!(markdown.contains("| Totals \\| tax | PASS |"));
    assert!(markdown.contains("### ❌ Discount applies"));
    assert!(markdown.contains("- ✗ price reduced: Expected 37 but got 42"));
    assert!(markdown.contains("retries: 1"));
}

#[test]
fn errors_render_in_each_format() {
    let mut broken = result("broken", 3, false);
    broken.error = Some("experiment broken timed out after 3ms".into());
    broken.hypotheses.push(HypothesisResult::pass("unused", AssertionKind::BeMounted));
    let report = synthetic(vec![broken]);

    assert!(Reporter::to_text(&report).contains("    Error: experiment broken timed out after 3ms"));
    assert!(Reporter::to_html(&report)
        .contains("<pre class=\"error\">experiment broken timed out after 3ms</pre>"));
    assert!(Reporter::to_markdown(&report)
        .contains("```\nexperiment broken timed out after 3ms\n```"));
}

#[test]
fn markdown_error_fence_survives_embedded_fences() {
    let mut broken = result("broken", 1, false);
    broken.error = Some("test hook failed: expected ```ok``` in output".into());
    let report = synthetic(vec![broken, result("after", 2, true)]);

    let markdown = Reporter::to_markdown(&report);

    assert!(markdown.contains("````\ntest hook failed: expected ```ok``` in output\n````\n"));
    assert!(markdown.contains("### ✅ after"));
}

#[test]
fn slowest_is_stable_and_truncated() {
    let report = synthetic(vec![
        result("a", 10, true),
        result("b", 30, true),
        result("c", 10, false),
        result("d", 30, true),
    ]);

    let ids: Vec<_> = Reporter::slowest(&report, 3)
        .into_iter()
        .map(|r| r.experiment_id.as_str())
        .collect();
    assert_eq!(ids, vec!["b", "d", "a"]);
    assert_eq!(Reporter::slowest(&report, 10).len(), 4);
    assert!(Reporter::slowest(&report, 0).is_empty());
}

#[test]
fn queries_partition_results_without_mutation() {
    let mut retried = result("r", 5, true);
    retried.retries = Some(2);
    let report = synthetic(vec![result("p", 1, true), result("f", 2, false), retried]);
    let before = report.clone();

    let failures: Vec<_> = Reporter::failures(&report).iter().map(|r| r.experiment_id.clone()).collect();
    let passes: Vec<_> = Reporter::passes(&report).iter().map(|r| r.experiment_id.clone()).collect();
    let retries: Vec<_> = Reporter::retried(&report).iter().map(|r| r.experiment_id.clone()).collect();

    assert_eq!(failures, vec!["f"]);
    assert_eq!(passes, vec!["p", "r"]);
    assert_eq!(retries, vec!["r"]);
    assert_eq!(report, before);
}

#[tokio::test]
async fn save_picks_format_from_extension() {
    let report = mixed_report().await;
    let dir = tempfile::tempdir().unwrap();

    for (file, format) in [
        ("nested/report.md", ReportFormat::Markdown),
        ("report.json", ReportFormat::Json),
        ("report.html", ReportFormat::Html),
        ("report.txt", ReportFormat::Text),
    ] {
        let path = dir.path().join(file);
        assert_eq!(Reporter::save(&report, &path).unwrap(), format);
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, Reporter::format(&report, format).unwrap());
    }

    let err = Reporter::save(&report, dir.path().join("report.pdf")).unwrap_err();
    assert!(matches!(err, lab_report::ReportError::UnknownFormat(_)));
}
