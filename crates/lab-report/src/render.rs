//! Renderers
//!
//! Every renderer surfaces the same facts: the summary counts and success
//! rate, each experiment's outcome with its hypotheses, failure messages,
//! errors, and retry counts.

use lab_core::{ExperimentResult, LabReport};
use std::fmt::Write;

const RULE_WIDTH: usize = 60;

fn percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

fn status(result: &ExperimentResult) -> &'static str {
    if result.success {
        "PASS"
    } else {
        "FAIL"
    }
}

/// Plain text with fixed-width banners
#[must_use]
pub fn text(report: &LabReport) -> String {
    let heavy = "=".repeat(RULE_WIDTH);
    let light = "-".repeat(RULE_WIDTH);
    let stats = &report.stats;
    let mut out = String::new();

    let _ = writeln!(out, "{heavy}");
    let _ = writeln!(out, "LABORATORY REPORT: {}", report.laboratory_name);
    let _ = writeln!(out, "{heavy}");
    let _ = writeln!(out, "Timestamp: {}", report.timestamp.to_rfc3339());
    let _ = writeln!(out, "Duration:  {}ms", report.duration_ms);
    let _ = writeln!(out);
    let _ = writeln!(out, "SUMMARY");
    let _ = writeln!(out, "{light}");
    let _ = writeln!(out, "Total:        {}", stats.total_experiments);
    let _ = writeln!(out, "Passed:       {}", stats.passed);
    let _ = writeln!(out, "Failed:       {}", stats.failed);
    let _ = writeln!(out, "Skipped:      {}", stats.skipped);
    let _ = writeln!(out, "Success rate: {}", percent(stats.success_rate));
    let _ = writeln!(out);
    let _ = writeln!(out, "EXPERIMENTS");
    let _ = writeln!(out, "{light}");

    for result in &report.results {
        let _ = write!(
            out,
            "[{}] {} ({}) - {}ms",
            status(result),
            result.experiment_name,
            result.experiment_id,
            result.duration_ms
        );
        if let Some(retries) = result.retries {
            let _ = write!(out, " (retries: {retries})");
        }
        let _ = writeln!(out);

        for hypothesis in &result.hypotheses {
            let mark = if hypothesis.passed { "✓" } else { "✗" };
            match &hypothesis.message {
                Some(message) if !hypothesis.passed => {
                    let _ = writeln!(out, "    {mark} {}: {message}", hypothesis.name);
                }
                _ => {
                    let _ = writeln!(out, "    {mark} {}", hypothesis.name);
                }
            }
        }
        if let Some(error) = &result.error {
            let _ = writeln!(out, "    Error: {error}");
        }
    }

    let _ = writeln!(out, "{heavy}");
    let verdict = if report.success { "PASSED" } else { "FAILED" };
    let _ = writeln!(out, "RESULT: {verdict}");
    out
}

/// Escape text for HTML element content and attribute values
#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = "\
body { font-family: system-ui, sans-serif; margin: 2rem; color: #222; }
.summary { display: flex; gap: 1rem; margin-bottom: 2rem; }
.card { padding: 1rem 1.5rem; border-radius: 8px; background: #f4f4f5; min-width: 6rem; }
.card .value { font-size: 1.6rem; font-weight: 600; }
.experiment { border-left: 6px solid; padding: 0.5rem 1rem; margin-bottom: 1rem; }
.experiment.pass { border-color: #16a34a; background: #f0fdf4; }
.experiment.fail { border-color: #dc2626; background: #fef2f2; }
.hypothesis.pass { color: #15803d; }
.hypothesis.fail { color: #b91c1c; }
pre.error { background: #fee2e2; padding: 0.5rem; white-space: pre-wrap; }
";

/// Self-contained HTML document
#[must_use]
pub fn html(report: &LabReport) -> String {
    let stats = &report.stats;
    let name = escape_html(&report.laboratory_name);
    let mut out = String::new();

    let _ = writeln!(out, "<!DOCTYPE html>");
    let _ = writeln!(out, "<html lang=\"en\">");
    let _ = writeln!(out, "<head>");
    let _ = writeln!(out, "<meta charset=\"utf-8\">");
    let _ = writeln!(out, "<title>Laboratory Report: {name}</title>");
    let _ = writeln!(out, "<style>\n{STYLE}</style>");
    let _ = writeln!(out, "</head>");
    let _ = writeln!(out, "<body>");
    let _ = writeln!(out, "<h1>Laboratory Report: {name}</h1>");
    let _ = writeln!(
        out,
        "<p class=\"meta\">{} &middot; {}ms &middot; {}</p>",
        report.timestamp.to_rfc3339(),
        report.duration_ms,
        if report.success { "PASSED" } else { "FAILED" }
    );

    let _ = writeln!(out, "<div class=\"summary\">");
    for (label, value) in [
        ("Total", stats.total_experiments.to_string()),
        ("Passed", stats.passed.to_string()),
        ("Failed", stats.failed.to_string()),
        ("Skipped", stats.skipped.to_string()),
        ("Success rate", percent(stats.success_rate)),
    ] {
        let _ = writeln!(
            out,
            "<div class=\"card\"><div class=\"label\">{label}</div><div class=\"value\">{value}</div></div>"
        );
    }
    let _ = writeln!(out, "</div>");

    for result in &report.results {
        let class = if result.success { "pass" } else { "fail" };
        let _ = writeln!(out, "<div class=\"experiment {class}\">");
        let _ = write!(
            out,
            "<h2>{} {} <small>({}, {}ms",
            status(result),
            escape_html(&result.experiment_name),
            escape_html(&result.experiment_id),
            result.duration_ms
        );
        if let Some(retries) = result.retries {
            let _ = write!(out, ", retries: {retries}");
        }
        let _ = writeln!(out, ")</small></h2>");

        if !result.hypotheses.is_empty() {
            let _ = writeln!(out, "<ul>");
            for hypothesis in &result.hypotheses {
                let class = if hypothesis.passed { "pass" } else { "fail" };
                let _ = write!(
                    out,
                    "<li class=\"hypothesis {class}\">{}",
                    escape_html(&hypothesis.name)
                );
                if let (false, Some(message)) = (hypothesis.passed, &hypothesis.message) {
                    let _ = write!(out, ": {}", escape_html(message));
                }
                let _ = writeln!(out, "</li>");
            }
            let _ = writeln!(out, "</ul>");
        }
        if let Some(error) = &result.error {
            let _ = writeln!(out, "<pre class=\"error\">{}</pre>", escape_html(error));
        }
        let _ = writeln!(out, "</div>");
    }

    let _ = writeln!(out, "</body>");
    let _ = writeln!(out, "</html>");
    out
}

fn escape_cell(input: &str) -> String {
    input.replace('|', "\\|").replace('\n', " ")
}

/// Code fence longer than any backtick run in `text`
fn fence_for(text: &str) -> String {
    let longest = text.split(|c| c != '`').map(str::len).max().unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

/// Markdown with a summary table and one section per experiment
#[must_use]
pub fn markdown(report: &LabReport) -> String {
    let stats = &report.stats;
    let mut out = String::new();

    let _ = writeln!(out, "# Laboratory Report: {}", report.laboratory_name);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "**Result:** {} &middot; **Duration:** {}ms &middot; **Generated:** {}",
        if report.success { "PASSED" } else { "FAILED" },
        report.duration_ms,
        report.timestamp.to_rfc3339()
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "## Summary");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Metric | Value |");
    let _ = writeln!(out, "|--------|-------|");
    let _ = writeln!(out, "| Total | {} |", stats.total_experiments);
    let _ = writeln!(out, "| Passed | {} |", stats.passed);
    let _ = writeln!(out, "| Failed | {} |", stats.failed);
    let _ = writeln!(out, "| Skipped | {} |", stats.skipped);
    let _ = writeln!(out, "| Success rate | {} |", percent(stats.success_rate));
    let _ = writeln!(out);

    if !report.results.is_empty() {
        let _ = writeln!(out, "| Experiment | Status | Duration | Retries |");
        let _ = writeln!(out, "|------------|--------|----------|---------|");
        for result in &report.results {
            let _ = writeln!(
                out,
                "| {} | {} | {}ms | {} |",
                escape_cell(&result.experiment_name),
                status(result),
                result.duration_ms,
                result.retry_count()
            );
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "## Experiments");
    for result in &report.results {
        let icon = if result.success { "✅" } else { "❌" };
        let _ = writeln!(out);
        let _ = writeln!(out, "### {icon} {}", result.experiment_name);
        let _ = writeln!(out);
        let _ = write!(
            out,
            "`{}` &middot; {}ms",
            result.experiment_id, result.duration_ms
        );
        if let Some(retries) = result.retries {
            let _ = write!(out, " &middot; retries: {retries}");
        }
        let _ = writeln!(out);

        if !result.hypotheses.is_empty() {
            let _ = writeln!(out);
            for hypothesis in &result.hypotheses {
                let mark = if hypothesis.passed { "✓" } else { "✗" };
                match &hypothesis.message {
                    Some(message) if !hypothesis.passed => {
                        let _ = writeln!(out, "- {mark} {}: {message}", hypothesis.name);
                    }
                    _ => {
                        let _ = writeln!(out, "- {mark} {}", hypothesis.name);
                    }
                }
            }
        }
        if let Some(error) = &result.error {
            let fence = fence_for(error);
            let _ = writeln!(out);
            let _ = writeln!(out, "{fence}");
            let _ = writeln!(out, "{error}");
            let _ = writeln!(out, "{fence}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html("<b class=\"x\">Tom & Jerry's</b>"),
            "&lt;b class=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/b&gt;"
        );
    }

    #[test]
    fn escapes_table_cells() {
        assert_eq!(escape_cell("a|b\nc"), "a\\|b c");
    }

    #[test]
    fn fence_outgrows_backticks_in_error() {
        assert_eq!(fence_for("plain error"), "```");
        assert_eq!(fence_for("use `x`"), "```");
        assert_eq!(fence_for("got ```rust\npanic\n```"), "````");
        assert_eq!(fence_for("`````"), "``````");
    }

    #[test]
    fn percent_has_one_decimal() {
        assert_eq!(percent(0.5), "50.0%");
        assert_eq!(percent(2.0 / 3.0), "66.7%");
        assert_eq!(percent(0.0), "0.0%");
    }
}
