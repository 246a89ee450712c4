//! Command handler functions for the covdash CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout.

use std::fmt::Write;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use crate::aggregate::{build_trend, group_by_package, group_by_pr, group_by_run};
use crate::alerts::{AlertConfig, AlertConfigWorker, AlertEvent, ParsedAlertConfig, DEBOUNCE};
use crate::api::DashboardApi;
use crate::baseline::BaselineStore;
use crate::heatmap::extract_file_heatmap;
use crate::lifecycle::{LoadState, Loader};
use crate::memory::refresh_memory;
use crate::prefs::{self, Theme};
use crate::store::KvStore;
use crate::usage::{summarize_bugs, summarize_llm_usage};

/// Number of reports fetched for report-based views.
pub const DEFAULT_REPORT_LIMIT: usize = 100;

/// Output style for every view.
#[derive(Clone, Copy, ValueEnum)]
pub enum Style {
    Text,
    Json,
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    out.push('\n');
    Ok(out)
}

fn opt(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

pub fn cmd_runs(api: &dyn DashboardApi, project: &str, limit: usize, style: Style) -> Result<String> {
    let reports = api.list_reports(project, limit).context("Failed to list reports")?;
    let runs = group_by_run(&reports);
    if let Style::Json = style {
        return to_json(&runs);
    }
    if runs.is_empty() {
        return Ok("No runs found.\n".to_string());
    }

    let mut out = String::new();
    writeln!(
        out,
        "{:<24} {:<10} {:<20} {:>6} {:>6} {:>6} {:>8} {:>10}",
        "RUN", "MODE", "BRANCH", "TESTS", "PASS", "FAIL", "COVER", "TOKENS"
    )
    .unwrap();
    writeln!(out, "{}", "-".repeat(98)).unwrap();
    for r in &runs {
        writeln!(
            out,
            "{:<24} {:<10} {:<20} {:>6} {:>6} {:>6} {:>7.1}% {:>10}",
            r.run_id,
            opt(r.run_mode.as_deref()),
            opt(r.branch.as_deref()),
            r.total_tests,
            r.total_passed,
            r.total_failed,
            r.avg_coverage * 100.0,
            r.total_tokens
        )
        .unwrap();
    }
    Ok(out)
}

pub fn cmd_packages(
    api: &dyn DashboardApi,
    project: &str,
    limit: usize,
    style: Style,
) -> Result<String> {
    let reports = api.list_reports(project, limit).context("Failed to list reports")?;
    let packages = group_by_package(&reports);
    if let Style::Json = style {
        return to_json(&packages);
    }
    if packages.is_empty() {
        return Ok("No packages found.\n".to_string());
    }

    let mut out = String::new();
    writeln!(
        out,
        "{:<40} {:>8} {:>8} {:>8} {:>8}",
        "PACKAGE", "REPORTS", "TESTS", "COVER", "PASS"
    )
    .unwrap();
    writeln!(out, "{}", "-".repeat(76)).unwrap();
    for p in &packages {
        writeln!(
            out,
            "{:<40} {:>8} {:>8} {:>7.1}% {:>7.1}%",
            p.package_id, p.report_count, p.total_tests, p.avg_coverage, p.pass_rate
        )
        .unwrap();
    }
    Ok(out)
}

pub fn cmd_prs(api: &dyn DashboardApi, project: &str, limit: usize, style: Style) -> Result<String> {
    let reports = api.list_reports(project, limit).context("Failed to list reports")?;
    let prs = group_by_pr(&reports);
    if let Style::Json = style {
        return to_json(&prs);
    }
    if prs.is_empty() {
        return Ok("No pull requests found.\n".to_string());
    }

    let mut out = String::new();
    writeln!(
        out,
        "{:<8} {:<24} {:>6} {:>6} {:>8} {:>9}  LATEST",
        "PR", "BRANCH", "TESTS", "BUGS", "COVER", "COST"
    )
    .unwrap();
    writeln!(out, "{}", "-".repeat(90)).unwrap();
    for pr in &prs {
        writeln!(
            out,
            "#{:<7} {:<24} {:>6} {:>6} {:>7.1}% {:>8.2}$  {}",
            pr.pr_number,
            opt(pr.branch.as_deref()),
            pr.total_tests,
            pr.total_bugs_found,
            pr.avg_coverage,
            pr.total_cost,
            pr.latest_date
        )
        .unwrap();
    }
    Ok(out)
}

pub fn cmd_trend(api: &dyn DashboardApi, project: &str, limit: usize, style: Style) -> Result<String> {
    let reports = api.list_reports(project, limit).context("Failed to list reports")?;
    let trend = build_trend(&reports);
    if let Style::Json = style {
        return to_json(&trend);
    }
    if trend.is_empty() {
        return Ok("No reports found.\n".to_string());
    }

    let mut out = String::new();
    writeln!(out, "{:<12} {:>8} {:>6} {:>6}", "DATE", "COVER", "PASS", "FAIL").unwrap();
    writeln!(out, "{}", "-".repeat(35)).unwrap();
    for p in &trend {
        writeln!(
            out,
            "{:<12} {:>7.1}% {:>6} {:>6}",
            p.date, p.coverage, p.tests_passed, p.tests_failed
        )
        .unwrap();
    }
    Ok(out)
}

pub fn cmd_heatmap(api: &dyn DashboardApi, report_id: &str, style: Style) -> Result<String> {
    let body = api
        .get_report_full(report_id)
        .with_context(|| format!("Failed to fetch report '{}'", report_id))?;
    let points = extract_file_heatmap(Some(&body));
    if let Style::Json = style {
        return to_json(&points);
    }
    if points.is_empty() {
        return Ok(format!("No per-file coverage in report '{}'\n", report_id));
    }

    let mut out = String::new();
    writeln!(out, "{:<70} {:>8}", "FILE", "COVER").unwrap();
    writeln!(out, "{}", "-".repeat(79)).unwrap();
    for p in &points {
        writeln!(out, "{:<70} {:>7.1}%", p.path, p.coverage_percent).unwrap();
    }
    Ok(out)
}

pub fn cmd_memory(api: &dyn DashboardApi, project: &str, style: Style) -> Result<String> {
    let loader = Mutex::new(Loader::new());
    refresh_memory(&loader, api, project);
    let state = loader
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .into_state();
    let summary = match state {
        LoadState::Ready(summary) => summary,
        LoadState::Error(msg) => bail!("Failed to load memory: {}", msg),
        LoadState::Idle | LoadState::Loading => bail!("Memory load did not complete"),
    };
    if let Style::Json = style {
        return to_json(&summary);
    }

    let mut out = String::new();
    writeln!(out, "Snapshots:  {}", summary.snapshot_count).unwrap();
    writeln!(out, "Latest:     {}", opt(summary.latest_date.as_deref())).unwrap();
    writeln!(out, "\nLearned patterns ({}):", summary.patterns.len()).unwrap();
    for p in &summary.patterns {
        writeln!(out, "  + {}", p).unwrap();
    }
    writeln!(out, "\nFailed approaches ({}):", summary.failed_approaches.len()).unwrap();
    for f in &summary.failed_approaches {
        writeln!(out, "  - {}", f).unwrap();
    }
    if !summary.growth.is_empty() {
        writeln!(out, "\nGrowth:").unwrap();
        for g in &summary.growth {
            writeln!(out, "  {:<28} {:>4}", g.date, g.total).unwrap();
        }
    }
    Ok(out)
}

pub fn cmd_usage(api: &dyn DashboardApi, project: &str, limit: usize, style: Style) -> Result<String> {
    let reports = api.list_reports(project, limit).context("Failed to list reports")?;
    let bugs = api.list_bugs(project).context("Failed to list bugs")?;
    let usage = summarize_llm_usage(&reports);
    let bug_summary = summarize_bugs(&bugs);
    if let Style::Json = style {
        return to_json(&serde_json::json!({ "llm": usage, "bugs": bug_summary }));
    }

    let mut out = String::new();
    writeln!(
        out,
        "LLM usage:  {} tokens, ${:.2}",
        usage.total_tokens, usage.total_cost
    )
    .unwrap();
    for m in &usage.models {
        writeln!(
            out,
            "  {:<30} {:>5} reports {:>12} tokens {:>9.2}$",
            m.model, m.report_count, m.total_tokens, m.total_cost
        )
        .unwrap();
    }
    writeln!(out, "Bugs:       {} total, {} open", bug_summary.total, bug_summary.open).unwrap();
    for (severity, count) in &bug_summary.by_severity {
        writeln!(out, "  {:<12} {:>5}", severity, count).unwrap();
    }
    Ok(out)
}

pub fn cmd_drift(
    api: &dyn DashboardApi,
    store: &dyn KvStore,
    project: &str,
    style: Style,
) -> Result<String> {
    let results = api
        .list_drift_results(project)
        .context("Failed to list drift results")?;
    let timeline = api
        .list_drift_timeline(project)
        .context("Failed to load drift timeline")?;
    let baselines = BaselineStore::load(store, project)?;
    let rows = baselines.annotate(&results);
    if let Style::Json = style {
        return to_json(&serde_json::json!({ "results": rows, "timeline": timeline }));
    }
    if rows.is_empty() {
        return Ok("No drift checks found.\n".to_string());
    }

    let mut out = String::new();
    writeln!(out, "{:<40} {:<10} {:>7}  BASELINE", "TEST", "STATUS", "SCORE").unwrap();
    writeln!(out, "{}", "-".repeat(90)).unwrap();
    for row in &rows {
        let score = row
            .result
            .drift_score
            .map(|s| format!("{:.2}", s))
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "{:<40} {:<10} {:>7}  {}",
            row.result.test_name,
            row.result.status,
            score,
            opt(row.accepted_at)
        )
        .unwrap();
    }
    Ok(out)
}

pub fn cmd_accept_baseline(store: &dyn KvStore, project: &str, test_name: &str) -> Result<String> {
    let mut baselines = BaselineStore::load(store, project)?;
    baselines.accept(store, test_name, chrono::Utc::now())?;
    Ok(format!(
        "Accepted baseline for '{}' at {}\n",
        test_name,
        opt(baselines.accepted_at(test_name))
    ))
}

pub fn cmd_alerts_show(api: &dyn DashboardApi, project: &str, style: Style) -> Result<String> {
    let config = api
        .get_alert_config(project)
        .context("Failed to load alert config")?
        .unwrap_or_default();
    if let Style::Json = style {
        return to_json(&config);
    }
    Ok(format_alert_config(&config))
}

fn format_alert_config(config: &ParsedAlertConfig) -> String {
    let form = AlertConfig::from_wire(config);
    let mut out = String::new();
    writeln!(out, "Webhook:          {}", or_unset(&form.slack_webhook_url)).unwrap();
    writeln!(out, "Daily cost (USD): {}", or_unset(&form.daily_cost_threshold_usd)).unwrap();
    writeln!(out, "Budget alert %:   {}", or_unset(&form.budget_alert_percent)).unwrap();
    writeln!(out, "Recipients:       {}", or_unset(&form.email_recipients)).unwrap();
    writeln!(out, "Email provider:   {}", or_unset(&form.email_provider)).unwrap();
    writeln!(out, "Email from:       {}", or_unset(&form.email_from)).unwrap();
    out
}

fn or_unset(s: &str) -> &str {
    if s.is_empty() {
        "(unset)"
    } else {
        s
    }
}

/// Field updates for `alerts set`. `None` leaves a field as loaded; an
/// empty string clears it.
#[derive(Debug, Default, Clone)]
pub struct AlertEdits {
    pub webhook: Option<String>,
    pub daily_cost_usd: Option<String>,
    pub budget_percent: Option<String>,
    pub recipients: Option<String>,
    pub provider: Option<String>,
    pub from: Option<String>,
}

impl AlertEdits {
    fn apply(self, config: &mut AlertConfig) {
        if let Some(v) = self.webhook {
            config.slack_webhook_url = v;
        }
        if let Some(v) = self.daily_cost_usd {
            config.daily_cost_threshold_usd = v;
        }
        if let Some(v) = self.budget_percent {
            config.budget_alert_percent = v;
        }
        if let Some(v) = self.recipients {
            config.email_recipients = v;
        }
        if let Some(v) = self.provider {
            config.email_provider = v;
        }
        if let Some(v) = self.from {
            config.email_from = v;
        }
    }
}

fn next_event(events: &Receiver<AlertEvent>, timeout: Duration) -> Result<AlertEvent> {
    events
        .recv_timeout(timeout)
        .context("Timed out waiting for alert config worker")
}

/// Apply edits through the debounced controller and wait for the save.
pub fn cmd_alerts_set(
    api: Arc<dyn DashboardApi>,
    project: &str,
    edits: AlertEdits,
    wait: Duration,
) -> Result<String> {
    let (worker, events) = AlertConfigWorker::spawn(api, project);

    match next_event(&events, wait)? {
        AlertEvent::Loaded(_) => {}
        AlertEvent::LoadFailed(msg) => bail!("Failed to load alert config: {}", msg),
        other => bail!("Unexpected alert config event: {:?}", other),
    }

    worker.edit(move |config| edits.apply(config));

    let result = match next_event(&events, wait + DEBOUNCE)? {
        AlertEvent::Saved(saved) => {
            let mut out = String::from("Alert config saved.\n");
            out.push_str(&format_alert_config(&saved));
            Ok(out)
        }
        AlertEvent::Invalid(msg) => Err(anyhow::anyhow!("Invalid alert config: {}", msg)),
        AlertEvent::SaveFailed(msg) => Err(anyhow::anyhow!("Failed to save alert config: {}", msg)),
        other => Err(anyhow::anyhow!("Unexpected alert config event: {:?}", other)),
    };
    worker.shutdown();
    result
}

pub fn cmd_recent(store: &dyn KvStore) -> Result<String> {
    let recent = prefs::recent_projects(store)?;
    if recent.is_empty() {
        return Ok("No recent projects.\n".to_string());
    }
    let mut out = String::new();
    for p in &recent {
        writeln!(out, "{}", p).unwrap();
    }
    Ok(out)
}

pub fn cmd_theme(store: &dyn KvStore, set: Option<Theme>) -> Result<String> {
    if let Some(theme) = set {
        prefs::set_theme(store, theme)?;
    }
    Ok(format!("{}\n", prefs::theme(store)?))
}

pub fn cmd_sidebar(store: &dyn KvStore, collapsed: Option<bool>) -> Result<String> {
    if let Some(c) = collapsed {
        prefs::set_sidebar_collapsed(store, c)?;
    }
    let state = if prefs::sidebar_collapsed(store)? {
        "collapsed"
    } else {
        "expanded"
    };
    Ok(format!("{}\n", state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn alert_edits_only_touch_given_fields() {
        let mut config = AlertConfig {
            email_from: "ops@example.test".into(),
            budget_alert_percent: "80".into(),
            ..Default::default()
        };
        AlertEdits {
            budget_percent: Some(String::new()),
            provider: Some("resend".into()),
            ..Default::default()
        }
        .apply(&mut config);
        assert_eq!(config.budget_alert_percent, "");
        assert_eq!(config.email_provider, "resend");
        assert_eq!(config.email_from, "ops@example.test");
    }

    #[test]
    fn theme_and_sidebar_commands() {
        let store = MemoryStore::new();
        assert_eq!(cmd_theme(&store, None).unwrap(), "system\n");
        assert_eq!(cmd_theme(&store, Some(Theme::Dark)).unwrap(), "dark\n");
        assert_eq!(cmd_sidebar(&store, Some(true)).unwrap(), "collapsed\n");
        assert_eq!(cmd_sidebar(&store, None).unwrap(), "collapsed\n");
    }

    #[test]
    fn recent_command_lists_visits() {
        let store = MemoryStore::new();
        assert_eq!(cmd_recent(&store).unwrap(), "No recent projects.\n");
        prefs::visit_project(&store, "p1").unwrap();
        prefs::visit_project(&store, "p2").unwrap();
        assert_eq!(cmd_recent(&store).unwrap(), "p2\np1\n");
    }

    #[test]
    fn accept_baseline_reports_timestamp() {
        let store = MemoryStore::new();
        let out = cmd_accept_baseline(&store, "p1", "login").unwrap();
        assert!(out.starts_with("Accepted baseline for 'login' at 20"));
    }
}
