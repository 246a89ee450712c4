//! What the test-generation agent has learned about a project.
//!
//! The structured memory endpoint is preferred. Projects that predate it
//! only carry memory inside free-form report bodies, so when the endpoint
//! has nothing the loader samples recent reports and reads those blobs,
//! tolerating every field-name variant that has shipped.
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use serde_json::Value;

use crate::api::DashboardApi;
use crate::error::Result;
use crate::lifecycle::Loader;
use crate::model::{CoverageReport, GrowthPoint, MemorySummary, ProjectMemory};
use crate::normalize::{as_record, string_items};

/// Display cap for pattern and failure lists.
pub const MAX_ITEMS: usize = 25;
/// Reports listed when falling back to report bodies.
pub const REPORT_WINDOW: usize = 60;
/// Report bodies fetched from that window.
pub const SAMPLE_SIZE: usize = 12;

const SECTION_KEYS: &[&str] = &["memory", "agentMemory"];
const PATTERN_KEYS: &[&str] = &["learnedPatterns", "patterns", "wins"];
const FAILURE_KEYS: &[&str] = &["failedApproaches", "failures", "dontRepeat"];

/// Memory read from one report body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportMemory {
    pub created_at: String,
    pub patterns: Vec<String>,
    pub failures: Vec<String>,
}

impl ReportMemory {
    fn item_count(&self) -> usize {
        self.patterns.len() + self.failures.len()
    }
}

/// Push unseen values, keeping first-seen order.
fn extend_unique<'a, I>(out: &mut Vec<String>, seen: &mut HashSet<String>, values: I)
where
    I: IntoIterator<Item = &'a str>,
{
    for v in values {
        if seen.insert(v.to_string()) {
            out.push(v.to_string());
        }
    }
}

fn collect_unique(section: &serde_json::Map<String, Value>, keys: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for key in keys {
        extend_unique(&mut out, &mut seen, string_items(section.get(*key)));
    }
    out
}

/// Read learned patterns and failed approaches from a report body.
///
/// The section is `memory`, else `agentMemory`, else the body itself.
/// Returns empty lists when nothing recognizable is present.
#[must_use]
pub fn parse_report_memory(body: &Value) -> (Vec<String>, Vec<String>) {
    let Some(root) = as_record(body) else {
        return (Vec::new(), Vec::new());
    };
    let section = SECTION_KEYS
        .iter()
        .find_map(|k| root.get(*k).and_then(as_record))
        .unwrap_or(root);
    (
        collect_unique(section, PATTERN_KEYS),
        collect_unique(section, FAILURE_KEYS),
    )
}

/// Summary from the structured endpoint, or `None` if it has nothing to
/// offer: version 0, no global section, or a global section without a
/// single pattern or failure.
#[must_use]
pub fn summarize_structured(memory: &ProjectMemory) -> Option<MemorySummary> {
    if memory.version == 0 {
        return None;
    }
    let global = memory
        .global
        .as_ref()
        .filter(|g| !g.patterns.is_empty() || !g.failures.is_empty())?;
    Some(MemorySummary {
        patterns: global
            .patterns
            .iter()
            .take(MAX_ITEMS)
            .map(|e| e.name.clone())
            .collect(),
        failed_approaches: global
            .failures
            .iter()
            .take(MAX_ITEMS)
            .map(|e| e.name.clone())
            .collect(),
        snapshot_count: 1,
        latest_date: memory.updated_at.clone(),
        growth: Vec::new(),
    })
}

/// Combine per-report memory (newest first) into a summary.
#[must_use]
pub fn summarize_sampled(samples: &[ReportMemory]) -> MemorySummary {
    let mut patterns = Vec::new();
    let mut failures = Vec::new();
    let mut seen_patterns = HashSet::new();
    let mut seen_failures = HashSet::new();
    for s in samples {
        extend_unique(&mut patterns, &mut seen_patterns, s.patterns.iter().map(String::as_str));
        extend_unique(&mut failures, &mut seen_failures, s.failures.iter().map(String::as_str));
    }
    patterns.truncate(MAX_ITEMS);
    failures.truncate(MAX_ITEMS);

    MemorySummary {
        patterns,
        failed_approaches: failures,
        snapshot_count: samples.iter().filter(|s| s.item_count() > 0).count(),
        latest_date: samples.first().map(|s| s.created_at.clone()),
        growth: build_growth(samples),
    }
}

/// Cumulative item counts in chronological order.
///
/// `samples` is newest first. The point for sample `i` sums the counts of
/// samples `i..`, i.e. that report and everything older, so the series never
/// decreases and ends at the overall total.
#[must_use]
pub fn build_growth(samples: &[ReportMemory]) -> Vec<GrowthPoint> {
    let mut patterns = 0;
    let mut failures = 0;
    samples
        .iter()
        .rev()
        .map(|s| {
            patterns += s.patterns.len();
            failures += s.failures.len();
            GrowthPoint {
                date: s.created_at.clone(),
                patterns,
                failures,
                total: patterns + failures,
            }
        })
        .collect()
}

/// Fetch the bodies of `reports` concurrently. A body that fails to load
/// contributes empty lists.
pub fn sample_reports(api: &dyn DashboardApi, reports: &[CoverageReport]) -> Vec<ReportMemory> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = reports
            .iter()
            .map(|report| {
                let handle = scope.spawn(move || api.get_report_full(&report.id));
                (report, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(report, handle)| {
                let (patterns, failures) = match handle.join() {
                    Ok(Ok(body)) => parse_report_memory(&body),
                    Ok(Err(err)) => {
                        tracing::warn!(report_id = %report.id, error = %err, "report body unavailable");
                        (Vec::new(), Vec::new())
                    }
                    Err(_) => {
                        tracing::warn!(report_id = %report.id, "report body fetch panicked");
                        (Vec::new(), Vec::new())
                    }
                };
                ReportMemory {
                    created_at: report.created_at.clone(),
                    patterns,
                    failures,
                }
            })
            .collect()
    })
}

/// Load the memory view for a project.
///
/// Errors from the structured endpoint only trigger the fallback. Once
/// falling back, a failure to list reports is returned as the load error.
pub fn load_memory(api: &dyn DashboardApi, project_id: &str) -> Result<MemorySummary> {
    match api.get_project_memory(project_id) {
        Ok(Some(memory)) => {
            if let Some(summary) = summarize_structured(&memory) {
                return Ok(summary);
            }
            tracing::debug!(project_id, version = memory.version, "structured memory empty");
        }
        Ok(None) => tracing::debug!(project_id, "no structured memory"),
        Err(err) => {
            tracing::warn!(project_id, error = %err, "structured memory unavailable, sampling reports")
        }
    }

    let reports = api.list_reports(project_id, REPORT_WINDOW)?;
    let sampled = &reports[..reports.len().min(SAMPLE_SIZE)];
    let samples = sample_reports(api, sampled);
    Ok(summarize_sampled(&samples))
}

/// Run [`load_memory`] as a load of `loader`.
///
/// The lock is not held while fetching, so the view may be torn down or
/// reloaded meanwhile. Returns `false` when the result was discarded.
pub fn refresh_memory(
    loader: &Mutex<Loader<MemorySummary>>,
    api: &dyn DashboardApi,
    project_id: &str,
) -> bool {
    let flag = loader
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .begin();
    let result = load_memory(api, project_id);
    let applied = loader
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .finish(&flag, result);
    if !applied {
        tracing::debug!(project_id, "memory load finished after teardown");
    }
    applied
}
