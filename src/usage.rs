//! Bug and LLM-usage rollups for the project overview.
use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::model::{Bug, CoverageReport};

const UNKNOWN: &str = "unknown";

/// Statuses that count a bug as resolved.
const CLOSED_STATUSES: &[&str] = &["closed", "fixed", "resolved", "wontfix", "dismissed"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BugSummary {
    pub total: usize,
    pub open: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
}

/// Count bugs by severity and status. Missing values are bucketed as
/// `"unknown"`; a bug without a status counts as open.
#[must_use]
pub fn summarize_bugs(bugs: &[Bug]) -> BugSummary {
    let mut summary = BugSummary {
        total: bugs.len(),
        ..Default::default()
    };
    for bug in bugs {
        let severity = bug.severity.as_deref().unwrap_or(UNKNOWN).to_lowercase();
        *summary.by_severity.entry(severity).or_default() += 1;

        let status = bug.status.as_deref().unwrap_or(UNKNOWN).to_lowercase();
        if !CLOSED_STATUSES.contains(&status.as_str()) {
            summary.open += 1;
        }
        *summary.by_status.entry(status).or_default() += 1;
    }
    summary
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUsage {
    pub model: String,
    pub report_count: usize,
    pub total_tokens: u64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmUsageSummary {
    pub total_tokens: u64,
    pub total_cost: f64,
    pub models: Vec<ModelUsage>,
}

/// Token and cost totals per model, most expensive first.
#[must_use]
pub fn summarize_llm_usage(reports: &[CoverageReport]) -> LlmUsageSummary {
    let mut per_model: HashMap<&str, ModelUsage> = HashMap::new();
    for r in reports {
        let model = r.llm_model.as_deref().unwrap_or(UNKNOWN);
        let entry = per_model.entry(model).or_insert_with(|| ModelUsage {
            model: model.to_string(),
            report_count: 0,
            total_tokens: 0,
            total_cost: 0.0,
        });
        entry.report_count += 1;
        entry.total_tokens += r.llm_total_tokens.unwrap_or(0);
        entry.total_cost += r.llm_cost_usd.unwrap_or(0.0);
    }

    let mut models: Vec<ModelUsage> = per_model.into_values().collect();
    models.sort_by(|a, b| {
        b.total_cost
            .total_cmp(&a.total_cost)
            .then_with(|| a.model.cmp(&b.model))
    });

    LlmUsageSummary {
        total_tokens: models.iter().map(|m| m.total_tokens).sum(),
        total_cost: models.iter().map(|m| m.total_cost).sum(),
        models,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bug(severity: Option<&str>, status: Option<&str>) -> Bug {
        Bug {
            severity: severity.map(str::to_string),
            status: status.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn bugs_are_counted_by_severity_and_status() {
        let bugs = vec![
            bug(Some("High"), Some("open")),
            bug(Some("high"), Some("fixed")),
            bug(None, None),
        ];
        let s = summarize_bugs(&bugs);
        assert_eq!(s.total, 3);
        assert_eq!(s.open, 2);
        assert_eq!(s.by_severity["high"], 2);
        assert_eq!(s.by_severity["unknown"], 1);
        assert_eq!(s.by_status["fixed"], 1);
    }

    #[test]
    fn usage_is_grouped_per_model() {
        let reports = vec![
            CoverageReport {
                llm_model: Some("small".into()),
                llm_total_tokens: Some(100),
                llm_cost_usd: Some(0.1),
                ..Default::default()
            },
            CoverageReport {
                llm_model: Some("large".into()),
                llm_total_tokens: Some(50),
                llm_cost_usd: Some(1.0),
                ..Default::default()
            },
            CoverageReport {
                llm_model: Some("small".into()),
                llm_total_tokens: None,
                llm_cost_usd: None,
                ..Default::default()
            },
        ];
        let s = summarize_llm_usage(&reports);
        assert_eq!(s.models.len(), 2);
        assert_eq!(s.models[0].model, "large");
        assert_eq!(s.models[1].report_count, 2);
        assert_eq!(s.total_tokens, 150);
        assert!((s.total_cost - 1.1).abs() < 1e-9);
    }
}
