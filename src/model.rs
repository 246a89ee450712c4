//! Records fetched from the dashboard API and the derived views built from
//! them. Wire types deserialize from the backend's camelCase JSON; derived
//! types serialize the same way so they can be handed straight to a UI.

use serde::{Deserialize, Serialize};

/// Package key used when a report carries no `packageId`.
pub const ROOT_PACKAGE: &str = "root";

/// Compute a ratio, returning 0.0 when the denominator is zero.
#[must_use]
pub fn rate(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Mean of the values that are present. Missing values are skipped rather
/// than counted as zero; an input with no values yields 0.0.
#[must_use]
pub fn mean_present<I>(values: I) -> f64
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0u64), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// One test-generation run against one package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoverageReport {
    pub id: String,
    pub project_id: String,
    pub package_id: Option<String>,
    pub run_id: String,
    pub run_mode: Option<String>,
    pub branch: Option<String>,
    pub commit_sha: Option<String>,
    pub llm_model: Option<String>,
    /// Fraction in 0..=1.
    pub overall_coverage: Option<f64>,
    pub tests_generated: u64,
    pub tests_passed: u64,
    pub tests_failed: u64,
    pub bugs_found: u64,
    pub llm_cost_usd: Option<f64>,
    pub llm_total_tokens: Option<u64>,
    pub pr_number: Option<u64>,
    pub pr_url: Option<String>,
    pub created_at: String,
}

impl CoverageReport {
    #[must_use]
    pub fn package_key(&self) -> &str {
        self.package_id.as_deref().unwrap_or(ROOT_PACKAGE)
    }
}

/// All reports sharing a `runId`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunGroup {
    pub run_id: String,
    pub run_mode: Option<String>,
    pub branch: Option<String>,
    pub commit_sha: Option<String>,
    pub model: Option<String>,
    pub created_at: String,
    pub report_count: usize,
    pub total_tests: u64,
    pub total_passed: u64,
    pub total_failed: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    /// Fraction in 0..=1.
    pub avg_coverage: f64,
}

/// All reports for one package.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageGroup {
    pub package_id: String,
    pub report_count: usize,
    pub total_tests: u64,
    pub total_passed: u64,
    /// Percent in 0..=100.
    pub avg_coverage: f64,
    /// Percent in 0..=100.
    pub pass_rate: f64,
    pub latest_date: String,
}

/// All reports attached to one pull request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrGroup {
    pub pr_number: u64,
    pub pr_url: Option<String>,
    pub branch: Option<String>,
    pub latest_date: String,
    pub report_count: usize,
    pub run_count: usize,
    pub total_tests: u64,
    pub total_bugs_found: u64,
    pub total_cost: f64,
    /// Percent in 0..=100.
    pub avg_coverage: f64,
}

/// One point of the coverage trend chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub date: String,
    /// Percent in 0..=100.
    pub coverage: f64,
    pub tests_passed: u64,
    pub tests_failed: u64,
}

/// Per-file coverage derived from a report's full body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHeatPoint {
    pub path: String,
    /// Percent in 0..=100.
    pub coverage_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Bug {
    pub id: String,
    pub project_id: String,
    pub report_id: Option<String>,
    pub title: String,
    pub severity: Option<String>,
    pub status: Option<String>,
    pub file_path: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DriftResult {
    pub id: String,
    pub project_id: String,
    pub test_name: String,
    pub status: String,
    pub drift_score: Option<f64>,
    pub message: Option<String>,
    pub checked_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DriftTimelinePoint {
    pub date: String,
    pub passed: u64,
    pub drifted: u64,
    pub failed: u64,
}

/// A named entry in the structured memory endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryEntry {
    pub name: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemorySection {
    pub patterns: Vec<MemoryEntry>,
    pub failures: Vec<MemoryEntry>,
}

/// Response of the structured memory-by-project endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectMemory {
    pub version: u64,
    pub global: Option<MemorySection>,
    pub updated_at: Option<String>,
}

/// Cumulative learned-item counts at one sampled report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthPoint {
    pub date: String,
    pub patterns: usize,
    pub failures: usize,
    pub total: usize,
}

/// What the memory view renders for a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySummary {
    pub patterns: Vec<String>,
    pub failed_approaches: Vec<String>,
    pub snapshot_count: usize,
    pub latest_date: Option<String>,
    pub growth: Vec<GrowthPoint>,
}
