//! Per-file coverage points from a full report body of unknown shape.
//!
//! Known layouts are listed in [`PROBES`] and evaluated in order. Each probe
//! answers `None` when its shape is absent, so adding a layout means adding
//! one entry rather than another branch in the control flow.
//!
//! Layouts currently recognized:
//!   - `files`:          `[{ "path": "a.ts", "coverage": 0.5 }, ...]`
//!     (path from `path|file|name`, value from `coveragePercent|coverage|lineCoverage`)
//!   - `coverage.files`: `{ "a.ts": 90, "b.ts": { "pct": 55 } }`
//!     (value is a number or a record exposing `pct|coverage`)
use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::model::FileHeatPoint;
use crate::normalize::{as_record, first_numeric, first_string, numeric_from_unknown};

/// Maximum number of points returned.
pub const MAX_HEAT_POINTS: usize = 60;

const PATH_KEYS: &[&str] = &["path", "file", "name"];
const FILE_COVERAGE_KEYS: &[&str] = &["coveragePercent", "coverage", "lineCoverage"];
const MAP_COVERAGE_KEYS: &[&str] = &["pct", "coverage"];

type Probe = fn(&Map<String, Value>) -> Option<Vec<(String, f64)>>;

/// Shape probes, in evaluation order.
pub const PROBES: &[(&str, Probe)] = &[
    ("files", probe_files_array),
    ("coverage.files", probe_coverage_files_map),
];

/// Scale a raw coverage value to a percentage.
///
/// Values `<= 1` are fractions and get multiplied by 100. The result is
/// clamped to `0..=100`.
#[must_use]
pub fn normalize_percent(value: f64) -> f64 {
    let pct = if value <= 1.0 { value * 100.0 } else { value };
    pct.clamp(0.0, 100.0)
}

/// Extract heatmap points from a report body, worst coverage first.
#[must_use]
pub fn extract_file_heatmap(payload: Option<&Value>) -> Vec<FileHeatPoint> {
    let Some(root) = payload.and_then(as_record) else {
        return Vec::new();
    };

    let mut best: HashMap<String, f64> = HashMap::new();
    for (name, probe) in PROBES {
        let Some(candidates) = probe(root) else {
            continue;
        };
        tracing::trace!(shape = *name, count = candidates.len(), "heatmap shape matched");
        for (path, raw) in candidates {
            let pct = normalize_percent(raw);
            best.entry(path)
                .and_modify(|e| *e = e.max(pct))
                .or_insert(pct);
        }
    }

    let mut points: Vec<FileHeatPoint> = best
        .into_iter()
        .map(|(path, coverage_percent)| FileHeatPoint {
            path,
            coverage_percent,
        })
        .collect();
    points.sort_by(|a, b| {
        a.coverage_percent
            .total_cmp(&b.coverage_percent)
            .then_with(|| a.path.cmp(&b.path))
    });
    points.truncate(MAX_HEAT_POINTS);
    points
}

fn probe_files_array(root: &Map<String, Value>) -> Option<Vec<(String, f64)>> {
    let files = root.get("files")?.as_array()?;
    Some(
        files
            .iter()
            .filter_map(as_record)
            .filter_map(|rec| {
                let path = first_string(rec, PATH_KEYS)?;
                let cov = first_numeric(rec, FILE_COVERAGE_KEYS)?;
                Some((path.to_string(), cov))
            })
            .collect(),
    )
}

fn probe_coverage_files_map(root: &Map<String, Value>) -> Option<Vec<(String, f64)>> {
    let files = root.get("coverage").and_then(as_record)?.get("files").and_then(as_record)?;
    Some(
        files
            .iter()
            .filter(|(path, _)| !path.is_empty())
            .filter_map(|(path, entry)| {
                let cov = numeric_from_unknown(entry)
                    .or_else(|| as_record(entry).and_then(|r| first_numeric(r, MAP_COVERAGE_KEYS)))?;
                Some((path.clone(), cov))
            })
            .collect(),
    )
}
