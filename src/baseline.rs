//! Accepted drift baselines, kept client-side per project.
//!
//! Accepting a baseline records when a user marked a drift check as known
//! good. Entries are only ever added or refreshed; nothing here removes
//! them. Baselines annotate drift results for display and never change a
//! result's own status.
use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::model::DriftResult;
use crate::store::{load_json, namespaced_key, save_json, KvStore};

/// Test name → ISO timestamp of acceptance.
pub type BaselineState = BTreeMap<String, String>;

/// A drift result paired with its accepted baseline, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftRow<'a> {
    #[serde(flatten)]
    pub result: &'a DriftResult,
    pub accepted_at: Option<&'a str>,
}

/// Baselines for one project.
#[derive(Debug, Clone, Default)]
pub struct BaselineStore {
    project_id: String,
    entries: BaselineState,
}

impl BaselineStore {
    fn key(project_id: &str) -> String {
        namespaced_key(&["drift-baselines", project_id])
    }

    /// Load the project's baselines; an unknown project starts empty.
    pub fn load(store: &dyn KvStore, project_id: &str) -> Result<Self> {
        let entries = load_json(store, &Self::key(project_id))?.unwrap_or_default();
        Ok(Self {
            project_id: project_id.to_string(),
            entries,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn entries(&self) -> &BaselineState {
        &self.entries
    }

    pub fn accepted_at(&self, test_name: &str) -> Option<&str> {
        self.entries.get(test_name).map(String::as_str)
    }

    /// Mark `test_name` as accepted at `now` and persist.
    pub fn accept(&mut self, store: &dyn KvStore, test_name: &str, now: DateTime<Utc>) -> Result<()> {
        self.entries.insert(
            test_name.to_string(),
            now.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        save_json(store, &Self::key(&self.project_id), &self.entries)
    }

    /// Pair each drift result with its baseline, preserving input order.
    #[must_use]
    pub fn annotate<'a>(&'a self, results: &'a [DriftResult]) -> Vec<DriftRow<'a>> {
        results
            .iter()
            .map(|result| DriftRow {
                result,
                accepted_at: self.accepted_at(&result.test_name),
            })
            .collect()
    }
}
