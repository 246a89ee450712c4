#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use covdash::alerts::ParsedAlertConfig;
use covdash::api::DashboardApi;
use covdash::error::{DashError, Result};
use covdash::model::{Bug, CoverageReport, DriftResult, DriftTimelinePoint, ProjectMemory};
use covdash::store::SqliteStore;
use serde_json::Value;
use tempfile::TempDir;

/// Create a fresh on-disk store, returning the store, dir handle, and db path.
/// The caller must hold onto `TempDir` to keep the temp directory alive.
pub fn setup_store() -> (SqliteStore, TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("prefs.db");
    let store = SqliteStore::open(&db_path).unwrap();
    (store, dir, db_path)
}

pub fn report(id: &str, run_id: &str, created_at: &str) -> CoverageReport {
    CoverageReport {
        id: id.to_string(),
        project_id: "p1".to_string(),
        run_id: run_id.to_string(),
        created_at: created_at.to_string(),
        ..Default::default()
    }
}

fn not_found(what: &str) -> DashError {
    DashError::Api {
        status: 404,
        message: format!("{what} not found"),
        body: None,
    }
}

/// In-memory stand-in for the dashboard backend.
#[derive(Default)]
pub struct FakeApi {
    pub reports: Vec<CoverageReport>,
    /// Full bodies by report id; a missing id fails with 404.
    pub bodies: HashMap<String, Value>,
    pub memory: Option<ProjectMemory>,
    pub memory_fails: bool,
    pub list_fails: bool,
    pub bugs: Vec<Bug>,
    pub drift: Vec<DriftResult>,
    pub timeline: Vec<DriftTimelinePoint>,
    pub alert_config: Mutex<Option<ParsedAlertConfig>>,
    pub save_fails: bool,
    pub saves: Mutex<Vec<ParsedAlertConfig>>,
    pub body_calls: AtomicUsize,
    pub list_limits: Mutex<Vec<usize>>,
    /// Runs inside `list_reports`, before it answers.
    pub on_list: Option<Box<dyn Fn() + Send + Sync>>,
}

impl FakeApi {
    pub fn body_calls(&self) -> usize {
        self.body_calls.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> Vec<ParsedAlertConfig> {
        self.saves.lock().unwrap().clone()
    }
}

impl DashboardApi for FakeApi {
    fn list_reports(&self, _project_id: &str, limit: usize) -> Result<Vec<CoverageReport>> {
        self.list_limits.lock().unwrap().push(limit);
        if let Some(hook) = &self.on_list {
            hook();
        }
        if self.list_fails {
            return Err(DashError::Transport("connection refused".to_string()));
        }
        Ok(self.reports.iter().take(limit).cloned().collect())
    }

    fn get_report_full(&self, report_id: &str) -> Result<Value> {
        self.body_calls.fetch_add(1, Ordering::SeqCst);
        self.bodies
            .get(report_id)
            .cloned()
            .ok_or_else(|| not_found("report"))
    }

    fn list_bugs(&self, _project_id: &str) -> Result<Vec<Bug>> {
        Ok(self.bugs.clone())
    }

    fn list_drift_results(&self, _project_id: &str) -> Result<Vec<DriftResult>> {
        Ok(self.drift.clone())
    }

    fn list_drift_timeline(&self, _project_id: &str) -> Result<Vec<DriftTimelinePoint>> {
        Ok(self.timeline.clone())
    }

    fn get_project_memory(&self, _project_id: &str) -> Result<Option<ProjectMemory>> {
        if self.memory_fails {
            return Err(DashError::Api {
                status: 500,
                message: "memory service down".to_string(),
                body: None,
            });
        }
        Ok(self.memory.clone())
    }

    fn get_alert_config(&self, _project_id: &str) -> Result<Option<ParsedAlertConfig>> {
        Ok(self.alert_config.lock().unwrap().clone())
    }

    fn update_alert_config(&self, _project_id: &str, config: &ParsedAlertConfig) -> Result<()> {
        if self.save_fails {
            return Err(DashError::Unauthorized);
        }
        self.saves.lock().unwrap().push(config.clone());
        *self.alert_config.lock().unwrap() = Some(config.clone());
        Ok(())
    }
}
