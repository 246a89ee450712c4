//! Boundary to the dashboard backend.
//!
//! Everything above this module talks to [`DashboardApi`]; [`HttpApi`] is the
//! blocking HTTP implementation used by the CLI. Failed calls are not
//! retried.
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::alerts::ParsedAlertConfig;
use crate::error::{DashError, Result};
use crate::model::{Bug, CoverageReport, DriftResult, DriftTimelinePoint, ProjectMemory};

/// Read and write operations the aggregation layer consumes.
pub trait DashboardApi: Send + Sync {
    /// Reports for a project, newest first.
    fn list_reports(&self, project_id: &str, limit: usize) -> Result<Vec<CoverageReport>>;

    /// Full, schema-unconstrained body of a single report.
    fn get_report_full(&self, report_id: &str) -> Result<Value>;

    fn list_bugs(&self, project_id: &str) -> Result<Vec<Bug>>;

    fn list_drift_results(&self, project_id: &str) -> Result<Vec<DriftResult>>;

    fn list_drift_timeline(&self, project_id: &str) -> Result<Vec<DriftTimelinePoint>>;

    /// Structured memory, or `None` when the project has none.
    fn get_project_memory(&self, project_id: &str) -> Result<Option<ProjectMemory>>;

    fn get_alert_config(&self, project_id: &str) -> Result<Option<ParsedAlertConfig>>;

    /// Replace the project's alert configuration. Omitted (null) fields are
    /// cleared on the server.
    fn update_alert_config(&self, project_id: &str, config: &ParsedAlertConfig) -> Result<()>;
}

/// Blocking HTTP client authenticating with a session cookie.
pub struct HttpApi {
    base_url: String,
    session: Option<String>,
    agent: ureq::Agent,
}

impl HttpApi {
    pub fn new(base_url: &str, session: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("covdash/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
            agent,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let req = self
            .agent
            .request(method, &self.url(path))
            .set("Accept", "application/json");
        match &self.session {
            Some(session) => req.set("Cookie", &format!("session={}", session)),
            None => req,
        }
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        tracing::debug!(path, "GET");
        let resp = self.request("GET", path).call().map_err(map_ureq_error)?;
        resp.into_json()
            .map_err(|e| DashError::Transport(format!("failed to decode response from {path}: {e}")))
    }

    /// Like [`get_json`](Self::get_json) but maps 404 to `None`.
    fn get_optional_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.get_json(path) {
            Ok(v) => Ok(Some(v)),
            Err(DashError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn put_json<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        tracing::debug!(path, "PUT");
        let body = serde_json::to_value(body)?;
        self.request("PUT", path)
            .send_json(body)
            .map_err(map_ureq_error)?;
        Ok(())
    }
}

/// Convert a ureq failure into the crate's error taxonomy. 401 means "not
/// authenticated"; any other status carries a best-effort decoded message.
fn map_ureq_error(err: ureq::Error) -> DashError {
    match err {
        ureq::Error::Status(401, _) => DashError::Unauthorized,
        ureq::Error::Status(status, resp) => {
            let status_text = resp.status_text().to_string();
            let body = resp.into_string().ok().filter(|b| !b.is_empty());
            let message = body
                .as_deref()
                .and_then(error_message_from_body)
                .unwrap_or(status_text);
            DashError::Api {
                status,
                message,
                body,
            }
        }
        ureq::Error::Transport(t) => DashError::Transport(t.to_string()),
    }
}

/// Pull a human-readable message out of an error body: a JSON `message` or
/// `error` field, otherwise the raw text.
#[must_use]
pub fn error_message_from_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        for key in ["message", "error"] {
            if let Some(Value::String(s)) = map.get(key) {
                return Some(s.clone());
            }
        }
    }
    Some(trimmed.to_string())
}

impl DashboardApi for HttpApi {
    fn list_reports(&self, project_id: &str, limit: usize) -> Result<Vec<CoverageReport>> {
        self.get_json(&format!("/api/projects/{project_id}/reports?limit={limit}"))
    }

    fn get_report_full(&self, report_id: &str) -> Result<Value> {
        self.get_json(&format!("/api/reports/{report_id}?full=true"))
    }

    fn list_bugs(&self, project_id: &str) -> Result<Vec<Bug>> {
        self.get_json(&format!("/api/projects/{project_id}/bugs"))
    }

    fn list_drift_results(&self, project_id: &str) -> Result<Vec<DriftResult>> {
        self.get_json(&format!("/api/projects/{project_id}/drift"))
    }

    fn list_drift_timeline(&self, project_id: &str) -> Result<Vec<DriftTimelinePoint>> {
        self.get_json(&format!("/api/projects/{project_id}/drift/timeline"))
    }

    fn get_project_memory(&self, project_id: &str) -> Result<Option<ProjectMemory>> {
        self.get_optional_json(&format!("/api/projects/{project_id}/memory"))
    }

    fn get_alert_config(&self, project_id: &str) -> Result<Option<ParsedAlertConfig>> {
        self.get_optional_json(&format!("/api/projects/{project_id}/alert-config"))
    }

    fn update_alert_config(&self, project_id: &str, config: &ParsedAlertConfig) -> Result<()> {
        self.put_json(&format!("/api/projects/{project_id}/alert-config"), config)
    }
}
