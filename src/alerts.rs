//! Alert settings for one project: validated on every edit, persisted after
//! a quiet period.
//!
//! [`AlertConfigController`] is the state machine. It never sleeps; callers
//! hand it the current time and ask [`poll`](AlertConfigController::poll)
//! whether a save is due. [`AlertConfigWorker`] drives a controller on a
//! background thread, loading the config, applying edits received over a
//! channel and persisting through [`DashboardApi`].
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::api::DashboardApi;
use crate::lifecycle::ActiveFlag;

/// Quiet period between the last valid edit and the save.
pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// Required prefix for incoming-webhook URLs.
pub const WEBHOOK_PREFIX: &str = "https://hooks.slack.com/";

/// Editable, text-typed alert settings as shown in the settings form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertConfig {
    pub slack_webhook_url: String,
    pub daily_cost_threshold_usd: String,
    pub budget_alert_percent: String,
    /// Comma-separated addresses.
    pub email_recipients: String,
    pub email_provider: String,
    pub email_from: String,
}

/// Wire shape of the alert-config endpoint. Unset fields are `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedAlertConfig {
    pub slack_webhook_url: Option<String>,
    pub daily_cost_threshold_usd: Option<f64>,
    pub budget_alert_percent: Option<f64>,
    pub email_recipients: Vec<String>,
    pub email_provider: Option<String>,
    pub email_from: Option<String>,
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

fn parse_number(s: &str) -> Option<f64> {
    non_empty(s)?.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn format_number(n: f64) -> String {
    n.to_string()
}

impl AlertConfig {
    /// Form values for a config loaded from the server.
    pub fn from_wire(wire: &ParsedAlertConfig) -> Self {
        Self {
            slack_webhook_url: wire.slack_webhook_url.clone().unwrap_or_default(),
            daily_cost_threshold_usd: wire
                .daily_cost_threshold_usd
                .map(format_number)
                .unwrap_or_default(),
            budget_alert_percent: wire.budget_alert_percent.map(format_number).unwrap_or_default(),
            email_recipients: wire.email_recipients.join(", "),
            email_provider: wire.email_provider.clone().unwrap_or_default(),
            email_from: wire.email_from.clone().unwrap_or_default(),
        }
    }

    /// Check the fields that have constraints. Returns the first problem.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = non_empty(&self.slack_webhook_url) {
            if !url.starts_with(WEBHOOK_PREFIX) {
                return Err(format!("Webhook URL must start with {WEBHOOK_PREFIX}"));
            }
        }
        if non_empty(&self.daily_cost_threshold_usd).is_some() {
            match parse_number(&self.daily_cost_threshold_usd) {
                Some(n) if n >= 0.0 => {}
                _ => return Err("Daily cost threshold must be a number >= 0".to_string()),
            }
        }
        if non_empty(&self.budget_alert_percent).is_some() {
            match parse_number(&self.budget_alert_percent) {
                Some(n) if (0.0..=100.0).contains(&n) => {}
                _ => return Err("Budget alert percent must be between 0 and 100".to_string()),
            }
        }
        Ok(())
    }

    /// Convert to the wire shape. Empty fields become `None`, never zero.
    pub fn parse(&self) -> ParsedAlertConfig {
        ParsedAlertConfig {
            slack_webhook_url: non_empty(&self.slack_webhook_url).map(str::to_string),
            daily_cost_threshold_usd: parse_number(&self.daily_cost_threshold_usd),
            budget_alert_percent: parse_number(&self.budget_alert_percent),
            email_recipients: self
                .email_recipients
                .split(',')
                .filter_map(non_empty)
                .map(str::to_string)
                .collect(),
            email_provider: non_empty(&self.email_provider).map(str::to_string),
            email_from: non_empty(&self.email_from).map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Idle,
}

/// What happened to an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// Valid; a save is scheduled for the returned instant.
    Scheduled(Instant),
    /// Invalid; nothing is scheduled.
    Invalid(String),
    /// Received while still loading; dropped.
    Ignored,
}

#[derive(Debug)]
pub struct AlertConfigController {
    project_id: String,
    phase: Phase,
    config: AlertConfig,
    validation_error: Option<String>,
    pending_save: Option<Instant>,
    debounce: Duration,
}

impl AlertConfigController {
    pub fn new(project_id: &str) -> Self {
        Self::with_debounce(project_id, DEBOUNCE)
    }

    pub fn with_debounce(project_id: &str, debounce: Duration) -> Self {
        Self {
            project_id: project_id.to_string(),
            phase: Phase::Loading,
            config: AlertConfig::default(),
            validation_error: None,
            pending_save: None,
            debounce,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    pub fn validation_error(&self) -> Option<&str> {
        self.validation_error.as_deref()
    }

    /// When the next save fires, if one is scheduled.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending_save
    }

    /// Finish loading. Nothing is scheduled: a freshly loaded config is
    /// already what the server has.
    pub fn loaded(&mut self, config: AlertConfig) {
        self.config = config;
        self.phase = Phase::Idle;
        self.validation_error = None;
        self.pending_save = None;
    }

    /// Apply an edit made at `now`.
    pub fn edit<F>(&mut self, now: Instant, apply: F) -> EditOutcome
    where
        F: FnOnce(&mut AlertConfig),
    {
        if self.phase == Phase::Loading {
            return EditOutcome::Ignored;
        }
        apply(&mut self.config);
        match self.config.validate() {
            Ok(()) => {
                self.validation_error = None;
                let due = now + self.debounce;
                self.pending_save = Some(due);
                EditOutcome::Scheduled(due)
            }
            Err(msg) => {
                self.validation_error = Some(msg.clone());
                self.pending_save = None;
                EditOutcome::Invalid(msg)
            }
        }
    }

    /// Take the config to save if the quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<ParsedAlertConfig> {
        match self.pending_save {
            Some(due) if now >= due => {
                self.pending_save = None;
                Some(self.config.parse())
            }
            _ => None,
        }
    }

    /// Drop any scheduled save.
    pub fn teardown(&mut self) {
        self.pending_save = None;
    }
}

/// Notifications from an [`AlertConfigWorker`].
#[derive(Debug, Clone, PartialEq)]
pub enum AlertEvent {
    Loaded(AlertConfig),
    LoadFailed(String),
    Invalid(String),
    Saved(ParsedAlertConfig),
    SaveFailed(String),
}

type Edit = Box<dyn FnOnce(&mut AlertConfig) + Send>;

enum Command {
    Edit(Edit),
    Shutdown,
}

/// Background driver for an [`AlertConfigController`].
///
/// Dropping the worker shuts it down; a save that has not fired yet is
/// discarded.
pub struct AlertConfigWorker {
    tx: Sender<Command>,
    active: ActiveFlag,
    handle: Option<JoinHandle<()>>,
}

impl AlertConfigWorker {
    pub fn spawn(api: Arc<dyn DashboardApi>, project_id: &str) -> (Self, Receiver<AlertEvent>) {
        Self::spawn_with_debounce(api, project_id, DEBOUNCE)
    }

    pub fn spawn_with_debounce(
        api: Arc<dyn DashboardApi>,
        project_id: &str,
        debounce: Duration,
    ) -> (Self, Receiver<AlertEvent>) {
        let (tx, rx) = mpsc::channel::<Command>();
        let (events_tx, events_rx) = mpsc::channel::<AlertEvent>();
        let active = ActiveFlag::new();
        let controller = AlertConfigController::with_debounce(project_id, debounce);
        let flag = active.clone();
        let handle = std::thread::spawn(move || run(api, controller, rx, events_tx, flag));
        (
            Self {
                tx,
                active,
                handle: Some(handle),
            },
            events_rx,
        )
    }

    /// Queue an edit. Returns `false` if the worker has already stopped.
    pub fn edit<F>(&self, apply: F) -> bool
    where
        F: FnOnce(&mut AlertConfig) + Send + 'static,
    {
        self.tx.send(Command::Edit(Box::new(apply))).is_ok()
    }

    /// Stop the worker and wait for its thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.active.deactivate();
        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("alert config worker panicked");
            }
        }
    }
}

impl Drop for AlertConfigWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    api: Arc<dyn DashboardApi>,
    mut controller: AlertConfigController,
    rx: Receiver<Command>,
    events: Sender<AlertEvent>,
    active: ActiveFlag,
) {
    let project_id = controller.project_id().to_string();

    let loaded = api.get_alert_config(&project_id);
    if !active.is_active() {
        return;
    }

    // Edits that arrived while loading are dropped.
    while let Ok(command) = rx.try_recv() {
        match command {
            Command::Edit(apply) => {
                let _ = controller.edit(Instant::now(), apply);
            }
            Command::Shutdown => return,
        }
    }

    match loaded {
        Ok(wire) => {
            let config = wire.as_ref().map(AlertConfig::from_wire).unwrap_or_default();
            controller.loaded(config.clone());
            let _ = events.send(AlertEvent::Loaded(config));
        }
        Err(err) => {
            tracing::warn!(project_id = %project_id, error = %err, "failed to load alert config");
            controller.loaded(AlertConfig::default());
            let _ = events.send(AlertEvent::LoadFailed(err.to_string()));
        }
    }

    loop {
        let received = match controller.deadline() {
            Some(due) => rx.recv_timeout(due.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Command::Edit(apply)) => {
                if let EditOutcome::Invalid(msg) = controller.edit(Instant::now(), apply) {
                    let _ = events.send(AlertEvent::Invalid(msg));
                }
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                controller.teardown();
                return;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        if !active.is_active() {
            controller.teardown();
            return;
        }

        let Some(parsed) = controller.poll(Instant::now()) else {
            continue;
        };
        tracing::debug!(project_id = %project_id, "persisting alert config");
        match api.update_alert_config(&project_id, &parsed) {
            Ok(()) => {
                // The server copy is authoritative; re-read it instead of
                // assuming the write landed as sent.
                let saved = match api.get_alert_config(&project_id) {
                    Ok(Some(fresh)) => fresh,
                    Ok(None) => parsed,
                    Err(err) => {
                        tracing::warn!(project_id = %project_id, error = %err, "re-fetch after save failed");
                        parsed
                    }
                };
                if active.is_active() {
                    let _ = events.send(AlertEvent::Saved(saved));
                }
            }
            Err(err) => {
                tracing::warn!(project_id = %project_id, error = %err, "failed to save alert config");
                if active.is_active() {
                    let _ = events.send(AlertEvent::SaveFailed(err.to_string()));
                }
            }
        }
    }
}
