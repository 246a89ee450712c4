mod common;

use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::FakeApi;
use covdash::alerts::{AlertConfigWorker, AlertEvent, ParsedAlertConfig};
use covdash::api::DashboardApi;

const DEBOUNCE: Duration = Duration::from_millis(50);
const WAIT: Duration = Duration::from_secs(5);

fn spawn(api: &Arc<FakeApi>) -> (AlertConfigWorker, Receiver<AlertEvent>) {
    let dyn_api: Arc<dyn DashboardApi> = api.clone();
    let (worker, events) = AlertConfigWorker::spawn_with_debounce(dyn_api, "p1", DEBOUNCE);
    match events.recv_timeout(WAIT).unwrap() {
        AlertEvent::Loaded(_) => {}
        other => panic!("expected Loaded, got {:?}", other),
    }
    (worker, events)
}

#[test]
fn loads_existing_config_into_form() {
    let api = Arc::new(FakeApi {
        alert_config: Mutex::new(Some(ParsedAlertConfig {
            budget_alert_percent: Some(75.0),
            email_recipients: vec!["ops@example.test".into()],
            ..Default::default()
        })),
        ..Default::default()
    });
    let dyn_api: Arc<dyn DashboardApi> = api.clone();
    let (worker, events) = AlertConfigWorker::spawn_with_debounce(dyn_api, "p1", DEBOUNCE);
    match events.recv_timeout(WAIT).unwrap() {
        AlertEvent::Loaded(cfg) => {
            assert_eq!(cfg.budget_alert_percent, "75");
            assert_eq!(cfg.email_recipients, "ops@example.test");
        }
        other => panic!("expected Loaded, got {:?}", other),
    }
    worker.shutdown();
    assert!(api.saves().is_empty());
}

#[test]
fn valid_edit_is_persisted_after_debounce() {
    let api = Arc::new(FakeApi::default());
    let (worker, events) = spawn(&api);

    worker.edit(|cfg| cfg.budget_alert_percent = "85".into());
    match events.recv_timeout(WAIT).unwrap() {
        AlertEvent::Saved(saved) => assert_eq!(saved.budget_alert_percent, Some(85.0)),
        other => panic!("expected Saved, got {:?}", other),
    }
    worker.shutdown();

    let saves = api.saves();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].budget_alert_percent, Some(85.0));
    assert_eq!(saves[0].daily_cost_threshold_usd, None);
}

#[test]
fn invalid_edit_is_reported_and_not_persisted() {
    let api = Arc::new(FakeApi::default());
    let (worker, events) = spawn(&api);

    worker.edit(|cfg| cfg.budget_alert_percent = "150".into());
    match events.recv_timeout(WAIT).unwrap() {
        AlertEvent::Invalid(msg) => assert!(msg.contains("between 0 and 100")),
        other => panic!("expected Invalid, got {:?}", other),
    }
    assert!(events.recv_timeout(DEBOUNCE * 6).is_err());
    worker.shutdown();
    assert!(api.saves().is_empty());
}

#[test]
fn rapid_edits_persist_only_the_latest_state() {
    let api = Arc::new(FakeApi::default());
    let dyn_api: Arc<dyn DashboardApi> = api.clone();
    // A long quiet period so all edits land inside one window.
    let (worker, events) =
        AlertConfigWorker::spawn_with_debounce(dyn_api, "p1", Duration::from_millis(300));
    assert!(matches!(
        events.recv_timeout(WAIT).unwrap(),
        AlertEvent::Loaded(_)
    ));

    for value in ["1", "12", "12.5"] {
        let value = value.to_string();
        worker.edit(move |cfg| cfg.daily_cost_threshold_usd = value);
    }
    match events.recv_timeout(WAIT).unwrap() {
        AlertEvent::Saved(saved) => assert_eq!(saved.daily_cost_threshold_usd, Some(12.5)),
        other => panic!("expected Saved, got {:?}", other),
    }
    worker.shutdown();
    assert_eq!(api.saves().len(), 1);
}

#[test]
fn shutdown_discards_pending_save() {
    let api = Arc::new(FakeApi::default());
    let dyn_api: Arc<dyn DashboardApi> = api.clone();
    let (worker, events) =
        AlertConfigWorker::spawn_with_debounce(dyn_api, "p1", Duration::from_secs(10));
    assert!(matches!(
        events.recv_timeout(WAIT).unwrap(),
        AlertEvent::Loaded(_)
    ));

    worker.edit(|cfg| cfg.email_from = "alerts@example.test".into());
    drop(worker);
    assert!(api.saves().is_empty());
}

#[test]
fn save_failure_is_reported() {
    let api = Arc::new(FakeApi {
        save_fails: true,
        ..Default::default()
    });
    let (worker, events) = spawn(&api);

    worker.edit(|cfg| cfg.email_provider = "resend".into());
    match events.recv_timeout(WAIT).unwrap() {
        AlertEvent::SaveFailed(msg) => assert!(msg.contains("Not authenticated")),
        other => panic!("expected SaveFailed, got {:?}", other),
    }
}
