//! The capacity-aware action executor: the unblocked path, the
//! recover-and-retry path, and recovery failure modes.

mod common;

use std::path::Path;
use std::sync::Arc;

use common::{row_delete_locator, test_config, FakeBrowser, OnClick, PRIMARY_TAB};
use provis_config::Config;
use provis_driver::{Locator, TabId};
use provis_flow::{ActionExecutor, FlowError, RecordWriter, UserCreator, VerificationHandler};
use provis_session::{MemorySessionStore, SessionStore};

fn executor(config: &Config, records_dir: &Path) -> ActionExecutor {
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    let verification = Arc::new(VerificationHandler::new(
        store,
        config.verification.clone(),
        None,
        config.timeouts.clone(),
    ));
    let creator = UserCreator::new(
        config.creation.clone(),
        config.timeouts.clone(),
        RecordWriter::new(records_dir),
    );
    ActionExecutor::new(
        verification,
        creator,
        config.portal.clone(),
        config.capacity.clone(),
        config.timeouts.clone(),
        "admin@corp.example".to_string(),
    )
}

fn count(log: &[String], raw: &str) -> usize {
    let key = Locator::parse(raw).to_string();
    log.iter().filter(|entry| **entry == key).count()
}

#[tokio::test]
async fn test_unblocked_action_creates_account() {
    let config = test_config();
    let records = tempfile::TempDir::new().unwrap();
    let browser = FakeBrowser::new();
    let primary = TabId::new(PRIMARY_TAB);

    browser.show(&config.portal.add_control);
    browser.show(&config.creation.first_name_field);
    browser.show(&config.creation.submit_control);

    let report = executor(&config, records.path())
        .execute(&browser, &primary, "corp.example")
        .await
        .unwrap();

    assert!(!report.recovered);
    assert!(!report.verification_resolved);
    assert!(report.identity.email.ends_with("@corp.example"));
    assert!(report.record_path.exists());

    let state = browser.state();
    assert_eq!(state.navigations, vec![config.portal.users_url.clone()]);
    assert_eq!(count(&state.clicks, &config.portal.add_control), 1);
    assert!(state.js_clicks.is_empty());
    // Tab-order fill: last name, email local part, password twice.
    assert_eq!(state.keys, vec!["Tab", "Tab", "Tab", "Tab"]);
    assert_eq!(state.typed.len(), 4);
    assert_eq!(state.typed[2], report.identity.password);
    assert_eq!(state.typed[3], report.identity.password);
}

#[tokio::test]
async fn test_blocked_action_deletes_one_row_and_retries_once() {
    let config = test_config();
    let records = tempfile::TempDir::new().unwrap();
    let browser = FakeBrowser::new();
    let primary = TabId::new(PRIMARY_TAB);

    browser.show(&config.portal.add_control);
    browser.show(&config.capacity.dismiss);
    browser.show(&config.capacity.confirm_control);
    browser.show(&config.creation.first_name_field);
    browser.show(&config.creation.submit_control);

    // The first trigger hits the capacity limit.
    browser.on_click(
        &config.portal.add_control,
        OnClick::Show(config.capacity.indicator.clone()),
    );
    browser.on_click(
        &config.capacity.confirm_control,
        OnClick::Hide(config.capacity.indicator.clone()),
    );

    // Header row, protected administrator, then the first deletable row.
    browser.set_texts(
        &config.capacity.rows,
        &[
            "Email Status Actions",
            "admin@corp.example owner",
            "dana@corp.example member",
        ],
    );
    let delete_raw = row_delete_locator(&config, 3);
    browser.show(&delete_raw);

    let report = executor(&config, records.path())
        .execute(&browser, &primary, "corp.example")
        .await
        .unwrap();

    assert!(report.recovered);
    assert!(report.record_path.exists());

    let state = browser.state();
    let add = Locator::parse(&config.portal.add_control).to_string();
    // One interactive trigger, then exactly one programmatic retry.
    assert_eq!(count(&state.clicks, &config.portal.add_control), 1);
    assert_eq!(state.js_clicks, vec![add]);
    // Exactly one compensating deletion, scoped to the third row.
    assert_eq!(count(&state.clicks, &delete_raw), 1);
    assert_eq!(count(&state.clicks, &config.capacity.dismiss), 1);
    assert_eq!(count(&state.clicks, &config.capacity.confirm_control), 1);
}

#[tokio::test]
async fn test_blocked_with_no_eligible_rows_exhausts_recovery() {
    let config = test_config();
    let records = tempfile::TempDir::new().unwrap();
    let browser = FakeBrowser::new();
    let primary = TabId::new(PRIMARY_TAB);

    browser.show(&config.portal.add_control);
    browser.show(&config.capacity.dismiss);
    browser.on_click(
        &config.portal.add_control,
        OnClick::Show(config.capacity.indicator.clone()),
    );
    // Only the header and the protected administrator remain.
    browser.set_texts(
        &config.capacity.rows,
        &["Email Status Actions", "admin@corp.example owner"],
    );

    let err = executor(&config, records.path())
        .execute(&browser, &primary, "corp.example")
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::RecoveryExhausted(_)));
    let state = browser.state();
    assert!(state.js_clicks.is_empty());
    assert_eq!(count(&state.clicks, &config.capacity.confirm_control), 0);
}

#[tokio::test]
async fn test_missing_trigger_control_fails() {
    let config = test_config();
    let records = tempfile::TempDir::new().unwrap();
    let browser = FakeBrowser::new();
    let primary = TabId::new(PRIMARY_TAB);

    let err = executor(&config, records.path())
        .execute(&browser, &primary, "corp.example")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FlowError::MissingElement { stage: "trigger", .. }
    ));
}
