//! Account creation form handling: tab-order fill, the password-change
//! toggle, and the provisioning record.

mod common;

use std::path::Path;

use common::{test_config, FakeBrowser};
use provis_config::Config;
use provis_driver::Locator;
use provis_flow::{FlowError, RecordWriter, UserCreator};

fn creator(config: &Config, records_dir: &Path) -> UserCreator {
    UserCreator::new(
        config.creation.clone(),
        config.timeouts.clone(),
        RecordWriter::new(records_dir),
    )
}

#[tokio::test]
async fn test_form_is_filled_in_tab_order_and_recorded() {
    let config = test_config();
    let records = tempfile::TempDir::new().unwrap();
    let browser = FakeBrowser::new();

    browser.show(&config.creation.first_name_field);
    browser.show(&config.creation.submit_control);

    let (identity, path) = creator(&config, records.path())
        .create(&browser, "corp.example")
        .await
        .unwrap();

    let state = browser.state();
    let first = Locator::parse(&config.creation.first_name_field).to_string();
    assert_eq!(state.fills, vec![(first, identity.first_name.clone())]);
    assert_eq!(state.keys, vec!["Tab", "Tab", "Tab", "Tab"]);
    assert_eq!(
        state.typed,
        vec![
            identity.last_name.clone(),
            identity.email_local_part().to_string(),
            identity.password.clone(),
            identity.password.clone(),
        ]
    );
    assert_eq!(
        count(&state.clicks, &config.creation.submit_control),
        1,
    );
    drop(state);

    let raw = std::fs::read_to_string(&path).unwrap();
    let record: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(record["email"], identity.email.as_str());
    assert_eq!(record["password"], identity.password.as_str());
}

#[tokio::test]
async fn test_checked_toggle_is_cleared_programmatically() {
    let config = test_config();
    let records = tempfile::TempDir::new().unwrap();
    let browser = FakeBrowser::new();

    browser.show(&config.creation.first_name_field);
    browser.show(&config.creation.submit_control);
    browser.show(&config.creation.password_toggle);
    browser.set_checked(&config.creation.password_toggle, true);

    creator(&config, records.path())
        .create(&browser, "corp.example")
        .await
        .unwrap();

    let toggle = Locator::parse(&config.creation.password_toggle).to_string();
    assert_eq!(browser.state().js_clicks, vec![toggle]);
}

#[tokio::test]
async fn test_unchecked_toggle_is_left_alone() {
    let config = test_config();
    let records = tempfile::TempDir::new().unwrap();
    let browser = FakeBrowser::new();

    browser.show(&config.creation.first_name_field);
    browser.show(&config.creation.submit_control);
    browser.show(&config.creation.password_toggle);
    browser.set_checked(&config.creation.password_toggle, false);

    creator(&config, records.path())
        .create(&browser, "corp.example")
        .await
        .unwrap();

    assert!(browser.state().js_clicks.is_empty());
}

#[tokio::test]
async fn test_absent_toggle_is_skipped() {
    let config = test_config();
    let records = tempfile::TempDir::new().unwrap();
    let browser = FakeBrowser::new();

    browser.show(&config.creation.first_name_field);
    browser.show(&config.creation.submit_control);

    creator(&config, records.path())
        .create(&browser, "corp.example")
        .await
        .unwrap();

    assert!(browser.state().js_clicks.is_empty());
}

#[tokio::test]
async fn test_missing_form_is_fatal() {
    let config = test_config();
    let records = tempfile::TempDir::new().unwrap();
    let browser = FakeBrowser::new();

    let err = creator(&config, records.path())
        .create(&browser, "corp.example")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FlowError::MissingElement {
            stage: "creation form",
            ..
        }
    ));
}

#[tokio::test]
async fn test_no_record_written_before_submit() {
    let config = test_config();
    let records = tempfile::TempDir::new().unwrap();
    let browser = FakeBrowser::new();

    // The form opens but the submit control never becomes available.
    browser.show(&config.creation.first_name_field);

    let err = creator(&config, records.path())
        .create(&browser, "corp.example")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FlowError::MissingElement {
            stage: "creation submit",
            ..
        }
    ));
    assert_eq!(std::fs::read_dir(records.path()).unwrap().count(), 0);
}

fn count(log: &[String], raw: &str) -> usize {
    let key = Locator::parse(raw).to_string();
    log.iter().filter(|entry| **entry == key).count()
}
