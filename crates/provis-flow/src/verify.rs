//! Secondary-verification challenge handling.
//!
//! The portal sometimes opens a separate tab asking the administrator to
//! re-enter a secret. The handler watches for that tab at the points where
//! the portal is known to raise it, resolves it, and re-captures the
//! session afterwards since resolving usually rotates cookies.

use std::sync::Arc;
use std::time::{Duration, Instant};

use provis_driver::{Browser, Locator, TabId};
use provis_config::{TimeoutsConfig, VerificationConfig};
use provis_session::SessionStore;
use tracing::{debug, info};

use crate::auth::capture_session;
use crate::error::FlowError;

/// Poll interval while watching for a second tab.
const TAB_POLL: Duration = Duration::from_millis(250);

/// What a verification check found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// No second tab appeared within the window.
    NotNeeded,
    /// A challenge tab appeared and was resolved.
    Resolved,
    /// A second tab appeared but is not a challenge; it was left open.
    Foreign,
}

/// Detects and resolves verification challenge tabs.
pub struct VerificationHandler {
    store: Arc<dyn SessionStore>,
    config: VerificationConfig,
    secret: Option<String>,
    timeouts: TimeoutsConfig,
}

impl VerificationHandler {
    pub fn new(
        store: Arc<dyn SessionStore>,
        config: VerificationConfig,
        secret: Option<String>,
        timeouts: TimeoutsConfig,
    ) -> Self {
        Self {
            store,
            config,
            secret,
            timeouts,
        }
    }

    /// Watch for a challenge tab and resolve it if one appears.
    ///
    /// Focus is always returned to `primary` before this resolves, whatever
    /// the outcome.
    pub async fn check(
        &self,
        browser: &dyn Browser,
        primary: &TabId,
    ) -> Result<VerificationOutcome, FlowError> {
        let Some(candidate) = self.wait_for_second_tab(browser, primary).await? else {
            return Ok(VerificationOutcome::NotNeeded);
        };

        debug!(tab = %candidate, "second tab detected, inspecting");
        browser.switch_tab(&candidate).await?;

        // Whatever happens on the candidate tab, focus returns to the
        // primary tab before the result propagates.
        let answered = self.answer_challenge(browser).await;
        browser.switch_tab(primary).await?;

        if !answered? {
            return Ok(VerificationOutcome::Foreign);
        }

        browser.close_tab(&candidate).await?;

        // Resolving the challenge rotates session cookies.
        let state = capture_session(browser).await?;
        self.store.save(&state).await?;
        info!("verification resolved, session re-captured");
        Ok(VerificationOutcome::Resolved)
    }

    /// Interact with the challenge tab the browser is focused on.
    ///
    /// `Ok(false)` means the tab is not a challenge and was left untouched.
    async fn answer_challenge(&self, browser: &dyn Browser) -> Result<bool, FlowError> {
        let title = browser.title().await?;

        if !title.contains(&self.config.title_marker) {
            debug!(title = %title, "not a verification tab, leaving it open");
            return Ok(false);
        }

        info!(title = %title, "resolving verification challenge");
        let Some(secret) = self.secret.as_deref() else {
            return Err(FlowError::Configuration(
                "verification challenge appeared but no secret is configured".to_string(),
            ));
        };

        let field = Locator::parse(&self.config.challenge_field);
        if !browser.wait_visible(&field, self.timeouts.element()).await? {
            return Err(FlowError::MissingElement {
                stage: "verification",
                locator: self.config.challenge_field.clone(),
            });
        }

        browser.fill(&field, secret).await?;
        browser.press_key("Enter").await?;
        tokio::time::sleep(self.timeouts.settle()).await;
        Ok(true)
    }

    async fn wait_for_second_tab(
        &self,
        browser: &dyn Browser,
        primary: &TabId,
    ) -> Result<Option<TabId>, FlowError> {
        let start = Instant::now();
        loop {
            let tabs = browser.tabs().await?;
            if let Some(tab) = tabs.iter().rev().find(|tab| *tab != primary) {
                return Ok(Some(tab.clone()));
            }
            if start.elapsed() >= self.timeouts.verification_tab() {
                return Ok(None);
            }
            tokio::time::sleep(TAB_POLL).await;
        }
    }
}
