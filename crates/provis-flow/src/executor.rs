//! Capacity-aware provisioning action.
//!
//! The action moves through an explicit phase machine. Triggering the
//! primary action can hit the portal's capacity limit; when it does, the
//! executor frees exactly one slot by deleting the first eligible resource
//! row and retries the trigger exactly once, programmatically.
//!
//! ```text
//! Start ─► TriggerPrimary ─► Unblocked ──────────────► create ─► Succeeded
//!                │
//!                └─► Blocked ─► RecoverCapacity ─► RetryPrimary ─► create ─► Succeeded
//!                                    │
//!                                    └─ (no eligible row / missing control) ─► Failed
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use provis_config::{CapacityConfig, PortalConfig, TimeoutsConfig};
use provis_driver::{Browser, Locator, TabId};
use tracing::{debug, info, warn};

use crate::creator::UserCreator;
use crate::error::FlowError;
use crate::identity::GeneratedIdentity;
use crate::verify::{VerificationHandler, VerificationOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    TriggerPrimary,
    Blocked,
    Unblocked,
    RecoverCapacity,
    RetryPrimary,
    Succeeded,
    Failed,
}

/// What a completed action did, beyond succeeding.
#[derive(Debug)]
pub struct ExecReport {
    /// A capacity recovery ran before the action went through.
    pub recovered: bool,
    /// A verification challenge was resolved along the way.
    pub verification_resolved: bool,
    pub identity: GeneratedIdentity,
    pub record_path: PathBuf,
}

/// Runs the provisioning action against the management surface.
pub struct ActionExecutor {
    verification: Arc<VerificationHandler>,
    creator: UserCreator,
    portal: PortalConfig,
    capacity: CapacityConfig,
    timeouts: TimeoutsConfig,
    /// Substring identifying the row that must never be deleted.
    protected: String,
}

impl ActionExecutor {
    pub fn new(
        verification: Arc<VerificationHandler>,
        creator: UserCreator,
        portal: PortalConfig,
        capacity: CapacityConfig,
        timeouts: TimeoutsConfig,
        protected: String,
    ) -> Self {
        Self {
            verification,
            creator,
            portal,
            capacity,
            timeouts,
            protected,
        }
    }

    fn enter(&self, phase: Phase) {
        debug!(?phase, "action executor phase");
    }

    /// Execute the full action: trigger, recover capacity if blocked, retry
    /// once, create the account.
    pub async fn execute(
        &self,
        browser: &dyn Browser,
        primary: &TabId,
        domain: &str,
    ) -> Result<ExecReport, FlowError> {
        let mut verification_resolved = false;

        self.enter(Phase::Start);
        browser.navigate(&self.portal.users_url).await?;
        tokio::time::sleep(self.timeouts.nav_settle()).await;
        verification_resolved |= self.check_verification(browser, primary).await?;

        self.enter(Phase::TriggerPrimary);
        let add = Locator::parse(&self.portal.add_control);
        if !browser.wait_visible(&add, self.timeouts.form()).await? {
            self.enter(Phase::Failed);
            return Err(FlowError::MissingElement {
                stage: "trigger",
                locator: self.portal.add_control.clone(),
            });
        }
        browser.click(&add).await?;
        tokio::time::sleep(self.timeouts.dialog_settle()).await;
        verification_resolved |= self.check_verification(browser, primary).await?;

        let indicator = Locator::parse(&self.capacity.indicator);
        let blocked = browser
            .wait_visible(&indicator, self.timeouts.blocked_check())
            .await?;

        let recovered = if blocked {
            self.enter(Phase::Blocked);
            self.recover_capacity(browser).await?;
            verification_resolved |= self.check_verification(browser, primary).await?;

            self.enter(Phase::RetryPrimary);
            if !browser.wait_visible(&add, self.timeouts.form()).await? {
                self.enter(Phase::Failed);
                return Err(FlowError::MissingElement {
                    stage: "retry",
                    locator: self.portal.add_control.clone(),
                });
            }
            // Synthesized clicks proved unreliable right after the dialog
            // churn, so the single retry clicks programmatically.
            browser.click_js(&add).await?;
            tokio::time::sleep(self.timeouts.dialog_settle()).await;
            true
        } else {
            self.enter(Phase::Unblocked);
            false
        };

        let (identity, record_path) = match self.creator.create(browser, domain).await {
            Ok(created) => created,
            Err(err) => {
                self.enter(Phase::Failed);
                return Err(err);
            }
        };

        self.enter(Phase::Succeeded);
        Ok(ExecReport {
            recovered,
            verification_resolved,
            identity,
            record_path,
        })
    }

    /// Free exactly one capacity slot by deleting the first eligible row.
    async fn recover_capacity(&self, browser: &dyn Browser) -> Result<(), FlowError> {
        self.enter(Phase::RecoverCapacity);
        warn!("capacity limit reached, freeing one slot");

        let dismiss = Locator::parse(&self.capacity.dismiss);
        if !browser.wait_visible(&dismiss, self.timeouts.element()).await? {
            return Err(FlowError::RecoveryExhausted(
                "capacity notice has no dismiss control".to_string(),
            ));
        }
        browser.click(&dismiss).await?;
        tokio::time::sleep(self.timeouts.dialog_settle()).await;

        let rows = Locator::parse(&self.capacity.rows);
        let texts = browser.all_texts(&rows).await?;
        let Some(index) = first_eligible(&texts, &self.capacity.row_marker, &self.protected)
        else {
            return Err(FlowError::RecoveryExhausted(
                "no eligible row on the management surface".to_string(),
            ));
        };
        debug!(row = index + 1, "selected row for compensating deletion");

        // XPath positions are 1-based; scope the delete control to that row.
        let row_base = self
            .capacity
            .rows
            .strip_prefix("xpath:")
            .unwrap_or(&self.capacity.rows);
        let delete = Locator::xpath(format!(
            "({})[{}]{}",
            row_base,
            index + 1,
            self.capacity.delete_control
        ));
        if !browser.wait_visible(&delete, self.timeouts.element()).await? {
            return Err(FlowError::RecoveryExhausted(format!(
                "row {} has no delete control",
                index + 1
            )));
        }
        browser.click(&delete).await?;
        tokio::time::sleep(self.timeouts.dialog_settle()).await;

        let confirm = Locator::parse(&self.capacity.confirm_control);
        if !browser
            .wait_visible(&confirm, self.timeouts.element())
            .await?
        {
            return Err(FlowError::RecoveryExhausted(
                "deletion dialog has no confirm control".to_string(),
            ));
        }
        browser.click(&confirm).await?;
        tokio::time::sleep(self.timeouts.settle()).await;
        info!("compensating deletion confirmed");
        Ok(())
    }

    async fn check_verification(
        &self,
        browser: &dyn Browser,
        primary: &TabId,
    ) -> Result<bool, FlowError> {
        Ok(self.verification.check(browser, primary).await? == VerificationOutcome::Resolved)
    }
}

/// Index of the first row that holds a deletable resource: it must contain
/// the marker and must not contain the protected identifier.
fn first_eligible(texts: &[String], marker: &str, protected: &str) -> Option<usize> {
    texts.iter().position(|text| {
        text.contains(marker) && (protected.is_empty() || !text.contains(protected))
    })
}
