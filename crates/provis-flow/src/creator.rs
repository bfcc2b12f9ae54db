//! Account creation form flow.

use std::path::PathBuf;
use std::time::Duration;

use provis_config::{CreationConfig, TimeoutsConfig};
use provis_driver::{Browser, Locator};
use tracing::{debug, info};

use crate::error::FlowError;
use crate::identity::{GeneratedIdentity, IdentityGenerator};
use crate::record::RecordWriter;

/// How long to probe for the optional password-change toggle.
const TOGGLE_PROBE: Duration = Duration::from_secs(2);

/// Fills and submits the account creation form, then records the account.
pub struct UserCreator {
    creation: CreationConfig,
    timeouts: TimeoutsConfig,
    generator: IdentityGenerator,
    records: RecordWriter,
}

impl UserCreator {
    pub fn new(creation: CreationConfig, timeouts: TimeoutsConfig, records: RecordWriter) -> Self {
        Self {
            creation,
            timeouts,
            generator: IdentityGenerator::new(),
            records,
        }
    }

    /// Create one account with a generated identity under `domain`.
    ///
    /// The form is filled in tab order starting from the first name field:
    /// first name, last name, email local part, password, confirmation.
    pub async fn create(
        &self,
        browser: &dyn Browser,
        domain: &str,
    ) -> Result<(GeneratedIdentity, PathBuf), FlowError> {
        let identity = self.generator.generate(domain);
        info!(email = %identity.email, "filling creation form");

        let first_field = Locator::parse(&self.creation.first_name_field);
        if !browser.wait_visible(&first_field, self.timeouts.form()).await? {
            return Err(FlowError::MissingElement {
                stage: "creation form",
                locator: self.creation.first_name_field.clone(),
            });
        }

        browser.fill(&first_field, &identity.first_name).await?;
        browser.press_key("Tab").await?;
        browser.type_text(&identity.last_name).await?;
        browser.press_key("Tab").await?;
        browser.type_text(identity.email_local_part()).await?;
        browser.press_key("Tab").await?;
        browser.type_text(&identity.password).await?;
        browser.press_key("Tab").await?;
        browser.type_text(&identity.password).await?;

        self.clear_password_toggle(browser).await?;

        let submit = Locator::parse(&self.creation.submit_control);
        if !browser.wait_visible(&submit, self.timeouts.element()).await? {
            return Err(FlowError::MissingElement {
                stage: "creation submit",
                locator: self.creation.submit_control.clone(),
            });
        }
        browser.click(&submit).await?;
        tokio::time::sleep(self.timeouts.settle()).await;

        let record_path = self.records.write(&identity).await?;
        Ok((identity, record_path))
    }

    /// Clear the force-password-change toggle if the form shows it checked.
    async fn clear_password_toggle(&self, browser: &dyn Browser) -> Result<(), FlowError> {
        let toggle = Locator::parse(&self.creation.password_toggle);
        if !browser.wait_visible(&toggle, TOGGLE_PROBE).await? {
            debug!("password-change toggle not present, skipping");
            return Ok(());
        }
        if browser.is_checked(&toggle).await? {
            // The styled checkbox sits under a decorated span, so click it
            // programmatically.
            browser.click_js(&toggle).await?;
            info!("cleared force-password-change toggle");
        }
        Ok(())
    }
}
