//! Optional chained steps run after a successful provisioning.

use async_trait::async_trait;
use provis_config::{ChainConfig, TimeoutsConfig};
use provis_driver::{Browser, Locator};
use tracing::info;

use crate::error::FlowError;
use crate::identity::GeneratedIdentity;

/// A follow-up step that consumes the freshly provisioned identity.
#[async_trait]
pub trait ChainedStep: Send + Sync {
    fn name(&self) -> &str;

    async fn run(
        &self,
        browser: &dyn Browser,
        identity: &GeneratedIdentity,
    ) -> Result<(), FlowError>;
}

/// Walks a downstream service's signup entry as the new identity.
///
/// Clears cookies so the downstream service sees a fresh visitor, then
/// navigates its signup path up to account creation, where provider-side
/// interaction takes over.
pub struct DownstreamSignup {
    config: ChainConfig,
    timeouts: TimeoutsConfig,
}

impl DownstreamSignup {
    pub fn new(config: ChainConfig, timeouts: TimeoutsConfig) -> Self {
        Self { config, timeouts }
    }
}

#[async_trait]
impl ChainedStep for DownstreamSignup {
    fn name(&self) -> &str {
        "downstream-signup"
    }

    async fn run(
        &self,
        browser: &dyn Browser,
        identity: &GeneratedIdentity,
    ) -> Result<(), FlowError> {
        info!(email = %identity.email, url = %self.config.signup_url, "starting downstream signup");

        browser.clear_cookies().await?;
        browser.navigate(&self.config.signup_url).await?;

        let entry = Locator::parse(&self.config.entry_control);
        if !browser.wait_visible(&entry, self.timeouts.element()).await? {
            return Err(FlowError::MissingElement {
                stage: "chained signup",
                locator: self.config.entry_control.clone(),
            });
        }
        browser.click(&entry).await?;

        let create = Locator::parse(&self.config.create_control);
        if !browser.wait_visible(&create, self.timeouts.element()).await? {
            return Err(FlowError::MissingElement {
                stage: "chained signup",
                locator: self.config.create_control.clone(),
            });
        }
        browser.click(&create).await?;

        info!("downstream signup handed off at account creation");
        Ok(())
    }
}
