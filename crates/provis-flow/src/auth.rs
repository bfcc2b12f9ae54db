//! Session establishment: replay first, interactive sign-in as fallback.

use std::sync::Arc;

use provis_config::{CredentialsConfig, PortalConfig, SigninConfig, TimeoutsConfig};
use provis_driver::{Browser, Locator, TabId};
use provis_session::{SessionState, SessionStore};
use tracing::{info, warn};

use crate::error::FlowError;
use crate::verify::{VerificationHandler, VerificationOutcome};

/// Result of establishing an authenticated console.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The tab the authenticated console lives in.
    pub primary_tab: TabId,
    /// Whether the saved session carried the run, without interactive login.
    pub used_saved_session: bool,
    /// Whether a verification challenge was resolved on the way in.
    pub verification_resolved: bool,
}

/// Puts the browser into an authenticated console state.
pub struct Authenticator {
    store: Arc<dyn SessionStore>,
    verification: Arc<VerificationHandler>,
    portal: PortalConfig,
    signin: SigninConfig,
    credentials: Option<CredentialsConfig>,
    timeouts: TimeoutsConfig,
}

impl Authenticator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        verification: Arc<VerificationHandler>,
        portal: PortalConfig,
        signin: SigninConfig,
        credentials: Option<CredentialsConfig>,
        timeouts: TimeoutsConfig,
    ) -> Self {
        Self {
            store,
            verification,
            portal,
            signin,
            credentials,
            timeouts,
        }
    }

    /// Establish an authenticated console, preferring the saved session.
    ///
    /// Replay failures of any kind degrade to interactive sign-in; only the
    /// interactive path failing is fatal. A fresh interactive login is
    /// persisted so the next run can skip it.
    pub async fn establish(&self, browser: &dyn Browser) -> Result<AuthContext, FlowError> {
        let used_saved_session = match self.store.load().await {
            Some(state) => self.replay(browser, &state).await?,
            None => false,
        };

        if used_saved_session {
            info!("saved session accepted");
        } else {
            self.interactive_login(browser).await?;
        }

        let primary_tab = browser.current_tab().await?;
        let outcome = self.verification.check(browser, &primary_tab).await?;

        if !used_saved_session {
            let state = capture_session(browser).await?;
            self.store.save(&state).await?;
            info!("interactive login persisted for future runs");
        }

        Ok(AuthContext {
            primary_tab,
            used_saved_session,
            verification_resolved: outcome == VerificationOutcome::Resolved,
        })
    }

    /// Replay the saved session and report whether it produced an
    /// authenticated console. The browser's existing cookies and storage
    /// are dropped first, never merged with the saved state.
    async fn replay(&self, browser: &dyn Browser, state: &SessionState) -> Result<bool, FlowError> {
        info!(cookies = state.cookies.len(), "replaying saved session");
        browser.navigate(&self.portal.origin).await?;

        // The loaded state replaces whatever the persistent profile still
        // holds; saved and leftover sessions never merge.
        browser.clear_cookies().await?;
        browser.clear_local_storage().await?;

        for cookie in state.replay_cookies() {
            if let Err(err) = browser.set_cookie(&cookie).await {
                warn!(cookie = %cookie.name, error = %err, "browser rejected cookie, skipping");
            }
        }
        for (key, value) in &state.local_storage {
            if let Err(err) = browser.set_local_storage_item(key, value).await {
                warn!(key = %key, error = %err, "could not restore localStorage entry, skipping");
            }
        }

        browser.reload().await?;

        let landmark = Locator::parse(&self.portal.landmark);
        let visible = browser
            .wait_visible(&landmark, self.timeouts.element())
            .await?;
        if !visible {
            warn!("saved session did not produce an authenticated console");
        }
        Ok(visible)
    }

    async fn interactive_login(&self, browser: &dyn Browser) -> Result<(), FlowError> {
        let credentials = self.credentials.clone().ok_or_else(|| {
            FlowError::Configuration(
                "no usable saved session and no credentials configured".to_string(),
            )
        })?;

        info!(email = %credentials.email, "signing in interactively");
        browser.navigate(&self.portal.signin_url).await?;

        let identifier = Locator::parse(&self.signin.identifier_field);
        if !browser.wait_visible(&identifier, self.timeouts.form()).await? {
            return Err(FlowError::MissingElement {
                stage: "sign-in",
                locator: self.signin.identifier_field.clone(),
            });
        }
        browser.fill(&identifier, &credentials.email).await?;
        browser.click(&Locator::parse(&self.signin.next_button)).await?;

        let password = Locator::parse(&self.signin.password_field);
        if !browser
            .wait_visible(&password, self.timeouts.element())
            .await?
        {
            return Err(FlowError::MissingElement {
                stage: "sign-in",
                locator: self.signin.password_field.clone(),
            });
        }
        browser.fill(&password, &credentials.password).await?;
        browser.click(&Locator::parse(&self.signin.next_button)).await?;

        // Window for challenges only a human can answer (2FA prompts).
        tokio::time::sleep(self.timeouts.post_login_settle()).await;

        browser.navigate(&self.portal.console_url).await?;
        let landmark = Locator::parse(&self.portal.landmark);
        if !browser.wait_visible(&landmark, self.timeouts.form()).await? {
            return Err(FlowError::MissingElement {
                stage: "post-login",
                locator: self.portal.landmark.clone(),
            });
        }
        Ok(())
    }
}

/// Capture the browser's current session as persistable state.
pub async fn capture_session(browser: &dyn Browser) -> Result<SessionState, FlowError> {
    let cookies = browser.cookies().await?;
    let local_storage = browser.local_storage().await?;
    Ok(SessionState::new(cookies, local_storage))
}
