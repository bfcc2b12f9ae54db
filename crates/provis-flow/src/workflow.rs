//! Top-level provisioning workflow.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use provis_config::{Config, ConfigLoader, CredentialsConfig};
use provis_driver::Browser;
use provis_session::SessionStore;
use tracing::{error, info};

use crate::auth::Authenticator;
use crate::chain::ChainedStep;
use crate::creator::UserCreator;
use crate::error::FlowError;
use crate::executor::ActionExecutor;
use crate::identity::GeneratedIdentity;
use crate::record::RecordWriter;
use crate::verify::VerificationHandler;

/// Tagged result of the provisioning action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// The account was created without interference.
    Succeeded,
    /// The capacity limit blocked the action; one slot was freed and the
    /// retried action went through.
    RecoveredAndRetried,
    /// The account was created after resolving a verification challenge.
    VerificationResolved,
    /// The capacity limit blocked the action and no slot could be freed.
    RecoveryFailed,
    /// The action failed for another reason.
    Failed(String),
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ActionOutcome::Succeeded
                | ActionOutcome::RecoveredAndRetried
                | ActionOutcome::VerificationResolved
        )
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionOutcome::Succeeded => write!(f, "succeeded"),
            ActionOutcome::RecoveredAndRetried => write!(f, "recovered-and-retried"),
            ActionOutcome::VerificationResolved => write!(f, "verification-resolved"),
            ActionOutcome::RecoveryFailed => write!(f, "recovery-failed"),
            ActionOutcome::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Everything a finished run reports back to the operator.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: ActionOutcome,
    pub identity: Option<GeneratedIdentity>,
    pub record: Option<PathBuf>,
    pub used_saved_session: bool,
    pub chain_ran: bool,
    /// Why the chained step failed, if it did. The provisioning itself
    /// stands either way.
    pub chain_error: Option<String>,
}

/// Wires authentication, the capacity-aware action, and optional chained
/// steps into one run.
pub struct Workflow {
    config: Config,
    store: Arc<dyn SessionStore>,
    chain: Option<Arc<dyn ChainedStep>>,
}

impl Workflow {
    pub fn new(config: Config, store: Arc<dyn SessionStore>) -> Self {
        Self {
            config,
            store,
            chain: None,
        }
    }

    pub fn with_chain(mut self, chain: Arc<dyn ChainedStep>) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Run one full provisioning pass.
    ///
    /// Failures before the action starts (authentication, configuration)
    /// surface as `Err`; failures of the action itself and of a chained
    /// step are reported through the [`RunReport`].
    pub async fn run(&self, browser: &dyn Browser) -> Result<RunReport, FlowError> {
        let credentials = self.config.resolved_credentials();

        let verification = Arc::new(VerificationHandler::new(
            Arc::clone(&self.store),
            self.config.verification.clone(),
            self.config.verification_secret(),
            self.config.timeouts.clone(),
        ));
        let authenticator = Authenticator::new(
            Arc::clone(&self.store),
            Arc::clone(&verification),
            self.config.portal.clone(),
            self.config.signin.clone(),
            credentials.clone(),
            self.config.timeouts.clone(),
        );

        let auth = authenticator.establish(browser).await?;
        info!(
            used_saved_session = auth.used_saved_session,
            "console authenticated"
        );

        let domain = resolve_domain(&self.config, credentials.as_ref())?;
        let protected = self
            .config
            .capacity
            .protected
            .clone()
            .or_else(|| credentials.as_ref().map(|c| c.email.clone()))
            .unwrap_or_default();

        let records = RecordWriter::new(ConfigLoader::expand_path(&self.config.output.dir));
        let creator = UserCreator::new(
            self.config.creation.clone(),
            self.config.timeouts.clone(),
            records,
        );
        let executor = ActionExecutor::new(
            verification,
            creator,
            self.config.portal.clone(),
            self.config.capacity.clone(),
            self.config.timeouts.clone(),
            protected,
        );

        let mut report = match executor.execute(browser, &auth.primary_tab, &domain).await {
            Ok(exec) => RunReport {
                outcome: successful_outcome(
                    exec.recovered,
                    exec.verification_resolved || auth.verification_resolved,
                ),
                identity: Some(exec.identity),
                record: Some(exec.record_path),
                used_saved_session: auth.used_saved_session,
                chain_ran: false,
                chain_error: None,
            },
            Err(FlowError::RecoveryExhausted(reason)) => {
                error!(reason = %reason, "capacity recovery failed");
                RunReport {
                    outcome: ActionOutcome::RecoveryFailed,
                    identity: None,
                    record: None,
                    used_saved_session: auth.used_saved_session,
                    chain_ran: false,
                    chain_error: None,
                }
            }
            Err(err) => {
                error!(error = %err, "provisioning action failed");
                RunReport {
                    outcome: ActionOutcome::Failed(err.to_string()),
                    identity: None,
                    record: None,
                    used_saved_session: auth.used_saved_session,
                    chain_ran: false,
                    chain_error: None,
                }
            }
        };

        if report.outcome.is_success() {
            if let (Some(chain), Some(identity)) = (&self.chain, report.identity.as_ref()) {
                info!(step = chain.name(), "running chained step");
                // The account exists at this point; a chained failure never
                // fails the run.
                match chain.run(browser, identity).await {
                    Ok(()) => report.chain_ran = true,
                    Err(err) => {
                        error!(step = chain.name(), error = %err, "chained step failed");
                        report.chain_error = Some(err.to_string());
                    }
                }
            }
        }

        Ok(report)
    }
}

/// Outcome tag for an action that went through, by precedence.
fn successful_outcome(recovered: bool, verification_resolved: bool) -> ActionOutcome {
    if recovered {
        ActionOutcome::RecoveredAndRetried
    } else if verification_resolved {
        ActionOutcome::VerificationResolved
    } else {
        ActionOutcome::Succeeded
    }
}

/// Domain for generated addresses: explicit configuration first, otherwise
/// the administrator email's domain.
fn resolve_domain(
    config: &Config,
    credentials: Option<&CredentialsConfig>,
) -> Result<String, FlowError> {
    if !config.creation.email_domain.is_empty() {
        return Ok(config.creation.email_domain.clone());
    }
    credentials
        .and_then(|c| c.email_domain())
        .map(str::to_string)
        .ok_or_else(|| {
            FlowError::Configuration(
                "no domain for generated addresses; set creation.email_domain or credentials"
                    .to_string(),
            )
        })
}
