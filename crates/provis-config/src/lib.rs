//! Configuration for provisioning runs.
//!
//! The schema binds the flows to a concrete portal: URLs, selectors,
//! timeouts, credentials. Loading supports `${VAR}` environment expansion
//! so secrets stay out of files.

mod error;
mod loader;
mod schema;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{
    BrowserConfig, CapacityConfig, ChainConfig, Config, CreationConfig, CredentialsConfig,
    OutputConfig, PortalConfig, SessionConfig, SigninConfig, TimeoutsConfig, VerificationConfig,
    ENV_EMAIL, ENV_PASSWORD, ENV_VERIFY_SECRET,
};
