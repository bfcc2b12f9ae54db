//! Provisioning flows over the browser automation interface.
//!
//! ```text
//! ┌──────────────────────── Workflow ────────────────────────┐
//! │                                                          │
//! │  Authenticator ──► ActionExecutor ──► ChainedStep (opt)  │
//! │       │                  │                               │
//! │       │                  ├── UserCreator ── RecordWriter │
//! │       └── VerificationHandler ──┘                        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Every flow is written against `provis_driver::Browser`, so the whole
//! stack runs unchanged against a live browser or a scripted fake.

mod auth;
mod chain;
mod creator;
mod error;
mod executor;
mod identity;
mod record;
mod verify;
mod workflow;

pub use auth::{capture_session, AuthContext, Authenticator};
pub use chain::{ChainedStep, DownstreamSignup};
pub use creator::UserCreator;
pub use error::FlowError;
pub use executor::{ActionExecutor, ExecReport};
pub use identity::{GeneratedIdentity, IdentityGenerator};
pub use record::RecordWriter;
pub use verify::{VerificationHandler, VerificationOutcome};
pub use workflow::{ActionOutcome, RunReport, Workflow};
