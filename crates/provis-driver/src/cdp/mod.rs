//! Chrome DevTools Protocol plumbing.
//!
//! [`CdpClient`] owns the browser WebSocket; [`PageSession`] scopes commands
//! to one attached tab.

mod client;
mod error;
mod protocol;
mod session;

pub use client::CdpClient;
pub use error::CdpError;
pub use protocol::{BrowserVersion, Cookie, PageInfo, TargetInfo};
pub use session::PageSession;

pub(crate) use session::js_string;
