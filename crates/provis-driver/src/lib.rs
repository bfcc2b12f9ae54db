//! Browser automation driver for provisioning flows.
//!
//! The crate is layered so the flows above it never see protocol details:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 Browser trait               │   what flows program against
//! ├──────────────────────┬──────────────────────┤
//! │      CdpBrowser      │    BrowserManager    │   live implementation + lifecycle
//! ├──────────────────────┴──────────────────────┤
//! │       CdpClient  /  PageSession  (cdp)      │   WebSocket + protocol plumbing
//! └─────────────────────────────────────────────┘
//! ```
//!
//! [`Browser`] models a Selenium-style single focused tab: commands act on
//! the current tab, and [`Browser::switch_tab`] moves focus explicitly.

mod browser;
pub mod cdp;
mod manager;

pub use browser::{Browser, CdpBrowser, DriverError, Locator, TabId};
pub use cdp::{CdpClient, CdpError, Cookie, PageSession};
pub use manager::{BrowserError, BrowserManager, BrowserManagerConfig};
