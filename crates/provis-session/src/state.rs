//! Captured session state.

use std::collections::BTreeMap;

use provis_driver::Cookie;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// sameSite values Chrome accepts when a cookie is set programmatically.
const LEGAL_SAME_SITE: [&str; 3] = ["Strict", "Lax", "None"];

/// Everything captured from an authenticated browser: its cookies and the
/// origin's localStorage.
///
/// The on-disk shape is `{"cookies": [...], "localStorage": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    #[serde(default, rename = "localStorage")]
    pub local_storage: BTreeMap<String, String>,
}

impl SessionState {
    pub fn new(cookies: Vec<Cookie>, local_storage: BTreeMap<String, String>) -> Self {
        Self {
            cookies,
            local_storage,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.local_storage.is_empty()
    }

    /// Cookies prepared for replay into a live browser.
    ///
    /// Captured cookies sometimes carry a sameSite value the browser will
    /// not accept back (Chrome reports values like `unspecified`). The
    /// offending attribute is dropped so the cookie itself still replays.
    pub fn replay_cookies(&self) -> Vec<Cookie> {
        self.cookies
            .iter()
            .cloned()
            .map(|mut cookie| {
                if let Some(same_site) = &cookie.same_site {
                    if !LEGAL_SAME_SITE.contains(&same_site.as_str()) {
                        warn!(
                            cookie = %cookie.name,
                            same_site = %same_site,
                            "dropping illegal sameSite attribute before replay"
                        );
                        cookie.same_site = None;
                    }
                }
                cookie
            })
            .collect()
    }
}
