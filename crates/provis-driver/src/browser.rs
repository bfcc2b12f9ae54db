//! The browser automation interface the provisioning flows are written
//! against, plus its CDP-backed implementation.
//!
//! Flows never touch the protocol layer directly. Everything they need is
//! expressed through [`Browser`], which keeps them testable against scripted
//! fakes and keeps the protocol details swappable.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::trace;

use crate::cdp::{js_string, CdpClient, CdpError, Cookie, PageSession};

/// Poll interval for element waits.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors surfaced through the [`Browser`] interface.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Tab not found: {0}")]
    TabNotFound(String),

    #[error("CDP error: {0}")]
    Cdp(#[from] CdpError),
}

/// How to find an element on the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Locator::XPath(expression.into())
    }

    /// Parse a configuration string into a locator.
    ///
    /// Explicit `css:` and `xpath:` prefixes win; otherwise strings that look
    /// like XPath (`//...` or a parenthesized step) are treated as XPath and
    /// everything else as a CSS selector.
    pub fn parse(raw: &str) -> Self {
        if let Some(rest) = raw.strip_prefix("css:") {
            Locator::Css(rest.to_string())
        } else if let Some(rest) = raw.strip_prefix("xpath:") {
            Locator::XPath(rest.to_string())
        } else if raw.starts_with("//") || raw.starts_with("(") || raw.starts_with("./") {
            Locator::XPath(raw.to_string())
        } else {
            Locator::Css(raw.to_string())
        }
    }

    /// JavaScript expression resolving to the first matching element or null.
    fn resolve_js(&self) -> String {
        match self {
            Locator::Css(selector) => {
                format!("document.querySelector({})", js_string(selector))
            }
            Locator::XPath(expression) => format!(
                "document.evaluate({}, document, null, \
                 XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
                js_string(expression)
            ),
        }
    }

    /// JavaScript expression resolving to an array of all matching elements.
    fn resolve_all_js(&self) -> String {
        match self {
            Locator::Css(selector) => format!(
                "Array.from(document.querySelectorAll({}))",
                js_string(selector)
            ),
            Locator::XPath(expression) => format!(
                "(() => {{ const snap = document.evaluate({}, document, null, \
                 XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); \
                 const arr = []; \
                 for (let i = 0; i < snap.snapshotLength; i++) \
                   arr.push(snap.snapshotItem(i)); \
                 return arr; }})()",
                js_string(expression)
            ),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selector) => write!(f, "css:{selector}"),
            Locator::XPath(expression) => write!(f, "xpath:{expression}"),
        }
    }
}

/// Opaque handle to one browser tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TabId(String);

impl TabId {
    pub fn new(id: impl Into<String>) -> Self {
        TabId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Browser automation interface.
///
/// Commands act on the currently focused tab unless they take a [`TabId`].
/// `wait_visible` reports absence as `Ok(false)` so callers decide whether a
/// missing element is fatal.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Navigate the current tab and wait for the document to load.
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// Reload the current tab and wait for the document to load.
    async fn reload(&self) -> Result<(), DriverError>;

    /// Title of the current tab's document.
    async fn title(&self) -> Result<String, DriverError>;

    /// Evaluate JavaScript in the current tab.
    async fn evaluate(&self, expression: &str) -> Result<Value, DriverError>;

    /// Wait until the element is present and visible, polling up to `timeout`.
    async fn wait_visible(&self, locator: &Locator, timeout: Duration)
        -> Result<bool, DriverError>;

    /// Click the element's center with a synthesized mouse event.
    async fn click(&self, locator: &Locator) -> Result<(), DriverError>;

    /// Click the element programmatically, bypassing hit testing.
    async fn click_js(&self, locator: &Locator) -> Result<(), DriverError>;

    /// Focus the element and type text into it.
    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), DriverError>;

    /// Type text into whatever element currently has focus.
    async fn type_text(&self, text: &str) -> Result<(), DriverError>;

    /// Press and release a named key (for example `Tab` or `Enter`).
    async fn press_key(&self, key: &str) -> Result<(), DriverError>;

    /// Whether a checkbox or radio element is currently checked.
    async fn is_checked(&self, locator: &Locator) -> Result<bool, DriverError>;

    /// Trimmed text content of every element matching the locator, in
    /// document order.
    async fn all_texts(&self, locator: &Locator) -> Result<Vec<String>, DriverError>;

    /// All cookies visible to the current tab.
    async fn cookies(&self) -> Result<Vec<Cookie>, DriverError>;

    /// Set a single cookie.
    async fn set_cookie(&self, cookie: &Cookie) -> Result<(), DriverError>;

    /// Delete all browser cookies.
    async fn clear_cookies(&self) -> Result<(), DriverError>;

    /// Snapshot of the current origin's localStorage.
    async fn local_storage(&self) -> Result<BTreeMap<String, String>, DriverError>;

    /// Write one localStorage entry on the current origin.
    async fn set_local_storage_item(&self, key: &str, value: &str) -> Result<(), DriverError>;

    /// Remove every localStorage entry on the current origin.
    async fn clear_local_storage(&self) -> Result<(), DriverError>;

    /// Handles of all open page tabs.
    async fn tabs(&self) -> Result<Vec<TabId>, DriverError>;

    /// Handle of the currently focused tab.
    async fn current_tab(&self) -> Result<TabId, DriverError>;

    /// Focus another tab. Returns the handle of the previously focused tab.
    async fn switch_tab(&self, tab: &TabId) -> Result<TabId, DriverError>;

    /// Close a tab. Callers must switch away from it first.
    async fn close_tab(&self, tab: &TabId) -> Result<(), DriverError>;
}

#[derive(Debug, Clone, Deserialize)]
struct ElementProbe {
    visible: bool,
    x: f64,
    y: f64,
}

/// [`Browser`] implementation backed by a live Chrome instance over CDP.
#[derive(Debug)]
pub struct CdpBrowser {
    client: Arc<CdpClient>,
    current: RwLock<Arc<PageSession>>,
}

impl CdpBrowser {
    pub fn new(client: Arc<CdpClient>, initial: PageSession) -> Self {
        Self {
            client,
            current: RwLock::new(Arc::new(initial)),
        }
    }

    async fn session(&self) -> Arc<PageSession> {
        self.current.read().await.clone()
    }

    /// Locate the element and report its visibility and center point.
    async fn probe(&self, locator: &Locator) -> Result<Option<ElementProbe>, DriverError> {
        let expression = format!(
            "(() => {{ const el = {}; if (!el) return null; \
             const r = el.getBoundingClientRect(); \
             const s = window.getComputedStyle(el); \
             const visible = r.width > 0 && r.height > 0 && \
               s.visibility !== 'hidden' && s.display !== 'none'; \
             return {{ visible: visible, x: r.x + r.width / 2, y: r.y + r.height / 2 }}; }})()",
            locator.resolve_js()
        );
        let value = self.session().await.evaluate(&expression).await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value).map_err(CdpError::from)?))
    }

    async fn require(&self, locator: &Locator) -> Result<ElementProbe, DriverError> {
        self.probe(locator)
            .await?
            .ok_or_else(|| DriverError::ElementNotFound(locator.to_string()))
    }
}

#[async_trait]
impl Browser for CdpBrowser {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        Ok(self.session().await.navigate(url).await?)
    }

    async fn reload(&self) -> Result<(), DriverError> {
        Ok(self.session().await.reload().await?)
    }

    async fn title(&self) -> Result<String, DriverError> {
        Ok(self.session().await.get_title().await?)
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, DriverError> {
        Ok(self.session().await.evaluate(expression).await?)
    }

    async fn wait_visible(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<bool, DriverError> {
        let start = Instant::now();
        loop {
            if let Some(probe) = self.probe(locator).await? {
                if probe.visible {
                    return Ok(true);
                }
            }
            if start.elapsed() >= timeout {
                trace!(%locator, "element did not become visible");
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn click(&self, locator: &Locator) -> Result<(), DriverError> {
        let probe = self.require(locator).await?;
        Ok(self.session().await.click_at(probe.x, probe.y).await?)
    }

    async fn click_js(&self, locator: &Locator) -> Result<(), DriverError> {
        let expression = format!(
            "(() => {{ const el = {}; if (!el) return false; el.click(); return true; }})()",
            locator.resolve_js()
        );
        let result = self.session().await.evaluate(&expression).await?;
        if result != Value::Bool(true) {
            return Err(DriverError::ElementNotFound(locator.to_string()));
        }
        Ok(())
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), DriverError> {
        let expression = format!(
            "(() => {{ const el = {}; if (!el) return false; el.focus(); return true; }})()",
            locator.resolve_js()
        );
        let session = self.session().await;
        let focused = session.evaluate(&expression).await?;
        if focused != Value::Bool(true) {
            return Err(DriverError::ElementNotFound(locator.to_string()));
        }
        Ok(session.insert_text(text).await?)
    }

    async fn type_text(&self, text: &str) -> Result<(), DriverError> {
        Ok(self.session().await.insert_text(text).await?)
    }

    async fn press_key(&self, key: &str) -> Result<(), DriverError> {
        Ok(self.session().await.press_key(key).await?)
    }

    async fn is_checked(&self, locator: &Locator) -> Result<bool, DriverError> {
        let expression = format!(
            "(() => {{ const el = {}; return el ? !!el.checked : null; }})()",
            locator.resolve_js()
        );
        match self.session().await.evaluate(&expression).await? {
            Value::Bool(checked) => Ok(checked),
            _ => Err(DriverError::ElementNotFound(locator.to_string())),
        }
    }

    async fn all_texts(&self, locator: &Locator) -> Result<Vec<String>, DriverError> {
        let expression = format!(
            "(() => {{ const els = {}; \
             return els.map(el => (el.textContent || '').trim()); }})()",
            locator.resolve_all_js()
        );
        let value = self.session().await.evaluate(&expression).await?;
        Ok(serde_json::from_value(value).map_err(CdpError::from)?)
    }

    async fn cookies(&self) -> Result<Vec<Cookie>, DriverError> {
        Ok(self.session().await.get_cookies().await?)
    }

    async fn set_cookie(&self, cookie: &Cookie) -> Result<(), DriverError> {
        Ok(self.session().await.set_cookie(cookie).await?)
    }

    async fn clear_cookies(&self) -> Result<(), DriverError> {
        Ok(self.session().await.clear_cookies().await?)
    }

    async fn local_storage(&self) -> Result<BTreeMap<String, String>, DriverError> {
        Ok(self.session().await.get_local_storage().await?)
    }

    async fn set_local_storage_item(&self, key: &str, value: &str) -> Result<(), DriverError> {
        Ok(self
            .session()
            .await
            .set_local_storage_item(key, value)
            .await?)
    }

    async fn clear_local_storage(&self) -> Result<(), DriverError> {
        Ok(self.session().await.clear_local_storage().await?)
    }

    async fn tabs(&self) -> Result<Vec<TabId>, DriverError> {
        let targets = self.client.get_targets().await.map_err(DriverError::from)?;
        Ok(targets
            .into_iter()
            .filter(|t| t.target_type == "page")
            .map(|t| TabId::new(t.target_id))
            .collect())
    }

    async fn current_tab(&self) -> Result<TabId, DriverError> {
        Ok(TabId::new(self.session().await.target_id()))
    }

    async fn switch_tab(&self, tab: &TabId) -> Result<TabId, DriverError> {
        let session = self
            .client
            .attach_page(tab.as_str())
            .await
            .map_err(|err| match err {
                CdpError::PageNotFound(id) => DriverError::TabNotFound(id),
                other => DriverError::Cdp(other),
            })?;
        session.enable_domains().await.map_err(DriverError::from)?;

        let mut current = self.current.write().await;
        let previous = TabId::new(current.target_id());
        *current = Arc::new(session);
        Ok(previous)
    }

    async fn close_tab(&self, tab: &TabId) -> Result<(), DriverError> {
        Ok(self.client.close_page(tab.as_str()).await?)
    }
}
