//! Page-scoped CDP operations.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::{debug, trace};

use super::client::CdpClient;
use super::error::CdpError;
use super::protocol::{Cookie, ExceptionDetails, KeyEventType, MouseButton, MouseEventType};

/// Upper bound on waiting for `document.readyState` to become complete.
const LOAD_TIMEOUT: Duration = Duration::from_secs(30);
/// Poll interval for load-state checks.
const LOAD_POLL: Duration = Duration::from_millis(100);

/// A single attached page tab. All commands are scoped to its session id.
#[derive(Debug)]
pub struct PageSession {
    client: Arc<CdpClient>,
    session_id: String,
    target_id: String,
}

impl PageSession {
    pub(crate) fn new(client: Arc<CdpClient>, session_id: String, target_id: String) -> Self {
        Self {
            client,
            session_id,
            target_id,
        }
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, CdpError> {
        self.client
            .call(method, Some(&self.session_id), params)
            .await
    }

    /// Enable the protocol domains the driver relies on.
    pub async fn enable_domains(&self) -> Result<(), CdpError> {
        self.call("Page.enable", None).await?;
        self.call("Runtime.enable", None).await?;
        self.call("Network.enable", None).await?;
        Ok(())
    }

    /// Navigate and wait for the document to finish loading.
    pub async fn navigate(&self, url: &str) -> Result<(), CdpError> {
        debug!(url, "navigating");
        self.call("Page.navigate", Some(json!({"url": url}))).await?;
        self.wait_for_load().await
    }

    /// Reload the page and wait for the document to finish loading.
    pub async fn reload(&self) -> Result<(), CdpError> {
        debug!("reloading page");
        self.call("Page.reload", None).await?;
        self.wait_for_load().await
    }

    async fn wait_for_load(&self) -> Result<(), CdpError> {
        let start = Instant::now();
        loop {
            let state = self.evaluate("document.readyState").await?;
            if state.as_str() == Some("complete") {
                return Ok(());
            }
            if start.elapsed() >= LOAD_TIMEOUT {
                trace!("load wait expired, continuing with current state");
                return Ok(());
            }
            tokio::time::sleep(LOAD_POLL).await;
        }
    }

    /// Evaluate a JavaScript expression and return its value.
    ///
    /// Promises are awaited; a thrown exception maps to [`CdpError::JavaScript`].
    pub async fn evaluate(&self, expression: &str) -> Result<Value, CdpError> {
        let result = self
            .call(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let details: ExceptionDetails = serde_json::from_value(details.clone())?;
            return Err(CdpError::JavaScript(details.message()));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Dispatch a left-button click at viewport coordinates.
    pub async fn click_at(&self, x: f64, y: f64) -> Result<(), CdpError> {
        trace!(x, y, "dispatching click");
        for event_type in [MouseEventType::MousePressed, MouseEventType::MouseReleased] {
            self.call(
                "Input.dispatchMouseEvent",
                Some(json!({
                    "type": event_type,
                    "x": x,
                    "y": y,
                    "button": MouseButton::Left,
                    "clickCount": 1,
                })),
            )
            .await?;
        }
        Ok(())
    }

    /// Insert text into the focused element.
    pub async fn insert_text(&self, text: &str) -> Result<(), CdpError> {
        self.call("Input.insertText", Some(json!({"text": text})))
            .await?;
        Ok(())
    }

    /// Press and release a named key on the focused element.
    ///
    /// Keys that move focus or submit forms need virtual key codes, so the
    /// few the flows use are mapped explicitly.
    pub async fn press_key(&self, key: &str) -> Result<(), CdpError> {
        let (vkey, text) = key_definition(key);
        let down_type = if text.is_some() {
            KeyEventType::KeyDown
        } else {
            KeyEventType::RawKeyDown
        };

        let mut down = json!({
            "type": down_type,
            "key": key,
            "code": key,
            "windowsVirtualKeyCode": vkey,
            "nativeVirtualKeyCode": vkey,
        });
        if let Some(text) = text {
            down["text"] = json!(text);
        }
        self.call("Input.dispatchKeyEvent", Some(down)).await?;

        self.call(
            "Input.dispatchKeyEvent",
            Some(json!({
                "type": KeyEventType::KeyUp,
                "key": key,
                "code": key,
                "windowsVirtualKeyCode": vkey,
                "nativeVirtualKeyCode": vkey,
            })),
        )
        .await?;
        Ok(())
    }

    /// All cookies visible to this page's network stack.
    pub async fn get_cookies(&self) -> Result<Vec<Cookie>, CdpError> {
        let result = self.call("Network.getCookies", None).await?;
        let mut cookies: Vec<Cookie> = serde_json::from_value(result["cookies"].clone())?;
        for cookie in &mut cookies {
            // CDP reports session cookies with expires == -1.
            if cookie.expires.is_some_and(|e| e < 0.0) {
                cookie.expires = None;
            }
        }
        Ok(cookies)
    }

    /// Set a single cookie. Fails with a protocol error if Chrome rejects it.
    pub async fn set_cookie(&self, cookie: &Cookie) -> Result<(), CdpError> {
        let params = serde_json::to_value(cookie)?;
        let result = self.call("Network.setCookie", Some(params)).await?;
        if result["success"] == json!(false) {
            return Err(CdpError::Protocol {
                code: 0,
                message: format!("cookie {} was not set", cookie.name),
            });
        }
        Ok(())
    }

    /// Clear all browser cookies.
    pub async fn clear_cookies(&self) -> Result<(), CdpError> {
        self.call("Network.clearBrowserCookies", None).await?;
        Ok(())
    }

    /// Snapshot of the current origin's localStorage.
    pub async fn get_local_storage(&self) -> Result<BTreeMap<String, String>, CdpError> {
        let value = self
            .evaluate(
                "(() => { const out = {}; \
                 for (let i = 0; i < localStorage.length; i++) { \
                   const k = localStorage.key(i); out[k] = localStorage.getItem(k); \
                 } return out; })()",
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Write one localStorage entry on the current origin.
    pub async fn set_local_storage_item(&self, key: &str, value: &str) -> Result<(), CdpError> {
        let expression = format!(
            "localStorage.setItem({}, {})",
            js_string(key),
            js_string(value)
        );
        self.evaluate(&expression).await?;
        Ok(())
    }

    /// Remove every localStorage entry on the current origin.
    pub async fn clear_local_storage(&self) -> Result<(), CdpError> {
        self.evaluate("localStorage.clear()").await?;
        Ok(())
    }

    /// The current document title.
    pub async fn get_title(&self) -> Result<String, CdpError> {
        let value = self.evaluate("document.title").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

/// Virtual key code and committed text for the keys the flows press.
fn key_definition(key: &str) -> (i64, Option<&'static str>) {
    match key {
        "Tab" => (9, None),
        "Enter" => (13, Some("\r")),
        "Escape" => (27, None),
        _ => (0, None),
    }
}

/// Render a Rust string as a JavaScript string literal.
pub(crate) fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}
