//! Chrome lifecycle management.
//!
//! Finds or launches a Chrome instance with remote debugging enabled and
//! hands out [`CdpBrowser`] handles. `connect` owns the browser lifecycle
//! for unattended runs; `attach` joins an operator's already-running
//! instance without opening new tabs.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::browser::CdpBrowser;
use crate::cdp::{CdpClient, CdpError};

/// Attempts made waiting for a freshly launched Chrome to serve CDP.
const READY_ATTEMPTS: u32 = 30;
/// Delay between readiness attempts.
const READY_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Chrome executable not found; set an explicit chrome_path")]
    ChromeNotFound,

    #[error("Failed to launch Chrome: {0}")]
    LaunchFailed(String),

    #[error("Chrome did not become ready on port {0}")]
    NotReady(u16),

    #[error("Chrome is not running on port {0}")]
    NotRunning(u16),

    #[error("No open page tab to attach to")]
    NoPageTarget,

    #[error("CDP error: {0}")]
    Cdp(#[from] CdpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Launch and connection settings for the managed Chrome instance.
#[derive(Debug, Clone)]
pub struct BrowserManagerConfig {
    /// Remote debugging port.
    pub debug_port: u16,
    /// Run without a visible window.
    pub headless: bool,
    /// Profile directory. Defaults to `~/.provis/browser-profile`.
    pub user_data_dir: Option<PathBuf>,
    /// Explicit Chrome binary path, overriding discovery.
    pub chrome_path: Option<String>,
    /// Initial window width in pixels.
    pub window_width: u32,
    /// Initial window height in pixels.
    pub window_height: u32,
}

impl Default for BrowserManagerConfig {
    fn default() -> Self {
        Self {
            debug_port: 9222,
            headless: false,
            user_data_dir: None,
            chrome_path: None,
            window_width: 800,
            window_height: 600,
        }
    }
}

/// Manages one Chrome instance reachable over the DevTools protocol.
pub struct BrowserManager {
    config: BrowserManagerConfig,
    chrome_process: Mutex<Option<Child>>,
}

impl BrowserManager {
    pub fn new(config: BrowserManagerConfig) -> Self {
        Self {
            config,
            chrome_process: Mutex::new(None),
        }
    }

    /// HTTP endpoint of the debugging interface.
    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.config.debug_port)
    }

    /// Locate a Chrome binary on this machine.
    pub fn find_chrome(&self) -> Option<String> {
        if let Some(path) = &self.config.chrome_path {
            return Some(path.clone());
        }

        #[cfg(target_os = "linux")]
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ];

        #[cfg(target_os = "macos")]
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ];

        #[cfg(target_os = "windows")]
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ];

        candidates
            .iter()
            .find(|path| std::path::Path::new(path).exists())
            .map(|path| path.to_string())
    }

    /// Whether a debuggable Chrome is already serving on the configured port.
    pub async fn is_running(&self) -> bool {
        CdpClient::fetch_version(&self.endpoint()).await.is_ok()
    }

    fn profile_dir(&self) -> PathBuf {
        self.config.user_data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".provis")
                .join("browser-profile")
        })
    }

    /// Spawn Chrome with remote debugging enabled.
    pub fn launch(&self) -> Result<(), BrowserError> {
        let chrome = self.find_chrome().ok_or(BrowserError::ChromeNotFound)?;
        let profile = self.profile_dir();

        let mut command = Command::new(&chrome);
        command
            .arg(format!("--remote-debugging-port={}", self.config.debug_port))
            .arg(format!("--user-data-dir={}", profile.display()))
            .arg(format!(
                "--window-size={},{}",
                self.config.window_width, self.config.window_height
            ))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--metrics-recording-only")
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        if self.config.headless {
            command.arg("--headless=new");
        }

        info!(chrome = %chrome, port = self.config.debug_port, "launching Chrome");
        let child = command
            .spawn()
            .map_err(|err| BrowserError::LaunchFailed(err.to_string()))?;
        *self.chrome_process.lock() = Some(child);
        Ok(())
    }

    async fn wait_until_ready(&self) -> Result<(), BrowserError> {
        for _ in 0..READY_ATTEMPTS {
            if self.is_running().await {
                return Ok(());
            }
            tokio::time::sleep(READY_DELAY).await;
        }
        Err(BrowserError::NotReady(self.config.debug_port))
    }

    /// Connect to Chrome, launching it first if nothing is listening.
    ///
    /// Opens a fresh blank tab and returns a browser focused on it.
    pub async fn connect(&self) -> Result<CdpBrowser, BrowserError> {
        if !self.is_running().await {
            self.launch()?;
            self.wait_until_ready().await?;
        }

        let client = Arc::new(CdpClient::connect(&self.endpoint()).await?);
        let session = client.new_page("about:blank").await?;
        session.enable_domains().await?;
        debug!(target_id = %session.target_id(), "connected with fresh tab");
        Ok(CdpBrowser::new(client, session))
    }

    /// Attach to an operator's already-running Chrome without opening tabs.
    ///
    /// Focuses the first open page tab. Fails if Chrome is not serving CDP
    /// on the configured port.
    pub async fn attach(&self) -> Result<CdpBrowser, BrowserError> {
        if !self.is_running().await {
            return Err(BrowserError::NotRunning(self.config.debug_port));
        }

        let client = Arc::new(CdpClient::connect(&self.endpoint()).await?);
        let targets = client.get_targets().await?;
        let page = targets
            .into_iter()
            .find(|t| t.target_type == "page")
            .ok_or(BrowserError::NoPageTarget)?;

        let session = client.attach_page(&page.target_id).await?;
        session.enable_domains().await?;
        debug!(target_id = %session.target_id(), url = %page.url, "attached to existing tab");
        Ok(CdpBrowser::new(client, session))
    }

    /// Kill the Chrome process if this manager launched it.
    pub fn shutdown(&self) {
        if let Some(mut child) = self.chrome_process.lock().take() {
            if let Err(err) = child.kill() {
                warn!(error = %err, "failed to kill Chrome process");
            }
            let _ = child.wait();
        }
    }
}

impl Drop for BrowserManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
