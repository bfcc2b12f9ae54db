//! Scripted fake browser for flow tests.
//!
//! Pages do not change on their own: visibility, tabs, and rows change only
//! through scripted click actions, so timeouts are irrelevant and tests run
//! instantly. All locator keys are normalized through `Locator::parse`.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use provis_config::{Config, CredentialsConfig, TimeoutsConfig};
use provis_driver::{Browser, CdpError, Cookie, DriverError, Locator, TabId};
use serde_json::Value;

pub const PRIMARY_TAB: &str = "primary";

/// Mutation applied to the scripted page when a control is clicked.
#[derive(Debug, Clone)]
pub enum OnClick {
    Noop,
    Show(String),
    Hide(String),
    OpenTab { id: String, title: String },
    Seq(Vec<OnClick>),
}

pub struct FakeState {
    pub visible: HashSet<String>,
    pub checked: HashMap<String, bool>,
    pub texts: HashMap<String, Vec<String>>,
    pub click_actions: HashMap<String, VecDeque<OnClick>>,
    pub tabs: Vec<TabId>,
    pub current: TabId,
    pub titles: HashMap<String, String>,
    pub cookies: Vec<Cookie>,
    pub local_storage: BTreeMap<String, String>,
    pub reject_cookies: HashSet<String>,
    pub reject_fills: HashSet<String>,

    // Interaction log.
    pub navigations: Vec<String>,
    pub reloads: usize,
    pub clicks: Vec<String>,
    pub js_clicks: Vec<String>,
    pub fills: Vec<(String, String)>,
    pub typed: Vec<String>,
    pub keys: Vec<String>,
    pub switches: Vec<String>,
    pub closed: Vec<String>,
    pub cookie_clears: usize,
    pub cookies_set: Vec<String>,
    pub local_storage_clears: usize,
}

pub struct FakeBrowser {
    state: Mutex<FakeState>,
}

fn key(raw: &str) -> String {
    Locator::parse(raw).to_string()
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                visible: HashSet::new(),
                checked: HashMap::new(),
                texts: HashMap::new(),
                click_actions: HashMap::new(),
                tabs: vec![TabId::new(PRIMARY_TAB)],
                current: TabId::new(PRIMARY_TAB),
                titles: HashMap::new(),
                cookies: Vec::new(),
                local_storage: BTreeMap::new(),
                reject_cookies: HashSet::new(),
                reject_fills: HashSet::new(),
                navigations: Vec::new(),
                reloads: 0,
                clicks: Vec::new(),
                js_clicks: Vec::new(),
                fills: Vec::new(),
                typed: Vec::new(),
                keys: Vec::new(),
                switches: Vec::new(),
                closed: Vec::new(),
                cookie_clears: 0,
                cookies_set: Vec::new(),
                local_storage_clears: 0,
            }),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Make an element visible. `raw` is a configuration selector string.
    pub fn show(&self, raw: &str) {
        self.state().visible.insert(key(raw));
    }

    pub fn set_checked(&self, raw: &str, checked: bool) {
        self.state().checked.insert(key(raw), checked);
    }

    pub fn set_texts(&self, raw: &str, texts: &[&str]) {
        self.state()
            .texts
            .insert(key(raw), texts.iter().map(|t| t.to_string()).collect());
    }

    /// Queue an action for the next click on `raw`; later clicks pop later
    /// queue entries.
    pub fn on_click(&self, raw: &str, action: OnClick) {
        self.state()
            .click_actions
            .entry(key(raw))
            .or_default()
            .push_back(action);
    }

    pub fn add_tab(&self, id: &str, title: &str) {
        let mut state = self.state();
        state.tabs.push(TabId::new(id));
        state.titles.insert(id.to_string(), title.to_string());
    }

    pub fn seed_cookies(&self, cookies: Vec<Cookie>) {
        self.state().cookies = cookies;
    }

    pub fn seed_local_storage(&self, storage_key: &str, value: &str) {
        self.state()
            .local_storage
            .insert(storage_key.to_string(), value.to_string());
    }

    pub fn reject_cookie(&self, name: &str) {
        self.state().reject_cookies.insert(name.to_string());
    }

    /// Make every `fill` on `raw` fail, as a dead transport would.
    pub fn reject_fill(&self, raw: &str) {
        self.state().reject_fills.insert(key(raw));
    }

    fn apply(state: &mut FakeState, action: OnClick) {
        match action {
            OnClick::Noop => {}
            OnClick::Show(raw) => {
                state.visible.insert(key(&raw));
            }
            OnClick::Hide(raw) => {
                state.visible.remove(&key(&raw));
            }
            OnClick::OpenTab { id, title } => {
                state.tabs.push(TabId::new(&id));
                state.titles.insert(id, title);
            }
            OnClick::Seq(actions) => {
                for action in actions {
                    Self::apply(state, action);
                }
            }
        }
    }

    fn record_click(&self, locator: &Locator, js: bool) {
        let locator_key = locator.to_string();
        let mut state = self.state();
        if js {
            state.js_clicks.push(locator_key.clone());
        } else {
            state.clicks.push(locator_key.clone());
        }
        let action = state
            .click_actions
            .get_mut(&locator_key)
            .and_then(|queue| queue.pop_front());
        if let Some(action) = action {
            Self::apply(&mut state, action);
        }
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.state().navigations.push(url.to_string());
        Ok(())
    }

    async fn reload(&self) -> Result<(), DriverError> {
        self.state().reloads += 1;
        Ok(())
    }

    async fn title(&self) -> Result<String, DriverError> {
        let state = self.state();
        Ok(state
            .titles
            .get(state.current.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn evaluate(&self, _expression: &str) -> Result<Value, DriverError> {
        Ok(Value::Null)
    }

    async fn wait_visible(
        &self,
        locator: &Locator,
        _timeout: Duration,
    ) -> Result<bool, DriverError> {
        Ok(self.state().visible.contains(&locator.to_string()))
    }

    async fn click(&self, locator: &Locator) -> Result<(), DriverError> {
        self.record_click(locator, false);
        Ok(())
    }

    async fn click_js(&self, locator: &Locator) -> Result<(), DriverError> {
        self.record_click(locator, true);
        Ok(())
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), DriverError> {
        let locator_key = locator.to_string();
        let mut state = self.state();
        if state.reject_fills.contains(&locator_key) {
            return Err(DriverError::Cdp(CdpError::Protocol {
                code: 0,
                message: format!("fill failed on {locator_key}"),
            }));
        }
        state.fills.push((locator_key, text.to_string()));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), DriverError> {
        self.state().typed.push(text.to_string());
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), DriverError> {
        self.state().keys.push(key.to_string());
        Ok(())
    }

    async fn is_checked(&self, locator: &Locator) -> Result<bool, DriverError> {
        Ok(self
            .state()
            .checked
            .get(&locator.to_string())
            .copied()
            .unwrap_or(false))
    }

    async fn all_texts(&self, locator: &Locator) -> Result<Vec<String>, DriverError> {
        Ok(self
            .state()
            .texts
            .get(&locator.to_string())
            .cloned()
            .unwrap_or_default())
    }

    async fn cookies(&self) -> Result<Vec<Cookie>, DriverError> {
        Ok(self.state().cookies.clone())
    }

    async fn set_cookie(&self, cookie: &Cookie) -> Result<(), DriverError> {
        let mut state = self.state();
        if state.reject_cookies.contains(&cookie.name) {
            return Err(DriverError::Cdp(CdpError::Protocol {
                code: 0,
                message: format!("cookie {} was not set", cookie.name),
            }));
        }
        state.cookies_set.push(cookie.name.clone());
        state.cookies.push(cookie.clone());
        Ok(())
    }

    async fn clear_cookies(&self) -> Result<(), DriverError> {
        let mut state = self.state();
        state.cookies.clear();
        state.cookie_clears += 1;
        Ok(())
    }

    async fn local_storage(&self) -> Result<BTreeMap<String, String>, DriverError> {
        Ok(self.state().local_storage.clone())
    }

    async fn set_local_storage_item(&self, key: &str, value: &str) -> Result<(), DriverError> {
        self.state()
            .local_storage
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn clear_local_storage(&self) -> Result<(), DriverError> {
        let mut state = self.state();
        state.local_storage.clear();
        state.local_storage_clears += 1;
        Ok(())
    }

    async fn tabs(&self) -> Result<Vec<TabId>, DriverError> {
        Ok(self.state().tabs.clone())
    }

    async fn current_tab(&self) -> Result<TabId, DriverError> {
        Ok(self.state().current.clone())
    }

    async fn switch_tab(&self, tab: &TabId) -> Result<TabId, DriverError> {
        let mut state = self.state();
        if !state.tabs.contains(tab) {
            return Err(DriverError::TabNotFound(tab.to_string()));
        }
        state.switches.push(tab.to_string());
        let previous = state.current.clone();
        state.current = tab.clone();
        Ok(previous)
    }

    async fn close_tab(&self, tab: &TabId) -> Result<(), DriverError> {
        let mut state = self.state();
        state.tabs.retain(|t| t != tab);
        state.closed.push(tab.to_string());
        Ok(())
    }
}

/// Cookie fixture.
pub fn cookie(name: &str, same_site: Option<&str>) -> Cookie {
    Cookie {
        name: name.to_string(),
        value: "v".to_string(),
        domain: ".corp.example".to_string(),
        path: "/".to_string(),
        expires: None,
        secure: None,
        http_only: None,
        same_site: same_site.map(|s| s.to_string()),
    }
}

/// Default test configuration: admin credentials set, every delay zeroed so
/// scripted runs finish instantly.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.credentials = Some(CredentialsConfig {
        email: "admin@corp.example".to_string(),
        password: "hunter2".to_string(),
    });
    config.timeouts = TimeoutsConfig {
        verification_tab_secs: 0,
        element_secs: 0,
        form_secs: 0,
        blocked_check_secs: 0,
        settle_secs: 0,
        dialog_settle_secs: 0,
        nav_settle_secs: 0,
        post_login_settle_secs: 0,
    };
    config
}

/// The indexed XPath the executor builds for a row's delete control.
pub fn row_delete_locator(config: &Config, position: usize) -> String {
    format!(
        "({})[{}]{}",
        config.capacity.rows, position, config.capacity.delete_control
    )
}
