//! Configuration schema.
//!
//! Every selector and timeout the flows use comes from here, so a portal
//! redesign is a configuration change rather than a code change. Defaults
//! describe a typical two-step sign-in console and are meant to be
//! overridden per deployment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable consulted when `[credentials].email` is absent.
pub const ENV_EMAIL: &str = "PROVIS_EMAIL";
/// Environment variable consulted when `[credentials].password` is absent.
pub const ENV_PASSWORD: &str = "PROVIS_PASSWORD";
/// Environment variable consulted when `[verification].secret` is absent.
pub const ENV_VERIFY_SECRET: &str = "PROVIS_VERIFY_SECRET";

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub signin: SigninConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialsConfig>,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub capacity: CapacityConfig,
    #[serde(default)]
    pub creation: CreationConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub chain: ChainConfig,
}

impl Config {
    /// Sign-in credentials, falling back to `PROVIS_EMAIL` and
    /// `PROVIS_PASSWORD` when the file omits them.
    pub fn resolved_credentials(&self) -> Option<CredentialsConfig> {
        if let Some(credentials) = &self.credentials {
            return Some(credentials.clone());
        }
        let email = std::env::var(ENV_EMAIL).ok()?;
        let password = std::env::var(ENV_PASSWORD).ok()?;
        Some(CredentialsConfig { email, password })
    }

    /// Secondary-verification secret, falling back to `PROVIS_VERIFY_SECRET`.
    ///
    /// Never configured with a literal in shipped defaults; the secret is
    /// always injected by the operator.
    pub fn verification_secret(&self) -> Option<String> {
        self.verification
            .secret
            .clone()
            .or_else(|| std::env::var(ENV_VERIFY_SECRET).ok())
    }
}

/// URLs and landmark elements of the target admin portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Origin the saved session is replayed against.
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Interactive sign-in entry point.
    #[serde(default = "default_signin_url")]
    pub signin_url: String,
    /// Post-login console home.
    #[serde(default = "default_console_url")]
    pub console_url: String,
    /// Management surface where accounts are provisioned.
    #[serde(default = "default_users_url")]
    pub users_url: String,
    /// Element whose visibility proves an authenticated console.
    #[serde(default = "default_landmark")]
    pub landmark: String,
    /// Control that starts the provisioning action on the users surface.
    #[serde(default = "default_add_control")]
    pub add_control: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            signin_url: default_signin_url(),
            console_url: default_console_url(),
            users_url: default_users_url(),
            landmark: default_landmark(),
            add_control: default_add_control(),
        }
    }
}

fn default_origin() -> String {
    "https://console.example.com".to_string()
}

fn default_signin_url() -> String {
    "https://accounts.example.com/signin".to_string()
}

fn default_console_url() -> String {
    "https://console.example.com/home".to_string()
}

fn default_users_url() -> String {
    "https://console.example.com/users".to_string()
}

fn default_landmark() -> String {
    "//*[text()='Users']".to_string()
}

fn default_add_control() -> String {
    "//*[(self::a or self::button) and contains(., 'Add')]".to_string()
}

/// Selectors for the two-step interactive sign-in form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigninConfig {
    #[serde(default = "default_identifier_field")]
    pub identifier_field: String,
    #[serde(default = "default_next_button")]
    pub next_button: String,
    #[serde(default = "default_password_field")]
    pub password_field: String,
}

impl Default for SigninConfig {
    fn default() -> Self {
        Self {
            identifier_field: default_identifier_field(),
            next_button: default_next_button(),
            password_field: default_password_field(),
        }
    }
}

fn default_identifier_field() -> String {
    "#login_id".to_string()
}

fn default_next_button() -> String {
    "#nextbtn".to_string()
}

fn default_password_field() -> String {
    "#password".to_string()
}

/// Administrator sign-in credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub email: String,
    pub password: String,
}

impl CredentialsConfig {
    /// Domain part of the administrator email, used for generated addresses.
    pub fn email_domain(&self) -> Option<&str> {
        let domain = self.email.split_once('@')?.1;
        if domain.is_empty() { None } else { Some(domain) }
    }
}

/// Secondary-verification challenge handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Challenge secret. Prefer the `PROVIS_VERIFY_SECRET` environment
    /// variable over writing this into a file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Substring that identifies a verification tab by title.
    #[serde(default = "default_title_marker")]
    pub title_marker: String,
    /// Input that receives the challenge secret.
    #[serde(default = "default_challenge_field")]
    pub challenge_field: String,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            secret: None,
            title_marker: default_title_marker(),
            challenge_field: default_challenge_field(),
        }
    }
}

fn default_title_marker() -> String {
    "Verify".to_string()
}

fn default_challenge_field() -> String {
    "input[name='password']".to_string()
}

/// Capacity-limit detection and compensating deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityConfig {
    /// Element that appears when the capacity limit blocks the action.
    #[serde(default = "default_indicator")]
    pub indicator: String,
    /// Control that dismisses the capacity notice.
    #[serde(default = "default_dismiss")]
    pub dismiss: String,
    /// Locator matching candidate resource rows.
    #[serde(default = "default_rows")]
    pub rows: String,
    /// Substring a row must contain to be a deletable resource.
    #[serde(default = "default_row_marker")]
    pub row_marker: String,
    /// Substring identifying the protected row that must never be deleted.
    /// Defaults to the administrator email when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protected: Option<String>,
    /// Delete control relative to a row, appended to the indexed row path.
    #[serde(default = "default_delete_control")]
    pub delete_control: String,
    /// Confirmation control inside the deletion dialog.
    #[serde(default = "default_confirm_control")]
    pub confirm_control: String,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            indicator: default_indicator(),
            dismiss: default_dismiss(),
            rows: default_rows(),
            row_marker: default_row_marker(),
            protected: None,
            delete_control: default_delete_control(),
            confirm_control: default_confirm_control(),
        }
    }
}

fn default_indicator() -> String {
    "//*[text()='License limit reached']".to_string()
}

fn default_dismiss() -> String {
    "//button[@aria-label='Close']".to_string()
}

fn default_rows() -> String {
    "//*[self::tr or @role='row']".to_string()
}

fn default_row_marker() -> String {
    "@".to_string()
}

fn default_delete_control() -> String {
    "//button[contains(@aria-label, 'Delete') or .//i[contains(@class, 'trash') or contains(@class, 'delete')]]"
        .to_string()
}

fn default_confirm_control() -> String {
    "//*[@role='dialog']//button[contains(., 'Delete') or contains(., 'Confirm')]".to_string()
}

/// Account-creation form selectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreationConfig {
    /// First field of the creation form; its visibility means the form opened.
    #[serde(default = "default_first_name_field")]
    pub first_name_field: String,
    /// Checkbox forcing a password change on first login, cleared if set.
    #[serde(default = "default_password_toggle")]
    pub password_toggle: String,
    /// Enabled submit control of the creation form.
    #[serde(default = "default_submit_control")]
    pub submit_control: String,
    /// Domain for generated addresses. Defaults to the administrator
    /// email's domain when empty.
    #[serde(default)]
    pub email_domain: String,
}

impl Default for CreationConfig {
    fn default() -> Self {
        Self {
            first_name_field: default_first_name_field(),
            password_toggle: default_password_toggle(),
            submit_control: default_submit_control(),
            email_domain: String::new(),
        }
    }
}

fn default_first_name_field() -> String {
    "input[data-test-id='fname']".to_string()
}

fn default_password_toggle() -> String {
    "//span[text()='Force user to change password on first log in']/preceding-sibling::span/input"
        .to_string()
}

fn default_submit_control() -> String {
    "//button[contains(., 'Add') and not(@disabled)]".to_string()
}

/// Where the captured session lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_file")]
    pub file: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            file: default_session_file(),
        }
    }
}

fn default_session_file() -> String {
    "~/.provis/session.json".to_string()
}

/// Where provisioning records are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "output".to_string()
}

/// Browser launch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_debug_port")]
    pub debug_port: u16,
    #[serde(default)]
    pub headless: bool,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            debug_port: default_debug_port(),
            headless: false,
            window_width: default_window_width(),
            window_height: default_window_height(),
            profile_dir: None,
            chrome_path: None,
        }
    }
}

fn default_debug_port() -> u16 {
    9222
}

fn default_window_width() -> u32 {
    800
}

fn default_window_height() -> u32 {
    600
}

/// Flow timeouts, in whole seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// How long to wait for a verification tab to appear.
    #[serde(default = "default_verification_tab_secs")]
    pub verification_tab_secs: u64,
    /// Generic wait for a required element.
    #[serde(default = "default_element_secs")]
    pub element_secs: u64,
    /// Wait for slow form surfaces to render.
    #[serde(default = "default_form_secs")]
    pub form_secs: u64,
    /// Window in which the capacity indicator may appear.
    #[serde(default = "default_blocked_check_secs")]
    pub blocked_check_secs: u64,
    /// Settle delay after a state-changing submit.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    /// Short settle delay after opening or dismissing a dialog.
    #[serde(default = "default_dialog_settle_secs")]
    pub dialog_settle_secs: u64,
    /// Settle delay after navigating between console surfaces.
    #[serde(default = "default_nav_settle_secs")]
    pub nav_settle_secs: u64,
    /// Grace period after interactive sign-in for manual challenges.
    #[serde(default = "default_post_login_settle_secs")]
    pub post_login_settle_secs: u64,
}

impl TimeoutsConfig {
    pub fn verification_tab(&self) -> Duration {
        Duration::from_secs(self.verification_tab_secs)
    }

    pub fn element(&self) -> Duration {
        Duration::from_secs(self.element_secs)
    }

    pub fn form(&self) -> Duration {
        Duration::from_secs(self.form_secs)
    }

    pub fn blocked_check(&self) -> Duration {
        Duration::from_secs(self.blocked_check_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn dialog_settle(&self) -> Duration {
        Duration::from_secs(self.dialog_settle_secs)
    }

    pub fn nav_settle(&self) -> Duration {
        Duration::from_secs(self.nav_settle_secs)
    }

    pub fn post_login_settle(&self) -> Duration {
        Duration::from_secs(self.post_login_settle_secs)
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            verification_tab_secs: default_verification_tab_secs(),
            element_secs: default_element_secs(),
            form_secs: default_form_secs(),
            blocked_check_secs: default_blocked_check_secs(),
            settle_secs: default_settle_secs(),
            dialog_settle_secs: default_dialog_settle_secs(),
            nav_settle_secs: default_nav_settle_secs(),
            post_login_settle_secs: default_post_login_settle_secs(),
        }
    }
}

fn default_verification_tab_secs() -> u64 {
    5
}

fn default_element_secs() -> u64 {
    10
}

fn default_form_secs() -> u64 {
    20
}

fn default_blocked_check_secs() -> u64 {
    5
}

fn default_settle_secs() -> u64 {
    5
}

fn default_dialog_settle_secs() -> u64 {
    2
}

fn default_nav_settle_secs() -> u64 {
    5
}

fn default_post_login_settle_secs() -> u64 {
    8
}

/// Optional downstream signup step run after a successful provisioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Signup page of the downstream service.
    #[serde(default)]
    pub signup_url: String,
    /// Control that opens the provider sign-in.
    #[serde(default = "default_chain_entry")]
    pub entry_control: String,
    /// Control that switches to account creation.
    #[serde(default = "default_chain_create")]
    pub create_control: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            signup_url: String::new(),
            entry_control: default_chain_entry(),
            create_control: default_chain_create(),
        }
    }
}

fn default_chain_entry() -> String {
    "//*[(self::a or self::button) and contains(., 'Sign in with GitHub')]".to_string()
}

fn default_chain_create() -> String {
    "//*[(self::a or self::button) and contains(., 'Create an account')]".to_string()
}
