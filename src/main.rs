//! provis - capacity-aware account provisioning over CDP.
//!
//! Entry point for the provis CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use provis_config::{Config, ConfigError, ConfigLoader};
use provis_driver::{Browser, BrowserManager, BrowserManagerConfig};
use provis_flow::{
    capture_session, Authenticator, ChainedStep, DownstreamSignup, VerificationHandler, Workflow,
};
use provis_session::{FileSessionStore, SessionStore};

/// provis CLI.
#[derive(Parser)]
#[command(name = "provis")]
#[command(about = "Capacity-aware account provisioning for web admin consoles")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "provis.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision one account (default)
    Run {
        /// Run the browser headless
        #[arg(long)]
        headless: bool,

        /// Attach to an already-running browser instead of launching one
        #[arg(long)]
        attach: bool,
    },

    /// Establish and persist a console session without provisioning
    Login {
        /// Run the browser headless
        #[arg(long)]
        headless: bool,
    },

    /// Capture the session from an already-running browser
    Capture,

    /// Saved session management
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Summarize the saved session
    Show,

    /// Delete the saved session
    Clear,
}

/// The .provis directory path.
fn provis_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".provis"))
        .unwrap_or_else(|| PathBuf::from(".provis"))
}

/// Initialize tracing with console and file output.
///
/// Log files are written to ~/.provis/debug/ with daily rotation.
fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = provis_dir().join("debug");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("provis")
        .filename_suffix("log")
        .max_log_files(30)
        .build(&log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer guard alive for the program duration.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        // Console layer (human-readable, with colors)
        .with(fmt::layer().with_target(true).with_ansi(true))
        // File layer (no colors)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if path.exists() {
        ConfigLoader::load(path)
    } else {
        warn!(path = %path.display(), "configuration file not found, using built-in defaults");
        Ok(Config::default())
    }
}

fn browser_manager(config: &Config, headless: bool) -> BrowserManager {
    BrowserManager::new(BrowserManagerConfig {
        debug_port: config.browser.debug_port,
        headless: config.browser.headless || headless,
        user_data_dir: config
            .browser
            .profile_dir
            .as_deref()
            .map(ConfigLoader::expand_path),
        chrome_path: config.browser.chrome_path.clone(),
        window_width: config.browser.window_width,
        window_height: config.browser.window_height,
    })
}

fn session_store(config: &Config) -> FileSessionStore {
    FileSessionStore::new(ConfigLoader::expand_path(&config.session.file))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing()?;

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        None => run_provisioning(config, false, false).await,
        Some(Commands::Run { headless, attach }) => {
            run_provisioning(config, headless, attach).await
        }
        Some(Commands::Login { headless }) => run_login(config, headless).await,
        Some(Commands::Capture) => run_capture(config).await,
        Some(Commands::Session { action }) => match action {
            SessionAction::Show => show_session(config).await,
            SessionAction::Clear => clear_session(config).await,
        },
    }
}

/// Run one full provisioning pass.
async fn run_provisioning(
    config: Config,
    headless: bool,
    attach: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(version = env!("CARGO_PKG_VERSION"), "starting provis");

    let manager = browser_manager(&config, headless);
    let browser = if attach {
        manager.attach().await?
    } else {
        manager.connect().await?
    };

    let store: Arc<dyn SessionStore> = Arc::new(session_store(&config));

    let mut workflow = Workflow::new(config.clone(), Arc::clone(&store));
    if config.chain.enabled {
        let chain: Arc<dyn ChainedStep> = Arc::new(DownstreamSignup::new(
            config.chain.clone(),
            config.timeouts.clone(),
        ));
        workflow = workflow.with_chain(chain);
    }

    let report = workflow.run(&browser).await?;

    println!("outcome: {}", report.outcome);
    if let Some(identity) = &report.identity {
        println!("{}", serde_json::to_string_pretty(identity)?);
    }
    if let Some(record) = &report.record {
        println!("record: {}", record.display());
    }
    if let Some(chain_error) = &report.chain_error {
        warn!(error = %chain_error, "chained step did not complete");
    }

    if !attach {
        manager.shutdown();
    }

    if !report.outcome.is_success() {
        error!(outcome = %report.outcome, "provisioning did not succeed");
        std::process::exit(1);
    }
    Ok(())
}

/// Establish a session and persist it, without provisioning anything.
async fn run_login(config: Config, headless: bool) -> Result<(), Box<dyn std::error::Error>> {
    let manager = browser_manager(&config, headless);
    let browser = manager.connect().await?;

    let store: Arc<dyn SessionStore> = Arc::new(session_store(&config));
    let verification = Arc::new(VerificationHandler::new(
        Arc::clone(&store),
        config.verification.clone(),
        config.verification_secret(),
        config.timeouts.clone(),
    ));
    let authenticator = Authenticator::new(
        Arc::clone(&store),
        verification,
        config.portal.clone(),
        config.signin.clone(),
        config.resolved_credentials(),
        config.timeouts.clone(),
    );

    let auth = authenticator.establish(&browser).await?;
    if auth.used_saved_session {
        println!("saved session is still valid");
    } else {
        println!("signed in; session saved");
    }

    manager.shutdown();
    Ok(())
}

/// Capture the session from an operator's running browser.
///
/// Useful after signing in by hand: attach, snapshot, and persist without
/// automating the sign-in form at all.
async fn run_capture(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let manager = browser_manager(&config, false);
    let browser = manager.attach().await?;

    browser.navigate(&config.portal.origin).await?;
    let state = capture_session(&browser).await?;
    if state.is_empty() {
        warn!("captured session is empty; sign in first");
    }

    let store = session_store(&config);
    store.save(&state).await?;
    println!(
        "captured {} cookies and {} localStorage entries to {}",
        state.cookies.len(),
        state.local_storage.len(),
        store.path().display()
    );
    Ok(())
}

async fn show_session(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = session_store(&config);
    match store.load().await {
        Some(state) => {
            println!("session file: {}", store.path().display());
            println!("cookies: {}", state.cookies.len());
            for cookie in &state.cookies {
                println!("  {} ({})", cookie.name, cookie.domain);
            }
            println!("localStorage entries: {}", state.local_storage.len());
        }
        None => println!("no saved session at {}", store.path().display()),
    }
    Ok(())
}

async fn clear_session(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = session_store(&config);
    store.clear().await?;
    println!("saved session cleared");
    Ok(())
}
