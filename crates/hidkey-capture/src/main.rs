//! hidkey-capture entry point.
//!
//! Headless capture shell: checks the host for HID access, attaches a
//! keyboard, and accumulates typed text until Ctrl-C.
//!
//! ```text
//! main()
//!  └─ load config, init tracing
//!  └─ detect_host()             -- None => capture disabled
//!  └─ SessionManager
//!       ├─ TextAccumulator      (consumers.text)
//!       └─ SubmitNotifier       (consumers.alert_on_submit)
//!  └─ attach_first_granted() / request_and_attach()
//!  └─ wait for Ctrl-C, detach
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hidkey_capture::application::consumers::{SubmitNotifier, TextAccumulator};
use hidkey_capture::application::manage_session::SessionManager;
use hidkey_capture::infrastructure::hid_host::{detect_host, NO_BACKEND_HINT};
use hidkey_capture::infrastructure::storage::config::{self, AppConfig};

/// Command-line arguments.  Each has an environment-variable fallback.
#[derive(Debug, Parser)]
#[command(
    name = "hidkey-capture",
    about = "Capture keystrokes from a HID keyboard (native capture needs a build with `--features hidapi`)",
    version
)]
struct Cli {
    /// Path to the TOML config file.  Defaults to the platform config directory.
    #[arg(long, env = "HIDKEY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level override (`error`, `warn`, `info`, `debug`, `trace`).
    #[arg(long, env = "HIDKEY_LOG")]
    log_level: Option<String>,

    /// Also read key names from stdin, one per line, into the text buffer.
    #[arg(long, env = "HIDKEY_STDIN_KEYS")]
    stdin_keys: bool,
}

fn load(cli: &Cli) -> anyhow::Result<AppConfig> {
    let cfg = match &cli.config {
        Some(path) => config::load_config_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => config::load_config().context("loading config")?,
    };
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load(&cli)?;

    // `RUST_LOG` wins over the CLI, which wins over the config file.
    let level = cli.log_level.clone().unwrap_or_else(|| cfg.capture.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level)))
        .init();

    info!("hidkey-capture starting");

    let manager = Arc::new(SessionManager::with_access(detect_host(&cfg.allowed_pairs())));
    if !manager.is_supported() {
        if cfg!(feature = "hidapi") {
            warn!("HID access is not supported on this host; capture disabled");
        } else {
            warn!("{NO_BACKEND_HINT}; capture disabled");
        }
        return Ok(());
    }

    // ── Consumers ─────────────────────────────────────────────────────────────
    let text = TextAccumulator::new();
    if cfg.consumers.text {
        manager.dispatcher().register(Box::new(text.clone()));
    }
    if cfg.consumers.alert_on_submit {
        manager
            .dispatcher()
            .register(Box::new(SubmitNotifier::new(|line| info!(%line, "line submitted"))));
    }

    if cli.stdin_keys {
        let fallback = text.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(key)) = lines.next_line().await {
                fallback.push_key(&key);
            }
        });
    }

    // ── Startup attach ────────────────────────────────────────────────────────
    let mut attached = false;
    if cfg.capture.auto_attach {
        match manager.attach_first_granted().await {
            Ok(session) => attached = session.is_some(),
            Err(e) => error!("auto-attach failed: {e}"),
        }
    }
    if !attached && cfg.capture.request_on_start {
        match manager.request_and_attach(&cfg.capture.filters).await {
            Ok(Some(session)) => info!(device = %session.device, "capturing"),
            Ok(None) => info!("no device selected; capture idle"),
            Err(e) => error!("attach failed: {e}"),
        }
    }

    info!("hidkey-capture ready.  Press Ctrl-C to exit.");
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("shutdown signal received");

    if let Err(e) = manager.detach().await {
        warn!("detach on shutdown: {e}");
    }
    if cfg.consumers.text {
        info!(text = %text.text(), "captured text");
    }

    info!("hidkey-capture stopped");
    Ok(())
}
