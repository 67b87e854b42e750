//! Keyhook service entry point.
//!
//! Loads the configuration, wires the capture loop to the binding
//! dispatcher, and runs until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! keyhook [OPTIONS]
//!
//! Options:
//!   --config <PATH>       Configuration file [env: KEYHOOK_CONFIG]
//!   --log-level <LEVEL>   Overrides settings.log_level when RUST_LOG is unset
//!   --list-keys           Print the scan-code and key-symbol tables and exit
//! ```
//!
//! # Architecture
//!
//! ```text
//! main()
//!  ├─ load_config()                 -- TOML, defaults when absent
//!  ├─ ActionRegistry::with_builtin_actions()
//!  ├─ DeviceRegistry::with_devices()
//!  └─ InterceptionService::start()
//!       └─ keyhook-capture thread  -- wait / receive / notify / forward
//!            └─ BindingDispatcher  -- hands actions to the Tokio runtime
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter};

use keyhook_core::keymap::{all_key_names, virtual_keys::symbol_names};
use keyhook_service::application::action_registry::{ActionContext, ActionExecutor, ActionRegistry};
use keyhook_service::application::device_registry::DeviceRegistry;
use keyhook_service::application::dispatch_bindings::{validate_bindings, BindingDispatcher};
use keyhook_service::application::interception_loop::{CaptureSettings, InterceptionService};
use keyhook_service::infrastructure::driver::platform_driver;
use keyhook_service::infrastructure::storage::config::{load_config, AppConfig};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "keyhook",
    about = "Per-keyboard key interception and action dispatch",
    version
)]
struct Cli {
    /// Configuration file; defaults to config.toml in the platform config dir.
    #[arg(long, env = "KEYHOOK_CONFIG")]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset (overrides the config file).
    #[arg(long)]
    log_level: Option<String>,

    /// Print the known key names and exit.
    #[arg(long)]
    list_keys: bool,
}

fn print_key_tables() {
    println!("Scan codes:");
    for (code, extended, name) in all_key_names() {
        let prefix = if extended { "E0 " } else { "   " };
        println!("  {prefix}0x{code:02X}  {name}");
    }
    println!();
    println!("Key sequence symbols:");
    let mut symbols: Vec<&str> = symbol_names().collect();
    symbols.sort_unstable_by_key(|s| s.to_ascii_lowercase());
    for chunk in symbols.chunks(8) {
        println!("  {}", chunk.join(", "));
    }
}

/// Filter in force before the config is read: `RUST_LOG`, then
/// `--log-level`, then `info`.
fn startup_filter(cli: &Cli) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_deref().unwrap_or("info")))
}

/// The config file's level, when neither `RUST_LOG` nor `--log-level` set one.
fn config_log_level<'a>(cli: &Cli, rust_log_set: bool, config: &'a AppConfig) -> Option<&'a str> {
    if rust_log_set || cli.log_level.is_some() {
        None
    } else {
        Some(config.settings.log_level.as_str())
    }
}

fn capture_settings(config: &AppConfig) -> CaptureSettings {
    CaptureSettings {
        wait_timeout: Duration::from_millis(config.settings.wait_timeout_ms.max(1)),
        stop_join_timeout: Duration::from_millis(config.settings.stop_join_timeout_ms),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.list_keys {
        print_key_tables();
        return Ok(());
    }

    // Logging starts before the config is read so loading can report.
    let (filter, filter_handle) = reload::Layer::new(startup_filter(&cli));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();

    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;

    let rust_log_set = std::env::var_os(EnvFilter::DEFAULT_ENV).is_some();
    if let Some(level) = config_log_level(&cli, rust_log_set, &config) {
        if let Err(e) = filter_handle.reload(EnvFilter::new(level)) {
            warn!("could not apply configured log level {level:?}: {e}");
        }
    }

    info!(
        devices = config.devices.len(),
        intercepted = config.intercepted_hardware_ids().len(),
        bindings = config.bindings.len(),
        "Keyhook starting"
    );

    // ── Actions ───────────────────────────────────────────────────────────────
    let ctx = ActionContext::platform(
        Duration::from_secs(config.settings.http_timeout_secs),
        config.settings.max_detached_playbacks,
    )
    .context("failed to initialise action services")?;
    let registry = Arc::new(ActionRegistry::with_builtin_actions(ctx));

    for issue in validate_bindings(&config.bindings, &registry) {
        warn!("{issue}");
    }

    let dispatcher = Arc::new(BindingDispatcher::new(
        config.bindings.clone(),
        Arc::clone(&registry),
        ActionExecutor::new(tokio::runtime::Handle::current()),
    ));

    // ── Capture ───────────────────────────────────────────────────────────────
    let devices = Arc::new(DeviceRegistry::with_devices(&config.devices));
    let mut service = InterceptionService::new(platform_driver(), devices, capture_settings(&config));

    service.on_device_discovered(|device| {
        info!(
            device = %device,
            hardware_id = device.hardware_id().unwrap_or("<none>"),
            intercepted = device.is_intercepted(),
            "keyboard connected"
        );
    });
    {
        let dispatcher = Arc::clone(&dispatcher);
        service.on_key_event(move |event| dispatcher.handle(event));
    }

    // `start` already logs the cause.
    service.start().context("interception could not start")?;

    info!("Keyhook ready.  Press Ctrl-C to exit.");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!("failed to listen for Ctrl-C: {e}"),
    }

    // `stop` joins the capture thread; keep it off the async workers.
    tokio::task::block_in_place(|| service.stop());

    info!("Keyhook stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
