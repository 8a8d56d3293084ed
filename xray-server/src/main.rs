// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  X-Ray: live request inspector
//
//  Receiver:  tokio accept loop on a dedicated thread
//  Store:     single-threaded poll tick + console on the main thread
//  Queue:     crossbeam channel of raw payload text between the two
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

mod console;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio::sync::oneshot;
use tracing::{error, info};
use xray_core::config::XrayConfig;
use xray_core::XrayError;
use xray_monitor::{MonitorApp, Receiver};

#[derive(Parser, Debug)]
#[command(name = "xray", version, about = "X-Ray: live request inspector")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the receiver and the monitor console
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Address to listen on (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Enable logging to stderr
    #[arg(long)]
    log: bool,

    /// Log level, used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Path to configuration file
    #[arg(short, long, default_value = "xray.yaml")]
    config: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

fn main() -> anyhow::Result<()> {
    let Command::Run(args) = Cli::parse().command;

    // ── Tracing ──
    if args.log {
        init_tracing(&args.log_level, args.log_format);
    }

    // ── Config ──
    let config = load_config(&args)?;
    let monitor = config.monitor;

    // ── Queue ──
    let (queue_tx, queue_rx) = xray_monitor::queue(monitor.queue_capacity);

    // ── Receiver on a dedicated tokio thread ──
    let (fault_tx, fault_rx) = oneshot::channel::<XrayError>();
    let receiver_config = monitor.clone();
    std::thread::Builder::new()
        .name("xray-receiver".to_string())
        .spawn(move || {
            let result = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| XrayError::ReceiverFault(format!("runtime: {e}")))
                .and_then(|rt| {
                    rt.block_on(async {
                        Receiver::bind(&receiver_config).await?.run(queue_tx).await
                    })
                });
            if let Err(e) = result {
                error!(kind = e.kind(), error = %e, "Receiver stopped");
                let _ = fault_tx.send(e);
            }
        })?;

    info!(
        addr = %monitor.bind_addr(),
        refresh_ms = monitor.refresh_interval_ms,
        "X-Ray is ready"
    );

    // ── Poll loop + console on this thread ──
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let app = MonitorApp::new(queue_rx);
    rt.block_on(console::run(app, monitor.refresh_interval(), fault_rx))?;

    info!("X-Ray stopped");
    Ok(())
}

/// YAML file (when present) plus `XRAY_` env overrides, then flags.
fn load_config(args: &RunArgs) -> anyhow::Result<XrayConfig> {
    if args.config.exists() {
        info!(path = %args.config.display(), "Loading config file");
    } else {
        info!(path = %args.config.display(), "No config file found, using defaults");
    }
    let mut config = XrayConfig::load(&args.config)?;
    if let Some(host) = &args.host {
        config.monitor.host = host.clone();
    }
    if let Some(port) = args.port {
        config.monitor.port = port;
    }
    Ok(config)
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
