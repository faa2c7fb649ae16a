mod alert;
mod config;
mod heartbeat;
mod process;
mod signals;
mod status;
mod supervisor;
mod windows;

use clap::Parser;
use config::WatchdogConfig;
use heartbeat::FileHeartbeat;
use signals::ShutdownHandle;
use status::StatusFile;
use std::path::PathBuf;
use supervisor::{Options, Supervisor};
use windows::CommandProbe;

/// Kiosk dashboard watchdog: supervises the browser automation process and
/// restarts the whole stack when it exits, freezes (stale heartbeat), or
/// loses one of the expected dashboard windows.
#[derive(Parser, Debug)]
#[command(name = "kiosk-watchdog", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "watchdog.toml")]
    config: PathBuf,

    /// Heartbeat staleness timeout in seconds (overrides config)
    #[arg(long)]
    timeout: Option<u64>,

    /// Poll interval in seconds (overrides config)
    #[arg(long)]
    interval: Option<u64>,

    /// Startup grace period in seconds (overrides config)
    #[arg(long)]
    grace: Option<u64>,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (per-poll health checks)
    #[arg(short, long)]
    verbose: bool,

    /// Write one heartbeat assertion and exit (for scripted collaborators)
    #[arg(long)]
    beat: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut cfg = match WatchdogConfig::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // CLI overrides win over the config file.
    if let Some(timeout) = cli.timeout {
        cfg.heartbeat.timeout_secs = timeout;
    }
    if let Some(interval) = cli.interval {
        cfg.timing.poll_interval_secs = interval;
    }
    if let Some(grace) = cli.grace {
        cfg.timing.startup_grace_secs = grace;
    }

    if cli.beat {
        // Producer mode: lets a shell-scripted automation process assert
        // liveness without linking against this crate.
        let hb = FileHeartbeat::new(cfg.heartbeat.path.clone());
        if let Err(e) = hb.report() {
            eprintln!("failed to write heartbeat {}: {e}", hb.path().display());
            std::process::exit(1);
        }
        return;
    }

    if cli.dry_run {
        println!("kiosk-watchdog v{}", env!("CARGO_PKG_VERSION"));
        println!("Config file:      {}", cli.config.display());
        println!("Child command:    {:?}", cfg.child_command());
        println!("Heartbeat path:   {}", cfg.heartbeat.path.display());
        println!("Heartbeat timeout: {}s", cfg.heartbeat.timeout_secs);
        println!("Poll interval:    {}s", cfg.timing.poll_interval_secs);
        println!("Startup grace:    {}s", cfg.timing.startup_grace_secs);
        println!("Cooldown:         {}s", cfg.timing.cooldown_secs);
        println!("KPI fragments:    {:?}", cfg.windows.kpi_fragments);
        println!("POD fragments:    {:?}", cfg.windows.pod_fragments);
        println!("Stray sweep:      {:?}", cfg.sweep.process_name);
        println!("Dry run mode — config validated, not running.");
        return;
    }

    // Operators read watchdog.log after the fact; stderr covers live runs.
    let file_appender = tracing_appender::rolling::daily(&cfg.log.dir, "watchdog.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    tracing::info!(config = %cli.config.display(), "kiosk-watchdog starting");

    let shutdown = match ShutdownHandle::install() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "failed to install signal handlers");
            std::process::exit(1);
        }
    };

    let opts = Options::from_config(&cfg);
    let health = Box::new(FileHeartbeat::new(cfg.heartbeat.path.clone()));
    let probe = Box::new(CommandProbe::new(cfg.windows.list_command.clone()));
    let status_file = Some(StatusFile::new(cfg.status.file.clone()));

    let mut sup = Supervisor::new(opts, health, probe, status_file, shutdown);
    sup.run().await;

    tracing::info!(restarts = sup.restarts(), "kiosk-watchdog exiting");
}
