use clap::Parser;
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod adapters;
mod config;
mod drain;
mod error;
mod policy;
mod rotation;
mod startup;
mod state;
#[cfg(test)]
mod testutil;

use adapters::{FatProvisioner, ModprobeGadget, SystemMount};
use config::Config;
use drain::DrainPipeline;
use error::{Result, RotatorError};
use rotation::RotationController;
use startup::StartupSequencer;
use state::{ImageIndex, ImageStore, Journal};

/// Exit code for a bad configuration file or flag
const EXIT_CONFIG: u8 = 2;

/// Rotates two dash-camera images over a USB mass-storage gadget, archiving
/// each one while the other records.
#[derive(Parser, Debug)]
#[command(about, version)]
struct Args {
    /// JSON configuration file (default: ~/.config/dashcam-rotator/config.json, if present).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the backing images cam0 and cam1.
    #[arg(long)]
    image_dir: Option<PathBuf>,

    /// Directory drained footage is moved into.
    #[arg(long)]
    backup_dir: Option<PathBuf>,

    /// Local mount point used while draining.
    #[arg(long)]
    mount_point: Option<PathBuf>,

    /// Directory inside each image the camera records into.
    #[arg(long)]
    capture_dir: Option<String>,

    /// Target time each image stays live, in seconds.
    #[arg(long)]
    record_window_secs: Option<u64>,

    /// Size of newly created backing images, in MiB.
    #[arg(long)]
    image_size_mib: Option<u64>,

    /// Expose images to the host read-only.
    #[arg(long)]
    read_only: bool,

    /// Drain journal database path.
    #[arg(long, conflicts_with = "no_journal")]
    journal: Option<PathBuf>,

    /// Do not record drains in the journal.
    #[arg(long)]
    no_journal: bool,

    /// Leave footage from a previous run on the images instead of draining it at startup.
    #[arg(long)]
    no_startup_drain: bool,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_filter: String,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,

    /// Print the last N drains from the journal and exit.
    #[arg(long, value_name = "N")]
    history: Option<usize>,
}

/// Load the config file, then apply command-line overrides
fn load_config(args: &Args) -> Result<Config> {
    let path = args
        .config
        .clone()
        .or_else(|| Config::default_path().filter(|p| p.exists()));
    let mut config = match path {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            Config::load(&path)?
        }
        None => Config::default(),
    };

    if let Some(dir) = &args.image_dir {
        config.image_dir = dir.clone();
    }
    if let Some(dir) = &args.backup_dir {
        config.backup_dir = dir.clone();
    }
    if let Some(dir) = &args.mount_point {
        config.mount_point = dir.clone();
    }
    if let Some(name) = &args.capture_dir {
        config.capture_dir = name.clone();
    }
    if let Some(secs) = args.record_window_secs {
        config.record_window_secs = secs;
    }
    if let Some(mib) = args.image_size_mib {
        config.image_size_mib = mib;
    }
    if args.read_only {
        config.gadget.read_only = true;
    }
    if let Some(path) = &args.journal {
        config.journal_enabled = true;
        config.journal_path = Some(path.clone());
    }
    if args.no_journal {
        config.journal_enabled = false;
    }
    if args.no_startup_drain {
        config.drain_leftovers_on_startup = false;
    }

    config.validate()?;
    Ok(config)
}

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolve once `listener` reports a signal. A listener that fails never
/// resolves, so a broken handler cannot pass for a shutdown request.
async fn signalled(listener: impl Future<Output = std::io::Result<()>>) {
    if let Err(err) = listener.await {
        warn!(error = %err, "signal listener failed");
        std::future::pending::<()>().await;
    }
}

/// Resolve on SIGINT or SIGTERM
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            let sigterm = async move {
                terminate
                    .recv()
                    .await
                    .ok_or_else(|| std::io::Error::other("SIGTERM stream closed"))
            };
            tokio::select! {
                _ = signalled(tokio::signal::ctrl_c()) => {}
                _ = signalled(sigterm) => {}
            }
        }
        Err(err) => {
            warn!(error = %err, "SIGTERM handler unavailable, listening for SIGINT only");
            signalled(tokio::signal::ctrl_c()).await;
        }
    }
}

/// Open the journal if configured. A journal that cannot be opened only
/// costs the history, so the rotation goes ahead without it.
fn open_journal(config: &Config) -> Option<Journal> {
    let path = config.resolved_journal_path()?;
    match Journal::open(&path) {
        Ok(journal) => {
            if let Some(path) = journal.path() {
                info!(path = %path.display(), "📁 drain journal ready");
            }
            Some(journal)
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "drain journal unavailable");
            None
        }
    }
}

/// Print recent drains and the lifetime totals
fn print_history(config: &Config, limit: usize) -> Result<()> {
    let path = config
        .resolved_journal_path()
        .ok_or_else(|| RotatorError::Config("the drain journal is disabled".into()))?;
    let journal = Journal::open(&path)?;

    for entry in journal.recent(limit)? {
        let drain = &entry.result;
        println!(
            "{:>6}  {}  cam{}  {:>5} pending  {:>5} moved  {:>3} errors  {:>8} ms  {}",
            entry.id,
            drain.started_at.format("%Y-%m-%d %H:%M:%S"),
            drain.index,
            drain.files_pending,
            drain.files_moved,
            drain.move_errors,
            drain.elapsed.as_millis(),
            drain.verdict.as_str(),
        );
    }
    println!(
        "{} drains, {} short copies",
        journal.drain_count()?,
        journal.short_copy_count()?
    );
    Ok(())
}

/// The production adapters and state the rotation runs on
struct Rig {
    store: ImageStore,
    gadget: ModprobeGadget,
    pipeline: DrainPipeline<SystemMount>,
    journal: Option<Journal>,
}

/// Startup checks, then the leftover drain. Blocks on external tools.
fn prepare(config: &Config, rig: &mut Rig) -> Result<()> {
    let mut provisioner = FatProvisioner::new(config.tools.mkfs.clone(), config.image_size_bytes());
    let report = StartupSequencer::new(
        config,
        &rig.store,
        &mut rig.gadget,
        rig.pipeline.mount_mut(),
        &mut provisioner,
    )
    .initialize()?;

    if !report.leftovers.is_empty() {
        if config.drain_leftovers_on_startup {
            startup::drain_leftovers(&report, &rig.store, &mut rig.pipeline, rig.journal.as_ref())?;
        } else {
            warn!(images = ?report.leftovers, "leaving footage from a previous run in place");
        }
    }
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    // Install the handler first so a signal during startup is not fatal
    let (trigger, shutdown) = rotation::shutdown::channel();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown requested, stopping at the next loop boundary");
        trigger.request();
    });

    let record_window = config.record_window();
    let rig = Rig {
        store: ImageStore::new(&config.image_dir),
        gadget: ModprobeGadget::new(config.tools.modprobe.clone(), config.gadget.clone()),
        pipeline: DrainPipeline::new(SystemMount::new(&config.mount_point, config.tools.clone()), &config),
        journal: open_journal(&config),
    };

    // Provisioning and the leftover drain can take minutes
    let rig = tokio::task::spawn_blocking(move || {
        let mut rig = rig;
        prepare(&config, &mut rig).map(|()| rig)
    })
    .await??;

    let mut controller = RotationController::new(
        rig.gadget,
        rig.pipeline,
        rig.store,
        record_window,
        shutdown,
    );
    if let Some(journal) = rig.journal {
        controller = controller.with_journal(journal);
    }

    controller.run(ImageIndex::Zero).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_filter);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if args.print_config {
        return match config.to_json() {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                error!("{err}");
                ExitCode::FAILURE
            }
        };
    }

    if let Some(limit) = args.history {
        return match print_history(&config, limit) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!("{err}");
                ExitCode::FAILURE
            }
        };
    }

    match run(config).await {
        Ok(()) => {
            info!("clean shutdown");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("❌ fatal: {err}");
            ExitCode::FAILURE
        }
    }
}
