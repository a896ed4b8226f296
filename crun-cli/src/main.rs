//! CLI for the crun container runtime.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod config;
mod log;

use anyhow::{Context as _, Result};
use clap::{CommandFactory as _, Parser, Subcommand};
use clap_complete::Shell;
use crun_oci::log::StatusSink as _;

use config::{Config, LogFormat, LogLevel};
use log::{ConsoleStatus, TracingEventLog};

#[derive(Parser)]
#[command(name = "crun", version, about = "A minimal Linux container runtime and image client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the on-disk store and write the default config file.
    Init {
        /// Minimum level the structured logger emits.
        #[arg(long, value_enum, default_value = "info")]
        log_level: LogLevel,
        /// Structured log encoding.
        #[arg(long, value_enum, default_value = "text")]
        log_format: LogFormat,
    },
    /// Pull an image from a Docker-compatible registry.
    Pull {
        /// Image reference, e.g. `nginx:1-alpine-perl`.
        image: String,
    },
    /// Launch an image's entrypoint as a detached container.
    Run {
        /// Share the host network stack instead of a new network namespace.
        #[arg(long)]
        network_host: bool,
        /// Image reference, e.g. `nginx:1-alpine-perl`.
        image: String,
    },
    /// Stop a running container.
    Stop {
        /// The container id, as printed by `run` or `ps`.
        id: String,
    },
    /// Remove a locally stored image.
    Rmi {
        /// Image reference, e.g. `nginx:1-alpine-perl`.
        image: String,
    },
    /// List locally stored images.
    Images,
    /// List containers and their status.
    Ps,
    /// Generate a shell completion script.
    Completion {
        /// Target shell.
        shell: Shell,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    let status = ConsoleStatus;
    if let Err(e) = dispatch(cli.command, &status).await {
        status.error(&format!("{e:#}"), &[]);
        std::process::exit(1);
    }
}

/// Loads the config file, initializing tracing from it, then routes to the
/// command implementation.
async fn dispatch(command: Command, status: &ConsoleStatus) -> Result<()> {
    let cfg_path = Config::default_for_home().config_file_path;
    let cfg = Config::load(&cfg_path)?;

    match command {
        Command::Init { log_level, log_format } => return init(cfg_path, log_level, log_format),
        Command::Completion { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "crun", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    // Every other command requires a prior `init`; load whatever tracing
    // preferences it recorded, falling back to defaults if unconfigured.
    let _ = log::init_tracing(&cfg.app_log_dir, cfg.log_level, cfg.log_format);
    let store = crun_oci::Store::new(&cfg.root_dir);

    let event = TracingEventLog;
    match command {
        Command::Init { .. } | Command::Completion { .. } => unreachable!("handled above"),
        Command::Pull { image } => pull(&store, &image, status, &event).await,
        Command::Run { network_host, image } => run(&store, &image, network_host),
        Command::Stop { id } => stop(&store, &id, status),
        Command::Rmi { image } => rmi(&store, &image),
        Command::Images => images(&store),
        Command::Ps => ps(&store),
    }
}

/// `init`: writes the default config file and creates the store's
/// top-level directories. Fails with `AlreadyExists` if the config file is
/// already present.
fn init(cfg_path: std::path::PathBuf, log_level: LogLevel, log_format: LogFormat) -> Result<()> {
    if cfg_path.is_file() {
        return Err(
            crun_oci::Error::AlreadyExists(format!("{} exists", cfg_path.display())).into(),
        );
    }

    let mut cfg = Config::default_for_home();
    cfg.config_file_path = cfg_path;
    cfg.log_level = log_level;
    cfg.log_format = log_format;
    cfg.write().context("writing config file")?;

    crun_oci::Store::new(&cfg.root_dir)
        .init()
        .context("creating store directories")?;
    std::fs::create_dir_all(&cfg.app_log_dir).context("creating log directory")?;

    println!("initialized crun at {}", cfg.root_dir.display());
    Ok(())
}

async fn pull(store: &crun_oci::Store, image: &str, status: &ConsoleStatus, event: &TracingEventLog) -> Result<()> {
    let reference = crun_oci::Reference::parse(image)?;
    crun_oci::pull(store, &reference, status, event).await?;
    Ok(())
}

fn run(store: &crun_oci::Store, image: &str, network_host: bool) -> Result<()> {
    let reference = crun_oci::Reference::parse(image)?;
    let options = crun::RunOptions { host_network: network_host };
    let result = crun::run(store, image, &reference, options)?;
    println!("{}", result.id);
    Ok(())
}

fn stop(store: &crun_oci::Store, id: &str, status: &ConsoleStatus) -> Result<()> {
    crun::stop(store, id, status)?;
    Ok(())
}

fn rmi(store: &crun_oci::Store, image: &str) -> Result<()> {
    let reference = crun_oci::Reference::parse(image)?;
    store.remove_image(&reference)?;
    println!("removed {image}");
    Ok(())
}

fn images(store: &crun_oci::Store) -> Result<()> {
    let list = store.list_images()?;
    if list.is_empty() {
        println!("(no images)");
        return Ok(());
    }
    for reference in list {
        println!("{reference}");
    }
    Ok(())
}

fn ps(store: &crun_oci::Store) -> Result<()> {
    let rows = crun::ps(store)?;
    println!("{:<14}{:<30}{:<10}{:<10}", "CONTAINER_ID", "IMAGE", "PID", "STATUS");
    for row in rows {
        println!(
            "{:<14}{:<30}{:<10}{:<10}",
            row.id, row.image, row.pid, row.status
        );
    }
    Ok(())
}
