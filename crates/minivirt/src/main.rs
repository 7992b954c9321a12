//! Command-line entry point for minivirt.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use color_eyre::{Report, Result};

use minivirt::cli::{self, CliContext};
use minivirt::config::Config;

/// Provision and control virtual machines on a libvirt endpoint.
#[derive(Debug, Parser)]
#[command(name = "minivirt", version, about)]
struct Cli {
    /// Hypervisor connection URI (overrides the config file)
    #[clap(long, short = 'c', global = true)]
    connect: Option<String>,

    /// Path to the configuration file
    #[clap(long, global = true)]
    config: Option<Utf8PathBuf>,

    /// Base directory for the default storage pools
    #[clap(long, global = true)]
    pool_dir: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available minivirt commands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// List defined and running domains
    List(cli::list::ListOpts),

    /// Define and start a new domain
    Create(cli::create::CreateOpts),

    /// Start a defined domain
    Start(cli::start::StartOpts),

    /// Shut down (or forcibly stop) a running domain
    Stop(cli::stop::StopOpts),

    /// Remove a shut-off domain definition
    Rm(cli::rm::RmOpts),

    /// Report a domain's VNC display port
    Vnc(cli::vnc::VncOpts),

    /// List storage pools
    Pools(cli::pools::PoolsOpts),

    /// Create the default storage pools (safe to repeat)
    InitPools(cli::pools::InitPoolsOpts),

    /// List volumes in a storage pool
    Volumes(cli::volumes::VolumesOpts),

    /// Delete a volume from a storage pool
    RmVolume(cli::volumes::RmVolumeOpts),

    /// Upload a local ISO image into the ISO pool
    UploadIso(cli::upload_iso::UploadIsoOpts),
}

/// Install and configure the tracing/logging system.
///
/// Logs go to stderr and are filtered by the RUST_LOG environment
/// variable, defaulting to 'info'.
fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

fn main() -> Result<(), Report> {
    install_tracing();
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let ctx = CliContext {
        uri: config.connect_uri(cli.connect.as_deref()),
        pool_dir: config.pool_dir(cli.pool_dir.as_deref()),
    };

    match cli.command {
        Commands::List(opts) => cli::list::run(&ctx, opts)?,
        Commands::Create(opts) => cli::create::run(&ctx, opts)?,
        Commands::Start(opts) => cli::start::run(&ctx, opts)?,
        Commands::Stop(opts) => cli::stop::run(&ctx, opts)?,
        Commands::Rm(opts) => cli::rm::run(&ctx, opts)?,
        Commands::Vnc(opts) => cli::vnc::run(&ctx, opts)?,
        Commands::Pools(opts) => cli::pools::run(&ctx, opts)?,
        Commands::InitPools(opts) => cli::pools::run_init(&ctx, opts)?,
        Commands::Volumes(opts) => cli::volumes::run(&ctx, opts)?,
        Commands::RmVolume(opts) => cli::volumes::run_rm(&ctx, opts)?,
        Commands::UploadIso(opts) => cli::upload_iso::run(&ctx, opts)?,
    }
    tracing::debug!("exiting");
    Ok(())
}
