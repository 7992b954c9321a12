//! CLI front-ends for the library operations.
//!
//! Each subcommand is an opts struct plus a `run` function colocated in its
//! own module, mirroring the operation contracts consumed by callers of the
//! library.

use camino::Utf8PathBuf;
use clap::ValueEnum;
use color_eyre::Result;

use crate::connection::Connection;

pub mod create;
pub mod list;
pub mod pools;
pub mod rm;
pub mod start;
pub mod stop;
pub mod upload_iso;
pub mod vnc;
pub mod volumes;

/// Output format for listing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table.
    Table,
    /// Machine-readable JSON.
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Resolved global options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct CliContext {
    /// Hypervisor connection URI.
    pub uri: String,
    /// Base directory for the default storage pools.
    pub pool_dir: Utf8PathBuf,
}

impl CliContext {
    /// Open a connection to the configured endpoint.
    pub fn connect(&self) -> Result<Connection> {
        Ok(Connection::open(&self.uri)?)
    }
}
