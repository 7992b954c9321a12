//! `volumes` and `rm-volume` commands - volume listing and deletion.

use camino::Utf8PathBuf;
use clap::Parser;
use color_eyre::Result;
use comfy_table::{presets::UTF8_FULL, Table};

use super::{CliContext, OutputFormat};
use crate::pool;

/// Options for listing volumes in a pool.
#[derive(Debug, Parser)]
pub struct VolumesOpts {
    /// Pool to list
    #[clap(long, default_value = pool::IMAGES_POOL)]
    pub pool: String,

    /// Output format
    #[clap(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

/// Execute the volumes command.
pub fn run(ctx: &CliContext, opts: VolumesOpts) -> Result<()> {
    let conn = ctx.connect()?;
    let volumes = pool::list_volumes(&conn, &opts.pool)?;

    match opts.format {
        OutputFormat::Table => {
            if volumes.is_empty() {
                println!("No volumes in pool '{}'", opts.pool);
                return Ok(());
            }
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["NAME", "CAPACITY (BYTES)", "PATH"]);
            for v in &volumes {
                table.add_row(vec![
                    v.name.clone(),
                    v.capacity.to_string(),
                    v.path.to_string(),
                ]);
            }
            println!("{}", table);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&volumes)?);
        }
    }
    Ok(())
}

/// Options for deleting a volume.
#[derive(Debug, Parser)]
pub struct RmVolumeOpts {
    /// Filesystem path of the volume to delete
    pub path: Utf8PathBuf,

    /// Pool the volume belongs to
    #[clap(long, default_value = pool::IMAGES_POOL)]
    pub pool: String,
}

/// Execute the rm-volume command.
pub fn run_rm(ctx: &CliContext, opts: RmVolumeOpts) -> Result<()> {
    let conn = ctx.connect()?;
    pool::delete_volume(&conn, &opts.pool, &opts.path)?;
    println!("Deleted {}", opts.path);
    Ok(())
}
