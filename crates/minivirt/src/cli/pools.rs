//! `pools` and `init-pools` commands - storage pool listing and default
//! pool creation.

use clap::Parser;
use color_eyre::Result;
use comfy_table::{presets::UTF8_FULL, Table};

use super::{CliContext, OutputFormat};
use crate::pool;

/// Options for listing storage pools.
#[derive(Debug, Parser)]
pub struct PoolsOpts {
    /// Output format
    #[clap(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

/// Execute the pools command.
pub fn run(ctx: &CliContext, opts: PoolsOpts) -> Result<()> {
    let conn = ctx.connect()?;
    let pools = pool::list_all(&conn)?;

    match opts.format {
        OutputFormat::Table => {
            if pools.is_empty() {
                println!("No storage pools found");
                println!("Tip: create the default pools with 'minivirt init-pools'");
                return Ok(());
            }
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["NAME", "UUID"]);
            for p in &pools {
                table.add_row(vec![p.name.clone(), p.uuid.to_string()]);
            }
            println!("{}", table);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&pools)?);
        }
    }
    Ok(())
}

/// Options for creating the default pools.
#[derive(Debug, Parser)]
pub struct InitPoolsOpts {}

/// Execute the init-pools command. Safe to run repeatedly.
pub fn run_init(ctx: &CliContext, _opts: InitPoolsOpts) -> Result<()> {
    let conn = ctx.connect()?;
    pool::ensure_default_pools(&conn, &ctx.pool_dir)?;
    println!(
        "Default pools '{}' and '{}' are present under {}",
        pool::IMAGES_POOL,
        pool::ISO_POOL,
        ctx.pool_dir
    );
    Ok(())
}
