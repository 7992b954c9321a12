//! `stop` command - shut down or forcibly stop a domain.

use clap::Parser;
use color_eyre::Result;
use uuid::Uuid;

use super::CliContext;
use crate::vm;

/// Options for stopping a domain.
#[derive(Debug, Parser)]
pub struct StopOpts {
    /// UUID of the domain to stop
    pub uuid: Uuid,

    /// Pull the plug instead of signalling a graceful shutdown
    #[clap(long)]
    pub force: bool,
}

/// Execute the stop command.
pub fn run(ctx: &CliContext, opts: StopOpts) -> Result<()> {
    let conn = ctx.connect()?;
    if opts.force {
        vm::destroy(&conn, opts.uuid)?;
        println!("Domain {} destroyed", opts.uuid);
    } else {
        vm::shutdown(&conn, opts.uuid)?;
        println!("Shutdown signalled to domain {}", opts.uuid);
    }
    Ok(())
}
