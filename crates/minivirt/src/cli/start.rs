//! `start` command - start a defined domain.

use clap::Parser;
use color_eyre::Result;
use uuid::Uuid;

use super::CliContext;
use crate::vm;

/// Options for starting a domain.
#[derive(Debug, Parser)]
pub struct StartOpts {
    /// UUID of the domain to start
    pub uuid: Uuid,
}

/// Execute the start command.
pub fn run(ctx: &CliContext, opts: StartOpts) -> Result<()> {
    let conn = ctx.connect()?;
    vm::start(&conn, opts.uuid)?;
    println!("Domain {} started", opts.uuid);
    Ok(())
}
