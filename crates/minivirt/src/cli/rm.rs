//! `rm` command - remove a domain definition.

use clap::Parser;
use color_eyre::Result;
use uuid::Uuid;

use super::CliContext;
use crate::vm;

/// Options for removing a domain.
#[derive(Debug, Parser)]
pub struct RmOpts {
    /// UUID of the domain to remove (must be shut off)
    pub uuid: Uuid,
}

/// Execute the rm command.
pub fn run(ctx: &CliContext, opts: RmOpts) -> Result<()> {
    let conn = ctx.connect()?;
    vm::undefine(&conn, opts.uuid)?;
    println!("Domain {} removed; its volumes were left in place", opts.uuid);
    Ok(())
}
