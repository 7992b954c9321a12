//! `vnc` command - report a domain's VNC display port.

use clap::Parser;
use color_eyre::Result;
use uuid::Uuid;

use super::CliContext;
use crate::vm;

/// Options for querying the VNC port.
#[derive(Debug, Parser)]
pub struct VncOpts {
    /// UUID of the domain
    pub uuid: Uuid,
}

/// Execute the vnc command.
pub fn run(ctx: &CliContext, opts: VncOpts) -> Result<()> {
    let conn = ctx.connect()?;
    match vm::vnc_port(&conn, opts.uuid)? {
        Some(port) => println!("{}", port),
        None => println!("unavailable (domain has no bound VNC port; is it running?)"),
    }
    Ok(())
}
