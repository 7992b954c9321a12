//! `list` command - list defined and running domains.

use clap::Parser;
use color_eyre::Result;
use comfy_table::{presets::UTF8_FULL, Table};

use super::{CliContext, OutputFormat};
use crate::vm;

/// Options for listing domains.
#[derive(Debug, Parser)]
pub struct ListOpts {
    /// Output format
    #[clap(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

/// Execute the list command.
pub fn run(ctx: &CliContext, opts: ListOpts) -> Result<()> {
    let conn = ctx.connect()?;
    let vms = vm::list_all(&conn)?;

    match opts.format {
        OutputFormat::Table => {
            if vms.is_empty() {
                println!("No domains found");
                println!("Tip: create one with 'minivirt create <name> --cdrom <iso>'");
                return Ok(());
            }
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["NAME", "UUID", "ID", "STATE"]);
            for v in &vms {
                let id = v.id.map(|i| i.to_string()).unwrap_or_else(|| "-".into());
                table.add_row(vec![
                    v.name.clone(),
                    v.uuid.to_string(),
                    id,
                    v.state.to_string(),
                ]);
            }
            println!("{}", table);
            println!(
                "\nFound {} domain{}",
                vms.len(),
                if vms.len() == 1 { "" } else { "s" }
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&vms)?);
        }
    }
    Ok(())
}
