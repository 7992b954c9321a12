//! `create` command - define and start a new domain.

use camino::Utf8PathBuf;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};

use super::CliContext;
use crate::vm::{self, VolumeRequest};

/// Options for creating a domain.
#[derive(Debug, Parser)]
pub struct CreateOpts {
    /// Name of the new domain
    pub name: String,

    /// CD-ROM image path, attached in the order given (up to 4)
    #[clap(long = "cdrom")]
    pub cdroms: Vec<Utf8PathBuf>,

    /// Disk volume to create, as NAME:SIZE (e.g. web01-disk:50G, up to 4)
    #[clap(long = "disk")]
    pub disks: Vec<String>,
}

/// Execute the create command.
pub fn run(ctx: &CliContext, opts: CreateOpts) -> Result<()> {
    let requests = opts
        .disks
        .iter()
        .map(|spec| parse_disk_spec(spec))
        .collect::<Result<Vec<_>>>()?;

    let conn = ctx.connect()?;
    let created = vm::create(&conn, &opts.name, &opts.cdroms, &requests, &ctx.pool_dir)?;
    println!(
        "Domain '{}' created and started (uuid {})",
        created.name, created.uuid
    );
    Ok(())
}

/// Parse a NAME:SIZE disk spec into a volume request.
fn parse_disk_spec(spec: &str) -> Result<VolumeRequest> {
    let (name, size) = spec
        .rsplit_once(':')
        .ok_or_else(|| eyre!("disk spec '{}' is not NAME:SIZE", spec))?;
    if name.is_empty() {
        return Err(eyre!("disk spec '{}' has an empty name", spec));
    }
    Ok(VolumeRequest {
        name: name.to_string(),
        capacity: parse_size(size).ok_or_else(|| eyre!("invalid size '{}' in '{}'", size, spec))?,
    })
}

/// Parse a size with an optional binary suffix (K, M, G, T) into bytes.
fn parse_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let (number, multiplier) = match text.char_indices().last()? {
        (i, 'K') | (i, 'k') => (&text[..i], 1024),
        (i, 'M') | (i, 'm') => (&text[..i], 1024u64.pow(2)),
        (i, 'G') | (i, 'g') => (&text[..i], 1024u64.pow(3)),
        (i, 'T') | (i, 't') => (&text[..i], 1024u64.pow(4)),
        _ => (text, 1),
    };
    let value: u64 = number.parse().ok()?;
    value.checked_mul(multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_parse_with_and_without_suffix() {
        assert_eq!(parse_size("50000000000"), Some(50_000_000_000));
        assert_eq!(parse_size("50G"), Some(50 * 1024u64.pow(3)));
        assert_eq!(parse_size("512m"), Some(512 * 1024 * 1024));
        assert_eq!(parse_size("2T"), Some(2 * 1024u64.pow(4)));
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("G"), None);
        assert_eq!(parse_size("12Q"), None);
    }

    #[test]
    fn disk_specs_split_on_the_last_colon() {
        let req = parse_disk_spec("web01-disk:50G").unwrap();
        assert_eq!(req.name, "web01-disk");
        assert_eq!(req.capacity, 50 * 1024u64.pow(3));

        // Names may themselves contain colons.
        let req = parse_disk_spec("data:vol:1G").unwrap();
        assert_eq!(req.name, "data:vol");

        assert!(parse_disk_spec("no-size").is_err());
        assert!(parse_disk_spec(":1G").is_err());
    }
}
