//! Storage pool discovery and volume allocation.
//!
//! Two pools exist by convention: one for VM disk images and one for ISO
//! images. [`ensure_default_pools`] creates them idempotently; everything
//! else is lookup, volume creation and deletion against a pool the
//! hypervisor already knows about.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::connection::{stderr_text, stdout_text, Connection};
use crate::descriptor;
use crate::error::{Error, Result};

/// Well-known pool holding VM disk volumes.
pub const IMAGES_POOL: &str = "minivirt-images";

/// Well-known pool holding uploaded ISO images.
pub const ISO_POOL: &str = "minivirt-isos";

/// A storage pool as reported by the endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StoragePool {
    /// Human name (read-only here; renames happen outside this system).
    pub name: String,
    /// Stable identity, unique within an endpoint.
    pub uuid: Uuid,
}

/// A volume inside a storage pool.
#[derive(Debug, Clone, Serialize)]
pub struct Volume {
    /// Volume name within its pool.
    pub name: String,
    /// Owning pool name.
    pub pool: String,
    /// Capacity in bytes; zero when the endpoint did not report one.
    pub capacity: u64,
    /// Filesystem path assigned by the hypervisor at creation time.
    pub path: Utf8PathBuf,
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    raw.trim().parse().map_err(|e: uuid::Error| Error::Parse {
        what: "pool uuid",
        message: format!("{:?}: {}", raw.trim(), e),
    })
}

/// Look up a pool by name. Absence is [`Error::NotFound`].
pub fn find_by_name(conn: &Connection, name: &str) -> Result<StoragePool> {
    let output = conn.output(["pool-uuid", name])?;
    if !output.status.success() {
        return Err(Error::NotFound {
            kind: "pool",
            ident: name.to_string(),
        });
    }
    Ok(StoragePool {
        name: name.to_string(),
        uuid: parse_uuid(&stdout_text(&output))?,
    })
}

/// Look up a pool by UUID. Absence is [`Error::NotFound`].
pub fn find_by_uuid(conn: &Connection, uuid: Uuid) -> Result<StoragePool> {
    let output = conn.output(["pool-name", &uuid.to_string()])?;
    if !output.status.success() {
        return Err(Error::NotFound {
            kind: "pool",
            ident: uuid.to_string(),
        });
    }
    Ok(StoragePool {
        name: stdout_text(&output),
        uuid,
    })
}

/// List every pool on the endpoint, in hypervisor-reported order.
pub fn list_all(conn: &Connection) -> Result<Vec<StoragePool>> {
    let output = conn.output(["pool-list", "--all", "--name"])?;
    if !output.status.success() {
        return Err(Error::Operation {
            operation: "pool-list",
            target: conn.uri().to_string(),
            message: stderr_text(&output),
        });
    }
    let mut pools = Vec::new();
    for name in stdout_text(&output).lines() {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        pools.push(find_by_name(conn, name)?);
    }
    Ok(pools)
}

/// Whether a define/create failure means the resource already exists.
///
/// Only this exact condition is suppressed during default-pool creation;
/// every other failure propagates. Matching is deliberately narrow rather
/// than guessing at further libvirt error strings.
fn already_exists(stderr: &str) -> bool {
    stderr.contains("already exists") || stderr.contains("already in use")
}

/// Ensure the two well-known pools exist, creating any that are absent.
///
/// A freshly created pool is defined from a directory-type descriptor
/// targeting `base_dir/<pool name>`, built, started and flagged for
/// autostart. A define rejected because the pool already exists is
/// swallowed as success, so calling this twice creates nothing new.
pub fn ensure_default_pools(conn: &Connection, base_dir: &Utf8Path) -> Result<()> {
    for name in [IMAGES_POOL, ISO_POOL] {
        match find_by_name(conn, name) {
            Ok(pool) => {
                debug!(pool = name, uuid = %pool.uuid, "default pool present");
                continue;
            }
            Err(Error::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        create_pool(conn, name, base_dir)?;
    }
    Ok(())
}

fn create_pool(conn: &Connection, name: &str, base_dir: &Utf8Path) -> Result<()> {
    let xml = descriptor::pool_xml(name, base_dir)?;
    let file = write_descriptor(&xml)?;

    let creation_err = |message: String| Error::ResourceCreation {
        resource: name.to_string(),
        message,
    };

    let output = conn.output([std::ffi::OsStr::new("pool-define"), file.path().as_os_str()])?;
    if !output.status.success() {
        let stderr = stderr_text(&output);
        if already_exists(&stderr) {
            // Lost a race against another creator; the pool is there.
            warn!(pool = name, "pool appeared concurrently, treating as existing");
            return Ok(());
        }
        return Err(creation_err(stderr));
    }

    for verb in ["pool-build", "pool-start", "pool-autostart"] {
        let output = conn.output([verb, name])?;
        if !output.status.success() {
            return Err(creation_err(format!(
                "{}: {}",
                verb,
                stderr_text(&output)
            )));
        }
    }
    debug!(pool = name, "created default pool");
    Ok(())
}

/// Create a volume named `name` (plus the image-file extension) with the
/// given capacity in bytes, returning the hypervisor-assigned path.
pub fn create_volume(
    conn: &Connection,
    pool_name: &str,
    name: &str,
    capacity_bytes: u64,
) -> Result<Volume> {
    let volume_name = format!("{}.img", name);
    create_volume_raw(conn, pool_name, &volume_name, capacity_bytes)
}

/// As [`create_volume`], but taking the exact volume name. Used for ISO
/// uploads, where the uploaded filename is the volume name.
pub fn create_volume_raw(
    conn: &Connection,
    pool_name: &str,
    volume_name: &str,
    capacity_bytes: u64,
) -> Result<Volume> {
    let xml = descriptor::volume_xml(volume_name, capacity_bytes)?;
    let file = write_descriptor(&xml)?;

    let output = conn.output([
        std::ffi::OsStr::new("vol-create"),
        std::ffi::OsStr::new(pool_name),
        file.path().as_os_str(),
    ])?;
    if !output.status.success() {
        return Err(Error::ResourceCreation {
            resource: format!("{}/{}", pool_name, volume_name),
            message: stderr_text(&output),
        });
    }

    let path = volume_path(conn, pool_name, volume_name)?;
    debug!(pool = pool_name, volume = volume_name, %path, "created volume");
    Ok(Volume {
        name: volume_name.to_string(),
        pool: pool_name.to_string(),
        capacity: capacity_bytes,
        path,
    })
}

/// Resolve the filesystem path the hypervisor assigned to a volume.
pub fn volume_path(conn: &Connection, pool_name: &str, volume_name: &str) -> Result<Utf8PathBuf> {
    let output = conn.output(["vol-path", volume_name, "--pool", pool_name])?;
    if !output.status.success() {
        return Err(Error::NotFound {
            kind: "volume",
            ident: format!("{}/{}", pool_name, volume_name),
        });
    }
    Ok(Utf8PathBuf::from(stdout_text(&output)))
}

/// Delete a volume by path. `pool` may be a pool name or UUID.
pub fn delete_volume(conn: &Connection, pool: &str, volume_path: &Utf8Path) -> Result<()> {
    let output = conn.output(["vol-delete", volume_path.as_str(), "--pool", pool])?;
    if !output.status.success() {
        return Err(Error::Operation {
            operation: "vol-delete",
            target: volume_path.to_string(),
            message: stderr_text(&output),
        });
    }
    Ok(())
}

/// Enumerate the volumes in a pool with their capacities and paths.
pub fn list_volumes(conn: &Connection, pool_name: &str) -> Result<Vec<Volume>> {
    let output = conn.output(["vol-list", pool_name])?;
    if !output.status.success() {
        return Err(Error::Operation {
            operation: "vol-list",
            target: pool_name.to_string(),
            message: stderr_text(&output),
        });
    }

    let names = parse_volume_table(&String::from_utf8_lossy(&output.stdout));
    let mut volumes = Vec::new();
    for name in names {
        let path = volume_path(conn, pool_name, &name)?;
        let capacity = volume_capacity(conn, pool_name, &name).unwrap_or_else(|e| {
            warn!(volume = %name, error = %e, "could not read volume capacity");
            0
        });
        volumes.push(Volume {
            name,
            pool: pool_name.to_string(),
            capacity,
            path,
        });
    }
    Ok(volumes)
}

fn volume_capacity(conn: &Connection, pool_name: &str, volume_name: &str) -> Result<u64> {
    let output = conn.output(["vol-info", volume_name, "--pool", pool_name, "--bytes"])?;
    if !output.status.success() {
        return Err(Error::Operation {
            operation: "vol-info",
            target: format!("{}/{}", pool_name, volume_name),
            message: stderr_text(&output),
        });
    }
    for line in stdout_text(&output).lines() {
        if let Some(rest) = line.strip_prefix("Capacity:") {
            return parse_virsh_bytes(rest.trim()).ok_or(Error::Parse {
                what: "volume capacity",
                message: rest.trim().to_string(),
            });
        }
    }
    Err(Error::Parse {
        what: "volume capacity",
        message: "no Capacity line in vol-info output".to_string(),
    })
}

/// Extract volume names from `vol-list` table output (two header lines,
/// then "name  path" rows).
fn parse_volume_table(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(2)
        .filter_map(|line| line.trim().split_whitespace().next())
        .filter(|name| !name.is_empty() && !name.starts_with('-'))
        .map(str::to_string)
        .collect()
}

/// Parse a virsh size ("4700000000 B" with `--bytes`, or "4.38 GiB").
///
/// Plain byte counts stay on the integer path so large capacities are not
/// rounded through the float mantissa; only the human-readable forms,
/// which are already truncated to two decimals, go through f64.
fn parse_virsh_bytes(text: &str) -> Option<u64> {
    let mut parts = text.split_whitespace();
    let number = parts.next()?;
    match parts.next().unwrap_or("B") {
        "B" | "bytes" => number.parse().ok(),
        unit => {
            let value: f64 = number.parse().ok()?;
            let multiplier: u64 = match unit {
                "KiB" => 1024,
                "MiB" => 1024 * 1024,
                "GiB" => 1024 * 1024 * 1024,
                "TiB" => 1024u64.pow(4),
                _ => return None,
            };
            Some((value * multiplier as f64) as u64)
        }
    }
}

/// Write a descriptor to a temp file for submission via virsh.
fn write_descriptor(xml: &str) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(xml.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn volume_table_parsing_skips_headers() {
        let stdout = indoc! {"
             Name              Path
            ---------------------------------------------------------
             web01-disk.img    /var/lib/libvirt/minivirt-images/web01-disk.img
             win.iso           /var/lib/libvirt/minivirt-isos/win.iso
        "};
        assert_eq!(
            parse_volume_table(stdout),
            vec!["web01-disk.img".to_string(), "win.iso".to_string()]
        );
    }

    #[test]
    fn volume_table_parsing_handles_empty_pool() {
        let stdout = indoc! {"
             Name   Path
            --------------
        "};
        assert!(parse_volume_table(stdout).is_empty());
    }

    #[test]
    fn virsh_sizes_parse_in_both_formats() {
        assert_eq!(parse_virsh_bytes("4700000000 B"), Some(4_700_000_000));
        assert_eq!(parse_virsh_bytes("1.00 GiB"), Some(1_073_741_824));
        assert_eq!(parse_virsh_bytes("512 MiB"), Some(536_870_912));
        assert_eq!(parse_virsh_bytes("garbage"), None);
    }

    #[test]
    fn byte_counts_keep_exact_precision() {
        // 2^53 + 1 is not representable in an f64 mantissa; a float
        // round-trip would come back off by one.
        assert_eq!(
            parse_virsh_bytes("9007199254740993 B"),
            Some(9_007_199_254_740_993)
        );
        assert_eq!(parse_virsh_bytes("18446744073709551615 B"), Some(u64::MAX));
    }

    #[test]
    fn already_exists_matching_is_narrow() {
        assert!(already_exists("error: pool 'minivirt-isos' already exists"));
        assert!(already_exists(
            "error: operation failed: pool name 'x' already in use"
        ));
        assert!(!already_exists("error: cannot open connection"));
        assert!(!already_exists("error: permission denied"));
    }
}
