//! Domain lifecycle operations.
//!
//! A domain moves `undefined -> defined+running` via [`create`],
//! `running -> shut off` via [`shutdown`] (graceful) or [`destroy`]
//! (forced), `shut off -> running` via [`start`] and
//! `shut off -> undefined` via [`undefine`]. State is always re-queried
//! from the endpoint, never cached locally.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::io::Write;

use camino::Utf8Path;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::connection::{stderr_text, stdout_text, Connection};
use crate::descriptor;
use crate::error::{Error, Result};
use crate::pool;
use crate::xml_utils;

/// Domain state as reported by the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DomainState {
    /// The domain is running.
    Running,
    /// Defined but not running.
    ShutOff,
    /// Suspended by the hypervisor.
    Paused,
    /// A graceful shutdown is in progress.
    InShutdown,
    /// The endpoint knows no domain by this identity.
    Undefined,
    /// Any state string this crate does not model explicitly.
    Other(String),
}

impl DomainState {
    fn parse(raw: &str) -> Self {
        match raw.trim() {
            "running" => DomainState::Running,
            "shut off" => DomainState::ShutOff,
            "paused" => DomainState::Paused,
            "in shutdown" => DomainState::InShutdown,
            other => DomainState::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for DomainState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DomainState::Running => write!(f, "running"),
            DomainState::ShutOff => write!(f, "shut off"),
            DomainState::Paused => write!(f, "paused"),
            DomainState::InShutdown => write!(f, "in shutdown"),
            DomainState::Undefined => write!(f, "undefined"),
            DomainState::Other(s) => write!(f, "{}", s),
        }
    }
}

/// A domain as reported by the endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct VmInfo {
    /// Stable identity across the domain's lifetime.
    pub uuid: Uuid,
    /// Domain name.
    pub name: String,
    /// Transient numeric id, defined only while running.
    pub id: Option<u32>,
    /// Current state.
    pub state: DomainState,
}

/// A disk volume to materialize for a new domain.
#[derive(Debug, Clone)]
pub struct VolumeRequest {
    /// Volume name; the image-file extension is appended at creation.
    pub name: String,
    /// Capacity in bytes.
    pub capacity: u64,
}

fn virsh_not_found(stderr: &str) -> bool {
    stderr.contains("failed to get domain")
}

fn parse_domain_uuid(raw: &str) -> Result<Uuid> {
    raw.trim().parse().map_err(|e: uuid::Error| Error::Parse {
        what: "domain uuid",
        message: format!("{:?}: {}", raw.trim(), e),
    })
}

/// List every domain: the union of inactive-defined and running domains,
/// deduplicated by UUID. A running domain is also defined, so the same
/// UUID can be reported on both sides of the union.
pub fn list_all(conn: &Connection) -> Result<Vec<VmInfo>> {
    let mut listings = Vec::new();
    for extra_flag in [None, Some("--inactive")] {
        let mut args = vec!["list", "--uuid"];
        if let Some(flag) = extra_flag {
            args.push(flag);
        }
        let output = conn.output(&args)?;
        if !output.status.success() {
            return Err(Error::Operation {
                operation: "list",
                target: conn.uri().to_string(),
                message: stderr_text(&output),
            });
        }
        listings.push(stdout_text(&output));
    }
    let mut vms = Vec::new();
    for uuid in unique_uuids(listings.iter().map(String::as_str))? {
        vms.push(describe(conn, uuid)?);
    }
    Ok(vms)
}

/// Merge `list --uuid` listings into one UUID sequence, first occurrence
/// winning. The same UUID legitimately appears in both the running and the
/// inactive listing's complement, so duplicates are expected input.
fn unique_uuids<'a>(listings: impl IntoIterator<Item = &'a str>) -> Result<Vec<Uuid>> {
    let mut seen = HashSet::new();
    let mut uuids = Vec::new();
    for listing in listings {
        for line in listing.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let uuid = parse_domain_uuid(line)?;
            if seen.insert(uuid) {
                uuids.push(uuid);
            }
        }
    }
    Ok(uuids)
}

fn describe(conn: &Connection, uuid: Uuid) -> Result<VmInfo> {
    let uuid_str = uuid.to_string();
    let output = conn.output(["domname", &uuid_str])?;
    if !output.status.success() {
        return Err(Error::NotFound {
            kind: "domain",
            ident: uuid_str,
        });
    }
    let name = stdout_text(&output);
    Ok(VmInfo {
        uuid,
        name,
        id: numeric_id(conn, &uuid_str)?,
        state: state(conn, uuid)?,
    })
}

/// The transient numeric id. Lookup legitimately fails for a domain that
/// is defined but not running; that is "no id", not an error.
fn numeric_id(conn: &Connection, uuid_str: &str) -> Result<Option<u32>> {
    let output = conn.output(["domid", uuid_str])?;
    if !output.status.success() {
        return Ok(None);
    }
    // virsh prints "-" for domains without an id.
    Ok(stdout_text(&output).parse().ok())
}

/// Define a new domain, mark it for autostart and start it immediately.
///
/// Device counts are validated up front: a request past the addressing
/// limit is a caller input error and fails before any pool or volume
/// exists for it.
/// The requested disk volumes are then materialized in the images pool
/// (ensuring the default pools exist), and the descriptor is built from
/// the CD-ROM paths plus the hypervisor-assigned volume paths.
pub fn create(
    conn: &Connection,
    name: &str,
    cdrom_paths: &[impl AsRef<Utf8Path>],
    volume_requests: &[VolumeRequest],
    pool_base_dir: &Utf8Path,
) -> Result<VmInfo> {
    descriptor::check_device_limit(descriptor::DeviceKind::Cdrom, cdrom_paths.len())?;
    descriptor::check_device_limit(descriptor::DeviceKind::Disk, volume_requests.len())?;

    pool::ensure_default_pools(conn, pool_base_dir)?;

    let mut volume_paths = Vec::with_capacity(volume_requests.len());
    for request in volume_requests {
        let volume = pool::create_volume(conn, pool::IMAGES_POOL, &request.name, request.capacity)?;
        volume_paths.push(volume.path);
    }

    let xml = descriptor::domain_xml(name, cdrom_paths, &volume_paths)?;
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(xml.as_bytes())?;
    file.flush()?;

    let output = conn.output([OsStr::new("define"), file.path().as_os_str()])?;
    if !output.status.success() {
        return Err(Error::Definition {
            name: name.to_string(),
            message: stderr_text(&output),
        });
    }

    for verb in ["autostart", "start"] {
        let output = conn.output([verb, name])?;
        if !output.status.success() {
            return Err(Error::Operation {
                operation: verb,
                target: name.to_string(),
                message: stderr_text(&output),
            });
        }
    }

    let output = conn.output(["domuuid", name])?;
    if !output.status.success() {
        return Err(Error::NotFound {
            kind: "domain",
            ident: name.to_string(),
        });
    }
    let vm = describe(conn, parse_domain_uuid(&stdout_text(&output))?)?;
    info!(name, uuid = %vm.uuid, "created domain");
    Ok(vm)
}

fn lifecycle_op(conn: &Connection, operation: &'static str, uuid: Uuid) -> Result<()> {
    let uuid_str = uuid.to_string();
    let output = conn.output([operation, &uuid_str])?;
    if !output.status.success() {
        let stderr = stderr_text(&output);
        if virsh_not_found(&stderr) {
            return Err(Error::NotFound {
                kind: "domain",
                ident: uuid_str,
            });
        }
        return Err(Error::Operation {
            operation,
            target: uuid_str,
            message: stderr,
        });
    }
    debug!(uuid = %uuid, operation, "lifecycle transition");
    Ok(())
}

/// Start a defined domain.
pub fn start(conn: &Connection, uuid: Uuid) -> Result<()> {
    lifecycle_op(conn, "start", uuid)
}

/// Send a graceful shutdown signal. Does not wait for completion; the
/// domain stays defined.
pub fn shutdown(conn: &Connection, uuid: Uuid) -> Result<()> {
    lifecycle_op(conn, "shutdown", uuid)
}

/// Forcibly stop a domain. It stays defined.
pub fn destroy(conn: &Connection, uuid: Uuid) -> Result<()> {
    lifecycle_op(conn, "destroy", uuid)
}

/// Remove a domain definition. The domain must be shut off; volumes it
/// used are left in place. This is irreversible.
pub fn undefine(conn: &Connection, uuid: Uuid) -> Result<()> {
    undefine_precheck(uuid, state(conn, uuid)?)?;
    lifecycle_op(conn, "undefine", uuid)
}

/// Whether a domain in `state` may be undefined. Only a shut-off domain
/// qualifies; a running (or otherwise active) one stays untouched.
fn undefine_precheck(uuid: Uuid, state: DomainState) -> Result<()> {
    match state {
        DomainState::ShutOff => Ok(()),
        DomainState::Undefined => Err(Error::NotFound {
            kind: "domain",
            ident: uuid.to_string(),
        }),
        other => Err(Error::InvalidState {
            operation: "undefine",
            uuid,
            state: other,
        }),
    }
}

/// Current state of a domain, re-queried from the endpoint. An unknown
/// identity yields [`DomainState::Undefined`] rather than an error.
pub fn state(conn: &Connection, uuid: Uuid) -> Result<DomainState> {
    let output = conn.output(["domstate", &uuid.to_string()])?;
    if !output.status.success() {
        let stderr = stderr_text(&output);
        if virsh_not_found(&stderr) {
            return Ok(DomainState::Undefined);
        }
        return Err(Error::Operation {
            operation: "domstate",
            target: uuid.to_string(),
            message: stderr,
        });
    }
    Ok(DomainState::parse(&stdout_text(&output)))
}

/// VNC port from the live descriptor's graphics element.
///
/// Returns `None` when no port has been assigned yet; the port is only
/// meaningful once the domain has been started in the current hypervisor
/// session.
pub fn vnc_port(conn: &Connection, uuid: Uuid) -> Result<Option<u16>> {
    let uuid_str = uuid.to_string();
    let output = conn.output(["dumpxml", &uuid_str])?;
    if !output.status.success() {
        let stderr = stderr_text(&output);
        if virsh_not_found(&stderr) {
            return Err(Error::NotFound {
                kind: "domain",
                ident: uuid_str,
            });
        }
        return Err(Error::Operation {
            operation: "dumpxml",
            target: uuid_str,
            message: stderr,
        });
    }
    let dom = xml_utils::parse_document(&String::from_utf8_lossy(&output.stdout))?;
    Ok(vnc_port_from_descriptor(&dom))
}

fn vnc_port_from_descriptor(dom: &xml_utils::XmlNode) -> Option<u16> {
    let mut graphics = Vec::new();
    dom.find_all("graphics", &mut graphics);
    graphics
        .iter()
        .filter(|g| g.attr("type") == Some("vnc"))
        .find_map(|g| g.attr("port"))
        // libvirt reports -1 until a port is actually bound.
        .and_then(|port| port.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DeviceKind;
    use crate::xml_utils::parse_document;
    use camino::Utf8PathBuf;

    #[test]
    fn create_rejects_excess_devices_before_any_round_trip() {
        // Every round-trip through a closed handle fails with
        // EndpointUnavailable, so reaching the endpoint at all would
        // change the error we observe here.
        let conn = Connection::closed("test:///default");
        let base = Utf8Path::new("/var/lib/libvirt");

        let cdroms: Vec<Utf8PathBuf> = (0..5)
            .map(|i| Utf8PathBuf::from(format!("/isos/{}.iso", i)))
            .collect();
        let err = create(&conn, "vm", &cdroms, &[], base).unwrap_err();
        assert!(matches!(
            err,
            Error::DeviceAddressExhausted {
                kind: DeviceKind::Cdrom,
                requested: 5
            }
        ));

        let no_cdroms: Vec<Utf8PathBuf> = Vec::new();
        let disks: Vec<VolumeRequest> = (0..5)
            .map(|i| VolumeRequest {
                name: format!("disk{}", i),
                capacity: 1024,
            })
            .collect();
        let err = create(&conn, "vm", &no_cdroms, &disks, base).unwrap_err();
        assert!(matches!(
            err,
            Error::DeviceAddressExhausted {
                kind: DeviceKind::Disk,
                requested: 5
            }
        ));
    }

    #[test]
    fn listing_reports_each_uuid_once() {
        let running = "11111111-1111-1111-1111-111111111111\n";
        let inactive = "11111111-1111-1111-1111-111111111111\n\
                        22222222-2222-2222-2222-222222222222\n";
        let uuids = unique_uuids([running, inactive]).unwrap();
        assert_eq!(
            uuids,
            vec![
                "11111111-1111-1111-1111-111111111111".parse::<Uuid>().unwrap(),
                "22222222-2222-2222-2222-222222222222".parse::<Uuid>().unwrap(),
            ]
        );
    }

    #[test]
    fn undefine_is_refused_unless_shut_off() {
        let uuid = Uuid::nil();
        assert!(undefine_precheck(uuid, DomainState::ShutOff).is_ok());
        assert!(matches!(
            undefine_precheck(uuid, DomainState::Running),
            Err(Error::InvalidState {
                operation: "undefine",
                state: DomainState::Running,
                ..
            })
        ));
        assert!(matches!(
            undefine_precheck(uuid, DomainState::Paused),
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(
            undefine_precheck(uuid, DomainState::Undefined),
            Err(Error::NotFound { kind: "domain", .. })
        ));
    }

    #[test]
    fn states_parse_from_domstate_output() {
        assert_eq!(DomainState::parse("running\n"), DomainState::Running);
        assert_eq!(DomainState::parse("shut off"), DomainState::ShutOff);
        assert_eq!(DomainState::parse("paused"), DomainState::Paused);
        assert_eq!(
            DomainState::parse("pmsuspended"),
            DomainState::Other("pmsuspended".to_string())
        );
    }

    #[test]
    fn state_display_round_trips() {
        assert_eq!(DomainState::Running.to_string(), "running");
        assert_eq!(DomainState::ShutOff.to_string(), "shut off");
        assert_eq!(DomainState::Undefined.to_string(), "undefined");
    }

    #[test]
    fn vnc_port_is_read_from_live_descriptor() {
        let dom = parse_document(
            r#"<domain>
                 <devices>
                   <graphics type="vnc" port="5901" listen="0.0.0.0"/>
                 </devices>
               </domain>"#,
        )
        .unwrap();
        assert_eq!(vnc_port_from_descriptor(&dom), Some(5901));
    }

    #[test]
    fn unbound_vnc_port_is_unavailable() {
        let dom = parse_document(
            r#"<domain>
                 <devices>
                   <graphics type="vnc" port="-1" autoport="no"/>
                 </devices>
               </domain>"#,
        )
        .unwrap();
        assert_eq!(vnc_port_from_descriptor(&dom), None);
    }

    #[test]
    fn spice_graphics_are_ignored() {
        let dom = parse_document(
            r#"<domain>
                 <devices>
                   <graphics type="spice" port="5930"/>
                 </devices>
               </domain>"#,
        )
        .unwrap();
        assert_eq!(vnc_port_from_descriptor(&dom), None);
    }
}
