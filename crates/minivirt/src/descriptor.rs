//! Descriptor document generation.
//!
//! Pure functions mapping plain parameters to libvirt XML for domains,
//! storage pools and volumes. No I/O happens here: device addresses are
//! assigned deterministically by the builder, never by the hypervisor, so
//! identical inputs always produce byte-identical documents.

use camino::Utf8Path;

use crate::error::{Error, Result};
use crate::xml_utils::XmlWriter;

/// Fixed memory for every domain, in KiB.
pub const MEMORY_KIB: u32 = 262_144;

/// Fixed virtual CPU count.
pub const VCPUS: u32 = 2;

/// Each device class owns four sequential target letters (a..d).
pub const MAX_DEVICES_PER_BUS: usize = 4;

const IDE_TARGETS: [&str; MAX_DEVICES_PER_BUS] = ["hda", "hdb", "hdc", "hdd"];
const VIRTIO_TARGETS: [&str; MAX_DEVICES_PER_BUS] = ["vda", "vdb", "vdc", "vdd"];

/// First PCI slot handed to virtio disks; each further disk gets the next
/// slot so no two devices collide at definition time.
const VIRTIO_BASE_SLOT: u8 = 0x04;

/// Device class for target-letter allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// IDE CD-ROM attachment.
    Cdrom,
    /// Virtio disk volume attachment.
    Disk,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Cdrom => write!(f, "cdrom"),
            DeviceKind::Disk => write!(f, "disk"),
        }
    }
}

/// A device address assigned by the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAddress {
    /// IDE drive address: controller / bus / unit.
    Drive {
        /// Controller index.
        controller: u8,
        /// Bus index, incremented per CD-ROM in input order.
        bus: u8,
        /// Unit on the bus.
        unit: u8,
    },
    /// PCI address with the fixed domain/bus used for all our devices.
    Pci {
        /// PCI slot.
        slot: u8,
        /// PCI function.
        function: u8,
    },
}

impl DeviceAddress {
    fn write(&self, w: &mut XmlWriter) -> Result<()> {
        match *self {
            DeviceAddress::Drive {
                controller,
                bus,
                unit,
            } => w.empty(
                "address",
                &[
                    ("type", "drive"),
                    ("controller", &controller.to_string()),
                    ("bus", &bus.to_string()),
                    ("unit", &unit.to_string()),
                ],
            ),
            DeviceAddress::Pci { slot, function } => w.empty(
                "address",
                &[
                    ("type", "pci"),
                    ("domain", "0x0000"),
                    ("bus", "0x00"),
                    ("slot", &format!("0x{:02x}", slot)),
                    ("function", &format!("0x{:x}", function)),
                ],
            ),
        }
    }
}

/// Reject device counts past the fixed addressing scheme. Callers run this
/// before doing any hypervisor work on the request.
pub(crate) fn check_device_limit(kind: DeviceKind, requested: usize) -> Result<()> {
    if requested > MAX_DEVICES_PER_BUS {
        return Err(Error::DeviceAddressExhausted { kind, requested });
    }
    Ok(())
}

/// Build the domain descriptor for `name` with the given CD-ROM images and
/// disk volume paths, both attached in input order.
///
/// Fixed parameters: hardware clock in local time, 262144 KiB memory,
/// 2 vcpus, machine type "pc", boot from CD-ROM, one interface on the
/// default network, one VGA video device and one VNC graphics device
/// listening on all interfaces with port auto-allocation disabled (an
/// operator attaches VNC manually after boot).
pub fn domain_xml(
    name: &str,
    cdrom_paths: &[impl AsRef<Utf8Path>],
    volume_paths: &[impl AsRef<Utf8Path>],
) -> Result<String> {
    check_device_limit(DeviceKind::Cdrom, cdrom_paths.len())?;
    check_device_limit(DeviceKind::Disk, volume_paths.len())?;

    let mut w = XmlWriter::new();
    w.open("domain", &[("type", "kvm")])?;

    w.empty("clock", &[("offset", "localtime")])?;
    w.leaf("name", name)?;
    w.leaf("memory", &MEMORY_KIB.to_string())?;
    w.leaf("currentMemory", &MEMORY_KIB.to_string())?;
    w.leaf("vcpu", &VCPUS.to_string())?;

    w.open("os", &[])?;
    w.leaf_with_attrs("type", "hvm", &[("arch", "x86_64"), ("machine", "pc")])?;
    w.empty("boot", &[("dev", "cdrom")])?;
    w.close("os")?;

    w.open("devices", &[])?;

    for (index, path) in cdrom_paths.iter().enumerate() {
        w.open("disk", &[("type", "file"), ("device", "cdrom")])?;
        w.empty("driver", &[("name", "qemu"), ("type", "raw")])?;
        w.empty("source", &[("file", path.as_ref().as_str())])?;
        w.empty("target", &[("dev", IDE_TARGETS[index]), ("bus", "ide")])?;
        w.empty("readonly", &[])?;
        DeviceAddress::Drive {
            controller: 0,
            bus: index as u8,
            unit: 0,
        }
        .write(&mut w)?;
        w.close("disk")?;
    }

    for (index, path) in volume_paths.iter().enumerate() {
        w.open("disk", &[("type", "file"), ("device", "disk")])?;
        w.empty(
            "driver",
            &[("name", "qemu"), ("type", "raw"), ("cache", "none")],
        )?;
        w.empty("source", &[("file", path.as_ref().as_str())])?;
        w.empty("target", &[("dev", VIRTIO_TARGETS[index]), ("bus", "virtio")])?;
        DeviceAddress::Pci {
            slot: VIRTIO_BASE_SLOT + index as u8,
            function: 0,
        }
        .write(&mut w)?;
        w.close("disk")?;
    }

    w.open("controller", &[("type", "ide"), ("index", "0")])?;
    DeviceAddress::Pci {
        slot: 0x01,
        function: 1,
    }
    .write(&mut w)?;
    w.close("controller")?;

    w.open("interface", &[("type", "network")])?;
    w.empty("source", &[("network", "default")])?;
    w.close("interface")?;

    w.open("video", &[])?;
    w.empty(
        "model",
        &[("type", "vga"), ("vram", "262144"), ("heads", "1")],
    )?;
    DeviceAddress::Pci {
        slot: 0x02,
        function: 0,
    }
    .write(&mut w)?;
    w.close("video")?;

    w.open(
        "graphics",
        &[("type", "vnc"), ("autoport", "no"), ("listen", "0.0.0.0")],
    )?;
    w.empty("listen", &[("type", "address"), ("address", "0.0.0.0")])?;
    w.close("graphics")?;

    w.close("devices")?;
    w.close("domain")?;
    w.finish()
}

/// Build a directory-backed storage pool descriptor targeting
/// `base_dir/name`.
pub fn pool_xml(name: &str, base_dir: &Utf8Path) -> Result<String> {
    let mut w = XmlWriter::new();
    w.open("pool", &[("type", "dir")])?;
    w.leaf("name", name)?;
    w.open("target", &[])?;
    w.leaf("path", base_dir.join(name).as_str())?;
    w.close("target")?;
    w.close("pool")?;
    w.finish()
}

/// Build a volume descriptor. `volume_name` is used verbatim; capacity is a
/// single numeric value in bytes.
pub fn volume_xml(volume_name: &str, capacity_bytes: u64) -> Result<String> {
    let mut w = XmlWriter::new();
    w.open("volume", &[])?;
    w.leaf("name", volume_name)?;
    w.leaf("capacity", &capacity_bytes.to_string())?;
    w.close("volume")?;
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml_utils::parse_document;
    use camino::Utf8PathBuf;
    use similar_asserts::assert_eq;

    fn paths(names: &[&str]) -> Vec<Utf8PathBuf> {
        names.iter().map(Utf8PathBuf::from).collect()
    }

    #[test]
    fn domain_xml_is_deterministic() {
        let cdroms = paths(&["/isos/boot.iso", "/isos/drivers.iso"]);
        let volumes = paths(&["/images/web01.img"]);
        let first = domain_xml("web01", &cdroms, &volumes).unwrap();
        let second = domain_xml("web01", &cdroms, &volumes).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn fixed_parameters_are_present() {
        let xml = domain_xml("web01", &paths(&["/isos/boot.iso"]), &paths(&[])).unwrap();
        assert!(xml.contains("<domain type=\"kvm\">"));
        assert!(xml.contains("<clock offset=\"localtime\"/>"));
        assert!(xml.contains("<name>web01</name>"));
        assert!(xml.contains("<memory>262144</memory>"));
        assert!(xml.contains("<currentMemory>262144</currentMemory>"));
        assert!(xml.contains("<vcpu>2</vcpu>"));
        assert!(xml.contains("<type arch=\"x86_64\" machine=\"pc\">hvm</type>"));
        assert!(xml.contains("<boot dev=\"cdrom\"/>"));
        assert!(xml.contains("<source network=\"default\"/>"));
        assert!(xml.contains("<model type=\"vga\" vram=\"262144\" heads=\"1\"/>"));
        assert!(xml.contains("<graphics type=\"vnc\" autoport=\"no\" listen=\"0.0.0.0\">"));
    }

    #[test]
    fn cdrom_letters_follow_input_order() {
        let cdroms = paths(&["/isos/a.iso", "/isos/b.iso", "/isos/c.iso", "/isos/d.iso"]);
        let xml = domain_xml("vm", &cdroms, &paths(&[])).unwrap();
        let dom = parse_document(&xml).unwrap();
        let mut disks = Vec::new();
        dom.find_all("disk", &mut disks);
        let targets: Vec<&str> = disks
            .iter()
            .map(|d| d.find("target").unwrap().attr("dev").unwrap())
            .collect();
        assert_eq!(targets, vec!["hda", "hdb", "hdc", "hdd"]);
        // IDE bus index increments with each CD-ROM, unit stays 0.
        let buses: Vec<&str> = disks
            .iter()
            .map(|d| d.find("address").unwrap().attr("bus").unwrap())
            .collect();
        assert_eq!(buses, vec!["0", "1", "2", "3"]);
    }

    #[test]
    fn virtio_disks_get_distinct_pci_slots() {
        let volumes = paths(&["/i/a.img", "/i/b.img", "/i/c.img", "/i/d.img"]);
        let xml = domain_xml("vm", &paths(&[]), &volumes).unwrap();
        let dom = parse_document(&xml).unwrap();
        let mut disks = Vec::new();
        dom.find_all("disk", &mut disks);
        let targets: Vec<&str> = disks
            .iter()
            .map(|d| d.find("target").unwrap().attr("dev").unwrap())
            .collect();
        assert_eq!(targets, vec!["vda", "vdb", "vdc", "vdd"]);
        let slots: Vec<&str> = disks
            .iter()
            .map(|d| d.find("address").unwrap().attr("slot").unwrap())
            .collect();
        assert_eq!(slots, vec!["0x04", "0x05", "0x06", "0x07"]);
    }

    #[test]
    fn cdroms_are_readonly_disks_are_not() {
        let xml = domain_xml("vm", &paths(&["/isos/a.iso"]), &paths(&["/i/a.img"])).unwrap();
        let dom = parse_document(&xml).unwrap();
        let mut disks = Vec::new();
        dom.find_all("disk", &mut disks);
        assert!(disks[0].find("readonly").is_some());
        assert!(disks[1].find("readonly").is_none());
    }

    #[test]
    fn five_cdroms_exhaust_the_address_pool() {
        let cdroms = paths(&["/1", "/2", "/3", "/4", "/5"]);
        let err = domain_xml("vm", &cdroms, &paths(&[])).unwrap_err();
        assert!(matches!(
            err,
            Error::DeviceAddressExhausted {
                kind: DeviceKind::Cdrom,
                requested: 5
            }
        ));
    }

    #[test]
    fn five_volumes_exhaust_the_address_pool() {
        let volumes = paths(&["/1", "/2", "/3", "/4", "/5"]);
        let err = domain_xml("vm", &paths(&[]), &volumes).unwrap_err();
        assert!(matches!(
            err,
            Error::DeviceAddressExhausted {
                kind: DeviceKind::Disk,
                requested: 5
            }
        ));
    }

    #[test]
    fn pool_xml_targets_base_dir_plus_name() {
        let xml = pool_xml("minivirt-isos", Utf8Path::new("/var/lib/libvirt")).unwrap();
        assert!(xml.contains("<pool type=\"dir\">"));
        assert!(xml.contains("<name>minivirt-isos</name>"));
        assert!(xml.contains("<path>/var/lib/libvirt/minivirt-isos</path>"));
    }

    #[test]
    fn volume_xml_uses_name_verbatim_and_bytes() {
        let xml = volume_xml("web01-disk.img", 50_000_000_000).unwrap();
        assert!(xml.contains("<name>web01-disk.img</name>"));
        assert!(xml.contains("<capacity>50000000000</capacity>"));
    }
}
