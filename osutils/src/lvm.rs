//! LVM tool wrappers and parsers for `vgscan` and `pvscan` output.

use std::path::Path;

use anyhow::{bail, Error};
use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    dependencies::{Dependency, DependencyError},
    host::Host,
};

lazy_static! {
    /// `Found volume group "vg_sdb" using metadata type lvm2`
    static ref VGSCAN_FOUND_REGEX: Regex =
        Regex::new(r#"^Found (?:exported )?volume group "([^"]+)""#)
            .expect("Failed to compile regex");

    /// `PV /dev/md0   VG vg_sdb   lvm2 [1.99 GiB / 0    free]` or, for a
    /// physical volume outside any group, `PV /dev/sdc   lvm2 [10.00 GiB]`.
    static ref PVSCAN_REGEX: Regex =
        Regex::new(r"^PV\s+(\S+)(?:\s+VG\s+(\S+))?(?:\s|$)").expect("Failed to compile regex");
}

/// Informational prefixes LVM tools print around the records.
const IGNORED_PREFIXES: [&str; 7] = [
    "Reading ",
    "No volume groups found",
    "No matching physical volumes found",
    "No physical volume",
    "Total:",
    "WARNING:",
    "Found duplicate",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VgscanLine {
    VolumeGroup(String),
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalVolume {
    /// Device path as reported, e.g. `/dev/md0`.
    pub device: String,

    /// Volume group the physical volume belongs to, if any.
    pub volume_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PvscanLine {
    PhysicalVolume(PhysicalVolume),
    Ignored,
}

fn is_ignored(line: &str) -> bool {
    line.is_empty() || IGNORED_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}

pub fn parse_vgscan_line(line: &str) -> Result<VgscanLine, Error> {
    let line = line.trim();
    if let Some(captures) = VGSCAN_FOUND_REGEX.captures(line) {
        return Ok(VgscanLine::VolumeGroup(captures[1].to_string()));
    }
    if is_ignored(line) {
        return Ok(VgscanLine::Ignored);
    }
    bail!("Unrecognized vgscan line '{line}'")
}

/// Names of the volume groups reported by `vgscan`.
pub fn parse_vgscan(output: &str) -> Result<Vec<String>, Error> {
    let mut volume_groups = Vec::new();
    for line in output.lines() {
        if let VgscanLine::VolumeGroup(name) = parse_vgscan_line(line)? {
            volume_groups.push(name);
        }
    }
    Ok(volume_groups)
}

pub fn parse_pvscan_line(line: &str) -> Result<PvscanLine, Error> {
    let line = line.trim();
    if let Some(captures) = PVSCAN_REGEX.captures(line) {
        return Ok(PvscanLine::PhysicalVolume(PhysicalVolume {
            device: captures[1].to_string(),
            volume_group: captures.get(2).map(|m| m.as_str().to_string()),
        }));
    }
    if is_ignored(line) {
        return Ok(PvscanLine::Ignored);
    }
    bail!("Unrecognized pvscan line '{line}'")
}

/// Physical volumes reported by `pvscan`.
pub fn parse_pvscan(output: &str) -> Result<Vec<PhysicalVolume>, Error> {
    let mut physical_volumes = Vec::new();
    for line in output.lines() {
        if let PvscanLine::PhysicalVolume(pv) = parse_pvscan_line(line)? {
            physical_volumes.push(pv);
        }
    }
    Ok(physical_volumes)
}

pub fn vgscan(host: &mut dyn Host) -> Result<String, Box<DependencyError>> {
    host.capture(&Dependency::Vgscan.cmd())
}

pub fn pvscan(host: &mut dyn Host) -> Result<String, Box<DependencyError>> {
    host.capture(&Dependency::Pvscan.cmd())
}

/// Activates every logical volume of a volume group.
pub fn vgchange_activate(
    host: &mut dyn Host,
    volume_group: &str,
) -> Result<(), Box<DependencyError>> {
    host.run(
        &Dependency::Vgchange
            .cmd()
            .with_args(["-a", "y", volume_group]),
    )
}

pub fn pvcreate(host: &mut dyn Host, device: &Path) -> Result<(), Box<DependencyError>> {
    host.run(&Dependency::Pvcreate.cmd().with_arg(device))
}

pub fn vgcreate(
    host: &mut dyn Host,
    volume_group: &str,
    devices: &[impl AsRef<Path>],
) -> Result<(), Box<DependencyError>> {
    host.run(
        &Dependency::Vgcreate
            .cmd()
            .with_arg(volume_group)
            .with_args(devices.iter().map(|device| device.as_ref())),
    )
}

pub fn vgextend(
    host: &mut dyn Host,
    volume_group: &str,
    device: &Path,
) -> Result<(), Box<DependencyError>> {
    host.run(
        &Dependency::Vgextend
            .cmd()
            .with_arg(volume_group)
            .with_arg(device),
    )
}

/// Creates a logical volume taking all free space of its volume group.
pub fn lvcreate_all_free(
    host: &mut dyn Host,
    volume_group: &str,
    logical_volume: &str,
) -> Result<(), Box<DependencyError>> {
    host.run(&Dependency::Lvcreate.cmd().with_args([
        "-l",
        "100%FREE",
        "-n",
        logical_volume,
        volume_group,
    ]))
}

/// Grows a logical volume over all free space of its volume group.
pub fn lvextend_all_free(host: &mut dyn Host, lv_path: &Path) -> Result<(), Box<DependencyError>> {
    host.run(
        &Dependency::Lvextend
            .cmd()
            .with_args(["-l", "+100%FREE"])
            .with_arg(lv_path),
    )
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn test_parse_vgscan() {
        let output = indoc! {r#"
              Reading all physical volumes.  This may take a while...
              Found volume group "vg_sdb" using metadata type lvm2
              Found volume group "vg_sdc" using metadata type lvm2
              Found exported volume group "backup" using metadata type lvm2
        "#};
        assert_eq!(
            parse_vgscan(output).unwrap(),
            ["vg_sdb", "vg_sdc", "backup"]
        );

        assert!(parse_vgscan("  No volume groups found\n")
            .unwrap()
            .is_empty());
        assert!(parse_vgscan("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_vgscan_rejects_unknown_lines() {
        parse_vgscan_line("Volume group vg_sdb is exported").unwrap_err();
        parse_vgscan("  Found volume group vg_sdb\n").unwrap_err();
    }

    #[test]
    fn test_parse_pvscan() {
        let output = indoc! {"
              PV /dev/md0   VG vg_sdb          lvm2 [1.99 GiB / 0    free]
              PV /dev/md1   VG vg_sdb          lvm2 [1.99 GiB / 1.99 GiB free]
              PV /dev/sdd                      lvm2 [10.00 GiB]
              Total: 3 [13.98 GiB] / in use: 2 [3.98 GiB] / in no VG: 1 [10.00 GiB]
        "};
        assert_eq!(
            parse_pvscan(output).unwrap(),
            [
                PhysicalVolume {
                    device: "/dev/md0".into(),
                    volume_group: Some("vg_sdb".into()),
                },
                PhysicalVolume {
                    device: "/dev/md1".into(),
                    volume_group: Some("vg_sdb".into()),
                },
                PhysicalVolume {
                    device: "/dev/sdd".into(),
                    volume_group: None,
                },
            ]
        );

        assert!(parse_pvscan("  No matching physical volumes found\n")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_parse_pvscan_rejects_unknown_lines() {
        assert_eq!(
            parse_pvscan_line("  WARNING: Device /dev/sdz not found").unwrap(),
            PvscanLine::Ignored
        );
        parse_pvscan_line("Physical volume /dev/md0").unwrap_err();
        parse_pvscan_line("PVX /dev/md0").unwrap_err();
    }
}
