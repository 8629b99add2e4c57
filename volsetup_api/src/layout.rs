//! The declarative volume layout consumed by `volsetup apply`.
//!
//! A layout is a plain text file with one mount per line:
//!
//! ```text
//! <mount_point> <device-or-volume> [<device> ...]
//! ```
//!
//! The shape of the device list decides how the mount point is backed; see
//! [`VolumeKind`].

use std::{
    collections::{BTreeSet, HashSet},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, IntoStaticStr};

use crate::constants::DEVICE_PREFIX_LENGTH;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidLayoutError {
    #[error("Line {line}: mount point '{mount_point}' has no devices")]
    MissingDevices { line: usize, mount_point: String },
    #[error("Line {line}: mount point '{mount_point}' is not an absolute path")]
    RelativeMountPoint { line: usize, mount_point: String },
    #[error("Duplicate mount point '{mount_point}'")]
    DuplicateMountPoint { mount_point: String },
    #[error("Mount point '{parent}' is a prefix of mount point '{child}'")]
    NestedMountPoints { parent: String, child: String },
    #[error("Devices of mount point '{mount_point}' don't share a common prefix: {devices}")]
    MixedDevicePrefixes { mount_point: String, devices: String },
    #[error("Line {line}: invalid device name '{device}'")]
    InvalidDeviceName { line: usize, device: String },
    #[error("Device '{device}' is used by more than one mount point")]
    DuplicateDevice { device: String },
    #[error("Device prefix '{prefix}' is used by more than one RAID10 mount point")]
    DuplicateDevicePrefix { prefix: String },
    #[error("Line {line}: invalid logical volume name '{name}', expected '<group>/<volume>'")]
    InvalidVolumeName { line: usize, name: String },
}

/// How a mount point is backed, derived from the shape of its device list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum VolumeKind {
    /// A single raw block device, formatted and mounted directly.
    Single,

    /// A single absolute path; the mount point becomes a symlink to it.
    Symlink,

    /// `<group>/<volume>` followed by the physical volumes of a plain LVM
    /// volume group.
    PlainLvm,

    /// Devices sharing a 3-character prefix, assembled into RAID10 arrays
    /// under the volume group `vg_<prefix>`.
    Raid10,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeLayoutEntry {
    /// 1-based line of the entry in the layout file.
    pub line: usize,
    pub mount_point: PathBuf,
    pub devices: Vec<String>,
    pub kind: VolumeKind,
}

impl VolumeLayoutEntry {
    fn classify(
        line: usize,
        mount_point: &str,
        devices: Vec<String>,
    ) -> Result<Self, InvalidLayoutError> {
        if !mount_point.starts_with('/') {
            return Err(InvalidLayoutError::RelativeMountPoint {
                line,
                mount_point: mount_point.into(),
            });
        }

        let kind = match devices.as_slice() {
            [] => {
                return Err(InvalidLayoutError::MissingDevices {
                    line,
                    mount_point: mount_point.into(),
                })
            }
            [target] if target.starts_with('/') => VolumeKind::Symlink,
            [_] => VolumeKind::Single,
            [first, ..] if first.contains('/') => VolumeKind::PlainLvm,
            _ => VolumeKind::Raid10,
        };

        let entry = Self {
            line,
            mount_point: mount_point.into(),
            devices,
            kind,
        };
        entry.validate_devices()?;
        Ok(entry)
    }

    fn validate_devices(&self) -> Result<(), InvalidLayoutError> {
        if let VolumeKind::PlainLvm = self.kind {
            if self.lvm_names().is_none() {
                return Err(InvalidLayoutError::InvalidVolumeName {
                    line: self.line,
                    name: self.devices[0].clone(),
                });
            }
        }

        for device in self.block_devices() {
            let too_short =
                self.kind == VolumeKind::Raid10 && device.len() < DEVICE_PREFIX_LENGTH;
            if device.contains('/') || !device.is_ascii() || too_short {
                return Err(InvalidLayoutError::InvalidDeviceName {
                    line: self.line,
                    device: device.clone(),
                });
            }
        }

        if let Some(prefix) = self.raid_prefix() {
            if self.devices.iter().any(|d| !d.starts_with(prefix)) {
                return Err(InvalidLayoutError::MixedDevicePrefixes {
                    mount_point: self.mount_point.display().to_string(),
                    devices: self.devices.join(" "),
                });
            }
        }

        Ok(())
    }

    /// The shared device prefix of a RAID10 entry, e.g. `sdb` for
    /// `sdb1 sdb2 sdb3 sdb4`.
    pub fn raid_prefix(&self) -> Option<&str> {
        match self.kind {
            VolumeKind::Raid10 => self.devices.first().map(|d| &d[..DEVICE_PREFIX_LENGTH]),
            _ => None,
        }
    }

    /// The `(volume group, logical volume)` pair of a plain LVM entry.
    pub fn lvm_names(&self) -> Option<(&str, &str)> {
        match self.kind {
            VolumeKind::PlainLvm => match self.devices.first()?.split_once('/') {
                Some((group, volume))
                    if !group.is_empty() && !volume.is_empty() && !volume.contains('/') =>
                {
                    Some((group, volume))
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// The path a symlink entry points to.
    pub fn symlink_target(&self) -> Option<&Path> {
        match self.kind {
            VolumeKind::Symlink => self.devices.first().map(Path::new),
            _ => None,
        }
    }

    /// Names of the block devices (relative to `/dev`) this entry consumes.
    pub fn block_devices(&self) -> &[String] {
        match self.kind {
            VolumeKind::Single | VolumeKind::Raid10 => &self.devices,
            VolumeKind::PlainLvm => &self.devices[1..],
            VolumeKind::Symlink => &[],
        }
    }
}

/// A parsed and validated volume layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VolumeLayout {
    pub entries: Vec<VolumeLayoutEntry>,
}

impl VolumeLayout {
    /// Parses a layout description. Blank lines and lines starting with `#`
    /// are ignored.
    pub fn parse(contents: &str) -> Result<Self, InvalidLayoutError> {
        let entries = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| {
                let trimmed = line.trim();
                !trimmed.is_empty() && !trimmed.starts_with('#')
            })
            .map(|(index, line)| {
                let mut tokens = line.split_whitespace();
                // Non-blank lines always have a first token
                let mount_point = tokens.next().unwrap_or_default();
                let devices = tokens.map(Into::into).collect();
                VolumeLayoutEntry::classify(index + 1, mount_point, devices)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let layout = Self { entries };
        layout.validate()?;
        Ok(layout)
    }

    fn validate(&self) -> Result<(), InvalidLayoutError> {
        let mut mount_points: Vec<&Path> =
            self.entries.iter().map(|e| &*e.mount_point).collect();
        mount_points.sort();

        for (i, mount_point) in mount_points.iter().enumerate() {
            for other in &mount_points[i + 1..] {
                if mount_point == other {
                    return Err(InvalidLayoutError::DuplicateMountPoint {
                        mount_point: mount_point.display().to_string(),
                    });
                }
                // Component-wise, so '/data' does not prefix '/database'
                if other.starts_with(mount_point) {
                    return Err(InvalidLayoutError::NestedMountPoints {
                        parent: mount_point.display().to_string(),
                        child: other.display().to_string(),
                    });
                }
            }
        }

        let mut devices = HashSet::new();
        for device in self.entries.iter().flat_map(|e| e.block_devices()) {
            if !devices.insert(device) {
                return Err(InvalidLayoutError::DuplicateDevice {
                    device: device.clone(),
                });
            }
        }

        let mut prefixes = HashSet::new();
        for prefix in self.entries.iter().filter_map(|e| e.raid_prefix()) {
            if !prefixes.insert(prefix) {
                return Err(InvalidLayoutError::DuplicateDevicePrefix {
                    prefix: prefix.into(),
                });
            }
        }

        Ok(())
    }

    /// Every block device named by any entry. These must all be attached
    /// before reconciliation starts.
    pub fn expected_devices(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .flat_map(|e| e.block_devices())
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
