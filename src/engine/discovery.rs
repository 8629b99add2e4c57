use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
    time::Duration,
};

use log::{debug, info, warn};

use osutils::{
    dependencies::DependencyResultExt,
    host::Host,
    lvm::{self, PhysicalVolume},
    mdadm, mdstat,
};
use volsetup_api::{
    constants::{DEVICE_WAIT_REPORT_INTERVAL_SECS, DEV_DIRECTORY},
    error::{InconsistentStateError, ReportError, ServicingError, VolsetupError},
    layout::VolumeKind,
};

use super::{dev_path, EngineContext};

/// What the host already has, as far as the layout is concerned. Built once
/// per run, before anything is changed.
#[derive(Debug, Default)]
pub(super) struct DiscoveredState {
    /// RAID arrays holding declared devices, by array id (`md0`), with the
    /// names of their member devices.
    pub arrays: BTreeMap<String, BTreeSet<String>>,

    /// Every volume group LVM reports.
    pub volume_groups: BTreeSet<String>,

    /// Every physical volume LVM reports.
    pub physical_volumes: Vec<PhysicalVolume>,
}

impl DiscoveredState {
    pub fn volume_group_exists(&self, volume_group: &str) -> bool {
        self.volume_groups.contains(volume_group)
    }

    /// Devices registered as physical volumes of `volume_group`, relative
    /// to `/dev` (e.g. `md0`).
    pub fn physical_volumes_of(&self, volume_group: &str) -> BTreeSet<String> {
        self.physical_volumes
            .iter()
            .filter(|pv| pv.volume_group.as_deref() == Some(volume_group))
            .map(|pv| {
                Path::new(&pv.device)
                    .strip_prefix(DEV_DIRECTORY)
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_else(|_| pv.device.clone())
            })
            .collect()
    }

    /// Whether `device` already carries an LVM physical volume signature.
    pub fn has_physical_volume(&self, device: &Path) -> bool {
        self.physical_volumes
            .iter()
            .any(|pv| Path::new(&pv.device) == device)
    }
}

/// Blocks until every device named by the layout exists. Devices may still
/// be attaching right after boot.
pub(super) fn wait_for_devices(
    host: &mut dyn Host,
    ctx: &EngineContext,
) -> Result<(), VolsetupError> {
    let devices = ctx.layout.expected_devices();
    let poll_interval = ctx.config.device_poll_interval;
    let report_interval = Duration::from_secs(DEVICE_WAIT_REPORT_INTERVAL_SECS);

    let mut waited = Duration::ZERO;
    let mut next_report = Duration::ZERO;
    loop {
        let missing = devices
            .iter()
            .filter(|device| !host.path_exists(&dev_path(device)))
            .map(String::as_str)
            .collect::<Vec<_>>();

        if missing.is_empty() {
            if !waited.is_zero() {
                info!(
                    "All {} devices attached after {}",
                    devices.len(),
                    humantime::format_duration(waited)
                );
            }
            return Ok(());
        }

        if let Some(timeout) = ctx.config.device_wait_timeout {
            if waited >= timeout {
                return Err(VolsetupError::new(
                    InconsistentStateError::DeviceWaitTimeout {
                        devices: missing.join(" "),
                    },
                ));
            }
        }

        if waited >= next_report {
            info!("Waiting for devices to attach: {}", missing.join(" "));
            next_report += report_interval;
        }

        host.sleep(poll_interval);
        waited += poll_interval;
    }
}

/// Makes arrays created on a previous machine visible: records the arrays
/// found on the attached devices in the mdadm configuration, then assembles
/// everything it describes.
pub(super) fn assemble_previous_arrays(
    host: &mut dyn Host,
    ctx: &EngineContext,
) -> Result<(), VolsetupError> {
    let config_path = &ctx.config.mdadm_config_path;

    let mut examined =
        mdadm::examine(host).message("Failed to examine devices for RAID superblocks")?;
    if !examined.trim().is_empty() {
        if !examined.ends_with('\n') {
            examined.push('\n');
        }
        host.append_to_file(config_path, &examined)
            .structured(ServicingError::RecordArrays {
                path: config_path.display().to_string(),
            })?;
    }

    let recorded = if host.path_exists(config_path) {
        host.read_to_string(config_path)
            .structured(ServicingError::ReadHostFile {
                path: config_path.display().to_string(),
            })?
    } else {
        String::new()
    };

    if recorded.trim().is_empty() {
        debug!("No RAID arrays recorded, skipping assembly");
        return Ok(());
    }

    if !mdadm::assemble(host).message("Failed to assemble RAID arrays")? {
        // mdadm also fails when the arrays are running already
        warn!("RAID assembly reported a failure, continuing with the arrays that are running");
    }

    Ok(())
}

/// Reads the RAID status table and the LVM state of the host.
pub(super) fn discover(
    host: &mut dyn Host,
    ctx: &EngineContext,
) -> Result<DiscoveredState, VolsetupError> {
    let arrays = discover_arrays(host, ctx)?;

    let output = lvm::vgscan(host).message("Failed to scan for volume groups")?;
    let volume_groups = lvm::parse_vgscan(&output)
        .structured(InconsistentStateError::ParseLvmOutput {
            command: "vgscan".into(),
        })?
        .into_iter()
        .collect();

    let output = lvm::pvscan(host).message("Failed to scan for physical volumes")?;
    let physical_volumes =
        lvm::parse_pvscan(&output).structured(InconsistentStateError::ParseLvmOutput {
            command: "pvscan".into(),
        })?;

    let state = DiscoveredState {
        arrays,
        volume_groups,
        physical_volumes,
    };
    debug!("Discovered state: {state:?}");
    Ok(state)
}

fn discover_arrays(
    host: &mut dyn Host,
    ctx: &EngineContext,
) -> Result<BTreeMap<String, BTreeSet<String>>, VolsetupError> {
    let mdstat_path = &ctx.config.mdstat_path;
    let contents = if host.path_exists(mdstat_path) {
        host.read_to_string(mdstat_path)
            .structured(ServicingError::ReadHostFile {
                path: mdstat_path.display().to_string(),
            })?
    } else {
        debug!("'{}' does not exist, no RAID arrays", mdstat_path.display());
        String::new()
    };

    let expected = ctx.layout.expected_devices();
    let mut related = BTreeMap::new();
    for array in mdstat::parse(&contents).structured(InconsistentStateError::ParseRaidStatus)? {
        if let Some(member) = array.failed_members().next() {
            return Err(VolsetupError::new(
                InconsistentStateError::FailedArrayMember {
                    array: array.name.clone(),
                    device: member.name.clone(),
                },
            ));
        }

        let members = array
            .member_names()
            .map(str::to_string)
            .collect::<BTreeSet<_>>();
        if members.is_disjoint(&expected) {
            info!(
                "Skipping RAID array '{}', none of its devices are in the layout",
                array.name
            );
            continue;
        }

        let unexpected = members.difference(&expected).cloned().collect::<Vec<_>>();
        if !unexpected.is_empty() {
            return Err(VolsetupError::new(
                InconsistentStateError::UnexpectedArrayMember {
                    array: array.name,
                    devices: unexpected.join(" "),
                },
            ));
        }

        if !array.is_active() {
            return Err(VolsetupError::new(InconsistentStateError::ArrayNotActive {
                array: array.name,
                status: array.status,
            }));
        }

        if array.level.as_deref() != Some("raid10") {
            return Err(VolsetupError::new(
                InconsistentStateError::UnexpectedRaidLevel {
                    array: array.name,
                    level: array.level.unwrap_or_else(|| "none".into()),
                },
            ));
        }

        // Every member must belong to the same RAID10 mount point
        let owned = ctx.layout.entries.iter().any(|entry| {
            entry.kind == VolumeKind::Raid10
                && members.iter().all(|member| entry.devices.contains(member))
        });
        if !owned {
            return Err(VolsetupError::new(
                InconsistentStateError::ArraySpansVolumes {
                    array: array.name,
                    devices: members.into_iter().collect::<Vec<_>>().join(" "),
                },
            ));
        }

        debug!("Found RAID array '{}' over {:?}", array.name, members);
        related.insert(array.name, members);
    }

    Ok(related)
}
