//! Mount points backed directly by devices or paths, without RAID: single
//! devices, symlinks and plain LVM volume groups.

use std::path::Path;

use log::info;

use osutils::{
    dependencies::DependencyResultExt,
    files,
    host::Host,
    lvm, mkfs, mount, mountpoint,
    tabfile::{self, TabFileEntry},
};
use volsetup_api::{
    constants::DEV_DIRECTORY,
    error::{InconsistentStateError, InternalError, ReportError, ServicingError, VolsetupError},
    layout::VolumeLayoutEntry,
};

use super::{dev_path, discovery::DiscoveredState, EngineContext};

/// Formats a raw device and mounts it through the mount table. Skipped when
/// the mount point is already mounted.
pub(super) fn single(
    host: &mut dyn Host,
    ctx: &EngineContext,
    entry: &VolumeLayoutEntry,
) -> Result<(), VolsetupError> {
    let mount_point = ctx.mount_point(entry);
    if is_mounted(host, &mount_point)? {
        return Ok(());
    }

    let device = dev_path(&entry.devices[0]);
    mkfs::run(host, &device, ctx.config.filesystem)
        .message(format!("Failed to format '{}'", device.display()))?;

    mount_persistently(host, ctx, &device, &mount_point)
}

/// Points the mount point at an existing directory. A mount point that
/// exists as anything but that link is left alone and reported.
pub(super) fn symlink(
    host: &mut dyn Host,
    ctx: &EngineContext,
    entry: &VolumeLayoutEntry,
) -> Result<(), VolsetupError> {
    let target = entry
        .symlink_target()
        .structured(InternalError::Internal("Symlink entry without a target"))?;
    let link = ctx.mount_point(entry);

    files::mkdir(host, target).message(format!(
        "Failed to create symlink target '{}'",
        target.display()
    ))?;

    if host.path_exists(&link) {
        return match host.read_link(&link) {
            Ok(existing) if existing == target => {
                info!("'{}' already links to '{}'", link.display(), target.display());
                Ok(())
            }
            _ => Err(VolsetupError::new(
                InconsistentStateError::MountPointNotSymlink {
                    path: link.display().to_string(),
                    target: target.display().to_string(),
                },
            )),
        };
    }

    if let Some(parent) = link.parent() {
        files::mkdir(host, parent)
            .message(format!("Failed to create '{}'", parent.display()))?;
    }
    files::symlink(host, target, &link).message(format!(
        "Failed to link '{}' to '{}'",
        link.display(),
        target.display()
    ))
}

/// Builds a volume group over the listed devices with one logical volume
/// spanning it, then formats and mounts it through the mount table. Refuses
/// to touch devices that already carry LVM metadata.
pub(super) fn plain_lvm(
    host: &mut dyn Host,
    ctx: &EngineContext,
    state: &DiscoveredState,
    entry: &VolumeLayoutEntry,
) -> Result<(), VolsetupError> {
    let (volume_group, logical_volume) = entry
        .lvm_names()
        .structured(InternalError::Internal("Plain LVM entry without volume names"))?;
    let mount_point = ctx.mount_point(entry);
    if is_mounted(host, &mount_point)? {
        return Ok(());
    }

    let devices = entry
        .block_devices()
        .iter()
        .map(dev_path)
        .collect::<Vec<_>>();
    if let Some(device) = devices.iter().find(|d| state.has_physical_volume(d)) {
        return Err(VolsetupError::new(
            InconsistentStateError::ExistingPhysicalVolume {
                device: device.display().to_string(),
            },
        ));
    }

    for device in &devices {
        lvm::pvcreate(host, device).message(format!(
            "Failed to create physical volume on '{}'",
            device.display()
        ))?;
    }
    lvm::vgcreate(host, volume_group, &devices)
        .message(format!("Failed to create volume group '{volume_group}'"))?;
    lvm::lvcreate_all_free(host, volume_group, logical_volume).message(format!(
        "Failed to create logical volume '{volume_group}/{logical_volume}'"
    ))?;

    let lv_path = Path::new(DEV_DIRECTORY)
        .join(volume_group)
        .join(logical_volume);
    mkfs::run(host, &lv_path, ctx.config.filesystem)
        .message(format!("Failed to format '{}'", lv_path.display()))?;

    mount_persistently(host, ctx, &lv_path, &mount_point)
}

fn is_mounted(host: &mut dyn Host, mount_point: &Path) -> Result<bool, VolsetupError> {
    let mounted = mountpoint::check_is_mountpoint(host, mount_point)
        .message("Failed to check for an existing mount")?;
    if mounted {
        info!("'{}' is already mounted", mount_point.display());
    }
    Ok(mounted)
}

/// Records `device` at `mount_point` in the mount table and mounts it.
fn mount_persistently(
    host: &mut dyn Host,
    ctx: &EngineContext,
    device: &Path,
    mount_point: &Path,
) -> Result<(), VolsetupError> {
    files::mkdir(host, mount_point).message(format!(
        "Failed to create mount point '{}'",
        mount_point.display()
    ))?;

    let fstab = &ctx.config.fstab_path;
    tabfile::append(
        host,
        fstab,
        &TabFileEntry::new_path(device, mount_point, ctx.config.filesystem),
    )
    .structured(ServicingError::UpdateMountTable {
        path: fstab.display().to_string(),
    })?;

    mount::mount_from_table(host, mount_point)
        .message(format!("Failed to mount '{}'", mount_point.display()))
}
