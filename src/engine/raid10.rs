//! RAID10 mount points.
//!
//! The devices of a RAID10 entry are assembled into one or more md arrays,
//! all registered as physical volumes of the volume group `vg_<prefix>`,
//! which holds a single logical volume spanning the whole group. Each run
//! adds the declared devices that no array holds yet as a new array, so a
//! mount point grows when devices are added to its entry.
//!
//! A volume moves through these states, each consuming the previous one:
//!
//! - [`DeclaredVolume`]: the entry as written in the layout.
//! - [`DiscoveredVolume`]: the arrays and volume group found on the host.
//! - [`VerifiedVolume`]: the LVM and RAID views agree and a [`Plan`] is
//!   known. Only this state can change the host.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use log::info;

use osutils::{
    dependencies::DependencyResultExt, files, host::Host, lvm, mdadm, mkfs, mount, mountpoint,
    resize2fs,
};
use volsetup_api::{
    constants::{DEV_DIRECTORY, MD_ARRAY_PREFIX, VOLUME_GROUP_PREFIX},
    error::{InconsistentStateError, VolsetupError},
    layout::VolumeLayoutEntry,
};

use super::{dev_path, discovery::DiscoveredState, EngineContext};

/// Hands out md array paths: the lowest `/dev/mdN` that neither exists nor
/// was handed out earlier in this run.
#[derive(Debug, Default)]
pub(super) struct ArraySlots {
    reserved: BTreeSet<u32>,
}

impl ArraySlots {
    pub fn allocate(&mut self, host: &dyn Host) -> PathBuf {
        let mut number = 0;
        while self.reserved.contains(&number) || host.path_exists(&array_path(number)) {
            number += 1;
        }
        self.reserved.insert(number);
        array_path(number)
    }
}

fn array_path(number: u32) -> PathBuf {
    Path::new(DEV_DIRECTORY).join(format!("{MD_ARRAY_PREFIX}{number}"))
}

/// A RAID10 entry of the layout.
#[derive(Debug)]
pub(super) struct DeclaredVolume<'a> {
    entry: &'a VolumeLayoutEntry,
    prefix: &'a str,
}

impl<'a> DeclaredVolume<'a> {
    /// Returns `None` for entries of any other kind.
    pub fn new(entry: &'a VolumeLayoutEntry) -> Option<Self> {
        let prefix = entry.raid_prefix()?;
        Some(Self { entry, prefix })
    }

    pub fn volume_group(&self) -> String {
        format!("{VOLUME_GROUP_PREFIX}{}", self.prefix)
    }

    /// Collects the arrays holding this volume's devices and the LVM
    /// registration of its volume group.
    pub fn discover(self, state: &DiscoveredState) -> Result<DiscoveredVolume<'a>, VolsetupError> {
        let mut used = BTreeSet::new();
        let mut mds = BTreeSet::new();
        for (array, members) in &state.arrays {
            if !members
                .iter()
                .all(|member| self.entry.devices.contains(member))
            {
                continue;
            }

            for member in members {
                if !used.insert(member.clone()) {
                    return Err(VolsetupError::new(
                        InconsistentStateError::RepeatedArrayMember {
                            array: array.clone(),
                            device: member.clone(),
                        },
                    ));
                }
            }
            mds.insert(array.clone());
        }

        let volume_group = self.volume_group();
        Ok(DiscoveredVolume {
            logical: state.volume_group_exists(&volume_group),
            pvs: state.physical_volumes_of(&volume_group),
            declared: self,
            used,
            mds,
        })
    }
}

/// A RAID10 entry together with what the host already has for it.
#[derive(Debug)]
pub(super) struct DiscoveredVolume<'a> {
    declared: DeclaredVolume<'a>,

    /// Declared devices some array already holds.
    used: BTreeSet<String>,

    /// Arrays over declared devices.
    mds: BTreeSet<String>,

    /// Physical volumes of the volume group.
    pvs: BTreeSet<String>,

    /// Whether the volume group exists.
    logical: bool,
}

impl<'a> DiscoveredVolume<'a> {
    /// Checks that every array is a physical volume of the volume group and
    /// the other way around, and works out what is missing.
    pub fn verify(self) -> Result<VerifiedVolume<'a>, VolsetupError> {
        let volume_group = self.declared.volume_group();
        if self.pvs != self.mds {
            return Err(VolsetupError::new(
                InconsistentStateError::PhysicalVolumeMismatch {
                    volume_group,
                    physical_volumes: join(&self.pvs),
                    arrays: join(&self.mds),
                },
            ));
        }

        let unused = self
            .declared
            .entry
            .devices
            .iter()
            .filter(|device| !self.used.contains(*device))
            .cloned()
            .collect::<BTreeSet<_>>();

        let plan = if !unused.is_empty() {
            Plan::CreateArray {
                devices: unused.into_iter().collect(),
                extend: self.logical,
            }
        } else if self.logical {
            Plan::Complete
        } else {
            return Err(VolsetupError::new(
                InconsistentStateError::MissingVolumeGroup { volume_group },
            ));
        };

        Ok(VerifiedVolume {
            declared: self.declared,
            logical: self.logical,
            plan,
        })
    }
}

fn join(set: &BTreeSet<String>) -> String {
    set.iter().cloned().collect::<Vec<_>>().join(" ")
}

/// What a verified volume is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Plan {
    /// Every declared device is in an array and the volume group exists.
    Complete,

    /// Build a new array over `devices`. With `extend`, the array grows the
    /// existing volume group, logical volume and filesystem; otherwise it
    /// backs a new volume group and a freshly formatted logical volume.
    CreateArray { devices: Vec<String>, extend: bool },
}

/// A RAID10 entry whose host state is consistent and can be completed.
#[derive(Debug)]
pub(super) struct VerifiedVolume<'a> {
    declared: DeclaredVolume<'a>,
    logical: bool,
    plan: Plan,
}

impl VerifiedVolume<'_> {
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn entry(&self) -> &VolumeLayoutEntry {
        self.declared.entry
    }

    /// Carries out the plan and mounts the logical volume.
    pub fn setup(
        self,
        host: &mut dyn Host,
        ctx: &EngineContext,
        slots: &mut ArraySlots,
    ) -> Result<(), VolsetupError> {
        let volume_group = self.declared.volume_group();
        let logical_volume = &ctx.config.logical_volume_name;
        let lv_path = Path::new(DEV_DIRECTORY)
            .join(&volume_group)
            .join(logical_volume);
        let filesystem = ctx.config.filesystem;

        if self.logical {
            lvm::vgchange_activate(host, &volume_group)
                .message(format!("Failed to activate volume group '{volume_group}'"))?;
        }

        match self.plan {
            Plan::Complete => {
                info!("All devices of '{volume_group}' are in use");
            }
            Plan::CreateArray { devices, extend } => {
                let array = slots.allocate(host);
                let device_paths = devices.iter().map(dev_path).collect::<Vec<_>>();
                mdadm::create(host, &array, &device_paths).message(format!(
                    "Failed to create RAID array '{}'",
                    array.display()
                ))?;

                if extend {
                    info!("Extending '{volume_group}' onto '{}'", array.display());
                    lvm::pvcreate(host, &array).message(format!(
                        "Failed to create physical volume on '{}'",
                        array.display()
                    ))?;
                    lvm::vgextend(host, &volume_group, &array)
                        .message(format!("Failed to extend volume group '{volume_group}'"))?;
                    lvm::lvextend_all_free(host, &lv_path).message(format!(
                        "Failed to extend logical volume '{}'",
                        lv_path.display()
                    ))?;
                    resize2fs::run(host, &lv_path).message(format!(
                        "Failed to grow the filesystem on '{}'",
                        lv_path.display()
                    ))?;
                } else {
                    info!("Creating '{volume_group}' on '{}'", array.display());
                    lvm::vgcreate(host, &volume_group, &[&array])
                        .message(format!("Failed to create volume group '{volume_group}'"))?;
                    lvm::lvcreate_all_free(host, &volume_group, logical_volume).message(
                        format!("Failed to create logical volume '{}'", lv_path.display()),
                    )?;
                    mkfs::run(host, &lv_path, filesystem).message(format!(
                        "Failed to format '{}'",
                        lv_path.display()
                    ))?;
                }
            }
        }

        let mount_point = ctx.mount_point(self.declared.entry);
        files::mkdir(host, &mount_point).message(format!(
            "Failed to create mount point '{}'",
            mount_point.display()
        ))?;
        if mountpoint::check_is_mountpoint(host, &mount_point)
            .message("Failed to check for an existing mount")?
        {
            info!("'{}' is already mounted", mount_point.display());
            return Ok(());
        }
        mount::mount(host, &lv_path, &mount_point, filesystem).message(format!(
            "Failed to mount '{}' at '{}'",
            lv_path.display(),
            mount_point.display()
        ))
    }
}
