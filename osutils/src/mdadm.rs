use std::path::Path;

use log::info;

use crate::{
    dependencies::{Dependency, DependencyError},
    host::Host,
};

pub const METADATA_VERSION: &str = "1.2";

/// RAID level of every array volsetup creates.
pub const RAID_LEVEL: &str = "10";

/// Creates a RAID10 array at `raid_path` over `device_paths`.
pub fn create(
    host: &mut dyn Host,
    raid_path: &Path,
    device_paths: &[impl AsRef<Path>],
) -> Result<(), Box<DependencyError>> {
    info!(
        "Creating RAID array '{}' over {} devices",
        raid_path.display(),
        device_paths.len()
    );

    host.run(
        &Dependency::Mdadm
            .cmd()
            .with_arg("--create")
            .with_arg(raid_path)
            .with_arg(format!("--level={RAID_LEVEL}"))
            .with_arg(format!("--raid-devices={}", device_paths.len()))
            .with_args(device_paths.iter().map(|path| path.as_ref()))
            .with_arg(format!("--metadata={METADATA_VERSION}"))
            .with_arg("--run"),
    )
}

/// Scans all block devices for RAID superblocks and returns the
/// configuration lines describing the arrays found.
pub fn examine(host: &mut dyn Host) -> Result<String, Box<DependencyError>> {
    host.capture(&Dependency::Mdadm.cmd().with_args(["--examine", "--scan"]))
}

/// Assembles every array described in the mdadm configuration. Returns
/// whether mdadm reported success; mdadm fails when the arrays are already
/// running.
pub fn assemble(host: &mut dyn Host) -> Result<bool, Box<DependencyError>> {
    host.probe(&Dependency::Mdadm.cmd().with_args(["--assemble", "--scan"]))
}
