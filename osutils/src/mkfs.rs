use std::path::Path;

use volsetup_api::config::FileSystemType;

use crate::{
    dependencies::{Dependency, DependencyError},
    host::Host,
};

/// Formats `device_path` with `filesystem`.
pub fn run(
    host: &mut dyn Host,
    device_path: &Path,
    filesystem: FileSystemType,
) -> Result<(), Box<DependencyError>> {
    host.run(
        &Dependency::Mkfs
            .cmd()
            .with_arg("--type")
            .with_arg(filesystem.to_string())
            .with_arg(device_path),
    )
}
