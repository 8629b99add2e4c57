use std::path::Path;

use volsetup_api::config::FileSystemType;

use crate::{
    dependencies::{Dependency, DependencyError},
    host::Host,
};

/// Mounts the block device in `path` to the directory `mount_dir`.
pub fn mount(
    host: &mut dyn Host,
    path: impl AsRef<Path>,
    mount_dir: impl AsRef<Path>,
    filesystem: FileSystemType,
) -> Result<(), Box<DependencyError>> {
    host.run(
        &Dependency::Mount
            .cmd()
            .with_arg("-t")
            .with_arg(filesystem.to_string())
            .with_arg(path.as_ref())
            .with_arg(mount_dir.as_ref()),
    )
}

/// Mounts `mount_dir` as described by its mount table entry.
pub fn mount_from_table(
    host: &mut dyn Host,
    mount_dir: impl AsRef<Path>,
) -> Result<(), Box<DependencyError>> {
    host.run(&Dependency::Mount.cmd().with_arg(mount_dir.as_ref()))
}
