use std::path::Path;

use crate::{
    dependencies::{Dependency, DependencyError},
    host::Host,
};

/// Checks whether `path` is a mount point. A path that does not exist is not
/// a mount point.
pub fn check_is_mountpoint(
    host: &mut dyn Host,
    path: impl AsRef<Path>,
) -> Result<bool, Box<DependencyError>> {
    host.probe(
        &Dependency::Mountpoint
            .cmd()
            .with_arg("-q")
            .with_arg(path.as_ref()),
    )
}
