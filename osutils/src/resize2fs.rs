use std::path::Path;

use crate::{
    dependencies::{Dependency, DependencyError},
    host::Host,
};

/// Resize ext* filesystem on the specified block device to fill the entire device.
pub fn run(host: &mut dyn Host, block_device_path: &Path) -> Result<(), Box<DependencyError>> {
    host.run(&Dependency::Resize2fs.cmd().with_arg(block_device_path))
}
