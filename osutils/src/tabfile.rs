use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use log::{debug, info};

use volsetup_api::{config::FileSystemType, constants::ROOT_MOUNT_POINT_PATH};

use crate::host::Host;

/// A representation of a single entry in a tab file.
#[derive(Debug, PartialEq, Eq)]
pub struct TabFileEntry {
    pub device: PathBuf,
    pub mount_point: PathBuf,
    pub fs_type: FileSystemType,
}

impl TabFileEntry {
    /// Create a new regular entry for a block device mounted at a path.
    pub fn new_path(
        device: impl Into<PathBuf>,
        mount_point: impl Into<PathBuf>,
        fs_type: FileSystemType,
    ) -> Self {
        Self {
            device: device.into(),
            mount_point: mount_point.into(),
            fs_type,
        }
    }

    /// Render this entry as a string suitable for writing to a tab file.
    pub fn render(&self) -> String {
        // fsck pass is 1 for root, 2 for everything else
        let fsck_pass = if self.mount_point == Path::new(ROOT_MOUNT_POINT_PATH) {
            1
        } else {
            2
        };

        format!(
            "{} {} {} defaults 0 {}\n",
            self.device.display(),
            self.mount_point.display(),
            self.fs_type,
            fsck_pass,
        )
    }
}

/// Mount points of the entries of a tab file, skipping comments and blank
/// lines.
pub fn mount_points(contents: &str) -> impl Iterator<Item = &str> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_whitespace().nth(1))
}

/// Appends `entry` to the tab file at `tab_file_path` unless the file
/// already has an entry for the same mount point. Returns whether the entry
/// was appended.
pub fn append(
    host: &mut dyn Host,
    tab_file_path: &Path,
    entry: &TabFileEntry,
) -> Result<bool, Error> {
    let contents = if host.path_exists(tab_file_path) {
        host.read_to_string(tab_file_path)
            .with_context(|| format!("Failed to read {}", tab_file_path.display()))?
    } else {
        String::new()
    };

    if mount_points(&contents).any(|mount_point| Path::new(mount_point) == entry.mount_point) {
        debug!(
            "'{}' already has an entry for '{}'",
            tab_file_path.display(),
            entry.mount_point.display()
        );
        return Ok(false);
    }

    let rendered = entry.render();
    info!(
        "Adding '{}' to '{}'",
        rendered.trim_end(),
        tab_file_path.display()
    );

    // The last line may not be terminated
    let mut line = String::new();
    if !contents.is_empty() && !contents.ends_with('\n') {
        line.push('\n');
    }
    line.push_str(&rendered);
    host.append_to_file(tab_file_path, &line)
        .with_context(|| format!("Failed to append to {}", tab_file_path.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::testutils::MockHost;

    use super::*;

    #[test]
    fn test_render() {
        let entry = TabFileEntry::new_path("/dev/sdb1", "/data", FileSystemType::Ext3);
        assert_eq!(entry.render(), "/dev/sdb1 /data ext3 defaults 0 2\n");

        let entry = TabFileEntry::new_path("/dev/sda1", "/", FileSystemType::Ext4);
        assert_eq!(entry.render(), "/dev/sda1 / ext4 defaults 0 1\n");
    }

    #[test]
    fn test_mount_points() {
        let contents = indoc! {"
            # /etc/fstab
            UUID=1234 / ext4 defaults 0 1

            /dev/sdb1\t/data\text3\tdefaults\t0 2
            tmpfs /tmp tmpfs defaults 0 0
        "};
        assert_eq!(
            mount_points(contents).collect::<Vec<_>>(),
            ["/", "/data", "/tmp"]
        );
    }

    #[test]
    fn test_append() {
        let fstab = Path::new("/etc/fstab");
        let mut host = MockHost::new().with_file(fstab, "UUID=1234 / ext4 defaults 0 1\n");
        let entry = TabFileEntry::new_path("/dev/sdb1", "/data", FileSystemType::Ext3);

        assert!(append(&mut host, fstab, &entry).unwrap());
        assert!(!append(&mut host, fstab, &entry).unwrap());
        assert_eq!(
            host.file(fstab).unwrap(),
            "UUID=1234 / ext4 defaults 0 1\n/dev/sdb1 /data ext3 defaults 0 2\n"
        );

        // A missing tab file is created
        let other = Path::new("/etc/fstab.d/volsetup");
        assert!(append(&mut host, other, &entry).unwrap());
        assert_eq!(
            host.file(other).unwrap(),
            "/dev/sdb1 /data ext3 defaults 0 2\n"
        );
    }

    #[test]
    fn test_append_unterminated_last_line() {
        let fstab = Path::new("/etc/fstab");
        let mut host = MockHost::new().with_file(fstab, "UUID=1234 / ext4 defaults 0 1");
        let entry = TabFileEntry::new_path("/dev/sdb1", "/data", FileSystemType::Ext3);

        assert!(append(&mut host, fstab, &entry).unwrap());
        let contents = host.file(fstab).unwrap();
        assert_eq!(
            contents,
            "UUID=1234 / ext4 defaults 0 1\n/dev/sdb1 /data ext3 defaults 0 2\n"
        );
        assert_eq!(mount_points(contents).collect::<Vec<_>>(), ["/", "/data"]);
        assert!(!append(&mut host, fstab, &entry).unwrap());
    }
}
