use std::{
    fs::{File, OpenOptions},
    path::Path,
};

use anyhow::{Context, Error};

use crate::{
    dependencies::{Dependency, DependencyError},
    host::Host,
};

/// Opens a file for appending, creating it and all parent directories if
/// they don't exist
pub fn open_append<S>(path: S) -> Result<File, Error>
where
    S: AsRef<Path>,
{
    if let Some(parent) = path.as_ref().parent() {
        create_dirs(parent)?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_ref())
        .context(format!(
            "Could not open file for appending: {}",
            path.as_ref().display()
        ))
}

/// Creates all directories in a path if they don't exist
pub fn create_dirs<S>(path: S) -> Result<(), Error>
where
    S: AsRef<Path>,
{
    std::fs::create_dir_all(path.as_ref()).context(format!(
        "Could not create path: {}",
        path.as_ref().display()
    ))
}

/// Creates a directory and its parents on the host, succeeding if it
/// already exists.
pub fn mkdir(host: &mut dyn Host, path: impl AsRef<Path>) -> Result<(), Box<DependencyError>> {
    host.run(&Dependency::Mkdir.cmd().with_arg("-p").with_arg(path.as_ref()))
}

/// Points the symbolic link `link` at `target`, replacing a previous link.
pub fn symlink(
    host: &mut dyn Host,
    target: impl AsRef<Path>,
    link: impl AsRef<Path>,
) -> Result<(), Box<DependencyError>> {
    host.run(
        &Dependency::Ln
            .cmd()
            .with_arg("-sfn")
            .with_arg(target.as_ref())
            .with_arg(link.as_ref()),
    )
}

#[cfg(test)]
mod tests {
    use crate::testutils::MockHost;

    use super::*;

    #[test]
    fn test_open_append() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/volsetup.log");
        open_append(&path).unwrap().write_all(b"first\n").unwrap();
        open_append(&path).unwrap().write_all(b"second\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");

        open_append(dir.path()).unwrap_err();
    }

    #[test]
    fn test_mkdir_and_symlink() {
        let mut host = MockHost::new();
        mkdir(&mut host, "/mnt/logs").unwrap();
        symlink(&mut host, "/mnt/logs", "/var/log/db").unwrap();
        assert_eq!(
            host.commands(),
            ["mkdir -p /mnt/logs", "ln -sfn /mnt/logs /var/log/db"]
        );
        assert!(host.path_exists(Path::new("/mnt/logs")));
        assert!(host.path_exists(Path::new("/var/log/db")));
    }
}
