use std::{fs::File, io::Write, path::Path, sync::Mutex};

use log::{LevelFilter, Log, Metadata, Record};

use osutils::files;

use super::LogEntry;

/// Audit log of `apply` runs: every record is appended to a file as one JSON
/// line, so the history of earlier runs is kept.
pub struct BackgroundLog {
    file: Mutex<File>,
    max_level: LevelFilter,
}

impl BackgroundLog {
    pub fn open(path: impl AsRef<Path>, max_level: LevelFilter) -> Result<Self, std::io::Error> {
        Ok(Self {
            file: Mutex::new(
                files::open_append(path.as_ref())
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?,
            ),
            max_level,
        })
    }
}

impl Log for BackgroundLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        let Ok(mut line) = serde_json::to_string(&LogEntry::from(record)) else {
            return;
        };
        line.push('\n');

        // A lost audit line must not fail the run
        if let Ok(mut file) = self.file.lock() {
            let _ = file.write_all(line.as_bytes());
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use log::Level;
    use tempfile::tempdir;

    use osutils::{dependencies::Dependency, host::Host, testutils::MockHost};

    use crate::logging::multilog::MultiLogger;

    use super::*;

    fn read_entries(path: &Path) -> Vec<LogEntry> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_filter() {
        let test_dir = tempdir().unwrap();
        let logger = BackgroundLog::open(test_dir.path().join("volsetup.log"), LevelFilter::Debug)
            .unwrap();

        assert!(logger.enabled(&Metadata::builder().level(Level::Debug).build()));
        assert!(!logger.enabled(&Metadata::builder().level(Level::Trace).build()));
    }

    #[test]
    fn test_open_directory() {
        let test_dir = tempdir().unwrap();
        assert!(BackgroundLog::open(test_dir.path(), LevelFilter::Debug).is_err());
    }

    #[test]
    fn test_keeps_earlier_runs() {
        let test_dir = tempdir().unwrap();
        let target = test_dir.path().join("log/volsetup.log");

        for (level, message) in [(Level::Info, "first run"), (Level::Warn, "second run")] {
            let logger = BackgroundLog::open(&target, LevelFilter::Debug).unwrap();
            logger.log(
                &Record::builder()
                    .args(format_args!("{message}"))
                    .level(level)
                    .target("volsetup")
                    .build(),
            );
            logger.flush();
        }

        let entries = read_entries(&target);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "first run");
        assert_eq!(entries[1].message, "second run");
        assert_eq!(entries[1].level, "warn");
        assert!(entries[0].timestamp <= entries[1].timestamp);
    }

    /// Installs the process-wide logger, so it is the only test that may.
    #[test]
    fn test_audit_records_command_output() {
        let test_dir = tempdir().unwrap();
        let target = test_dir.path().join("volsetup.log");
        MultiLogger::new()
            .with_max_level(LevelFilter::Debug)
            .with_logger(Box::new(
                BackgroundLog::open(&target, LevelFilter::Debug).unwrap(),
            ))
            .init()
            .unwrap();

        let mut host = MockHost::new().with_output(
            "mdadm --create /dev/md0 --level=10",
            "mdadm: array /dev/md0 started.\n",
        );
        host.run(
            &Dependency::Mdadm
                .cmd()
                .with_args(["--create", "/dev/md0", "--level=10"]),
        )
        .unwrap();
        log::logger().flush();

        let entries = read_entries(&target);
        assert!(entries.iter().any(|entry| entry.level == "info"
            && entry.message == "Running 'mdadm --create /dev/md0 --level=10'"));
        assert!(entries.iter().any(|entry| entry.level == "debug"
            && entry.target == "osutils::host"
            && entry
                .message
                .contains("exited with status: 0. Output:\nstdout:\nmdadm: array /dev/md0 started.")));
    }
}
