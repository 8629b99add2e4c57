use log::{LevelFilter, Log, Metadata, Record};

/// Fans every log record out to a set of loggers.
pub struct MultiLogger {
    loggers: Vec<Box<dyn Log>>,
    max_level: LevelFilter,
}

impl Default for MultiLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiLogger {
    pub fn new() -> Self {
        Self {
            loggers: Vec::new(),
            max_level: LevelFilter::Trace,
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn Log>) -> Self {
        self.loggers.push(logger);
        self
    }

    /// Drops records above `max_level` before any logger sees them.
    pub fn with_max_level(mut self, max_level: LevelFilter) -> Self {
        self.max_level = max_level;
        self
    }

    pub fn init(self) -> Result<(), log::SetLoggerError> {
        log::set_max_level(self.max_level);
        log::set_boxed_logger(Box::new(self))
    }
}

impl Log for MultiLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level && self.loggers.iter().any(|l| l.enabled(metadata))
    }

    fn log(&self, record: &Record) {
        if record.level() > self.max_level {
            return;
        }

        self.loggers
            .iter()
            .filter(|l| l.enabled(record.metadata()))
            .for_each(|l| l.log(record));
    }

    fn flush(&self) {
        self.loggers.iter().for_each(|l| l.flush());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use log::Level;

    use super::*;

    /// Remembers the messages it was handed.
    #[derive(Default)]
    struct RecordingLogger {
        enabled: bool,
        messages: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingLogger {
        fn new(enabled: bool) -> (Box<Self>, Arc<Mutex<Vec<String>>>) {
            let logger = Self {
                enabled,
                ..Default::default()
            };
            let messages = logger.messages.clone();
            (Box::new(logger), messages)
        }
    }

    impl Log for RecordingLogger {
        fn enabled(&self, _: &Metadata) -> bool {
            self.enabled
        }

        fn log(&self, record: &Record) {
            self.messages
                .lock()
                .unwrap()
                .push(record.args().to_string());
        }

        fn flush(&self) {}
    }

    #[test]
    fn test_enabled() {
        let (stderr, _) = RecordingLogger::new(false);
        let (audit, _) = RecordingLogger::new(false);
        let multi_logger = MultiLogger::new().with_logger(stderr).with_logger(audit);
        assert!(!multi_logger.enabled(&Metadata::builder().level(Level::Error).build()));

        let (stderr, _) = RecordingLogger::new(false);
        let (audit, _) = RecordingLogger::new(true);
        let multi_logger = MultiLogger::new()
            .with_logger(stderr)
            .with_logger(audit)
            .with_max_level(LevelFilter::Info);
        assert!(multi_logger.enabled(&Metadata::builder().level(Level::Error).build()));
        assert!(!multi_logger.enabled(&Metadata::builder().level(Level::Debug).build()));
    }

    #[test]
    fn test_fan_out() {
        let (stderr, stderr_messages) = RecordingLogger::new(true);
        let (audit, audit_messages) = RecordingLogger::new(false);
        let multi_logger = MultiLogger::new()
            .with_logger(stderr)
            .with_logger(audit)
            .with_max_level(LevelFilter::Info);

        for (level, message) in [(Level::Info, "Volume layout applied"), (Level::Debug, "Plan")] {
            multi_logger.log(
                &Record::builder()
                    .level(level)
                    .target("volsetup")
                    .args(format_args!("{message}"))
                    .build(),
            );
        }

        assert_eq!(*stderr_messages.lock().unwrap(), ["Volume layout applied"]);
        assert!(audit_messages.lock().unwrap().is_empty());
    }
}
