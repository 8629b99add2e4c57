use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub(super) mod background_log;
pub(super) mod multilog;

/// One line of the audit log.
#[derive(Debug, Serialize, Deserialize)]
struct LogEntry {
    timestamp: DateTime<Utc>,
    level: String,
    target: String,
    message: String,
}

impl From<&log::Record<'_>> for LogEntry {
    fn from(record: &log::Record) -> Self {
        Self {
            timestamp: Utc::now(),
            level: record.level().as_str().to_lowercase(),
            target: record.target().to_string(),
            message: record.args().to_string(),
        }
    }
}
