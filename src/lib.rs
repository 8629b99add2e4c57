pub mod cli;
mod engine;
mod logging;

pub use engine::{apply, read_layout, ApplyOutcome};
pub use logging::{background_log::BackgroundLog, multilog::MultiLogger};

/// Version of the volsetup package, overridable at build time.
pub const VOLSETUP_VERSION: &str = match option_env!("VOLSETUP_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};
