use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
    time::Duration,
};

use clap::{Parser, Subcommand};
use log::LevelFilter;

use volsetup_api::config::VolsetupConfig;

use crate::VOLSETUP_VERSION;

#[derive(Parser, Debug)]
#[clap(version = VOLSETUP_VERSION)]
pub struct Cli {
    /// Logging verbosity [OFF, ERROR, WARN, INFO, DEBUG, TRACE]
    #[arg(global = true, short, long, default_value_t = LevelFilter::Debug)]
    pub verbosity: LevelFilter,

    /// Agent configuration file. Defaults to /etc/volsetup/config.yaml when
    /// it exists.
    #[arg(global = true, short, long)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Assemble, format and mount the volumes of the pending layout
    Apply {
        /// Layout to apply instead of the configured one
        #[clap(index = 1)]
        layout: Option<PathBuf>,

        /// Directory every mount point is resolved under
        #[clap(long)]
        mount_root: Option<PathBuf>,

        /// Give up when devices are still missing after this long (e.g. "5m")
        #[clap(long, value_parser = humantime::parse_duration)]
        device_timeout: Option<Duration>,

        /// Inspect the host but only log the changes that would be made
        #[clap(long)]
        dry_run: bool,
    },

    /// Check a layout without touching the host
    Validate {
        /// Layout to validate instead of the configured one
        #[clap(index = 1)]
        layout: Option<PathBuf>,
    },

    /// Print the effective configuration
    #[clap(name = "show-config")]
    ShowConfig,
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Apply { .. } => "apply",
            Commands::Validate { .. } => "validate",
            Commands::ShowConfig => "show-config",
        }
    }

    /// Applies the command line overrides to `config`.
    pub fn override_config(&self, config: &mut VolsetupConfig) {
        match self {
            Commands::Apply {
                layout,
                mount_root,
                device_timeout,
                ..
            } => {
                if let Some(layout) = layout {
                    config.layout_path = layout.clone();
                }
                if let Some(mount_root) = mount_root {
                    config.mount_root = mount_root.clone();
                }
                if device_timeout.is_some() {
                    config.device_wait_timeout = *device_timeout;
                }
            }
            Commands::Validate {
                layout: Some(layout),
            } => config.layout_path = layout.clone(),
            Commands::Validate { layout: None } | Commands::ShowConfig => {}
        }
    }
}

impl Display for Commands {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_overrides() {
        let cli = Cli::parse_from([
            "volsetup",
            "apply",
            "/tmp/volumes",
            "--mount-root",
            "/home/databases",
            "--device-timeout",
            "5m",
            "--dry-run",
        ]);
        assert!(matches!(cli.command, Commands::Apply { dry_run: true, .. }));
        assert_eq!(cli.command.to_string(), "apply");

        let mut config = VolsetupConfig::default();
        cli.command.override_config(&mut config);
        assert_eq!(config.layout_path, Path::new("/tmp/volumes"));
        assert_eq!(config.mount_root, Path::new("/home/databases"));
        assert_eq!(config.device_wait_timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_defaults_untouched() {
        let cli = Cli::parse_from(["volsetup", "-v", "info", "validate"]);
        assert_eq!(cli.verbosity, LevelFilter::Info);
        assert_eq!(cli.config, None);

        let mut config = VolsetupConfig::default();
        cli.command.override_config(&mut config);
        assert_eq!(config, VolsetupConfig::default());
    }
}
