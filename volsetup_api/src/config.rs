use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, IntoStaticStr};

use crate::{
    constants::{
        AGENT_CONFIG_PATH, DEVICE_POLL_INTERVAL_DEFAULT, FSTAB_PATH, LAYOUT_ARCHIVE_SUFFIX_DEFAULT,
        LAYOUT_PATH_DEFAULT, LOGICAL_VOLUME_NAME_DEFAULT, MDADM_CONFIG_PATH, PROC_MDSTAT_PATH,
        ROOT_MOUNT_POINT_PATH, VOLSETUP_LOG_PATH_DEFAULT,
    },
    error::{InvalidInputError, ReportError, VolsetupError},
};

/// Filesystems volsetup can create on new volumes. Volumes are grown with
/// `resize2fs`, so only the ext family is supported.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FileSystemType {
    Ext2,
    #[default]
    Ext3,
    Ext4,
}

/// Agent configuration, read from [`AGENT_CONFIG_PATH`] when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct VolsetupConfig {
    /// Layout description to apply.
    pub layout_path: PathBuf,

    /// Suffix appended to the layout description once it has been applied.
    pub archive_suffix: String,

    /// Directory every mount point of the layout is resolved under.
    pub mount_root: PathBuf,

    /// Filesystem created on new volumes.
    pub filesystem: FileSystemType,

    /// Name of the logical volume inside each RAID10 volume group.
    pub logical_volume_name: String,

    pub mdadm_config_path: PathBuf,

    pub mdstat_path: PathBuf,

    pub fstab_path: PathBuf,

    /// Delay between checks for devices that are still attaching.
    #[serde(with = "humantime_duration")]
    pub device_poll_interval: Duration,

    /// Give up waiting for devices after this long. Waits forever when unset.
    #[serde(
        with = "humantime_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub device_wait_timeout: Option<Duration>,

    /// JSON-lines audit log of every apply run.
    pub log_path: PathBuf,
}

impl Default for VolsetupConfig {
    fn default() -> Self {
        Self {
            layout_path: LAYOUT_PATH_DEFAULT.into(),
            archive_suffix: LAYOUT_ARCHIVE_SUFFIX_DEFAULT.into(),
            mount_root: ROOT_MOUNT_POINT_PATH.into(),
            filesystem: FileSystemType::default(),
            logical_volume_name: LOGICAL_VOLUME_NAME_DEFAULT.into(),
            mdadm_config_path: MDADM_CONFIG_PATH.into(),
            mdstat_path: PROC_MDSTAT_PATH.into(),
            fstab_path: FSTAB_PATH.into(),
            device_poll_interval: humantime::parse_duration(DEVICE_POLL_INTERVAL_DEFAULT)
                .unwrap_or(Duration::from_millis(100)),
            device_wait_timeout: None,
            log_path: VOLSETUP_LOG_PATH_DEFAULT.into(),
        }
    }
}

impl VolsetupConfig {
    /// Loads the configuration at `path`, or the defaults when `path` is
    /// `None` and nothing exists at [`AGENT_CONFIG_PATH`].
    pub fn load(path: Option<&Path>) -> Result<Self, VolsetupError> {
        let path = match path {
            Some(path) => path,
            None if Path::new(AGENT_CONFIG_PATH).exists() => Path::new(AGENT_CONFIG_PATH),
            None => return Ok(Self::default()),
        };

        let contents =
            std::fs::read_to_string(path).structured(InvalidInputError::LoadConfiguration {
                path: path.display().to_string(),
            })?;

        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, VolsetupError> {
        let config: Self =
            serde_yaml::from_str(contents).structured(InvalidInputError::ParseConfiguration)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values serde can't. The device wait only makes progress
    /// towards its timeout by sleeping, so the poll interval can't be zero.
    pub fn validate(&self) -> Result<(), VolsetupError> {
        if self.device_poll_interval.is_zero() {
            return Err(VolsetupError::new(
                InvalidInputError::ZeroDevicePollInterval,
            ));
        }
        Ok(())
    }

    /// Resolves a layout mount point under the configured mount root.
    pub fn resolve_mount_point(&self, mount_point: &Path) -> PathBuf {
        self.mount_root
            .join(mount_point.strip_prefix(ROOT_MOUNT_POINT_PATH).unwrap_or(mount_point))
    }

    /// Path of the layout description once it has been archived.
    pub fn archived_layout_path(&self) -> PathBuf {
        let mut archived = self.layout_path.clone().into_os_string();
        archived.push(&self.archive_suffix);
        archived.into()
    }
}

mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let value = String::deserialize(deserializer)?;
        humantime::parse_duration(&value).map_err(serde::de::Error::custom)
    }
}

mod humantime_duration_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(duration) => super::humantime_duration::serialize(duration, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|value| humantime::parse_duration(&value).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::error::ErrorKind;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = VolsetupConfig::parse("{}").unwrap();
        assert_eq!(config, VolsetupConfig::default());
        assert_eq!(config.filesystem, FileSystemType::Ext3);
        assert_eq!(config.device_poll_interval, Duration::from_millis(100));
        assert_eq!(config.device_wait_timeout, None);
        assert_eq!(config.logical_volume_name, "data");
    }

    #[test]
    fn test_parse() {
        let config = VolsetupConfig::parse(indoc! {"
            layoutPath: /tmp/volumes
            mountRoot: /home/databases
            filesystem: ext4
            devicePollInterval: 2s
            deviceWaitTimeout: 10m
        "})
        .unwrap();

        assert_eq!(config.layout_path, PathBuf::from("/tmp/volumes"));
        assert_eq!(config.filesystem, FileSystemType::Ext4);
        assert_eq!(config.device_poll_interval, Duration::from_secs(2));
        assert_eq!(config.device_wait_timeout, Some(Duration::from_secs(600)));
        assert_eq!(
            config.resolve_mount_point(Path::new("/data")),
            PathBuf::from("/home/databases/data")
        );
        assert_eq!(
            config.archived_layout_path(),
            PathBuf::from("/tmp/volumes.applied")
        );
    }

    #[test]
    fn test_parse_rejects_unknown_fields() {
        let error = VolsetupConfig::parse("mountPoint: /data\n").unwrap_err();
        assert!(matches!(
            error.kind(),
            ErrorKind::InvalidInput(InvalidInputError::ParseConfiguration)
        ));

        let error = VolsetupConfig::parse("devicePollInterval: soon\n").unwrap_err();
        assert!(matches!(
            error.kind(),
            ErrorKind::InvalidInput(InvalidInputError::ParseConfiguration)
        ));
    }

    #[test]
    fn test_parse_rejects_zero_poll_interval() {
        let error = VolsetupConfig::parse(indoc! {"
            devicePollInterval: 0s
            deviceWaitTimeout: 1s
        "})
        .unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::InvalidInput(InvalidInputError::ZeroDevicePollInterval)
        );

        let config = VolsetupConfig {
            device_poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(VolsetupConfig::default().validate().is_ok());
    }

    #[test]
    fn test_resolve_mount_point_default_root() {
        let config = VolsetupConfig::default();
        assert_eq!(
            config.resolve_mount_point(Path::new("/data")),
            PathBuf::from("/data")
        );
    }

    #[test]
    fn test_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "archiveSuffix: .done\n").unwrap();

        let config = VolsetupConfig::load(Some(&path)).unwrap();
        assert_eq!(config.archive_suffix, ".done");

        let error = VolsetupConfig::load(Some(&dir.path().join("missing.yaml"))).unwrap_err();
        assert!(matches!(
            error.kind(),
            ErrorKind::InvalidInput(InvalidInputError::LoadConfiguration { .. })
        ));
    }

    #[test]
    fn test_serialize_roundtrip_durations() {
        let config = VolsetupConfig {
            device_wait_timeout: Some(Duration::from_secs(90)),
            ..Default::default()
        };
        let rendered = serde_yaml::to_string(&config).unwrap();
        assert!(rendered.contains("devicePollInterval: 100ms"));
        assert!(rendered.contains("deviceWaitTimeout: 1m 30s"));
        assert_eq!(VolsetupConfig::parse(&rendered).unwrap(), config);
    }
}
