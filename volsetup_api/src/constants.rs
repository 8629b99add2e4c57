use const_format::formatcp;

// Configuration constants

/// Directory holding the agent configuration and the layout description.
pub const VOLSETUP_CONFIG_DIRECTORY: &str = "/etc/volsetup";

/// Path to load the agent config from.
pub const AGENT_CONFIG_PATH: &str = formatcp!("{VOLSETUP_CONFIG_DIRECTORY}/config.yaml");

/// Default location of the volume layout description.
pub const LAYOUT_PATH_DEFAULT: &str = formatcp!("{VOLSETUP_CONFIG_DIRECTORY}/volumes");

/// Suffix appended to the layout description once it has been applied.
pub const LAYOUT_ARCHIVE_SUFFIX_DEFAULT: &str = ".applied";

/// Default JSON-lines audit log.
pub const VOLSETUP_LOG_PATH_DEFAULT: &str = "/var/log/volsetup.log";

// Host paths

/// Root mount point path.
pub const ROOT_MOUNT_POINT_PATH: &str = "/";

/// Directory holding block device nodes.
pub const DEV_DIRECTORY: &str = "/dev";

/// RAID status table exposed by the md driver.
pub const PROC_MDSTAT_PATH: &str = "/proc/mdstat";

/// mdadm configuration file, extended with arrays found on attached devices.
pub const MDADM_CONFIG_PATH: &str = "/etc/mdadm.conf";

/// Persistent mount table.
pub const FSTAB_PATH: &str = "/etc/fstab";

// Naming

/// Prefix of the volume group backing a RAID10 entry, followed by the shared
/// device prefix (e.g. `vg_sdb`).
pub const VOLUME_GROUP_PREFIX: &str = "vg_";

/// Default name of the logical volume created inside each RAID10 volume group.
pub const LOGICAL_VOLUME_NAME_DEFAULT: &str = "data";

/// Number of leading characters of a device name that identify its group.
pub const DEVICE_PREFIX_LENGTH: usize = 3;

/// Device name prefix of md arrays (`md0`, `md1`, ...).
pub const MD_ARRAY_PREFIX: &str = "md";

// Timing

/// Default delay between two checks for attaching devices.
pub const DEVICE_POLL_INTERVAL_DEFAULT: &str = "100ms";

/// How often the device wait reports the devices it is still waiting for.
pub const DEVICE_WAIT_REPORT_INTERVAL_SECS: u64 = 10;
