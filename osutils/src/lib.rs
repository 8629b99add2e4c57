pub mod dependencies;
pub mod files;
pub mod host;
pub mod lvm;
pub mod mdadm;
pub mod mdstat;
pub mod mkfs;
pub mod mount;
pub mod mountpoint;
pub mod resize2fs;
pub mod tabfile;

#[cfg(any(test, feature = "test-utilities"))]
pub mod testutils;
