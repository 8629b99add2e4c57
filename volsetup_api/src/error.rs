use std::fmt::{Debug, Write};
use std::{borrow::Cow, panic::Location};

use serde::{ser::SerializeStruct, Deserialize, Serialize};
use strum_macros::IntoStaticStr;

use crate::layout::InvalidLayoutError;

/// The execution environment is missing something volsetup needs to run.
#[derive(Debug, Clone, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionEnvironmentMisconfigurationError {
    #[error("Required binary '{binary}' was not found")]
    MissingBinary { binary: String },
    #[error("Applying a volume layout requires root privileges")]
    MissingRequiredPermissions,
}

/// User provided input was invalid.
#[derive(Debug, Clone, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidInputError {
    #[error("Failed to load configuration file from '{path}'")]
    LoadConfiguration { path: String },
    #[error("Failed to parse configuration")]
    ParseConfiguration,
    #[error("Device poll interval must be longer than zero")]
    ZeroDevicePollInterval,
    #[error("Failed to read volume layout from '{path}'")]
    ReadLayout { path: String },
    #[error("Invalid volume layout: {0}")]
    InvalidLayout(#[from] InvalidLayoutError),
}

/// The state found on the host disagrees with the declared layout or with
/// itself. Reconciliation refuses to guess in these cases.
#[derive(Debug, Clone, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum InconsistentStateError {
    #[error("Failed to parse RAID status table")]
    ParseRaidStatus,
    #[error("RAID array '{array}' has a failed member '{device}'")]
    FailedArrayMember { array: String, device: String },
    #[error("Unexpected volume in RAID array '{array}': {devices}")]
    UnexpectedArrayMember { array: String, devices: String },
    #[error("RAID array '{array}' is '{status}' instead of active")]
    ArrayNotActive { array: String, status: String },
    #[error("RAID array '{array}' has level '{level}' instead of raid10")]
    UnexpectedRaidLevel { array: String, level: String },
    #[error("RAID array '{array}' spans devices of more than one volume: {devices}")]
    ArraySpansVolumes { array: String, devices: String },
    #[error("Device '{device}' of RAID array '{array}' is already part of another array")]
    RepeatedArrayMember { array: String, device: String },
    #[error("Failed to parse output of '{command}'")]
    ParseLvmOutput { command: String },
    #[error(
        "Physical volumes of '{volume_group}' ({physical_volumes}) don't match the RAID arrays found ({arrays})"
    )]
    PhysicalVolumeMismatch {
        volume_group: String,
        physical_volumes: String,
        arrays: String,
    },
    #[error("All devices of '{volume_group}' are in use but the volume group does not exist")]
    MissingVolumeGroup { volume_group: String },
    #[error("Device '{device}' already carries a physical volume signature")]
    ExistingPhysicalVolume { device: String },
    #[error("'{path}' exists but is not a symlink to '{target}'")]
    MountPointNotSymlink { path: String, target: String },
    #[error("Timed out waiting for devices to attach: {devices}")]
    DeviceWaitTimeout { devices: String },
}

/// A step of the reconciliation failed while changing the host.
#[derive(Debug, Clone, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ServicingError {
    #[error("Failed to execute '{binary}'")]
    CommandCouldNotExecute { binary: String },
    #[error("'{binary}' {explanation}")]
    CommandFailed { binary: String, explanation: String },
    #[error("Failed to read '{path}'")]
    ReadHostFile { path: String },
    #[error("Failed to record examined arrays in '{path}'")]
    RecordArrays { path: String },
    #[error("Failed to update mount table '{path}'")]
    UpdateMountTable { path: String },
    #[error("Failed to archive volume layout '{path}'")]
    ArchiveLayout { path: String },
}

#[derive(Debug, Clone, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum InternalError {
    #[error("Internal error: {0}")]
    Internal(&'static str),
    #[error("Panic: {0}")]
    Panic(String),
    #[error("Failed to serialize output")]
    Serialize,
}

/// Each variant of `ErrorKind` corresponds to a different category of error.
#[derive(Debug, Clone, Eq, thiserror::Error, IntoStaticStr, PartialEq)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    /// volsetup failed to run because the execution environment was
    /// misconfigured.
    #[error(transparent)]
    ExecutionEnvironmentMisconfiguration(#[from] ExecutionEnvironmentMisconfigurationError),

    /// volsetup was provided an invalid layout or configuration. Nothing on
    /// the host has been changed.
    #[error(transparent)]
    InvalidInput(#[from] InvalidInputError),

    /// The host state disagrees with the layout. Nothing was changed by the
    /// step that detected it; an operator has to look at the machine.
    #[error(transparent)]
    InconsistentState(#[from] InconsistentStateError),

    /// A command or file operation failed while changing the host. Re-running
    /// resumes from whatever state the host is in.
    #[error(transparent)]
    Servicing(#[from] ServicingError),

    /// A bug was encountered.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

#[derive(Debug)]
struct VolsetupErrorInner {
    kind: ErrorKind,
    location: &'static Location<'static>,
    source: Option<anyhow::Error>,
    context: Vec<(Cow<'static, str>, &'static Location<'static>)>,
}

pub struct VolsetupError(Box<VolsetupErrorInner>);
impl VolsetupError {
    #[track_caller]
    pub fn new(kind: impl Into<ErrorKind>) -> Self {
        VolsetupError(Box::new(VolsetupErrorInner {
            kind: kind.into(),
            location: Location::caller(),
            source: None,
            context: Vec::new(),
        }))
    }

    #[track_caller]
    pub fn with_source(kind: impl Into<ErrorKind>, source: anyhow::Error) -> Self {
        VolsetupError(Box::new(VolsetupErrorInner {
            kind: kind.into(),
            location: Location::caller(),
            source: Some(source),
            context: Vec::new(),
        }))
    }

    #[track_caller]
    pub fn internal(message: &'static str) -> Self {
        Self::new(InternalError::Internal(message))
    }

    /// Returns a reference to the inner ErrorKind.
    pub fn kind(&self) -> &ErrorKind {
        &self.0.kind
    }
}

pub trait ReportError<T, K> {
    /// Convert this error into a structured VolsetupError.
    fn structured(self, kind: K) -> Result<T, VolsetupError>;
}

impl<T, K> ReportError<T, K> for Option<T>
where
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, VolsetupError> {
        match self {
            Some(t) => Ok(t),
            None => Err(VolsetupError(Box::new(VolsetupErrorInner {
                kind: kind.into(),
                location: Location::caller(),
                source: None,
                context: Vec::new(),
            }))),
        }
    }
}

impl<T, E, K> ReportError<T, K> for Result<T, E>
where
    E: Into<anyhow::Error>,
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, VolsetupError> {
        match self {
            Ok(o) => Ok(o),
            Err(e) => Err(VolsetupError(Box::new(VolsetupErrorInner {
                kind: kind.into(),
                location: Location::caller(),
                source: Some(e.into()),
                context: Vec::new(),
            }))),
        }
    }
}

pub trait VolsetupResultExt<T> {
    /// Attach a context message to the error.
    fn message(self, context: impl Into<Cow<'static, str>>) -> Result<T, VolsetupError>;
}

impl<T> VolsetupResultExt<T> for Result<T, VolsetupError> {
    #[track_caller]
    fn message(mut self, context: impl Into<Cow<'static, str>>) -> Result<T, VolsetupError> {
        if let Err(ref mut e) = self {
            e.0.context.push((context.into(), Location::caller()));
        }
        self
    }
}

impl Serialize for VolsetupError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("volsetup-error", 5)?;
        state.serialize_field("message", &self.0.kind.to_string())?;
        match self.0.kind {
            ErrorKind::ExecutionEnvironmentMisconfiguration(ref e) => {
                state.serialize_field("error", e)?
            }
            ErrorKind::InvalidInput(ref e) => state.serialize_field("error", e)?,
            ErrorKind::InconsistentState(ref e) => state.serialize_field("error", e)?,
            ErrorKind::Servicing(ref e) => state.serialize_field("error", e)?,
            ErrorKind::Internal(ref e) => state.serialize_field("error", e)?,
        }
        state.serialize_field("category", <&str>::from(&self.0.kind))?;
        state.serialize_field(
            "location",
            &format!("{}:{}", self.0.location.file(), self.0.location.line()),
        )?;
        match self.0.source {
            Some(ref e) => state.serialize_field("cause", &Some(format!("{:?}", e)))?,
            None => state.serialize_field("cause", &None::<String>)?,
        }
        state.end()
    }
}

impl Debug for VolsetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at {}:{}",
            self.0.kind,
            self.0.location.file(),
            self.0.location.line()
        )?;

        if !self.0.context.is_empty() {
            writeln!(f, "\n\nContext:")?;
            for (i, (context, location)) in self.0.context.iter().enumerate() {
                for (j, line) in context.split('\n').enumerate() {
                    if j == 0 {
                        write!(f, "{: >5}: ", i)?;
                    } else {
                        f.write_str("\n       ")?;
                    }
                    f.write_str(line)?;
                }
                writeln!(f, " at {}:{}", location.file(), location.line())?;
            }
        }

        if let Some(ref source) = self.0.source {
            writeln!(f, "\n\nCaused by:")?;
            let mut index = 0;
            let mut source: Option<&dyn std::error::Error> = Some(source.as_ref());
            while let Some(e) = source {
                for (i, line) in e.to_string().split('\n').enumerate() {
                    if i == 0 {
                        write!(f, "{: >5}: ", index)?;
                    } else {
                        f.write_str("\n       ")?;
                    }
                    f.write_str(line)?;
                }
                f.write_char('\n')?;
                source = e.source();
                index += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;
    use serde_yaml::Value;

    use super::*;

    #[test]
    fn test_error_serialize() {
        let e = VolsetupError(Box::new(VolsetupErrorInner {
            kind: ErrorKind::InvalidInput(InvalidInputError::ParseConfiguration),
            location: Location::caller(),
            source: Some(
                std::fs::read("/non-existant-file")
                    .context("failed to read file")
                    .unwrap_err(),
            ),
            context: Vec::new(),
        }));
        match serde_yaml::to_value(e).unwrap() {
            Value::Mapping(m) => {
                assert_eq!(m.len(), 5);
                assert_eq!(m["error"], Value::String("parse-configuration".into()));
                assert_eq!(m["category"], Value::String("invalid-input".into()));
                assert!(matches!(m["cause"], Value::String(_)));
                assert_eq!(
                    m["message"],
                    Value::String("Failed to parse configuration".into())
                );
                match m["location"] {
                    Value::String(ref s) => assert!(s.contains("error.rs:")),
                    _ => panic!("location isn't string"),
                }
            }
            _ => panic!("value isn't mapping"),
        }
    }

    #[test]
    fn test_error_serialize_struct_variant() {
        let e = VolsetupError::new(InconsistentStateError::MissingVolumeGroup {
            volume_group: "vg_sdb".into(),
        });
        match serde_yaml::to_value(e).unwrap() {
            Value::Mapping(m) => {
                assert_eq!(m["category"], Value::String("inconsistent-state".into()));
                assert_eq!(m["cause"], Value::Null);
                assert_eq!(
                    m["message"],
                    Value::String(
                        "All devices of 'vg_sdb' are in use but the volume group does not exist"
                            .into()
                    )
                );
            }
            _ => panic!("value isn't mapping"),
        }
    }

    #[test]
    fn test_error_debug() {
        let error = Err::<(), _>(anyhow::anyhow!("z"))
            .context("x\ny")
            .structured(InternalError::Internal("w"))
            .unwrap_err();
        assert_eq!(
            format!("{:?}", error),
            format!(
                "Internal error: w at {}:{}\n\nCaused by:\n    0: x\n       y\n    1: z\n",
                error.0.location.file(),
                error.0.location.line(),
            ),
        );
    }

    #[test]
    fn test_error_message_context() {
        let error = Err::<(), _>(VolsetupError::new(ServicingError::UpdateMountTable {
            path: "/etc/fstab".into(),
        }))
        .message("Failed to reconcile '/data'")
        .unwrap_err();
        let rendered = format!("{:?}", error);
        assert!(rendered.starts_with("Failed to update mount table '/etc/fstab' at "));
        assert!(rendered.contains("Context:\n    0: Failed to reconcile '/data' at "));
        assert!(matches!(
            error.kind(),
            ErrorKind::Servicing(ServicingError::UpdateMountTable { .. })
        ));
    }

    #[test]
    fn test_option_structured() {
        let error = None::<()>
            .structured(InternalError::Internal("missing"))
            .unwrap_err();
        assert_eq!(error.kind().to_string(), "Internal error: missing");
        assert_eq!(Some(3).structured(InternalError::Serialize).unwrap(), 3);
    }
}
