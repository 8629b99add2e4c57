use std::{
    borrow::Cow,
    ffi::{OsStr, OsString},
    io,
    os::unix::process::ExitStatusExt,
    path::PathBuf,
    process::{Command as StdCommand, ExitStatus},
};

use log::trace;
use strum_macros::IntoStaticStr;

use volsetup_api::error::{
    ExecutionEnvironmentMisconfigurationError, ServicingError, VolsetupError, VolsetupResultExt,
};

#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error("Failed to find dependency '{dependency}': {source}")]
    NotFound {
        dependency: Dependency,
        #[source]
        source: which::Error,
    },

    #[error("Failed to execute dependency '{dependency}': {inner}")]
    CouldNotExecute {
        dependency: Dependency,
        #[source]
        inner: io::Error,
    },

    #[error("Dependency '{dependency}' finished unsuccessfully: {explanation}\nCmdline: {rendered_command}\n{output}")]
    ExecutionFailed {
        dependency: Dependency,
        rendered_command: String,
        code: Option<i32>,
        signal: Option<i32>,
        stdout: String,
        stderr: String,
        explanation: String,
        output: String,
    },
}

impl From<DependencyError> for VolsetupError {
    #[track_caller]
    fn from(value: DependencyError) -> Self {
        match value {
            DependencyError::NotFound { dependency, source } => VolsetupError::with_source(
                ExecutionEnvironmentMisconfigurationError::MissingBinary {
                    binary: dependency.name().into(),
                },
                source.into(),
            ),
            DependencyError::CouldNotExecute { dependency, inner } => VolsetupError::with_source(
                ServicingError::CommandCouldNotExecute {
                    binary: dependency.name().into(),
                },
                inner.into(),
            ),
            DependencyError::ExecutionFailed {
                dependency,
                ref explanation,
                ..
            } => {
                let kind = ServicingError::CommandFailed {
                    binary: dependency.name().into(),
                    explanation: explanation.clone(),
                };
                VolsetupError::with_source(kind, value.into())
            }
        }
    }
}

pub trait DependencyResultExt<T> {
    /// Attach a context message to the error.
    fn message(self, context: impl Into<Cow<'static, str>>) -> Result<T, VolsetupError>;
}

impl<T> DependencyResultExt<T> for Result<T, Box<DependencyError>> {
    #[track_caller]
    fn message(self, context: impl Into<Cow<'static, str>>) -> Result<T, VolsetupError> {
        let result: Result<T, VolsetupError> = self.map_err(|e| (*e).into());
        result.message(context)
    }
}

/// The host binaries volsetup drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Dependency {
    Ln,
    Lvcreate,
    Lvextend,
    Mdadm,
    Mkdir,
    Mkfs,
    Mount,
    Mountpoint,
    Pvcreate,
    Pvscan,
    Resize2fs,
    Vgchange,
    Vgcreate,
    Vgextend,
    Vgscan,
    // Test dependencies
    #[cfg(test)]
    DoesNotExist,
    #[cfg(test)]
    Echo,
    #[cfg(test)]
    False,
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.into())
    }
}

impl Dependency {
    /// Name of the binary, e.g. `mdadm`.
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Resolves the binary through `$PATH`.
    pub fn path(&self) -> Result<PathBuf, Box<DependencyError>> {
        which::which(self.name()).map_err(|source| {
            Box::new(DependencyError::NotFound {
                dependency: *self,
                source,
            })
        })
    }

    /// A command running this binary without arguments.
    pub fn cmd(&self) -> Command {
        Command {
            dependency: *self,
            args: vec![],
        }
    }
}

/// A command line for one of the known dependencies. Commands are plain
/// values; a [`crate::host::Host`] decides how to execute them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    dependency: Dependency,
    args: Vec<OsString>,
}

impl Command {
    pub fn with_arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        self
    }

    pub fn dependency(&self) -> Dependency {
        self.dependency
    }

    pub fn get_args(&self) -> impl Iterator<Item = &OsStr> {
        self.args.iter().map(|arg| arg.as_os_str())
    }

    /// Whether running this command leaves the host unchanged. Read-only
    /// commands are still run on a dry run.
    pub fn is_read_only(&self) -> bool {
        match self.dependency {
            Dependency::Mountpoint | Dependency::Pvscan | Dependency::Vgscan => true,
            Dependency::Mdadm => self
                .args
                .iter()
                .any(|arg| arg == "--examine" || arg == "--detail"),
            #[cfg(test)]
            Dependency::DoesNotExist | Dependency::Echo | Dependency::False => true,
            _ => false,
        }
    }

    /// The command line as it would be typed in a shell, for logs and error
    /// reports.
    pub fn render_command(&self) -> String {
        let mut rendered = self.dependency.name().to_string();
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            rendered.push(' ');
            if arg.contains(' ') {
                rendered.push_str(&format!("'{arg}'"));
            } else {
                rendered.push_str(&arg);
            }
        }
        rendered
    }

    /// Runs the command as a process on the local machine and waits for it.
    pub fn execute(&self) -> Result<CommandOutput, Box<DependencyError>> {
        let rendered_command = self.render_command();
        trace!("Executing '{rendered_command}'");
        let output = StdCommand::new(self.dependency.path()?)
            .args(&self.args)
            .output()
            .map_err(|inner| DependencyError::CouldNotExecute {
                dependency: self.dependency,
                inner,
            })?;

        Ok(CommandOutput {
            rendered_command,
            dependency: self.dependency,
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into(),
            stderr: String::from_utf8_lossy(&output.stderr).into(),
        })
    }
}

/// Exit status and captured output of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    rendered_command: String,
    dependency: Dependency,
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    /// Builds the output of a command that was not run as a local process,
    /// e.g. one that was simulated or skipped.
    pub fn from_exit_code(
        command: &Command,
        code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            rendered_command: command.render_command(),
            dependency: command.dependency,
            status: ExitStatus::from_raw((code & 0xff) << 8),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn rendered_command(&self) -> &str {
        &self.rendered_command
    }

    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code of the process, if it exited normally
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    fn signal(&self) -> Option<i32> {
        self.status.signal()
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Both output streams, labelled, skipping empty ones.
    pub fn report(&self) -> String {
        [("stdout", &self.stdout), ("stderr", &self.stderr)]
            .into_iter()
            .filter(|(_, contents)| !contents.is_empty())
            .map(|(name, contents)| format!("{name}:\n{contents}\n"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Fails unless the process exited successfully.
    pub fn check(&self) -> Result<(), Box<DependencyError>> {
        if self.success() {
            return Ok(());
        }

        let report = self.report();
        Err(Box::new(DependencyError::ExecutionFailed {
            dependency: self.dependency,
            rendered_command: self.rendered_command.clone(),
            code: self.code(),
            signal: self.signal(),
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            explanation: self.explain_exit(),
            output: if report.is_empty() {
                "(no output collected)".into()
            } else {
                report
            },
        }))
    }

    /// Like [`CommandOutput::check`], returning stdout on success.
    pub fn check_output(self) -> Result<String, Box<DependencyError>> {
        self.check()?;
        Ok(self.stdout)
    }

    pub fn explain_exit(&self) -> String {
        match (self.code(), self.signal()) {
            (Some(code), _) => format!("exited with status: {code}"),
            (None, Some(signal)) => format!("terminated by signal: {signal}"),
            (None, None) => "exited with unknown status".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use volsetup_api::error::ErrorKind;

    use super::*;

    #[test]
    fn test_render_command() {
        assert_eq!(Dependency::Vgscan.cmd().render_command(), "vgscan");
        assert_eq!(
            Dependency::Mdadm
                .cmd()
                .with_arg("--create")
                .with_args(["/dev/md0", "--level=10"])
                .render_command(),
            "mdadm --create /dev/md0 --level=10"
        );
        assert_eq!(
            Dependency::Echo
                .cmd()
                .with_arg("Hello, world")
                .render_command(),
            "echo 'Hello, world'"
        );
    }

    #[test]
    fn test_execute() {
        let output = Dependency::Echo
            .cmd()
            .with_args(["vg_sdb", "vg_sdc"])
            .execute()
            .unwrap();
        assert!(output.success());
        assert_eq!(output.code(), Some(0));
        assert_eq!(output.signal(), None);
        assert_eq!(output.stderr(), "");
        assert_eq!(output.report(), "stdout:\nvg_sdb vg_sdc\n\n");
        assert_eq!(output.explain_exit(), "exited with status: 0");
        assert_eq!(output.check_output().unwrap(), "vg_sdb vg_sdc\n");

        let output = Dependency::False.cmd().execute().unwrap();
        assert!(!output.success());
        assert_eq!(output.code(), Some(1));
        assert_eq!(output.report(), "");
        assert_eq!(output.explain_exit(), "exited with status: 1");
        match *output.check().unwrap_err() {
            DependencyError::ExecutionFailed { ref output, .. } => {
                assert_eq!(output, "(no output collected)")
            }
            ref e => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_missing_binary() {
        let error = Dependency::DoesNotExist.cmd().execute().unwrap_err();
        assert!(matches!(*error, DependencyError::NotFound { .. }));
        assert_eq!(
            error.to_string(),
            "Failed to find dependency 'doesnotexist': cannot find binary path"
        );

        let error: VolsetupError = (*error).into();
        assert!(matches!(
            error.kind(),
            ErrorKind::ExecutionEnvironmentMisconfiguration(
                ExecutionEnvironmentMisconfigurationError::MissingBinary { .. }
            )
        ));
    }

    #[test]
    fn test_from_exit_code() {
        let command = Dependency::Mdadm.cmd().with_args(["--assemble", "--scan"]);
        let output = CommandOutput::from_exit_code(&command, 2, "", "mdadm: No arrays found\n");
        assert!(!output.success());
        assert_eq!(output.code(), Some(2));
        assert_eq!(output.report(), "stderr:\nmdadm: No arrays found\n\n");

        let error = output.check().unwrap_err();
        match *error {
            DependencyError::ExecutionFailed {
                ref rendered_command,
                ref stderr,
                ..
            } => {
                assert_eq!(rendered_command, "mdadm --assemble --scan");
                assert_eq!(stderr, "mdadm: No arrays found\n");
            }
            _ => panic!("unexpected error: {error}"),
        }

        let error = Err::<(), _>(error)
            .message("Failed to assemble arrays")
            .unwrap_err();
        assert_eq!(error.kind().to_string(), "'mdadm' exited with status: 2");
    }

    #[test]
    fn test_is_read_only() {
        assert!(Dependency::Vgscan.cmd().is_read_only());
        assert!(Dependency::Mountpoint.cmd().with_arg("-q").is_read_only());
        assert!(Dependency::Mdadm
            .cmd()
            .with_args(["--examine", "--scan"])
            .is_read_only());
        assert!(!Dependency::Mdadm
            .cmd()
            .with_args(["--assemble", "--scan"])
            .is_read_only());
        assert!(!Dependency::Mkfs.cmd().is_read_only());
    }
}
