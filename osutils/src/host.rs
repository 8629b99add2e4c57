//! The capabilities the reconciliation engine needs from the machine it runs
//! on. Everything that observes or changes the host goes through [`Host`], so
//! the engine can be driven against a simulated machine in tests.

use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use log::{debug, info};

use crate::dependencies::{Command, CommandOutput, DependencyError};

pub trait Host {
    /// Executes a command and returns its output, whatever the exit status.
    fn output(&mut self, command: &Command) -> Result<CommandOutput, Box<DependencyError>>;

    fn path_exists(&self, path: &Path) -> bool;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Where the symlink at `path` points. Fails when `path` is not a
    /// symlink.
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Appends to a file, creating it if needed.
    fn append_to_file(&mut self, path: &Path, contents: &str) -> io::Result<()>;

    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()>;

    fn sleep(&mut self, duration: Duration);

    /// Runs a command, failing on a nonzero exit status.
    fn run(&mut self, command: &Command) -> Result<(), Box<DependencyError>> {
        info!("Running '{}'", command.render_command());
        echo(self.output(command)?).check()
    }

    /// Runs a command and returns its stdout, failing on a nonzero exit
    /// status.
    fn capture(&mut self, command: &Command) -> Result<String, Box<DependencyError>> {
        debug!("Querying '{}'", command.render_command());
        echo(self.output(command)?).check_output()
    }

    /// Runs a command whose exit status is the answer to a question. A
    /// nonzero exit status is a negative answer, not an error.
    fn probe(&mut self, command: &Command) -> Result<bool, Box<DependencyError>> {
        debug!("Probing '{}'", command.render_command());
        Ok(echo(self.output(command)?).success())
    }
}

/// Logs how a command ended and what it printed, for the audit trail.
fn echo(output: CommandOutput) -> CommandOutput {
    let report = output.report();
    if report.is_empty() {
        debug!("'{}' {}", output.rendered_command(), output.explain_exit());
    } else {
        debug!(
            "'{}' {}. Output:\n{}",
            output.rendered_command(),
            output.explain_exit(),
            report.trim_end()
        );
    }
    output
}

/// The machine volsetup is running on.
#[derive(Debug, Default)]
pub struct LocalHost;

impl Host for LocalHost {
    fn output(&mut self, command: &Command) -> Result<CommandOutput, Box<DependencyError>> {
        command.execute()
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::read_link(path)
    }

    fn append_to_file(&mut self, path: &Path, contents: &str) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(contents.as_bytes())?;
        file.flush()
    }

    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Observes the local machine for real but only reports the changes it would
/// make.
#[derive(Debug, Default)]
pub struct DryRunHost {
    inner: LocalHost,
}

impl Host for DryRunHost {
    fn output(&mut self, command: &Command) -> Result<CommandOutput, Box<DependencyError>> {
        if command.is_read_only() {
            return self.inner.output(command);
        }

        info!("Dry run, skipping '{}'", command.render_command());
        Ok(CommandOutput::from_exit_code(command, 0, "", ""))
    }

    fn path_exists(&self, path: &Path) -> bool {
        self.inner.path_exists(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.inner.read_to_string(path)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        self.inner.read_link(path)
    }

    fn append_to_file(&mut self, path: &Path, contents: &str) -> io::Result<()> {
        info!(
            "Dry run, not appending to '{}':\n{}",
            path.display(),
            contents.trim_end()
        );
        Ok(())
    }

    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        info!(
            "Dry run, not renaming '{}' to '{}'",
            from.display(),
            to.display()
        );
        Ok(())
    }

    fn sleep(&mut self, duration: Duration) {
        self.inner.sleep(duration);
    }
}
