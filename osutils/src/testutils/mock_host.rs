use std::{
    collections::{BTreeMap, BTreeSet},
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    dependencies::{Command, CommandOutput, Dependency, DependencyError},
    host::Host,
};

/// Scripted result of a command, keyed by its rendered command line.
#[derive(Debug, Clone)]
struct Response {
    code: i32,
    stdout: String,
    stderr: String,
}

/// An in-memory host. It records every command and simulates the effects
/// the engine relies on:
///
/// - `mountpoint -q <dir>` succeeds iff `<dir>` was mounted.
/// - `mount ... <dir>` mounts `<dir>`.
/// - `mdadm --create <array>` and `mkdir -p <dir>` make their path exist.
/// - `ln -sfn <target> <link>` makes `<link>` a symlink to `<target>`.
///
/// Any other command succeeds with no output unless a response was
/// scripted for it.
#[derive(Debug, Default)]
pub struct MockHost {
    commands: Vec<Command>,
    responses: BTreeMap<String, Response>,
    paths: BTreeSet<PathBuf>,
    delayed_paths: BTreeMap<PathBuf, usize>,
    files: BTreeMap<PathBuf, String>,
    symlinks: BTreeMap<PathBuf, PathBuf>,
    mounts: BTreeSet<PathBuf>,
    sleeps: Vec<Duration>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(path.into());
        self
    }

    pub fn with_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Makes `path` appear after the host slept `sleeps` times.
    pub fn with_delayed_path(mut self, path: impl Into<PathBuf>, sleeps: usize) -> Self {
        self.delayed_paths.insert(path.into(), sleeps);
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }

    pub fn with_symlink(mut self, link: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        self.symlinks.insert(link.into(), target.into());
        self
    }

    pub fn with_mount(mut self, mount_point: impl Into<PathBuf>) -> Self {
        self.mounts.insert(mount_point.into());
        self
    }

    /// Scripts a successful command printing `stdout`.
    pub fn with_output(mut self, rendered_command: &str, stdout: impl Into<String>) -> Self {
        self.responses.insert(
            rendered_command.into(),
            Response {
                code: 0,
                stdout: stdout.into(),
                stderr: String::new(),
            },
        );
        self
    }

    /// Scripts a command that exits with status 1 printing `stderr`.
    pub fn with_failure(mut self, rendered_command: &str, stderr: impl Into<String>) -> Self {
        self.responses.insert(
            rendered_command.into(),
            Response {
                code: 1,
                stdout: String::new(),
                stderr: stderr.into(),
            },
        );
        self
    }

    /// Rendered command lines of every command run so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.iter().map(Command::render_command).collect()
    }

    /// Like [`MockHost::commands`], leaving out the read-only ones.
    pub fn mutating_commands(&self) -> Vec<String> {
        self.commands
            .iter()
            .filter(|command| !command.is_read_only())
            .map(Command::render_command)
            .collect()
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<&str> {
        self.files.get(path.as_ref()).map(String::as_str)
    }

    pub fn is_mounted(&self, mount_point: impl AsRef<Path>) -> bool {
        self.mounts.contains(mount_point.as_ref())
    }

    pub fn sleeps(&self) -> &[Duration] {
        &self.sleeps
    }

    fn simulate(&mut self, command: &Command) -> Response {
        let args: Vec<PathBuf> = command.get_args().map(PathBuf::from).collect();
        let mut code = 0;
        match command.dependency() {
            Dependency::Mountpoint => {
                if !args.last().is_some_and(|dir| self.mounts.contains(dir)) {
                    code = 32;
                }
            }
            Dependency::Mount => {
                if let Some(dir) = args.last() {
                    self.mounts.insert(dir.clone());
                }
            }
            Dependency::Mdadm if args.first().is_some_and(|arg| arg == Path::new("--create")) => {
                if let Some(array) = args.get(1) {
                    self.paths.insert(array.clone());
                }
            }
            Dependency::Mkdir => {
                if let Some(path) = args.last() {
                    self.paths.insert(path.clone());
                }
            }
            Dependency::Ln => {
                if let [.., target, link] = args.as_slice() {
                    self.symlinks.insert(link.clone(), target.clone());
                }
            }
            _ => {}
        }

        Response {
            code,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

impl Host for MockHost {
    fn output(&mut self, command: &Command) -> Result<CommandOutput, Box<DependencyError>> {
        self.commands.push(command.clone());
        let response = match self.responses.get(&command.render_command()) {
            Some(response) => response.clone(),
            None => self.simulate(command),
        };
        Ok(CommandOutput::from_exit_code(
            command,
            response.code,
            response.stdout,
            response.stderr,
        ))
    }

    fn path_exists(&self, path: &Path) -> bool {
        self.paths.contains(path)
            || self.files.contains_key(path)
            || self.symlinks.contains_key(path)
            || self
                .delayed_paths
                .get(path)
                .is_some_and(|sleeps| *sleeps <= self.sleeps.len())
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )
        })
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        self.symlinks.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a symlink", path.display()),
            )
        })
    }

    fn append_to_file(&mut self, path: &Path, contents: &str) -> io::Result<()> {
        self.files
            .entry(path.to_path_buf())
            .or_default()
            .push_str(contents);
        Ok(())
    }

    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        let contents = self.files.remove(from).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", from.display()),
            )
        })?;
        self.files.insert(to.to_path_buf(), contents);
        Ok(())
    }

    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
    }
}
