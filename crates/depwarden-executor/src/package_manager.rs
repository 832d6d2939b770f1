use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};
use wait_timeout::ChildExt;

pub const DEFAULT_PROGRAM: &str = "poetry";

/// The package-manager operations the executor drives.
pub trait PackageManager {
    /// Upgrades `package` to `target_version`, or to the newest version its
    /// declared constraint admits when no target is given.
    fn upgrade(&self, package: &str, target_version: Option<&str>) -> Result<(), CommandFailure>;

    /// The installed version, or `None` when it cannot be determined.
    fn installed_version(&self, package: &str) -> Option<String>;

    /// Validates the lockfile against the dependency declarations.
    fn check(&self) -> Result<(), CommandFailure>;

    /// Reinstalls the environment from the current lockfile.
    fn reinstall(&self) -> Result<(), CommandFailure>;
}

#[derive(Debug, Error)]
pub enum CommandFailure {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed waiting for '{command}': {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("{operation} timed out after {}", describe_timeout(.timeout))]
    TimedOut {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("'{command}' exited with status {code}: {stderr}")]
    Exited {
        command: String,
        code: i32,
        stderr: String,
    },
}

impl CommandFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

fn describe_timeout(timeout: &Duration) -> String {
    let secs = timeout.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        let minutes = secs / 60;
        if minutes == 1 {
            "1 minute".to_string()
        } else {
            format!("{minutes} minutes")
        }
    } else if secs >= 1 && timeout.subsec_nanos() == 0 {
        format!("{secs} seconds")
    } else {
        format!("{} ms", timeout.as_millis())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTimeouts {
    pub upgrade: Duration,
    pub version_query: Duration,
    pub check: Duration,
    pub reinstall: Duration,
}

impl Default for CommandTimeouts {
    fn default() -> Self {
        Self {
            upgrade: Duration::from_secs(300),
            version_query: Duration::from_secs(30),
            check: Duration::from_secs(60),
            reinstall: Duration::from_secs(600),
        }
    }
}

/// Drives a poetry-compatible command line tool as a subprocess rooted at
/// the project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliPackageManager {
    program: String,
    base_args: Vec<String>,
    project_root: PathBuf,
    timeouts: CommandTimeouts,
}

impl CliPackageManager {
    pub fn new(program: impl Into<String>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            project_root: project_root.into(),
            timeouts: CommandTimeouts::default(),
        }
    }

    pub fn poetry(project_root: impl Into<PathBuf>) -> Self {
        Self::new(DEFAULT_PROGRAM, project_root)
    }

    /// Arguments placed before every subcommand, e.g. `-m poetry` when the
    /// program is a Python interpreter.
    pub fn with_base_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeouts(mut self, timeouts: CommandTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn timeouts(&self) -> &CommandTimeouts {
        &self.timeouts
    }

    fn run(
        &self,
        args: &[String],
        operation: &'static str,
        timeout: Duration,
    ) -> Result<String, CommandFailure> {
        let command_line = self.render_command(args);
        info!("Executing: {command_line}");

        let mut child = Command::new(&self.program)
            .args(&self.base_args)
            .args(args)
            .current_dir(&self.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandFailure::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().map(drain_pipe);
        let stderr = child.stderr.take().map(drain_pipe);

        let status = match child.wait_timeout(timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                // Grandchildren may still hold the pipes open, so the reader
                // threads are left to finish on their own.
                return Err(CommandFailure::TimedOut { operation, timeout });
            }
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CommandFailure::Wait {
                    command: command_line,
                    source,
                });
            }
        };

        let stdout = join_pipe(stdout);
        let stderr = join_pipe(stderr);
        for line in stderr.lines().filter(|line| !line.trim().is_empty()) {
            debug!("[{}] {line}", self.program);
        }

        if status.success() {
            Ok(stdout)
        } else {
            Err(CommandFailure::Exited {
                command: command_line,
                code: status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            })
        }
    }

    fn render_command(&self, args: &[String]) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.base_args.iter().map(String::as_str))
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl PackageManager for CliPackageManager {
    fn upgrade(&self, package: &str, target_version: Option<&str>) -> Result<(), CommandFailure> {
        let args = match target_version {
            Some(version) => vec!["add".to_string(), format!("{package}@{version}")],
            None => vec!["update".to_string(), package.to_string()],
        };
        self.run(&args, "Upgrade", self.timeouts.upgrade).map(|_| ())
    }

    fn installed_version(&self, package: &str) -> Option<String> {
        let args = ["show".to_string(), package.to_string()];
        match self.run(&args, "Version query", self.timeouts.version_query) {
            Ok(stdout) => parse_show_version(&stdout),
            Err(err) => {
                debug!("could not determine installed version of {package}: {err}");
                None
            }
        }
    }

    fn check(&self) -> Result<(), CommandFailure> {
        self.run(&["check".to_string()], "Health check", self.timeouts.check)
            .map(|_| ())
    }

    fn reinstall(&self) -> Result<(), CommandFailure> {
        let args = ["install".to_string(), "--sync".to_string()];
        self.run(&args, "Reinstall", self.timeouts.reinstall)
            .map(|_| ())
    }
}

/// Reads the `version : x.y.z` line out of `show <package>` output.
pub fn parse_show_version(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim() != "version" {
            return None;
        }
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

fn drain_pipe<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_pipe(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
