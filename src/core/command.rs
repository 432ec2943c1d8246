/// External command execution
///
/// Every collaborator the pipeline shells out to (docker, ls, tar) goes
/// through [`CommandRunner`], so stage logic can be exercised without
/// spawning processes.

use regex::Regex;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

/// Captured result of a finished external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// True when the diagnostic output reports an access problem
    pub fn permission_denied(&self) -> bool {
        is_permission_error(&self.stderr)
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner {
    /// Run `program` with `args`, under the elevation program when `elevated`
    fn run(&self, program: &str, args: &[String], elevated: bool) -> std::io::Result<CommandOutput>;
}

/// Runs commands on the local system
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    elevation_program: String,
}

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self::with_elevation("sudo")
    }

    pub fn with_elevation(program: impl Into<String>) -> Self {
        Self {
            elevation_program: program.into(),
        }
    }

    /// Resolve the program and argument vector that will actually be spawned
    ///
    /// Elevation wraps the command exactly once.
    pub fn command_line(&self, program: &str, args: &[String], elevated: bool) -> (String, Vec<String>) {
        if elevated {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(program.to_string());
            full.extend(args.iter().cloned());
            (self.elevation_program.clone(), full)
        } else {
            (program.to_string(), args.to_vec())
        }
    }
}

impl Default for SystemCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[String], elevated: bool) -> std::io::Result<CommandOutput> {
        let (program, args) = self.command_line(program, args, elevated);
        tracing::debug!("running: {} {}", program, args.join(" "));

        let output = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

fn permission_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)permission denied|operation not permitted")
            .expect("permission pattern is a valid regex")
    })
}

/// Check diagnostic text for a permission failure
pub fn is_permission_error(stderr: &str) -> bool {
    permission_pattern().is_match(stderr)
}
