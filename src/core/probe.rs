/// Content probing with sticky privilege escalation
///
/// Decides whether any resolved volume holds data before an archive is built.

use std::path::Path;

use crate::core::command::{CommandOutput, CommandRunner};
use crate::core::error::BackupError;
use crate::core::mounts::VolumePaths;

/// Whether external commands must run elevated for the rest of the run
///
/// Escalation is one-way: once set it is never cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrivilegeState {
    sudo_required: bool,
}

impl PrivilegeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A state that starts out elevated
    pub fn escalated() -> Self {
        Self { sudo_required: true }
    }

    pub fn sudo_required(&self) -> bool {
        self.sudo_required
    }

    pub fn escalate(&mut self) {
        if !self.sudo_required {
            tracing::debug!("permission denied, switching to elevated commands for the rest of the run");
        }
        self.sudo_required = true;
    }
}

pub struct ContentProbe<'a, R: CommandRunner> {
    runner: &'a R,
}

impl<'a, R: CommandRunner> ContentProbe<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self { runner }
    }

    /// Return true as soon as one path has at least one entry
    pub fn probe(&self, paths: &VolumePaths, state: &mut PrivilegeState) -> Result<bool, BackupError> {
        for path in paths {
            if self.has_entries(path, state)? {
                tracing::debug!("{} has content", path.display());
                return Ok(true);
            }
            tracing::debug!("{} is empty", path.display());
        }

        Ok(false)
    }

    fn has_entries(&self, path: &Path, state: &mut PrivilegeState) -> Result<bool, BackupError> {
        let mut output = self.list(path, state.sudo_required())?;

        if !output.success() && output.permission_denied() && !state.sudo_required() {
            state.escalate();
            output = self.list(path, true)?;
        }

        if !output.success() {
            return Err(BackupError::InaccessiblePath {
                path: path.to_path_buf(),
                cause: describe_failure(&output),
            });
        }

        Ok(!output.stdout.trim().is_empty())
    }

    fn list(&self, path: &Path, elevated: bool) -> Result<CommandOutput, BackupError> {
        let args = vec!["-A".to_string(), path.to_string_lossy().to_string()];
        self.runner
            .run("ls", &args, elevated)
            .map_err(|e| BackupError::InaccessiblePath {
                path: path.to_path_buf(),
                cause: e.to_string(),
            })
    }
}

fn describe_failure(output: &CommandOutput) -> String {
    let stderr = output.stderr.trim();
    match (stderr.is_empty(), output.status) {
        (false, _) => stderr.to_string(),
        (true, Some(code)) => format!("ls exited with status {}", code),
        (true, None) => "ls was terminated by a signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::command::MockCommandRunner;
    use mockall::Sequence;
    use std::path::PathBuf;

    fn paths(list: &[&str]) -> VolumePaths {
        list.iter().map(PathBuf::from).collect()
    }

    fn listing(stdout: &str) -> CommandOutput {
        CommandOutput {
            status: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    fn denied(path: &str) -> CommandOutput {
        CommandOutput {
            status: Some(2),
            stdout: String::new(),
            stderr: format!("ls: cannot open directory '{}': Permission denied\n", path),
        }
    }

    fn expect_ls(
        runner: &mut MockCommandRunner,
        seq: &mut Sequence,
        path: &'static str,
        elevated: bool,
        output: CommandOutput,
    ) {
        runner
            .expect_run()
            .withf(move |program, args, e| {
                program == "ls" && args.len() == 2 && args[0] == "-A" && args[1] == path && *e == elevated
            })
            .times(1)
            .in_sequence(seq)
            .returning(move |_, _, _| Ok(output.clone()));
    }

    #[test]
    fn test_short_circuits_on_first_non_empty() {
        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();
        expect_ls(&mut runner, &mut seq, "/a", false, listing(""));
        expect_ls(&mut runner, &mut seq, "/b", false, listing(".hidden\n"));
        // /c is never listed: any call for it fails the mock

        let mut state = PrivilegeState::new();
        let found = ContentProbe::new(&runner)
            .probe(&paths(&["/a", "/b", "/c"]), &mut state)
            .unwrap();

        assert!(found);
        assert!(!state.sudo_required());
    }

    #[test]
    fn test_all_empty_returns_false() {
        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();
        expect_ls(&mut runner, &mut seq, "/a", false, listing(""));
        expect_ls(&mut runner, &mut seq, "/b", false, listing("  \n"));

        let mut state = PrivilegeState::new();
        let found = ContentProbe::new(&runner)
            .probe(&paths(&["/a", "/b"]), &mut state)
            .unwrap();
        assert!(!found);
    }

    #[test]
    fn test_escalation_is_sticky() {
        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();
        expect_ls(&mut runner, &mut seq, "/p1", false, denied("/p1"));
        expect_ls(&mut runner, &mut seq, "/p1", true, listing(""));
        expect_ls(&mut runner, &mut seq, "/p2", true, listing(""));
        expect_ls(&mut runner, &mut seq, "/p3", true, listing("file\n"));

        let mut state = PrivilegeState::new();
        let found = ContentProbe::new(&runner)
            .probe(&paths(&["/p1", "/p2", "/p3"]), &mut state)
            .unwrap();

        assert!(found);
        assert!(state.sudo_required());
    }

    #[test]
    fn test_pre_escalated_state_never_lists_unelevated() {
        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();
        expect_ls(&mut runner, &mut seq, "/a", true, listing(""));
        expect_ls(&mut runner, &mut seq, "/b", true, listing(""));

        let mut state = PrivilegeState::escalated();
        let found = ContentProbe::new(&runner)
            .probe(&paths(&["/a", "/b"]), &mut state)
            .unwrap();
        assert!(!found);
    }

    #[test]
    fn test_elevated_failure_is_fatal() {
        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();
        expect_ls(&mut runner, &mut seq, "/a", false, denied("/a"));
        expect_ls(&mut runner, &mut seq, "/a", true, denied("/a"));

        let mut state = PrivilegeState::new();
        let err = ContentProbe::new(&runner)
            .probe(&paths(&["/a", "/b"]), &mut state)
            .unwrap_err();

        match err {
            BackupError::InaccessiblePath { path, cause } => {
                assert_eq!(path, PathBuf::from("/a"));
                assert!(cause.contains("Permission denied"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_path_is_not_escalated() {
        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();
        expect_ls(
            &mut runner,
            &mut seq,
            "/gone",
            false,
            CommandOutput {
                status: Some(2),
                stdout: String::new(),
                stderr: "ls: cannot access '/gone': No such file or directory".to_string(),
            },
        );

        let mut state = PrivilegeState::new();
        let err = ContentProbe::new(&runner)
            .probe(&paths(&["/gone"]), &mut state)
            .unwrap_err();

        assert!(matches!(err, BackupError::InaccessiblePath { .. }));
        assert!(!state.sudo_required());
    }

    #[test]
    fn test_escalate_is_one_way() {
        let mut state = PrivilegeState::new();
        state.escalate();
        state.escalate();
        assert!(state.sudo_required());
    }
}
