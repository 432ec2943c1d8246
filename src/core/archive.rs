/// Archive creation
///
/// Wraps `tar` over the resolved volume paths and rejects output that is
/// missing or no larger than an empty gzip'd tar.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::command::{CommandOutput, CommandRunner};
use crate::core::error::BackupError;
use crate::core::mounts::VolumePaths;
use crate::core::probe::PrivilegeState;
use crate::utils::{archive_name, MIN_ARCHIVE_SIZE};

/// A validated archive on local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveArtifact {
    /// File name, also used as the object key
    pub name: String,
    pub path: PathBuf,
    pub byte_size: u64,
}

pub struct ArchiveBuilder<'a, R: CommandRunner> {
    runner: &'a R,
    output_dir: PathBuf,
}

impl<'a, R: CommandRunner> ArchiveBuilder<'a, R> {
    pub fn new(runner: &'a R, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            output_dir: output_dir.into(),
        }
    }

    pub fn build(
        &self,
        paths: &VolumePaths,
        backup_name: &str,
        state: &mut PrivilegeState,
    ) -> Result<ArchiveArtifact, BackupError> {
        self.build_at(paths, backup_name, Utc::now(), state)
    }

    /// Build an archive whose name carries `timestamp`
    pub fn build_at(
        &self,
        paths: &VolumePaths,
        backup_name: &str,
        timestamp: DateTime<Utc>,
        state: &mut PrivilegeState,
    ) -> Result<ArchiveArtifact, BackupError> {
        let name = archive_name(backup_name, timestamp);
        let path = self.output_dir.join(&name);

        let mut output = self.run_tar(&path, paths, state.sudo_required())?;
        if output.permission_denied() && !state.sudo_required() {
            state.escalate();
            output = self.run_tar(&path, paths, true)?;
        }

        if !output.success() {
            // tar exits non-zero for benign things like files changing while read;
            // the size check below decides
            tracing::debug!("tar exited with {:?}: {}", output.status, output.stderr.trim());
        }

        validate(&name, &path, &output.stderr)
    }

    fn run_tar(&self, archive: &Path, paths: &VolumePaths, elevated: bool) -> Result<CommandOutput, BackupError> {
        let mut args = vec![
            "-c".to_string(),
            "-z".to_string(),
            "-f".to_string(),
            archive.to_string_lossy().to_string(),
        ];
        args.extend(paths.iter().map(|p| p.to_string_lossy().to_string()));

        tracing::debug!("tar {}", args.join(" "));
        self.runner
            .run("tar", &args, elevated)
            .map_err(|source| BackupError::Spawn {
                program: "tar".to_string(),
                source,
            })
    }
}

fn validate(name: &str, path: &Path, diagnostics: &str) -> Result<ArchiveArtifact, BackupError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => {
            return Err(BackupError::ArchiveNotCreated {
                path: path.to_path_buf(),
                diagnostics: diagnostics.to_string(),
            })
        }
    };

    let byte_size = metadata.len();
    if byte_size < MIN_ARCHIVE_SIZE {
        return Err(BackupError::ArchiveTooSmall {
            path: path.to_path_buf(),
            size: byte_size,
            minimum: MIN_ARCHIVE_SIZE,
            diagnostics: diagnostics.to_string(),
        });
    }

    Ok(ArchiveArtifact {
        name: name.to_string(),
        path: path.to_path_buf(),
        byte_size,
    })
}
