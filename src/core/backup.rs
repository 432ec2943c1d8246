/// Backup pipeline
///
/// resolve volumes -> probe for content -> build archive -> upload.
/// Each stage gates the next; the first failure ends the run.

use std::path::{Path, PathBuf};

use crate::core::archive::{ArchiveArtifact, ArchiveBuilder};
use crate::core::command::CommandRunner;
use crate::core::error::BackupError;
use crate::core::mounts::{InspectionResolver, MountPolicy, MountResolver, ProcMountResolver, VolumePaths};
use crate::core::probe::{ContentProbe, PrivilegeState};
use crate::core::upload::{ObjectStore, Uploader};

/// Where the volumes to back up are discovered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupMode {
    /// Running on the host: inspect the given container
    Host { container_id: String, policy: MountPolicy },
    /// Running inside the container: read the mount table at `mount_table`
    Container { mount_table: PathBuf },
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub volumes: VolumePaths,
    pub artifact: ArchiveArtifact,
    pub object_key: String,
    pub elevated: bool,
}

pub struct BackupPipeline<R: CommandRunner, S: ObjectStore> {
    runner: R,
    uploader: Uploader<S>,
    output_dir: PathBuf,
}

impl<R: CommandRunner, S: ObjectStore> BackupPipeline<R, S> {
    pub fn new(runner: R, uploader: Uploader<S>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            uploader,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn uploader(&self) -> &Uploader<S> {
        &self.uploader
    }

    /// Discover the volume paths for `mode`
    pub fn resolve(&self, mode: &BackupMode) -> Result<VolumePaths, BackupError> {
        match mode {
            BackupMode::Host { container_id, policy } => {
                InspectionResolver::new(&self.runner, container_id.clone(), *policy).resolve()
            }
            BackupMode::Container { mount_table } => ProcMountResolver::with_source(mount_table).resolve(),
        }
    }

    /// Run every stage for `backup_name`
    pub async fn run(&self, mode: &BackupMode, backup_name: &str) -> Result<BackupReport, BackupError> {
        let mut privilege = PrivilegeState::new();

        let volumes = self.resolve(mode)?;
        tracing::info!("found {} volume path(s)", volumes.len());
        for path in &volumes {
            tracing::debug!("  {}", path.display());
        }

        if !ContentProbe::new(&self.runner).probe(&volumes, &mut privilege)? {
            return Err(BackupError::NothingToBackup);
        }

        let artifact = ArchiveBuilder::new(&self.runner, &self.output_dir).build(&volumes, backup_name, &mut privilege)?;
        tracing::info!("created archive {} ({} bytes)", artifact.name, artifact.byte_size);

        let object_key = self.uploader.upload(&artifact).await?;
        tracing::info!("uploaded and verified {}", object_key);

        Ok(BackupReport {
            volumes,
            artifact,
            object_key,
            elevated: privilege.sudo_required(),
        })
    }
}
