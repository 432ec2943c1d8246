/// CLI argument parsing

use clap::Parser;
use std::path::PathBuf;

use volume_backup::core::{BackupMode, MountPolicy};
use volume_backup::utils::DEFAULT_MOUNT_TABLE;

// Build timestamp injected at compile time
pub const VERSION_WITH_BUILD: &str = concat!(env!("CARGO_PKG_VERSION"), " (built: ", env!("BUILD_TIMESTAMP"), ")");

/// Back up a container's volumes to S3-compatible storage.
///
/// On the host pass the container id; inside the container omit it and the
/// volumes are read from the mount table.
#[derive(Parser, Debug)]
#[command(name = "volume-backup")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    /// Name prefixed to the archive file
    pub backup_name: String,

    /// Container to back up (host mode)
    pub container_id: Option<String>,

    /// Also archive bind mounts of the inspected container
    #[arg(long)]
    pub include_bind_mounts: bool,

    /// Directory the archive is written to
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Mount table read in container mode
    #[arg(long, default_value = DEFAULT_MOUNT_TABLE)]
    pub mount_table: PathBuf,

    /// Disable the upload progress bar
    #[arg(long)]
    pub no_progress: bool,
}

impl Cli {
    /// Host mode when a container id was given, container mode otherwise
    pub fn mode(&self) -> BackupMode {
        match &self.container_id {
            Some(container_id) => BackupMode::Host {
                container_id: container_id.clone(),
                policy: if self.include_bind_mounts {
                    MountPolicy::AllMounts
                } else {
                    MountPolicy::VolumesOnly
                },
            },
            None => BackupMode::Container {
                mount_table: self.mount_table.clone(),
            },
        }
    }
}
