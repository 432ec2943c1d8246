pub mod archive;
pub mod backup;
pub mod command;
pub mod config;
pub mod error;
pub mod mounts;
pub mod probe;
pub mod s3;
pub mod upload;

pub use archive::{ArchiveArtifact, ArchiveBuilder};
pub use backup::{BackupMode, BackupPipeline, BackupReport};
pub use command::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use config::StorageConfig;
pub use error::{BackupError, DiscoveryError, StoreError};
pub use mounts::{InspectionResolver, MountPolicy, MountResolver, ProcMountResolver, VolumePaths};
pub use probe::{ContentProbe, PrivilegeState};
pub use s3::S3Store;
pub use upload::{ObjectStore, PartStream, UploadSession, Uploader};
