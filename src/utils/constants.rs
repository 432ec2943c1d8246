/// Backup constants
///
/// Sizes, limits and well-known paths shared by the pipeline stages

/// Smallest archive considered to contain data.
/// An empty gzip'd tar is a few dozen bytes, a single small file pushes it past this.
pub const MIN_ARCHIVE_SIZE: u64 = 512;

/// Upload part size (S3 minimum for all but the last part)
pub const PART_SIZE_BYTES: usize = 5 * 1024 * 1024;

/// Additional attempts per part after the first failure
pub const MAX_PART_RETRIES: u32 = 3;

/// Parts the transport may keep in flight
pub const MAX_IN_FLIGHT_PARTS: usize = 10;

/// Base delay between part retries, multiplied by the attempt number
pub const RETRY_BACKOFF_MS: u64 = 500;

/// Mount table of the running process
pub const DEFAULT_MOUNT_TABLE: &str = "/proc/self/mountinfo";

/// Docker's named volume storage root
pub const DOCKER_VOLUMES_ROOT: &str = "/var/lib/docker/volumes/";

/// Last component of a docker volume's data directory
pub const VOLUME_DATA_SUFFIX: &str = "/_data";

/// mountinfo lines shorter than this are not valid entries
pub const MIN_MOUNTINFO_FIELDS: usize = 10;

/// Region used when S3_BACKUP_REGION is unset
pub const DEFAULT_REGION: &str = "us-east-1";

// Environment variable names
pub const ENV_ACCESS_KEY_ID: &str = "S3_BACKUP_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "S3_BACKUP_SECRET_ACCESS_KEY";
pub const ENV_BUCKET_NAME: &str = "S3_BACKUP_BUCKET_NAME";
pub const ENV_ENDPOINT: &str = "S3_BACKUP_ENDPOINT";
pub const ENV_REGION: &str = "S3_BACKUP_REGION";
pub const ENV_PREFIX: &str = "S3_BACKUP_PREFIX";
pub const ENV_DEBUG: &str = "DEBUG";
