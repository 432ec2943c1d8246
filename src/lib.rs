//! Back up the data volumes of a Docker container to S3-compatible storage.
//!
//! The pipeline resolves the host paths behind a container's volumes, checks
//! that at least one holds data, archives them with `tar`, and streams the
//! archive to object storage in fixed-size parts.

pub mod core;
pub mod utils;
