/// Volume discovery
///
/// Two strategies find the host paths that hold a container's volume data:
/// - [`InspectionResolver`] runs on the host and asks `docker inspect`
/// - [`ProcMountResolver`] runs inside the container and reads its own mount table

use serde::Deserialize;
use std::collections::btree_set;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::command::CommandRunner;
use crate::core::error::{BackupError, DiscoveryError};
use crate::utils::{DEFAULT_MOUNT_TABLE, DOCKER_VOLUMES_ROOT, MIN_MOUNTINFO_FIELDS, VOLUME_DATA_SUFFIX};

/// Mount type as reported by the container runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    Volume,
    Bind,
    Other,
}

impl From<&str> for MountKind {
    fn from(kind: &str) -> Self {
        match kind {
            "volume" => MountKind::Volume,
            "bind" => MountKind::Bind,
            _ => MountKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub kind: MountKind,
    pub source: String,
}

/// Which mounts of an inspected container are backed up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MountPolicy {
    #[default]
    VolumesOnly,
    AllMounts,
}

impl MountPolicy {
    pub fn includes(&self, kind: MountKind) -> bool {
        match self {
            MountPolicy::VolumesOnly => kind == MountKind::Volume,
            MountPolicy::AllMounts => true,
        }
    }
}

/// Deduplicated, non-empty set of volume paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumePaths(BTreeSet<PathBuf>);

impl VolumePaths {
    pub fn new(paths: BTreeSet<PathBuf>) -> Result<Self, DiscoveryError> {
        if paths.is_empty() {
            return Err(DiscoveryError::NoVolumes);
        }
        Ok(Self(paths))
    }

    pub fn iter(&self) -> btree_set::Iter<'_, PathBuf> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.0.contains(path)
    }
}

impl FromIterator<PathBuf> for VolumePaths {
    /// Collects without the non-empty check; use [`VolumePaths::new`] for resolver output
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a VolumePaths {
    type Item = &'a PathBuf;
    type IntoIter = btree_set::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

pub trait MountResolver {
    fn resolve(&self) -> Result<VolumePaths, BackupError>;
}

/// Container descriptor subset returned by `docker inspect`
#[derive(Debug, Deserialize)]
struct ContainerDescriptor {
    #[serde(default, rename = "Mounts")]
    mounts: Vec<MountDescriptor>,
}

#[derive(Debug, Deserialize)]
struct MountDescriptor {
    #[serde(default, rename = "Type")]
    kind: String,
    #[serde(default, rename = "Source")]
    source: String,
}

/// Host-mode discovery through the docker CLI
pub struct InspectionResolver<'a, R: CommandRunner> {
    runner: &'a R,
    container_id: String,
    policy: MountPolicy,
}

impl<'a, R: CommandRunner> InspectionResolver<'a, R> {
    pub fn new(runner: &'a R, container_id: impl Into<String>, policy: MountPolicy) -> Self {
        Self {
            runner,
            container_id: container_id.into(),
            policy,
        }
    }

    /// Parse `docker inspect` output into the first container's mounts
    pub fn parse_mounts(&self, output: &str) -> Result<Vec<MountEntry>, DiscoveryError> {
        let descriptors: Vec<ContainerDescriptor> =
            serde_json::from_str(output).map_err(|e| DiscoveryError::InvalidDescriptor {
                container_id: self.container_id.clone(),
                message: e.to_string(),
            })?;

        let first = descriptors
            .into_iter()
            .next()
            .ok_or_else(|| DiscoveryError::ContainerNotFound(self.container_id.clone()))?;

        Ok(first
            .mounts
            .into_iter()
            .map(|m| MountEntry {
                kind: MountKind::from(m.kind.as_str()),
                source: m.source,
            })
            .collect())
    }
}

impl<R: CommandRunner> MountResolver for InspectionResolver<'_, R> {
    fn resolve(&self) -> Result<VolumePaths, BackupError> {
        let args = vec!["inspect".to_string(), self.container_id.clone()];
        let output = self
            .runner
            .run("docker", &args, false)
            .map_err(|e| DiscoveryError::InspectionFailed {
                container_id: self.container_id.clone(),
                stderr: e.to_string(),
            })?;

        if !output.success() {
            return Err(DiscoveryError::InspectionFailed {
                container_id: self.container_id.clone(),
                stderr: output.stderr.trim().to_string(),
            }
            .into());
        }

        let mounts = self.parse_mounts(&output.stdout)?;
        tracing::debug!("container {} has {} mounts", self.container_id, mounts.len());

        let paths: BTreeSet<PathBuf> = mounts
            .into_iter()
            .filter(|m| self.policy.includes(m.kind) && !m.source.is_empty())
            .map(|m| PathBuf::from(m.source))
            .collect();

        Ok(VolumePaths::new(paths)?)
    }
}

/// Container-mode discovery through the process mount table
pub struct ProcMountResolver {
    source: PathBuf,
}

impl ProcMountResolver {
    pub fn new() -> Self {
        Self::with_source(DEFAULT_MOUNT_TABLE)
    }

    pub fn with_source(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }

    fn read_table(&self) -> Result<String, DiscoveryError> {
        let content = fs::read_to_string(&self.source).map_err(|e| DiscoveryError::MountTableUnreadable {
            path: self.source.clone(),
            reason: e.to_string(),
        })?;

        if content.trim().is_empty() {
            return Err(DiscoveryError::MountTableUnreadable {
                path: self.source.clone(),
                reason: "mount table is empty".to_string(),
            });
        }

        Ok(content)
    }
}

impl Default for ProcMountResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl MountResolver for ProcMountResolver {
    fn resolve(&self) -> Result<VolumePaths, BackupError> {
        let content = self.read_table()?;
        let paths = parse_mount_table(&content);
        tracing::debug!("mount table lists {} docker volumes", paths.len());
        Ok(VolumePaths::new(paths)?)
    }
}

/// Collect mount points of docker volumes from mountinfo text
///
/// Lines that are too short or lack the `-` separator are skipped.
pub fn parse_mount_table(content: &str) -> BTreeSet<PathBuf> {
    content
        .lines()
        .filter_map(parse_mount_line)
        .collect()
}

fn parse_mount_line(line: &str) -> Option<PathBuf> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < MIN_MOUNTINFO_FIELDS || !fields.contains(&"-") {
        return None;
    }

    let root = fields[3];
    let mount_point = fields[4];

    if is_volume_root(root) {
        Some(PathBuf::from(unescape_mount_field(mount_point)))
    } else {
        None
    }
}

/// Docker keeps named volume data under `/var/lib/docker/volumes/<name>/_data`
pub fn is_volume_root(root: &str) -> bool {
    root.contains(DOCKER_VOLUMES_ROOT) && root.ends_with(VOLUME_DATA_SUFFIX)
}

/// Decode the `\ooo` octal escapes the kernel uses for whitespace and backslash
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits.iter().fold(0u32, |acc, b| acc * 8 + (b - b'0') as u32);
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::command::{CommandOutput, MockCommandRunner};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn mountinfo_line(id: u32, root: &str, mount_point: &str) -> String {
        format!(
            "{} 1200 254:1 {} {} rw,relatime master:1 - ext4 /dev/vda1 rw,discard",
            id, root, mount_point
        )
    }

    #[test]
    fn test_volume_root_match() {
        assert!(is_volume_root("/var/lib/docker/volumes/abc/_data"));
        assert!(!is_volume_root("/var/lib/docker/volumes/abc/_other"));
        assert!(!is_volume_root("/home/user/_data"));
    }

    #[test]
    fn test_parse_volume_mount() {
        let table = mountinfo_line(1301, "/var/lib/docker/volumes/abc/_data", "/data");
        let paths = parse_mount_table(&table);
        assert_eq!(paths.len(), 1);
        assert!(paths.contains(Path::new("/data")));
    }

    #[test]
    fn test_parse_ignores_non_volume_root() {
        let table = mountinfo_line(1301, "/var/lib/docker/volumes/abc/_other", "/data");
        assert!(parse_mount_table(&table).is_empty());
    }

    #[test]
    fn test_parse_skips_short_and_separatorless_lines() {
        let table = [
            "1301 1200 254:1 /var/lib/docker/volumes/a/_data /short - ext4".to_string(),
            "1302 1200 254:1 /var/lib/docker/volumes/b/_data /nosep rw,relatime master:1 x ext4 /dev/vda1 rw".to_string(),
            String::new(),
            "garbage".to_string(),
            mountinfo_line(1303, "/var/lib/docker/volumes/c/_data", "/kept"),
        ]
        .join("\n");

        let paths = parse_mount_table(&table);
        assert_eq!(paths.into_iter().collect::<Vec<_>>(), vec![PathBuf::from("/kept")]);
    }

    #[test]
    fn test_parse_deduplicates() {
        let line = mountinfo_line(1301, "/var/lib/docker/volumes/abc/_data", "/data");
        let table = format!("{}\n{}\n", line, line);
        assert_eq!(parse_mount_table(&table).len(), 1);
    }

    #[test]
    fn test_parse_unescapes_mount_point() {
        let table = mountinfo_line(1301, "/var/lib/docker/volumes/abc/_data", "/my\\040data");
        let paths = parse_mount_table(&table);
        assert!(paths.contains(Path::new("/my data")));
    }

    #[test]
    fn test_proc_resolver_reads_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", mountinfo_line(22, "/", "/")).unwrap();
        writeln!(file, "{}", mountinfo_line(1301, "/var/lib/docker/volumes/pg/_data", "/var/lib/postgresql/data")).unwrap();
        writeln!(file, "{}", mountinfo_line(1302, "/var/lib/docker/volumes/cfg/_data", "/config")).unwrap();

        let paths = ProcMountResolver::with_source(file.path()).resolve().unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.contains(Path::new("/config")));
        assert!(paths.contains(Path::new("/var/lib/postgresql/data")));
    }

    #[test]
    fn test_proc_resolver_empty_table() {
        let file = NamedTempFile::new().unwrap();
        let err = ProcMountResolver::with_source(file.path()).resolve().unwrap_err();
        assert!(matches!(
            err,
            BackupError::Discovery(DiscoveryError::MountTableUnreadable { .. })
        ));
    }

    #[test]
    fn test_proc_resolver_missing_table() {
        let err = ProcMountResolver::with_source("/nonexistent/mountinfo").resolve().unwrap_err();
        assert!(matches!(
            err,
            BackupError::Discovery(DiscoveryError::MountTableUnreadable { .. })
        ));
    }

    #[test]
    fn test_proc_resolver_no_volumes() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", mountinfo_line(22, "/", "/")).unwrap();

        let err = ProcMountResolver::with_source(file.path()).resolve().unwrap_err();
        assert!(matches!(err, BackupError::Discovery(DiscoveryError::NoVolumes)));
    }

    const INSPECT_OUTPUT: &str = r#"[
        {
            "Id": "abc123",
            "Mounts": [
                {"Type": "volume", "Name": "pg", "Source": "/var/lib/docker/volumes/pg/_data", "Destination": "/data"},
                {"Type": "bind", "Source": "/srv/config", "Destination": "/config"},
                {"Type": "volume", "Name": "pg", "Source": "/var/lib/docker/volumes/pg/_data", "Destination": "/data2"}
            ]
        }
    ]"#;

    fn inspect_runner(status: i32, stdout: &'static str, stderr: &'static str) -> MockCommandRunner {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|program, args, elevated| {
                program == "docker" && args.len() == 2 && args[0] == "inspect" && args[1] == "abc123" && !*elevated
            })
            .times(1)
            .returning(move |_, _, _| {
                Ok(CommandOutput {
                    status: Some(status),
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                })
            });
        runner
    }

    #[test]
    fn test_inspection_volumes_only() {
        let runner = inspect_runner(0, INSPECT_OUTPUT, "");
        let paths = InspectionResolver::new(&runner, "abc123", MountPolicy::VolumesOnly)
            .resolve()
            .unwrap();

        assert_eq!(paths.len(), 1);
        assert!(paths.contains(Path::new("/var/lib/docker/volumes/pg/_data")));
    }

    #[test]
    fn test_inspection_all_mounts() {
        let runner = inspect_runner(0, INSPECT_OUTPUT, "");
        let paths = InspectionResolver::new(&runner, "abc123", MountPolicy::AllMounts)
            .resolve()
            .unwrap();

        assert_eq!(paths.len(), 2);
        assert!(paths.contains(Path::new("/srv/config")));
    }

    #[test]
    fn test_inspection_empty_array() {
        let runner = inspect_runner(0, "[]", "");
        let err = InspectionResolver::new(&runner, "abc123", MountPolicy::VolumesOnly)
            .resolve()
            .unwrap_err();
        assert!(matches!(
            err,
            BackupError::Discovery(DiscoveryError::ContainerNotFound(ref id)) if id == "abc123"
        ));
    }

    #[test]
    fn test_inspection_nonzero_exit() {
        let runner = inspect_runner(1, "[]", "Error: No such object: abc123\n");
        let err = InspectionResolver::new(&runner, "abc123", MountPolicy::VolumesOnly)
            .resolve()
            .unwrap_err();

        match err {
            BackupError::Discovery(DiscoveryError::InspectionFailed { stderr, .. }) => {
                assert_eq!(stderr, "Error: No such object: abc123");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_inspection_invalid_json() {
        let runner = inspect_runner(0, "not json", "");
        let err = InspectionResolver::new(&runner, "abc123", MountPolicy::VolumesOnly)
            .resolve()
            .unwrap_err();
        assert!(matches!(
            err,
            BackupError::Discovery(DiscoveryError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn test_inspection_without_volumes() {
        let runner = inspect_runner(0, r#"[{"Mounts": [{"Type": "bind", "Source": "/srv"}]}]"#, "");
        let err = InspectionResolver::new(&runner, "abc123", MountPolicy::VolumesOnly)
            .resolve()
            .unwrap_err();
        assert!(matches!(err, BackupError::Discovery(DiscoveryError::NoVolumes)));
    }
}
