//! # Archive Configuration
//!
//! Every archive carries an `nbank.json` file at its root recording the
//! registry it belongs to and the storage policy: identifier assignment,
//! extension handling, whether directories may be deposited, whether hashes
//! are mandatory, and the access-control defaults applied to stored files.
//!
//! The configuration is created once by [`create_archive`] and read on every
//! deposit or check. Editing it afterwards is an administrative task done by
//! hand.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ArchiveError;
use crate::unix;

/// Name of the configuration file at the archive root.
pub const CONFIG_FILE: &str = "nbank.json";

/// Subdirectory holding stored resources.
pub const RESOURCE_SUBDIR: &str = "resources";

/// JSON schema marker written into new configurations.
pub const CONFIG_SCHEMA: &str = "https://melizalab.github.io/neurobank/config.json#";

/// Default umask for files stored in new archives.
pub const DEFAULT_UMASK: u32 = 0o002;

/// Default number of identifier characters used for the shard directory.
pub const DEFAULT_SHARD_LENGTH: usize = 2;

const README_FILE: &str = "README.md";

const README: &str = "\
This directory contains a [neurobank](https://github.com/melizalab/neurobank)
data management archive. The following files and directories are part of the archive:

+ README.md: this file
+ nbank.json: information and configuration for the archive
+ resources/: registered source files and deposited data

Files in `resources` are organized into subdirectories based on the first two
characters of the files' identifiers.

# Archive contents

Add notes about the contents of the data archive here. You should also edit
`nbank.json` to set information and policy for your project.

# Quick reference

Deposit resources: `nbank deposit archive_path file-1 [file-2 [file-3]]`

Deposited files are given the permissions specified in `nbank.json`. When
entire directories are deposited, ownership and access may not be set
correctly. If you have issues accessing files, run (usually as root):
`find resources -type d -exec chmod 2770 {} \\+` and
`setfacl -R -d -m u::rwx,g::rwx,o::- resources`
";

/// The persisted archive configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Schema marker.
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Free-form project description.
    #[serde(default)]
    pub project: ProjectInfo,
    /// Archive owner contact.
    #[serde(default)]
    pub owner: OwnerInfo,
    /// Base URL of the registry that catalogs this archive.
    pub registry: String,
    /// Storage policy.
    pub policy: Policy,
    /// Canonical filesystem path of the archive. Set on load, never persisted.
    #[serde(skip)]
    pub path: PathBuf,
}

/// Project description block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Owner contact block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OwnerInfo {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Storage policy for an archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Always assign identifiers automatically instead of using file names.
    #[serde(default)]
    pub auto_identifiers: bool,
    /// Kind of automatic identifier. `"uuid"` generates locally; anything else
    /// lets the registry assign one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_id_type: Option<String>,
    /// Keep the source file's extension on the stored resource.
    #[serde(default = "default_true")]
    pub keep_extensions: bool,
    /// Permit whole directories as resources.
    #[serde(default)]
    pub allow_directories: bool,
    /// Always hash resources on deposit.
    #[serde(default = "default_true")]
    pub require_hash: bool,
    /// Number of identifier characters used for the shard directory name.
    #[serde(default = "default_shard_length")]
    pub shard_length: usize,
    /// Access-control defaults.
    #[serde(default)]
    pub access: AccessPolicy,
}

/// Ownership and mode defaults for stored resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Owning user name, recorded for reference.
    #[serde(default)]
    pub user: Option<String>,
    /// Group applied to stored resources when set.
    #[serde(default)]
    pub group: Option<String>,
    /// Mask removed from the default mode (`0o666` for files).
    #[serde(
        default = "default_umask",
        serialize_with = "serialize_umask",
        deserialize_with = "deserialize_umask"
    )]
    pub umask: u32,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            user: None,
            group: None,
            umask: DEFAULT_UMASK,
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            auto_identifiers: false,
            auto_id_type: None,
            keep_extensions: true,
            allow_directories: false,
            require_hash: true,
            shard_length: DEFAULT_SHARD_LENGTH,
            access: AccessPolicy::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_shard_length() -> usize {
    DEFAULT_SHARD_LENGTH
}

fn default_umask() -> u32 {
    DEFAULT_UMASK
}

fn serialize_umask<S: Serializer>(umask: &u32, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{umask:03o}"))
}

fn deserialize_umask<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Octal(String),
        Number(u32),
    }
    let umask = match Raw::deserialize(d)? {
        Raw::Octal(s) => u32::from_str_radix(s.trim().trim_start_matches("0o"), 8)
            .map_err(|e| serde::de::Error::custom(format!("umask {s:?} is not octal: {e}")))?,
        Raw::Number(n) => n,
    };
    if umask > 0o777 {
        return Err(serde::de::Error::custom(format!(
            "umask {umask:o} is out of range"
        )));
    }
    Ok(umask)
}

impl AccessPolicy {
    /// Mode applied to stored files.
    pub fn file_mode(&self) -> u32 {
        0o666 & !self.umask
    }

    /// Mode applied to stored directories. Every read bit in the file mode
    /// gains the matching execute bit so the directory stays traversable.
    pub fn dir_mode(&self) -> u32 {
        directory_mode(self.file_mode())
    }
}

/// Transform a file mode into the equivalent directory mode.
pub fn directory_mode(mode: u32) -> u32 {
    (mode >> 2) | mode
}

/// Options for a new archive.
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    pub umask: u32,
    pub require_hash: bool,
    pub auto_id_type: Option<String>,
    pub allow_directories: bool,
    pub keep_extensions: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            umask: DEFAULT_UMASK,
            require_hash: true,
            auto_id_type: None,
            allow_directories: false,
            keep_extensions: true,
        }
    }
}

impl ArchiveConfig {
    /// Build a fresh configuration for the given registry.
    pub fn new(registry: impl Into<String>, options: &ArchiveOptions) -> Self {
        Self {
            schema: Some(CONFIG_SCHEMA.to_string()),
            project: ProjectInfo::default(),
            owner: OwnerInfo::default(),
            registry: registry.into(),
            policy: Policy {
                auto_identifiers: false,
                auto_id_type: options.auto_id_type.clone(),
                keep_extensions: options.keep_extensions,
                allow_directories: options.allow_directories,
                require_hash: options.require_hash,
                shard_length: DEFAULT_SHARD_LENGTH,
                access: AccessPolicy {
                    user: unix::current_user_name(),
                    group: unix::current_group_name(),
                    umask: options.umask,
                },
            },
            path: PathBuf::new(),
        }
    }

    /// Load the configuration of the archive at `path`.
    ///
    /// The path is canonicalized; the canonical form is what the registry
    /// knows the archive by.
    pub fn load(path: &Path) -> Result<Self, ArchiveError> {
        let root = path.canonicalize().map_err(|e| ArchiveError::InvalidArchive {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let file = root.join(CONFIG_FILE);
        let text = match fs::read_to_string(&file) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArchiveError::InvalidArchive {
                    path: root,
                    reason: format!("missing {CONFIG_FILE}"),
                });
            }
            Err(e) => {
                return Err(ArchiveError::InvalidArchive {
                    path: root,
                    reason: e.to_string(),
                });
            }
        };
        let mut cfg: ArchiveConfig =
            serde_json::from_str(&text).map_err(|e| ArchiveError::InvalidArchive {
                path: root.clone(),
                reason: format!("bad {CONFIG_FILE}: {e}"),
            })?;
        if cfg.policy.shard_length == 0 {
            return Err(ArchiveError::InvalidArchive {
                path: root,
                reason: "policy.shard_length must be at least 1".into(),
            });
        }
        cfg.path = root;
        Ok(cfg)
    }

    /// Directory holding stored resources.
    pub fn resources_dir(&self) -> PathBuf {
        self.path.join(RESOURCE_SUBDIR)
    }

    /// Write the configuration to `<path>/nbank.json`, replacing any existing file.
    pub fn save(&self) -> Result<(), ArchiveError> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(self.path.join(CONFIG_FILE), text + "\n")?;
        Ok(())
    }
}

/// Initialize an archive at `root`.
///
/// Creates `root` and its parents as needed. Existing files are never
/// overwritten, so running this on an existing archive is harmless.
pub fn create_archive(
    root: &Path,
    registry: &str,
    options: &ArchiveOptions,
) -> Result<ArchiveConfig, ArchiveError> {
    let resources = root.join(RESOURCE_SUBDIR);
    fs::create_dir_all(&resources).map_err(|e| ArchiveError::CreateDir {
        path: resources.clone(),
        source: e,
    })?;
    {
        use std::os::unix::fs::PermissionsExt;
        // setgid keeps the archive group on new shard directories; some
        // filesystems refuse it.
        if let Err(e) = fs::set_permissions(&resources, fs::Permissions::from_mode(0o2775)) {
            tracing::warn!(path = %resources.display(), "unable to set setgid bit: {e}");
        }
    }

    write_if_absent(&root.join(README_FILE), README)?;
    write_if_absent(&root.join(".gitignore"), "resources/\n")?;

    let config_path = root.join(CONFIG_FILE);
    if !config_path.exists() {
        let mut cfg = ArchiveConfig::new(registry, options);
        cfg.path = root.to_path_buf();
        cfg.save()?;
    }
    ArchiveConfig::load(root)
}

fn write_if_absent(path: &Path, contents: &str) -> Result<(), ArchiveError> {
    if !path.exists() {
        fs::write(path, contents)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY: &str = "https://meliza.org/neurobank/";

    #[test]
    fn create_writes_layout_and_loads_back() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("archive");
        let cfg = create_archive(&root, REGISTRY, &ArchiveOptions::default()).unwrap();

        assert_eq!(cfg.path, root.canonicalize().unwrap());
        assert_eq!(cfg.registry, REGISTRY);
        assert!(root.join("resources").is_dir());
        assert!(root.join("README.md").is_file());
        assert_eq!(
            fs::read_to_string(root.join(".gitignore")).unwrap(),
            "resources/\n"
        );
        assert_eq!(cfg.policy.access.umask, DEFAULT_UMASK);
        assert!(cfg.policy.require_hash);
        assert_eq!(cfg.policy.shard_length, 2);
    }

    #[test]
    fn create_does_not_overwrite_existing_config() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("archive");
        let mut cfg = create_archive(&root, REGISTRY, &ArchiveOptions::default()).unwrap();
        cfg.policy.allow_directories = true;
        cfg.save().unwrap();

        let again = create_archive(&root, "https://other/", &ArchiveOptions::default()).unwrap();
        assert_eq!(again.registry, REGISTRY);
        assert!(again.policy.allow_directories);
    }

    #[test]
    fn load_rejects_directory_without_config() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ArchiveConfig::load(tmp.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidArchive { .. }));
    }

    #[test]
    fn load_rejects_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ArchiveConfig::load(&tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidArchive { .. }));
    }

    #[test]
    fn load_rejects_malformed_json() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), "{ not json").unwrap();
        let err = ArchiveConfig::load(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("bad nbank.json"));
    }

    #[test]
    fn legacy_config_without_optional_fields_loads() {
        let tmp = tempfile::tempdir().unwrap();
        let legacy = r#"{
            "registry": "https://meliza.org/neurobank/",
            "policy": {
                "auto_identifiers": false,
                "keep_extensions": true,
                "allow_directories": false,
                "access": {"user": "dmeliza", "group": "melizalab", "umask": "027"}
            }
        }"#;
        fs::write(tmp.path().join(CONFIG_FILE), legacy).unwrap();
        let cfg = ArchiveConfig::load(tmp.path()).unwrap();
        assert_eq!(cfg.policy.access.umask, 0o027);
        assert_eq!(cfg.policy.access.group.as_deref(), Some("melizalab"));
        assert!(cfg.policy.require_hash);
        assert_eq!(cfg.policy.auto_id_type, None);
    }

    #[test]
    fn umask_round_trips_as_octal_string() {
        let access = AccessPolicy {
            user: None,
            group: None,
            umask: 0o027,
        };
        let v = serde_json::to_value(&access).unwrap();
        assert_eq!(v["umask"], "027");
    }

    #[test]
    fn modes_follow_umask() {
        let access = AccessPolicy {
            user: None,
            group: None,
            umask: 0o027,
        };
        assert_eq!(access.file_mode(), 0o640);
        assert_eq!(access.dir_mode(), 0o750);

        let open = AccessPolicy::default();
        assert_eq!(open.file_mode(), 0o664);
        assert_eq!(open.dir_mode(), 0o775);
    }
}
