//! Restore profiles and their on-disk location
//!
//! A profile names one live/backup pair so it can be restored without
//! repeating paths on the command line. Paths are taken literally; any
//! environment expansion is the caller's job.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::restore::RestoreRequest;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no profile named '{name}' in {}", path.display())]
    UnknownProfile { name: String, path: PathBuf },
}

/// A named live/backup pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreProfile {
    /// Resource currently in use
    pub live: PathBuf,
    /// Saved copy to restore from
    pub backup: PathBuf,
    /// Process that must not be running during restore
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_if_running: Option<String>,
    /// Keep the replaced live resource beside the restored one
    #[serde(default)]
    pub keep_previous: bool,
}

impl RestoreProfile {
    pub fn to_request(&self) -> RestoreRequest {
        RestoreRequest {
            live_path: self.live.clone(),
            backup_path: self.backup.clone(),
            blocking_process: self.block_if_running.clone(),
            keep_previous: self.keep_previous,
        }
    }
}

/// Contents of the profiles file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilesFile {
    #[serde(default)]
    pub profiles: BTreeMap<String, RestoreProfile>,
}

impl ProfilesFile {
    /// Load and parse a profiles file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Look up a profile by name
    pub fn profile(&self, name: &str, path: &Path) -> Result<&RestoreProfile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                name: name.to_string(),
                path: path.to_path_buf(),
            })
    }
}

/// Get the default profiles file
/// - macOS: ~/Library/Application Support/restore-tool/profiles.json
/// - Linux: ~/.config/restore-tool/profiles.json
/// - Windows: %APPDATA%/restore-tool/profiles.json
pub fn default_profiles_path() -> Result<PathBuf, ConfigError> {
    let config = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(config.join("restore-tool").join("profiles.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_path_does_not_panic() {
        let _ = default_profiles_path();
    }

    #[test]
    fn test_parse_profiles() {
        let json = r#"{
            "profiles": {
                "browser": {
                    "live": "/home/me/.mozilla",
                    "backup": "/mnt/backup/.mozilla",
                    "block_if_running": "firefox"
                },
                "notes": {
                    "live": "/home/me/notes",
                    "backup": "/mnt/backup/notes.tar.gz",
                    "keep_previous": true
                }
            }
        }"#;

        let file: ProfilesFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.profiles.len(), 2);

        let browser = &file.profiles["browser"];
        assert_eq!(browser.block_if_running.as_deref(), Some("firefox"));
        assert!(!browser.keep_previous);

        let request = file.profiles["notes"].to_request();
        assert_eq!(request.backup_path, PathBuf::from("/mnt/backup/notes.tar.gz"));
        assert!(request.keep_previous);
        assert!(request.blocking_process.is_none());
    }

    #[test]
    fn test_load_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        fs::write(
            &path,
            r#"{"profiles": {"app": {"live": "/a", "backup": "/b"}}}"#,
        )
        .unwrap();

        let file = ProfilesFile::load(&path).unwrap();
        assert_eq!(file.profile("app", &path).unwrap().live, PathBuf::from("/a"));
        assert!(matches!(
            file.profile("other", &path),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            ProfilesFile::load(&missing),
            Err(ConfigError::Read { .. })
        ));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(
            ProfilesFile::load(&bad),
            Err(ConfigError::Parse { .. })
        ));
    }
}
