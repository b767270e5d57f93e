// Persisted CLI defaults
//
// Two small JSON files remember the recording format and the last job's
// rotation / time-lapse / scale values between runs.

use crate::video::FourCC;
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const RECORDING_SETTINGS_FILE: &str = "recording_settings.json";
pub const SELECTION_HISTORY_FILE: &str = "selection_history.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RecordingSettings {
    pub recording_ext: String,
    pub codec: String,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            recording_ext: ".avi".to_string(),
            codec: "X264".to_string(),
        }
    }
}

impl RecordingSettings {
    /// Extension gets a leading dot, codec is made a valid FourCC.
    pub fn sanitized(extension: &str, codec: &str) -> Result<Self> {
        let extension = extension.trim();
        if extension.is_empty() || extension == "." {
            return Err(anyhow!("Recording extension must not be empty"));
        }
        let recording_ext = if extension.starts_with('.') {
            extension.to_string()
        } else {
            format!(".{}", extension)
        };
        let codec = FourCC::sanitize(codec)?.to_string();
        Ok(Self {
            recording_ext,
            codec,
        })
    }

    pub fn fourcc(&self) -> Result<FourCC> {
        Ok(FourCC::sanitize(&self.codec)?)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SelectionHistory {
    pub search_path: String,
    pub ccw_rotations: i32,
    pub timelapse_factor: f64,
    #[serde(alias = "new_scaling_factor")]
    pub scaling_factor: f64,
}

impl Default for SelectionHistory {
    fn default() -> Self {
        Self {
            search_path: "~/Desktop".to_string(),
            ccw_rotations: 1,
            timelapse_factor: 12.0,
            scaling_factor: 1.0,
        }
    }
}

impl SelectionHistory {
    pub fn expanded_search_path(&self) -> PathBuf {
        expand_home(&self.search_path, dirs::home_dir().as_deref())
    }
}

/// Reads and writes the settings files in one directory. The directory itself
/// is never created.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    dir: PathBuf,
}

impl SettingsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stored values over defaults; defaults alone when the file is absent.
    pub fn load<T: DeserializeOwned + Default>(&self, file_name: &str) -> Result<T> {
        let path = self.dir.join(file_name);
        if !path.exists() {
            return Ok(T::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid settings in {}", path.display()))
    }

    /// Returns whether the file was written. Nothing is written when the
    /// directory is missing, or when the file exists and `overwrite` is false.
    pub fn save<T: Serialize>(&self, file_name: &str, value: &T, overwrite: bool) -> Result<bool> {
        if !self.dir.is_dir() {
            tracing::debug!("Settings directory {} missing, not saving", self.dir.display());
            return Ok(false);
        }
        let path = self.dir.join(file_name);
        if path.exists() && !overwrite {
            return Ok(false);
        }
        let content = serde_json::to_string_pretty(value)?;
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(true)
    }

    pub fn load_recording_settings(&self) -> Result<RecordingSettings> {
        self.load(RECORDING_SETTINGS_FILE)
    }

    /// Only rewrites the file when the values changed from `previous`.
    pub fn save_recording_settings(
        &self,
        settings: &RecordingSettings,
        previous: &RecordingSettings,
    ) -> Result<bool> {
        self.save(RECORDING_SETTINGS_FILE, settings, settings != previous)
    }

    pub fn load_selection_history(&self) -> Result<SelectionHistory> {
        self.load(SELECTION_HISTORY_FILE)
    }

    pub fn save_selection_history(&self, history: &SelectionHistory) -> Result<bool> {
        let stored = SelectionHistory {
            search_path: collapse_home(&history.search_path, dirs::home_dir().as_deref()),
            ..history.clone()
        };
        self.save(SELECTION_HISTORY_FILE, &stored, true)
    }
}

fn expand_home(path: &str, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix('~'), home) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(path),
    }
}

fn collapse_home(path: &str, home: Option<&Path>) -> String {
    let Some(home) = home.and_then(Path::to_str).filter(|h| !h.is_empty()) else {
        return path.to_string();
    };
    match path.strip_prefix(home) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => format!("~{}", rest),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_recording_settings() {
        let settings = RecordingSettings::sanitized("mp4", "mp4v").unwrap();
        assert_eq!(settings.recording_ext, ".mp4");
        assert_eq!(settings.codec, "mp4v");

        let padded = RecordingSettings::sanitized(".mkv", "H26").unwrap();
        assert_eq!(padded.recording_ext, ".mkv");
        assert_eq!(padded.codec, "0H26");

        assert!(RecordingSettings::sanitized("", "XVID").is_err());
        assert!(RecordingSettings::sanitized(".avi", "").is_err());
    }

    #[test]
    fn test_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        assert_eq!(store.load_recording_settings().unwrap(), RecordingSettings::default());
        assert_eq!(store.load_selection_history().unwrap(), SelectionHistory::default());
    }

    #[test]
    fn test_partial_and_legacy_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(SELECTION_HISTORY_FILE),
            r#"{"ccw_rotations": 3, "new_scaling_factor": 0.5}"#,
        )
        .unwrap();
        let history = SettingsStore::new(dir.path()).load_selection_history().unwrap();
        assert_eq!(history.ccw_rotations, 3);
        assert_eq!(history.scaling_factor, 0.5);
        assert_eq!(history.timelapse_factor, 12.0);
        assert_eq!(history.search_path, "~/Desktop");
    }

    #[test]
    fn test_recording_settings_only_rewritten_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        let defaults = RecordingSettings::default();

        // Absent file is always written
        assert!(store.save_recording_settings(&defaults, &defaults).unwrap());
        assert!(!store.save_recording_settings(&defaults, &defaults).unwrap());

        let changed = RecordingSettings::sanitized("mp4", "XVID").unwrap();
        assert!(store.save_recording_settings(&changed, &defaults).unwrap());
        assert_eq!(store.load_recording_settings().unwrap(), changed);
    }

    #[test]
    fn test_missing_directory_is_never_created() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let store = SettingsStore::new(&missing);
        assert!(!store.save_selection_history(&SelectionHistory::default()).unwrap());
        assert!(!missing.exists());
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(RECORDING_SETTINGS_FILE), "{not json").unwrap();
        assert!(SettingsStore::new(dir.path()).load_recording_settings().is_err());
    }

    #[test]
    fn test_home_expansion() {
        let home = Path::new("/home/user");
        assert_eq!(expand_home("~/Desktop", Some(home)), PathBuf::from("/home/user/Desktop"));
        assert_eq!(expand_home("~", Some(home)), PathBuf::from("/home/user"));
        assert_eq!(expand_home("~other/x", Some(home)), PathBuf::from("~other/x"));
        assert_eq!(expand_home("~/Desktop", None), PathBuf::from("~/Desktop"));

        assert_eq!(collapse_home("/home/user/videos", Some(home)), "~/videos");
        assert_eq!(collapse_home("/home/users/videos", Some(home)), "/home/users/videos");
        assert_eq!(collapse_home("/data", None), "/data");
    }
}
