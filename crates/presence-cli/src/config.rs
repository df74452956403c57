use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Attendance backend used when nothing else is configured.
pub const DEFAULT_BACKEND_URL: &str = "https://web-production-2da4.up.railway.app";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Client configuration: defaults, then an optional TOML file, then
/// `PRESENCE_*` environment variables. Command-line flags are applied by
/// the caller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base URL of the attendance backend.
    pub backend_url: String,
    /// Whether to probe for a camera at all.
    pub camera_enabled: bool,
    /// V4L2 device path; the first capture device when unset.
    pub camera_device: Option<String>,
    /// Where downloaded reports are written.
    pub download_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            camera_enabled: true,
            camera_device: None,
            download_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Load from the config file (if any) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match config_file_path(|key| std::env::var(key).ok()) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    /// Overlay `PRESENCE_*` variables looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("PRESENCE_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Some(device) = var("PRESENCE_CAMERA_DEVICE") {
            self.camera_device = Some(device).filter(|d| !d.is_empty());
        }
        if let Some(enabled) = var("PRESENCE_CAMERA_ENABLED") {
            self.camera_enabled = enabled != "0";
        }
        if let Some(dir) = var("PRESENCE_DOWNLOAD_DIR") {
            self.download_dir = PathBuf::from(dir);
        }
    }
}

/// `PRESENCE_CONFIG` if set; otherwise the XDG config file when it exists.
fn config_file_path(var: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(explicit) = var("PRESENCE_CONFIG") {
        return Some(PathBuf::from(explicit));
    }
    let config_home = var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| var("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    let path = config_home.join("presence").join("config.toml");
    path.exists().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert!(config.camera_enabled);
        assert!(config.camera_device.is_none());
        assert_eq!(config.download_dir, PathBuf::from("."));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("PRESENCE_BACKEND_URL", "http://127.0.0.1:5000"),
            ("PRESENCE_CAMERA_DEVICE", "/dev/video2"),
            ("PRESENCE_CAMERA_ENABLED", "0"),
            ("PRESENCE_DOWNLOAD_DIR", "/tmp/reports"),
        ]));
        assert_eq!(config.backend_url, "http://127.0.0.1:5000");
        assert_eq!(config.camera_device.as_deref(), Some("/dev/video2"));
        assert!(!config.camera_enabled);
        assert_eq!(config.download_dir, PathBuf::from("/tmp/reports"));
    }

    #[test]
    fn test_empty_camera_device_clears() {
        let mut config = Config {
            camera_device: Some("/dev/video0".into()),
            ..Config::default()
        };
        config.apply_env(env(&[("PRESENCE_CAMERA_DEVICE", "")]));
        assert!(config.camera_device.is_none());
    }

    #[test]
    fn test_from_file_partial() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "backend_url = \"http://attendance.local\"\ncamera_enabled = false\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.backend_url, "http://attendance.local");
        assert!(!config.camera_enabled);
        assert_eq!(config.download_dir, PathBuf::from("."));
    }

    #[test]
    fn test_from_file_rejects_unknown_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "backend = \"http://x\"\n").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_config_file_path_resolution() {
        assert_eq!(
            config_file_path(env(&[("PRESENCE_CONFIG", "/etc/presence.toml")])),
            Some(PathBuf::from("/etc/presence.toml"))
        );

        let tmp = tempfile::tempdir().unwrap();
        let xdg = tmp.path().to_str().unwrap();
        assert_eq!(config_file_path(env(&[("XDG_CONFIG_HOME", xdg)])), None);

        std::fs::create_dir_all(tmp.path().join("presence")).unwrap();
        std::fs::write(tmp.path().join("presence/config.toml"), "").unwrap();
        assert_eq!(
            config_file_path(env(&[("XDG_CONFIG_HOME", xdg)])),
            Some(tmp.path().join("presence/config.toml"))
        );
    }
}
