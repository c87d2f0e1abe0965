use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ForgeError, Result};

/// Platform API server used when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8124";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub build: BuildConfig,
}

impl Config {
    /// Load defaults, then the config file, then `APPFORGE_*` environment overrides.
    ///
    /// An explicit path (argument or `APPFORGE_CONFIG`) replaces the global file.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(explicit_path, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`] with an injectable environment lookup.
    pub fn load_with_env<F>(explicit_path: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| env("APPFORGE_CONFIG").map(PathBuf::from));

        if let Some(path) = explicit {
            match Self::load_patch(&path)? {
                Some(patch) => config.merge_patch(patch),
                None => {
                    return Err(ForgeError::Config(format!(
                        "config file {} does not exist",
                        path.display()
                    )));
                }
            }
        } else if let Some(global) = Self::load_global()? {
            config.merge_patch(global);
        }

        config.apply_env_overrides(&env)?;

        Ok(config)
    }

    fn load_global() -> Result<Option<ConfigPatch>> {
        let Some(dir) = dirs::config_dir() else {
            return Ok(None);
        };
        Self::load_patch(&dir.join("appforge/config.toml"))
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| ForgeError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| ForgeError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.platform {
            self.platform.merge(patch);
        }
        if let Some(patch) = patch.remote {
            self.remote.merge(patch);
        }
        if let Some(patch) = patch.build {
            self.build.merge(patch);
        }
    }

    fn apply_env_overrides<F>(&mut self, env: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = env("APPFORGE_API_URL") {
            self.platform.api_url = value;
        }
        if let Some(value) = env("APPFORGE_TOKEN") {
            self.platform.token = Some(value);
        }
        if let Some(value) = env("APPFORGE_PROJECT") {
            self.platform.default_project = Some(value);
        }
        if let Some(value) = env_u64(env, "APPFORGE_TIMEOUT_SECS")? {
            self.platform.timeout_secs = value;
        }
        if let Some(value) = env_u64(env, "APPFORGE_POLL_INTERVAL_MS")? {
            self.remote.poll_interval = Duration::from_millis(value);
        }
        if let Some(value) = env("APPFORGE_APP_BUILDER") {
            self.remote.app_builder = value;
        }
        if let Some(value) = env("APPFORGE_APPLET_BUILDER") {
            self.remote.applet_builder = value;
        }
        Ok(())
    }

    /// The auth token, or an error naming where to set it.
    pub fn require_token(&self) -> Result<&str> {
        self.platform
            .token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| {
                ForgeError::MissingConfig(
                    "platform.token (set APPFORGE_TOKEN or [platform] token in config.toml)"
                        .to_string(),
                )
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub api_url: String,
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    #[serde(default)]
    pub default_project: Option<String>,
    pub timeout_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            default_project: None,
            timeout_secs: 60,
        }
    }
}

impl PlatformConfig {
    fn merge(&mut self, patch: PlatformPatch) {
        if let Some(value) = patch.api_url {
            self.api_url = value;
        }
        if let Some(value) = patch.token {
            self.token = Some(value);
        }
        if let Some(value) = patch.default_project {
            self.default_project = Some(value);
        }
        if let Some(value) = patch.timeout_secs {
            self.timeout_secs = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Builder app run for remote app builds.
    pub app_builder: String,
    /// Builder app run for remote applet builds.
    pub applet_builder: String,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            app_builder: "app-tarball_app_builder".to_string(),
            applet_builder: "app-tarball_applet_builder".to_string(),
            poll_interval: Duration::from_secs(2),
        }
    }
}

impl RemoteConfig {
    fn merge(&mut self, patch: RemotePatch) {
        if let Some(value) = patch.app_builder {
            self.app_builder = value;
        }
        if let Some(value) = patch.applet_builder {
            self.applet_builder = value;
        }
        if let Some(value) = patch.poll_interval {
            self.poll_interval = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Name given to the temporary project of a local app build.
    pub temp_project_name: String,
    /// Name given to the temporary project of a remote app build.
    pub remote_project_name: String,
    pub make_command: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            temp_project_name: "Temporary build project for appforge".to_string(),
            remote_project_name: "appforge --remote temporary project".to_string(),
            make_command: "make".to_string(),
        }
    }
}

impl BuildConfig {
    fn merge(&mut self, patch: BuildPatch) {
        if let Some(value) = patch.temp_project_name {
            self.temp_project_name = value;
        }
        if let Some(value) = patch.remote_project_name {
            self.remote_project_name = value;
        }
        if let Some(value) = patch.make_command {
            self.make_command = value;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub platform: Option<PlatformPatch>,
    pub remote: Option<RemotePatch>,
    pub build: Option<BuildPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PlatformPatch {
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub default_project: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RemotePatch {
    pub app_builder: Option<String>,
    pub applet_builder: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub poll_interval: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BuildPatch {
    pub temp_project_name: Option<String>,
    pub remote_project_name: Option<String>,
    pub make_command: Option<String>,
}

fn env_u64<F>(env: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match env(key) {
        Some(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|err| ForgeError::Config(format!("invalid {key} value {value}: {err}"))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_point_at_local_api_server() {
        let config = Config::default();
        assert_eq!(config.platform.api_url, "http://localhost:8124");
        assert!(config.platform.token.is_none());
        assert_eq!(config.remote.app_builder, "app-tarball_app_builder");
        assert_eq!(config.remote.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn load_patch_nonexistent_file() {
        let result = Config::load_patch(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn explicit_config_file_is_merged() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[platform]
api_url = "https://api.example.test"
default_project = "project-123"

[remote]
poll_interval = "500ms"
"#,
        )
        .unwrap();

        let config = Config::load_with_env(Some(&path), env_from(&[])).unwrap();
        assert_eq!(config.platform.api_url, "https://api.example.test");
        assert_eq!(config.platform.default_project.as_deref(), Some("project-123"));
        assert_eq!(config.remote.poll_interval, Duration::from_millis(500));
        assert_eq!(config.remote.applet_builder, "app-tarball_applet_builder");
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let err = Config::load_with_env(Some(Path::new("/nonexistent/appforge.toml")), env_from(&[]))
            .unwrap_err();
        assert!(matches!(err, ForgeError::Config(_)));
    }

    #[test]
    fn invalid_toml_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[platform\napi_url = 1").unwrap();

        let err = Config::load_with_env(Some(&path), env_from(&[])).unwrap_err();
        assert!(err.to_string().contains("parse config"));
    }

    #[test]
    fn env_overrides_win_over_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[platform]\napi_url = \"https://file.test\"\n").unwrap();

        let env = env_from(&[
            ("APPFORGE_API_URL", "https://env.test"),
            ("APPFORGE_TOKEN", "secret"),
            ("APPFORGE_POLL_INTERVAL_MS", "250"),
        ]);
        let config = Config::load_with_env(Some(&path), env).unwrap();
        assert_eq!(config.platform.api_url, "https://env.test");
        assert_eq!(config.require_token().unwrap(), "secret");
        assert_eq!(config.remote.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn config_path_from_env() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("alt.toml");
        std::fs::write(&path, "[build]\nmake_command = \"gmake\"\n").unwrap();

        let path_str = path.to_string_lossy().to_string();
        let config =
            Config::load_with_env(None, env_from(&[("APPFORGE_CONFIG", path_str.as_str())]))
                .unwrap();
        assert_eq!(config.build.make_command, "gmake");
    }

    #[test]
    fn invalid_numeric_env_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "").unwrap();

        let err = Config::load_with_env(
            Some(&path),
            env_from(&[("APPFORGE_TIMEOUT_SECS", "soon")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("APPFORGE_TIMEOUT_SECS"));
    }

    #[test]
    fn blank_token_is_missing() {
        let mut config = Config::default();
        config.platform.token = Some("   ".to_string());
        assert!(matches!(
            config.require_token(),
            Err(ForgeError::MissingConfig(_))
        ));
    }

    #[test]
    fn token_is_not_serialized() {
        let mut config = Config::default();
        config.platform.token = Some("secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
