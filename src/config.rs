//! Configuration management for refract
//!
//! Stores settings in ~/.config/refract/config.json. Keys use the same names
//! an editor settings page would show (`optimizationGoal`, `backend`, ...).

use crate::keyring;
use crate::transform::{BackendKind, Intent};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_GOAL: &str = "readability";
pub const DEFAULT_BACKEND: &str = "claude";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Read-only key/value view of the configuration.
pub trait ConfigProvider {
    /// Raw value for `key`, `None` when unset.
    fn get_value(&self, key: &str) -> Option<serde_json::Value>;

    /// Typed value for `key`, or `default` when unset or of the wrong type.
    fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T
    where
        Self: Sized,
    {
        self.get_value(key)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or(default)
    }
}

/// Where a credential may be looked up besides the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CredentialSources {
    environment: bool,
    keychain: bool,
}

impl Default for CredentialSources {
    fn default() -> Self {
        Self {
            environment: true,
            keychain: true,
        }
    }
}

/// Where `set_credential` ended up storing a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialLocation {
    Keychain,
    ConfigFile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub optimization_goal: String,
    /// Backend used for refactoring
    pub backend: String,
    /// If false, replacements are applied without a preview
    pub preview_changes: bool,
    pub request_timeout_secs: u64,
    /// Plaintext fallback when the system keychain is unavailable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub huggingface_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub huggingface_endpoint: Option<String>,
    #[serde(skip)]
    credential_sources: CredentialSources,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            optimization_goal: DEFAULT_GOAL.to_string(),
            backend: DEFAULT_BACKEND.to_string(),
            preview_changes: true,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            anthropic_api_key: None,
            huggingface_api_key: None,
            anthropic_endpoint: None,
            huggingface_endpoint: None,
            credential_sources: CredentialSources::default(),
        }
    }
}

impl ConfigProvider for Config {
    fn get_value(&self, key: &str) -> Option<serde_json::Value> {
        let value = serde_json::to_value(self).ok()?;
        value.get(key).filter(|v| !v.is_null()).cloned()
    }
}

/// Environment variable that overrides the stored key for `backend`.
pub fn credential_env_var(backend: BackendKind) -> &'static str {
    match backend {
        BackendKind::Claude => "ANTHROPIC_API_KEY",
        BackendKind::HuggingFace => "HUGGINGFACE_API_KEY",
    }
}

/// Config key holding the plaintext fallback for `backend`.
pub fn credential_key(backend: BackendKind) -> &'static str {
    match backend {
        BackendKind::Claude => "anthropicApiKey",
        BackendKind::HuggingFace => "huggingfaceApiKey",
    }
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("refract"))
    }

    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return default
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from `path`. A corrupt file is moved aside and defaults are used.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                preserve_corrupt_config(path, &content);
                warn!(
                    path = %path.display(),
                    error = %err,
                    "config file was corrupted; a backup was saved and defaults were loaded"
                );
                Self::default()
            }
        }
    }

    /// Save config to disk
    pub fn save(&self) -> Result<(), String> {
        let path =
            Self::config_path().ok_or_else(|| "Could not determine config directory".to_string())?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
                    warn!(error = %e, "failed to set config directory permissions");
                }
            }
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        #[cfg(unix)]
        {
            write_config_atomic(path, &content)
                .map_err(|e| format!("Failed to write config: {}", e))?;
        }

        #[cfg(not(unix))]
        {
            fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))?;
        }

        Ok(())
    }

    /// Ignore environment variables and the keychain; only this config's own
    /// fields count.
    pub fn without_ambient_credentials(mut self) -> Self {
        self.credential_sources = CredentialSources {
            environment: false,
            keychain: false,
        };
        self
    }

    /// Configured goal, falling back to readability for unknown values.
    pub fn optimization_goal(&self) -> Intent {
        let goal: String = self.get("optimizationGoal", DEFAULT_GOAL.to_string());
        goal.parse().unwrap_or_else(|err| {
            warn!(%err, "unknown optimizationGoal, using readability");
            Intent::Readability
        })
    }

    pub fn selected_backend(&self) -> BackendKind {
        self.backend.parse().unwrap_or_else(|err| {
            warn!(%err, "unknown backend, using claude");
            BackendKind::Claude
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn endpoint(&self, backend: BackendKind) -> Option<&str> {
        match backend {
            BackendKind::Claude => self.anthropic_endpoint.as_deref(),
            BackendKind::HuggingFace => self.huggingface_endpoint.as_deref(),
        }
    }

    /// Key for `backend`: environment, then keychain, then the config file.
    pub fn credential(&self, backend: BackendKind) -> Option<String> {
        if self.credential_sources.environment {
            if let Ok(key) = std::env::var(credential_env_var(backend)) {
                if !key.trim().is_empty() {
                    debug!(%backend, "using credential from environment");
                    return Some(key);
                }
            }
        }

        if self.credential_sources.keychain {
            if let Some(key) = keyring::get_credential(backend) {
                debug!(%backend, "using credential from keychain");
                return Some(key);
            }
        }

        self.get_value(credential_key(backend))
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Store a key: keychain when possible, config file otherwise.
    pub fn set_credential(
        &mut self,
        backend: BackendKind,
        key: &str,
    ) -> Result<CredentialLocation, String> {
        match keyring::set_credential(backend, key) {
            Ok(()) => {
                // Drop any plaintext copy now that the keychain has it
                if self.plaintext_credential_mut(backend).take().is_some() {
                    self.save()?;
                }
                Ok(CredentialLocation::Keychain)
            }
            Err(err) => {
                warn!(%backend, error = %err, "keychain unavailable, storing key in config file");
                *self.plaintext_credential_mut(backend) = Some(key.to_string());
                self.save()?;
                Ok(CredentialLocation::ConfigFile)
            }
        }
    }

    fn plaintext_credential_mut(&mut self, backend: BackendKind) -> &mut Option<String> {
        match backend {
            BackendKind::Claude => &mut self.anthropic_api_key,
            BackendKind::HuggingFace => &mut self.huggingface_api_key,
        }
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/refract/config.json".to_string())
    }
}

/// Whether `key` looks like a key for `backend`. Used for setup warnings;
/// hard validation happens when the backend is built.
pub fn validate_key_format(backend: BackendKind, key: &str) -> bool {
    match backend {
        BackendKind::Claude => key.starts_with("sk-ant-"),
        BackendKind::HuggingFace => key.starts_with(crate::transform::huggingface::KEY_PREFIX),
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

#[cfg(unix)]
fn write_config_atomic(path: &Path, content: &str) -> Result<(), String> {
    use std::fs::OpenOptions;
    use std::os::unix::fs::PermissionsExt;

    let tmp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)
        .map_err(|e| e.to_string())?;

    if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
        warn!(error = %e, "failed to set temp config file permissions");
    }

    file.write_all(content.as_bytes())
        .map_err(|e| e.to_string())?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.optimization_goal(), Intent::Readability);
        assert_eq!(config.selected_backend(), BackendKind::Claude);
        assert!(config.preview_changes);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_provider_get_with_default() {
        let config = Config {
            optimization_goal: "security".to_string(),
            ..Config::default()
        };
        assert_eq!(config.get("optimizationGoal", String::new()), "security");
        assert_eq!(config.get("anthropicApiKey", "none".to_string()), "none");
        assert_eq!(config.get("missingKey", 7u32), 7);
        // Wrong type falls back too
        assert!(!config.get("optimizationGoal", false));
        assert_eq!(config.optimization_goal(), Intent::Security);
    }

    #[test]
    fn test_unknown_goal_falls_back() {
        let config = Config {
            optimization_goal: "vibes".to_string(),
            ..Config::default()
        };
        assert_eq!(config.optimization_goal(), Intent::Readability);
    }

    #[test]
    fn test_isolated_credentials_come_from_fields() {
        let config = Config {
            huggingface_api_key: Some("hf_file".to_string()),
            ..Config::default()
        }
        .without_ambient_credentials();
        assert_eq!(config.credential(BackendKind::HuggingFace).as_deref(), Some("hf_file"));
        assert_eq!(config.credential(BackendKind::Claude), None);
    }

    #[test]
    fn test_load_reads_camel_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"optimizationGoal":"performance","backend":"huggingface","previewChanges":false}"#,
        )
        .unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.optimization_goal(), Intent::Performance);
        assert_eq!(config.selected_backend(), BackendKind::HuggingFace);
        assert!(!config.preview_changes);
        assert_eq!(config.request_timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_save_round_trip_omits_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            optimization_goal: "security".to_string(),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"optimizationGoal\": \"security\""));
        assert!(!raw.contains("anthropicApiKey"));
        assert_eq!(Config::load_from(&path).optimization_goal(), Intent::Security);
    }

    #[test]
    fn test_corrupt_config_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.backend, DEFAULT_BACKEND);
        assert!(dir.path().join("config.json.corrupt").exists());
        assert!(!path.exists());
    }

    #[test]
    fn test_validate_key_format() {
        assert!(validate_key_format(BackendKind::HuggingFace, "hf_abc"));
        assert!(!validate_key_format(BackendKind::HuggingFace, "sk-abc"));
        assert!(validate_key_format(BackendKind::Claude, "sk-ant-abc"));
    }
}
