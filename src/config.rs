//! Configuration.
//!
//! TOML file, resolved in order: explicit path, `JITCALL_CONFIG`, then
//! `config.toml` under the platform config directory. A missing file at the
//! env or default location yields defaults; a missing explicit path is an
//! error. Environment overrides are applied on top of the file.

use crate::auth::firebase::DEFAULT_IDENTITY_ENDPOINT;
use crate::integrations::SupabaseConfig;
use anyhow::Context;
use directories::ProjectDirs;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Database file inside the data directory.
pub const DB_FILE_NAME: &str = "jitcall.db";

const CONFIG_FILE_NAME: &str = "config.toml";
const REDACTED: &str = "***";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub identity: IdentityConfig,
    pub external_api: ExternalApiConfig,
    pub storage: StorageConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supabase: Option<SupabaseConfig>,
    /// File this config was read from, if any.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// "memory" or "firebase".
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Identity Toolkit REST base.
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            provider: "memory".into(),
            api_key: None,
            endpoint: DEFAULT_IDENTITY_ENDPOINT.into(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ExternalApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".into(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Defaults to the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolve_data_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| anyhow::anyhow!("Could not determine a data directory; set storage.data_dir"))
    }

    pub fn db_path(&self) -> anyhow::Result<PathBuf> {
        Ok(self.resolve_data_dir()?.join(DB_FILE_NAME))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "jitcall", "jitcall")
}

/// Default config file location, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

impl Config {
    /// Load, apply environment overrides and validate.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with(explicit, |name| std::env::var(name).ok())
    }

    fn load_with(
        explicit: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = lookup("JITCALL_CONFIG")
                    .filter(|p| !p.trim().is_empty())
                    .map(PathBuf::from)
                    .or_else(default_config_path);
                match path {
                    Some(path) if path.exists() => Self::from_file(&path)?,
                    Some(path) => {
                        tracing::debug!(path = %path.display(), "No config file; using defaults");
                        Self::default()
                    }
                    None => Self::default(),
                }
            }
        };

        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Apply `JITCALL_*` and `SUPABASE_*` environment overrides.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("JITCALL_EXTERNAL_API_URL") {
            self.external_api.base_url = url.trim().to_string();
        }
        if let Some(key) = non_empty("JITCALL_FIREBASE_API_KEY") {
            self.identity.api_key = Some(key.trim().to_string());
        }
        if let Some(dir) = non_empty("JITCALL_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(dir.trim()));
        }

        if let Some(env) = SupabaseConfig::from_lookup(&lookup) {
            match self.supabase.as_mut() {
                Some(existing) => {
                    existing.url = env.url;
                    existing.anon_key = env.anon_key;
                }
                None => self.supabase = Some(env),
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validate_http_url("external_api.base_url", &self.external_api.base_url)?;
        if self.external_api.timeout_secs == 0 {
            anyhow::bail!("external_api.timeout_secs must be greater than 0");
        }
        if self.identity.timeout_secs == 0 {
            anyhow::bail!("identity.timeout_secs must be greater than 0");
        }

        match self.identity.provider.as_str() {
            "memory" => {}
            "firebase" => {
                let has_key = self
                    .identity
                    .api_key
                    .as_deref()
                    .is_some_and(|k| !k.trim().is_empty());
                if !has_key {
                    anyhow::bail!(
                        "identity.provider='firebase' requires identity.api_key (or JITCALL_FIREBASE_API_KEY)"
                    );
                }
                validate_http_url("identity.endpoint", &self.identity.endpoint)?;
            }
            other => anyhow::bail!(
                "Unknown identity provider '{other}'. Supported values: memory, firebase"
            ),
        }

        if let Some(supabase) = &self.supabase {
            validate_http_url("supabase.url", &supabase.url)?;
            if supabase.anon_key.trim().is_empty() {
                anyhow::bail!("supabase.anon_key cannot be empty");
            }
        }
        Ok(())
    }

    /// Copy with every secret replaced, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.identity.api_key.is_some() {
            copy.identity.api_key = Some(REDACTED.into());
        }
        if let Some(supabase) = copy.supabase.as_mut() {
            supabase.anon_key = REDACTED.into();
        }
        copy
    }
}

fn validate_http_url(field: &str, value: &str) -> anyhow::Result<()> {
    let url = Url::parse(value.trim()).with_context(|| format!("{field} is not a valid URL: '{value}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("{field} must use http or https, got '{}'", url.scheme());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.identity.provider, "memory");
        assert_eq!(config.identity.endpoint, DEFAULT_IDENTITY_ENDPOINT);
        assert_eq!(config.external_api.timeout_secs, 30);
        assert!(config.supabase.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn parses_full_file() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[identity]
provider = "firebase"
api_key = "fb-key"

[external_api]
base_url = "https://api.example.com/v1"
timeout_secs = 10

[storage]
data_dir = "/var/lib/jitcall"

[supabase]
url = "https://p.supabase.co"
anon_key = "anon"
photo_bucket = "avatars"
"#,
        );

        let config = Config::load_with(Some(&path), env(&[])).unwrap();
        assert_eq!(config.identity.provider, "firebase");
        assert_eq!(config.identity.timeout_secs, 30);
        assert_eq!(config.external_api.base_url, "https://api.example.com/v1");
        assert_eq!(config.external_api.timeout_secs, 10);
        assert_eq!(
            config.storage.db_path().unwrap(),
            PathBuf::from("/var/lib/jitcall").join(DB_FILE_NAME)
        );
        let supabase = config.supabase.unwrap();
        assert_eq!(supabase.photo_bucket, "avatars");
        assert_eq!(supabase.profile_table, "users");
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.toml");
        assert!(Config::load_with(Some(&missing), env(&[])).is_err());
    }

    #[test]
    fn missing_env_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.toml");
        let config =
            Config::load_with(None, env(&[("JITCALL_CONFIG", missing.to_str().unwrap())])).unwrap();
        assert_eq!(config.external_api, ExternalApiConfig::default());
        assert!(config.config_path.is_none());
    }

    #[test]
    fn env_config_path_is_used() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(&tmp, "[external_api]\nbase_url = \"https://env.example.com\"\n");
        let config =
            Config::load_with(None, env(&[("JITCALL_CONFIG", path.to_str().unwrap())])).unwrap();
        assert_eq!(config.external_api.base_url, "https://env.example.com");
    }

    #[test]
    fn env_overrides_win_over_file() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            "[external_api]\nbase_url = \"https://file.example.com\"\n[supabase]\nurl = \"https://file.supabase.co\"\nanon_key = \"file\"\ncontacts_table = \"friends\"\n",
        );
        let config = Config::load_with(
            Some(&path),
            env(&[
                ("JITCALL_EXTERNAL_API_URL", "https://env.example.com"),
                ("JITCALL_FIREBASE_API_KEY", "env-key"),
                ("JITCALL_DATA_DIR", "/tmp/jitcall-data"),
                ("SUPABASE_URL", "https://env.supabase.co"),
                ("SUPABASE_ANON_KEY", "env-anon"),
            ]),
        )
        .unwrap();

        assert_eq!(config.external_api.base_url, "https://env.example.com");
        assert_eq!(config.identity.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.storage.data_dir, Some(PathBuf::from("/tmp/jitcall-data")));
        let supabase = config.supabase.unwrap();
        assert_eq!(supabase.url, "https://env.supabase.co");
        assert_eq!(supabase.anon_key, "env-anon");
        assert_eq!(supabase.contacts_table, "friends");
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(env(&[("JITCALL_EXTERNAL_API_URL", "  ")]));
        assert_eq!(config.external_api, ExternalApiConfig::default());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::default();
        config.external_api.base_url = "not a url".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.external_api.base_url = "ftp://files.example.com".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.external_api.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.identity.provider = "firebase".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("requires identity.api_key"));

        let mut config = Config::default();
        config.identity.provider = "ldap".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn redacted_hides_secrets() {
        let mut config = Config::default();
        config.identity.api_key = Some("fb-secret".into());
        config.supabase = Some(SupabaseConfig::new("https://p.supabase.co", "anon-secret"));

        let rendered = toml::to_string_pretty(&config.redacted()).unwrap();
        assert!(!rendered.contains("fb-secret"));
        assert!(!rendered.contains("anon-secret"));
        assert!(rendered.contains("https://p.supabase.co"));
        assert_eq!(config.identity.api_key.as_deref(), Some("fb-secret"));
    }
}
