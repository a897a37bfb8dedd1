//! Connection configuration.
//!
//! A [`StoreConfig`] names the backend project and carries the credential
//! key. Sources, lowest to highest precedence:
//!
//! 1. built-in defaults
//! 2. TOML file (`~/.config/gatehouse/config.toml` or an explicit path)
//! 3. `GATEHOUSE_*` environment variables
//!
//! A missing `api_key` is a valid configuration: the
//! [`ClientRegistry`](crate::ClientRegistry) answers it with stub handles.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, ENV_API_KEY, ENV_APP_ID, ENV_AUTH_DOMAIN,
    ENV_FORCE_LONG_POLLING, ENV_PROJECT_ID,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Wire transport the store client should use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Bidirectional socket; the store's default.
    WebSocket,
    /// HTTP long-polling, for networks that block sockets.
    LongPolling,
}

/// Named connection parameters for the store and auth clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Credential key. Absent means "run with stub handles".
    pub api_key: Option<String>,
    pub auth_domain: Option<String>,
    pub project_id: Option<String>,
    pub app_id: Option<String>,
    /// Force long-polling instead of sockets. On by default since sockets
    /// are commonly blocked on the networks this runs on.
    pub force_long_polling: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            auth_domain: None,
            project_id: None,
            app_id: None,
            force_long_polling: true,
        }
    }
}

impl StoreConfig {
    /// Whether the credential key is present and non-blank.
    pub fn has_credentials(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn transport(&self) -> Transport {
        if self.force_long_polling {
            Transport::LongPolling
        } else {
            Transport::WebSocket
        }
    }

    /// Default config file location (`~/.config/gatehouse/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Overlay values from `lookup` (normally the process environment).
    ///
    /// Empty values are ignored so an exported-but-blank variable does not
    /// clobber a file setting.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_API_KEY) {
            self.api_key = Some(v);
        }
        if let Some(v) = get(ENV_AUTH_DOMAIN) {
            self.auth_domain = Some(v);
        }
        if let Some(v) = get(ENV_PROJECT_ID) {
            self.project_id = Some(v);
        }
        if let Some(v) = get(ENV_APP_ID) {
            self.app_id = Some(v);
        }
        if let Some(v) = get(ENV_FORCE_LONG_POLLING) {
            match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.force_long_polling = true,
                "0" | "false" | "no" | "off" => self.force_long_polling = false,
                other => tracing::warn!("Ignoring {ENV_FORCE_LONG_POLLING}={other}: not a boolean"),
            }
        }
        self
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::default().apply_env(|name| std::env::var(name).ok())
    }

    /// Resolve the effective config: file (explicit path, else the default
    /// location if it exists), then environment.
    ///
    /// An explicit path that cannot be read is an error; a missing default
    /// file is not.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(p) => Self::load(p)?,
            None => match Self::default_path() {
                Some(p) if p.exists() => Self::load(&p)?,
                _ => Self::default(),
            },
        };
        Ok(base.apply_env(|name| std::env::var(name).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_has_no_credentials() {
        let c = StoreConfig::default();
        assert!(!c.has_credentials());
        assert_eq!(c.transport(), Transport::LongPolling);
    }

    #[test]
    fn test_blank_key_is_not_a_credential() {
        let c = StoreConfig {
            api_key: Some("   ".into()),
            ..Default::default()
        };
        assert!(!c.has_credentials());
    }

    #[test]
    fn test_parse_toml() {
        let c = StoreConfig::from_toml_str(
            r#"
            api_key = "k-123"
            project_id = "camp-alpha"
            force_long_polling = false
            "#,
        )
        .unwrap();
        assert!(c.has_credentials());
        assert_eq!(c.project_id.as_deref(), Some("camp-alpha"));
        assert_eq!(c.transport(), Transport::WebSocket);
        assert_eq!(c.auth_domain, None);
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            StoreConfig::from_toml_str("api_key = ["),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = StoreConfig::from_toml_str("api_key = \"from-file\"\nproject_id = \"p\"").unwrap();
        let c = file.apply_env(env(&[
            (ENV_API_KEY, "from-env"),
            (ENV_PROJECT_ID, ""),
            (ENV_FORCE_LONG_POLLING, "off"),
        ]));
        assert_eq!(c.api_key.as_deref(), Some("from-env"));
        // Blank env var leaves the file value alone
        assert_eq!(c.project_id.as_deref(), Some("p"));
        assert!(!c.force_long_polling);
    }

    #[test]
    fn test_unparseable_bool_is_ignored() {
        let c = StoreConfig::default().apply_env(env(&[(ENV_FORCE_LONG_POLLING, "maybe")]));
        assert!(c.force_long_polling);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api_key = \"abc\"\nauth_domain = \"camp.example\"").unwrap();
        let c = StoreConfig::load(file.path()).unwrap();
        assert_eq!(c.auth_domain.as_deref(), Some("camp.example"));
        assert!(c.force_long_polling);
    }

    #[test]
    fn test_load_missing_explicit_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = StoreConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
