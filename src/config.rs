// Service endpoint configuration and the small settings file that carries
// the server URL and key from one invocation to the next.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_SERVER: &str = "http://api.resh.io";
pub const SERVER_ENV: &str = "RESH_SERVER";
pub const KEY_ENV: &str = "RESH_KEY";

/// Where and as whom to talk to the service. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub base_url: String,
    pub credential_key: Option<String>,
}

impl ServiceEndpoint {
    pub fn new(base_url: impl Into<String>, credential_key: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        ServiceEndpoint {
            base_url,
            credential_key: credential_key.filter(|k| !k.is_empty()),
        }
    }
}

/// Values remembered between runs.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl Settings {
    /// Default location: `<config dir>/resh/config.json`, falling back to
    /// the home directory and then the current one.
    pub fn default_path() -> PathBuf {
        let dir = dirs::config_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        dir.join("resh").join("config.json")
    }

    /// A missing or unreadable file gives empty settings.
    pub fn load(path: &Path) -> Settings {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no stored settings");
                return Settings::default();
            }
        };
        serde_json::from_str(&data).unwrap_or_else(|e| {
            debug!(path = %path.display(), error = %e, "ignoring malformed settings");
            Settings::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(self).context("Serializing settings")?;
        std::fs::write(path, data)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;
        Ok(())
    }

    /// What gets remembered: flag values replace stored ones. The
    /// environment never reaches this.
    pub fn with_flags(&self, server_flag: Option<&str>, key_flag: Option<&str>) -> Settings {
        Settings {
            server: server_flag.map(str::to_string).or_else(|| self.server.clone()),
            key: key_flag.map(str::to_string).or_else(|| self.key.clone()),
        }
    }

    /// Precedence: explicit flag, environment, stored value, default.
    pub fn endpoint(&self, server_flag: Option<&str>, key_flag: Option<&str>) -> ServiceEndpoint {
        self.endpoint_with_env(server_flag, key_flag, |name| std::env::var(name).ok())
    }

    pub fn endpoint_with_env(
        &self,
        server_flag: Option<&str>,
        key_flag: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> ServiceEndpoint {
        let env = |name: &str| env(name).filter(|v| !v.trim().is_empty());
        let server = server_flag
            .map(str::to_string)
            .or_else(|| env(SERVER_ENV))
            .or_else(|| self.server.clone())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string());
        let key = key_flag
            .map(str::to_string)
            .or_else(|| env(KEY_ENV))
            .or_else(|| self.key.clone());
        ServiceEndpoint::new(server, key)
    }
}
