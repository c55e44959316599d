use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

pub const DEFAULT_NETBOX_URL: &str = "http://localhost:8000";

/// Settings for `osd-registry serve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub http_addr: String,
    pub log_level: String,
    /// Host inventory seed (sites, racks, devices).
    pub inventory_file: Option<PathBuf>,
    /// Snapshot file; the registry is memory-only when unset.
    pub data_file: Option<PathBuf>,
    /// Base URL used when rendering `url`/`next`/`previous` links.
    pub public_url: String,
    pub page_size: usize,
    pub max_page_size: usize,
    /// Days of change log to keep; 0 keeps everything.
    pub changelog_retention_days: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:8000".to_string(),
            log_level: "info".to_string(),
            inventory_file: None,
            data_file: None,
            public_url: String::new(),
            page_size: 50,
            max_page_size: 1000,
            changelog_retention_days: 90,
        }
    }
}

impl ServerConfig {
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("osd-registry").join("config.yaml"))
    }

    /// Defaults, then the YAML file (if present), then `OSD_REGISTRY_*` env.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(ServerConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("OSD_REGISTRY_"))
    }

    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: ServerConfig = figment.extract().context("loading server config")?;
        if config.page_size == 0 || config.page_size > config.max_page_size {
            bail!(
                "page_size must be between 1 and max_page_size ({})",
                config.max_page_size
            );
        }
        Ok(config)
    }
}

/// Load the server config from `path`, or the default location.
pub fn load(path: Option<&Path>) -> Result<ServerConfig> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                bail!("config file {} does not exist", p.display());
            }
            p.to_path_buf()
        }
        None => ServerConfig::default_path()?,
    };
    ServerConfig::from_figment(&ServerConfig::figment(&path))
        .with_context(|| format!("reading {}", path.display()))
}

/// Connection settings for commands talking to a NetBox-compatible API,
/// taken from `NETBOX_URL` and `NETBOX_TOKEN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl ApiConfig {
    pub fn figment() -> Figment {
        Figment::from(Serialized::default("url", DEFAULT_NETBOX_URL)).merge(Env::prefixed("NETBOX_"))
    }

    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let mut config: ApiConfig = figment.extract().context("loading API config")?;
        config.url = config.url.trim_end_matches('/').to_string();
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_figment(&Self::figment())
    }

    /// The token, which every write to the API needs.
    pub fn require_token(&self) -> Result<&str> {
        match self.token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(token),
            _ => bail!("Set NETBOX_TOKEN environment variable first."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn yaml_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "http_addr: 0.0.0.0:9200\npage_size: 25\ndata_file: /tmp/osd.json\nchangelog_retention_days: 7"
        )
        .unwrap();

        let figment = Figment::from(Serialized::defaults(ServerConfig::default()))
            .merge(Yaml::file(file.path()));
        let config = ServerConfig::from_figment(&figment).unwrap();
        assert_eq!(config.http_addr, "0.0.0.0:9200");
        assert_eq!(config.page_size, 25);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.data_file, Some(PathBuf::from("/tmp/osd.json")));
        assert_eq!(config.changelog_retention_days, 7);
    }

    #[test]
    fn missing_yaml_file_yields_defaults() {
        let figment = Figment::from(Serialized::defaults(ServerConfig::default()))
            .merge(Yaml::file("/nonexistent/osd-registry.yaml"));
        assert_eq!(ServerConfig::from_figment(&figment).unwrap(), ServerConfig::default());
    }

    #[test]
    fn rejects_zero_page_size() {
        let figment =
            Figment::from(Serialized::defaults(ServerConfig::default())).merge(("page_size", 0));
        assert!(ServerConfig::from_figment(&figment).is_err());
    }

    #[test]
    fn api_url_defaults_and_trims() {
        let config =
            ApiConfig::from_figment(&Figment::from(Serialized::default("url", DEFAULT_NETBOX_URL)))
                .unwrap();
        assert_eq!(config.url, "http://localhost:8000");
        assert!(config.require_token().is_err());

        let config = ApiConfig::from_figment(
            &Figment::from(Serialized::default("url", "https://netbox.example.com/"))
                .merge(("token", "abc123")),
        )
        .unwrap();
        assert_eq!(config.url, "https://netbox.example.com");
        assert_eq!(config.require_token().unwrap(), "abc123");
    }

    #[test]
    fn blank_token_is_missing() {
        let config = ApiConfig {
            url: DEFAULT_NETBOX_URL.to_string(),
            token: Some("  ".to_string()),
        };
        let err = config.require_token().unwrap_err();
        assert_eq!(err.to_string(), "Set NETBOX_TOKEN environment variable first.");
    }
}
