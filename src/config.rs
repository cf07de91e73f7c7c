//! Layered configuration: defaults, optional TOML file, environment.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

/// Environment variable prefix; `CHATRELAY_API_TOKEN` et al.
const ENV_PREFIX: &str = "CHATRELAY";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the proxy server binds to.
    pub listen_addr: String,
    /// Base URL of the upstream conversational API.
    pub upstream_base_url: String,
    /// Bearer token for the upstream API. Environment only in practice;
    /// without it the server answers every request with a 500.
    pub api_token: Option<String>,
    /// Base URL of the proxy, used by the chat client.
    pub proxy_base_url: String,
    /// Node (assistant) identifier sent with every prompt.
    pub node_id: String,
    /// Wire-level user id the API expects from shared deployments.
    pub share_user_id: String,
    /// Override for the client state file location.
    pub state_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8787".to_string(),
            upstream_base_url: crate::upstream::DEFAULT_BASE_URL.to_string(),
            api_token: None,
            proxy_base_url: "http://127.0.0.1:8787".to_string(),
            node_id: String::new(),
            share_user_id: "__share__".to_string(),
            state_path: None,
        }
    }
}

impl Settings {
    /// Load settings, layering an optional TOML file under the
    /// environment. An explicitly given path must exist; the default
    /// path is optional.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        match config_path {
            Some(path) => {
                builder = builder.add_source(
                    File::from(path.to_path_buf())
                        .format(FileFormat::Toml)
                        .required(true),
                );
            }
            None => {
                builder = builder.add_source(
                    File::from(Self::default_config_path())
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX));

        let settings = builder
            .build()
            .context("loading configuration")?
            .try_deserialize()
            .context("deserializing configuration")?;

        Ok(settings)
    }

    fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chatrelay/config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.listen_addr, "127.0.0.1:8787");
        assert_eq!(settings.share_user_id, "__share__");
        assert!(settings.api_token.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "listen_addr = \"0.0.0.0:9000\"\nnode_id = \"node-7\""
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.listen_addr, "0.0.0.0:9000");
        assert_eq!(settings.node_id, "node-7");
        // Untouched keys keep their defaults.
        assert_eq!(settings.share_user_id, "__share__");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(Settings::load(Some(Path::new("/nonexistent/config.toml"))).is_err());
    }
}
