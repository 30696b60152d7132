//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to (0 = first free port in 3000-3010).
    /// Override: `AIRWAVE_BIND_PORT`
    pub bind_port: u16,

    /// Air time in seconds of a track with no known duration.
    /// Override: `AIRWAVE_FALLBACK_TRACK_SECS`
    pub fallback_track_secs: u64,

    /// Seconds of silence before a WebSocket client is dropped.
    pub ws_heartbeat_timeout_secs: u64,

    /// Number of snapshots returned by `/api/stats`.
    pub history_limit: usize,

    /// JSON catalog of tracks and playlists loaded at startup.
    /// Override: `AIRWAVE_CATALOG`
    pub catalog: Option<PathBuf>,

    /// Directory for the persisted status history.
    /// Override: `AIRWAVE_DATA_DIR`
    pub data_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = airwave_core::Config::default();
        Self {
            bind_port: 0,
            fallback_track_secs: core.fallback_track_secs,
            ws_heartbeat_timeout_secs: core.ws_heartbeat_timeout_secs,
            history_limit: core.history_limit,
            catalog: None,
            data_dir: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AIRWAVE_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Ok(val) = std::env::var("AIRWAVE_FALLBACK_TRACK_SECS") {
            if let Ok(secs) = val.parse() {
                self.fallback_track_secs = secs;
            }
        }

        // Note: AIRWAVE_CATALOG and AIRWAVE_DATA_DIR are handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to airwave-core's Config type.
    pub fn to_core_config(&self) -> airwave_core::Config {
        airwave_core::Config {
            preferred_port: self.bind_port,
            fallback_track_secs: self.fallback_track_secs,
            ws_heartbeat_timeout_secs: self.ws_heartbeat_timeout_secs,
            history_limit: self.history_limit,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_core() {
        let core = ServerConfig::default().to_core_config();
        assert_eq!(core.preferred_port, 0);
        assert_eq!(core.fallback_track_secs, 180);
        assert!(core.validate().is_ok());
    }

    #[test]
    fn loads_partial_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fallback_track_secs: 90\ncatalog: /srv/radio/catalog.json").unwrap();

        let config: ServerConfig =
            serde_yaml::from_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
        assert_eq!(config.fallback_track_secs, 90);
        assert_eq!(config.history_limit, 100);
        assert_eq!(
            config.catalog.as_deref(),
            Some(Path::new("/srv/radio/catalog.json"))
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServerConfig::load(Some(&dir.path().join("absent.yaml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
