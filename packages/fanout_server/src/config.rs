use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use fanout_hub::HubConfig;
use serde::{Deserialize, Serialize};

// =============================================================================
// File config (figment-deserialized from defaults / fanout.toml / env vars)
// =============================================================================
//
//   fanout.toml:     [hub]
//                    exclude_sender = true
//
//   env var:         FANOUT_HUB__EXCLUDE_SENDER=true   (double underscore = nesting)

pub const DEFAULT_CONFIG_FILE: &str = "fanout.toml";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub hub: HubFileConfig,
    #[serde(default)]
    pub transport: TransportFileConfig,
}

/// Listener settings (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
        }
    }
}

/// Fan-out behavior (lives under `[hub]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HubFileConfig {
    #[serde(default)]
    pub exclude_sender: bool,
    /// Per-peer send bound in milliseconds; 0 disables it
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

impl Default for HubFileConfig {
    fn default() -> Self {
        Self {
            exclude_sender: false,
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

/// WebSocket framing (lives under `[transport]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransportFileConfig {
    #[serde(default = "default_validate_draw_events")]
    pub validate_draw_events: bool,
    #[serde(default = "default_max_message_kb")]
    pub max_message_kb: usize,
}

impl Default for TransportFileConfig {
    fn default() -> Self {
        Self {
            validate_draw_events: default_validate_draw_events(),
            max_message_kb: default_max_message_kb(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_ws_path() -> String {
    "/ws".to_string()
}
fn default_send_timeout_ms() -> u64 {
    5000
}
fn default_validate_draw_events() -> bool {
    true
}
fn default_max_message_kb() -> usize {
    64
}

/// Build a figment that layers: defaults → config file → FANOUT_* env vars.
///
/// Without an explicit path, `fanout.toml` in the working directory is used
/// when present.
pub fn load_config(config_path: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("FANOUT_").split("__"))
}

impl FileConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.server.ws_path.starts_with('/') {
            anyhow::bail!(
                "server.ws_path must start with '/', got {:?}",
                self.server.ws_path
            );
        }
        if self.transport.max_message_kb == 0 {
            anyhow::bail!("transport.max_message_kb must be greater than zero");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse::<SocketAddr>()
            .with_context(|| {
                format!(
                    "Invalid listen address {}:{}",
                    self.server.host, self.server.port
                )
            })
    }
}

// =============================================================================
// Runtime config (derived from FileConfig)
// =============================================================================

impl HubFileConfig {
    pub fn to_runtime(&self) -> HubConfig {
        HubConfig {
            exclude_sender: self.exclude_sender,
            send_timeout: if self.send_timeout_ms == 0 {
                None
            } else {
                Some(Duration::from_millis(self.send_timeout_ms))
            },
        }
    }
}

/// Transport configuration (runtime view).
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Require every frame to be a drawing event, re-encoded canonically
    pub validate_draw_events: bool,
    /// Largest inbound WebSocket message accepted
    pub max_message_bytes: usize,
}

impl TransportConfig {
    pub fn from_file(fc: &TransportFileConfig) -> Self {
        Self {
            validate_draw_events: fc.validate_draw_events,
            max_message_bytes: fc.max_message_kb * 1024,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::from_file(&TransportFileConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_file_config_defaults() {
        let fc = FileConfig::default();
        assert_eq!(fc.server.host, "127.0.0.1");
        assert_eq!(fc.server.port, 8080);
        assert_eq!(fc.server.ws_path, "/ws");
        assert!(!fc.hub.exclude_sender);
        assert_eq!(fc.hub.send_timeout_ms, 5000);
        assert!(fc.transport.validate_draw_events);
        assert_eq!(fc.transport.max_message_kb, 64);
    }

    // ── runtime conversion ──────────────────────────────────────────────

    #[test]
    fn test_hub_config_from_file() {
        let hc = HubFileConfig {
            exclude_sender: true,
            send_timeout_ms: 250,
        }
        .to_runtime();
        assert!(hc.exclude_sender);
        assert_eq!(hc.send_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_send_timeout_zero_disables() {
        let hc = HubFileConfig {
            send_timeout_ms: 0,
            ..Default::default()
        }
        .to_runtime();
        assert!(hc.send_timeout.is_none());
    }

    #[test]
    fn test_default_hub_file_config_matches_hub_defaults() {
        assert_eq!(HubFileConfig::default().to_runtime(), HubConfig::default());
    }

    #[test]
    fn test_transport_config_from_file() {
        let tc = TransportConfig::from_file(&TransportFileConfig {
            validate_draw_events: false,
            max_message_kb: 4,
        });
        assert!(!tc.validate_draw_events);
        assert_eq!(tc.max_message_bytes, 4096);
    }

    // ── validation ──────────────────────────────────────────────────────

    #[test]
    fn test_validate_rejects_relative_ws_path() {
        let mut fc = FileConfig::default();
        fc.server.ws_path = "ws".to_string();
        assert!(fc.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_message_size() {
        let mut fc = FileConfig::default();
        fc.transport.max_message_kb = 0;
        assert!(fc.validate().is_err());
    }

    #[test]
    fn test_bind_addr() {
        let fc = FileConfig::default();
        assert_eq!(
            fc.bind_addr().unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );

        let mut bad = FileConfig::default();
        bad.server.host = "not a host".to_string();
        assert!(bad.bind_addr().is_err());
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(Some(&tmp.path().join("absent.toml")))
            .extract()
            .unwrap();
        assert_eq!(fc.server.port, 8080);
        assert!(fc.transport.validate_draw_events);
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("fanout.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9001\nws_path = \"/draw\"\n\n[hub]\nexclude_sender = true\nsend_timeout_ms = 0\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(Some(&path)).extract().unwrap();
        assert_eq!(fc.server.port, 9001);
        assert_eq!(fc.server.host, "127.0.0.1");
        assert_eq!(fc.server.ws_path, "/draw");
        assert!(fc.hub.exclude_sender);
        assert!(fc.hub.to_runtime().send_timeout.is_none());
    }

    #[test]
    fn test_load_config_rejects_bad_types() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("fanout.toml");
        std::fs::write(&path, "[server]\nport = \"eighty\"\n").unwrap();
        let result: Result<FileConfig, _> = load_config(Some(&path)).extract();
        assert!(result.is_err());
    }
}
