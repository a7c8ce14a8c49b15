//! Configuration loading and persistence.
//!
//! Handles reading and writing the brainlink configuration file. All values
//! are fixed at startup; the bridge never mutates its configuration at
//! runtime.

use std::time::Duration;
use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::transport::{TransportConfig, TransportKind};

/// Configuration for the Brain link.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BridgeConfig {
    /// Channel flavor used to reach the Brain.
    pub transport: TransportKind,
    /// Brain host name or address.
    pub host: String,
    /// Brain port.
    pub port: u16,
    /// Name announced in the handshake frame (`"<name> Connected"`).
    pub client_name: String,
    /// Seconds allowed for connection establishment.
    pub connect_timeout_secs: u64,
    /// Seconds a blocking receive may wait before waking up. Bounds both
    /// shutdown latency and stop-signal observation, so keep it small.
    pub receive_timeout_secs: u64,
    /// Seconds between reconnect attempts after a failure.
    pub reconnect_delay_secs: u64,
    /// Seconds between heartbeat (handshake resend) frames. 0 disables.
    pub heartbeat_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Udp,
            host: "127.0.0.1".to_string(),
            port: 8005,
            client_name: "body".to_string(),
            connect_timeout_secs: 5,
            receive_timeout_secs: 2,
            reconnect_delay_secs: 2,
            heartbeat_secs: 20,
        }
    }
}

impl BridgeConfig {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `BRAINLINK_CONFIG_DIR` overrides the platform config dir.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("BRAINLINK_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("brainlink")
        };
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing or unreadable file falls back to defaults; env overrides
    /// apply either way.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file().unwrap_or_else(|_| Self::default());
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.json");
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            anyhow::bail!("Config file not found")
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("BRAINLINK_HOST") {
            self.host = host;
        }

        if let Ok(port) = std::env::var("BRAINLINK_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.port = port;
            }
        }

        if let Ok(transport) = std::env::var("BRAINLINK_TRANSPORT") {
            match transport.to_ascii_lowercase().as_str() {
                "tcp" => self.transport = TransportKind::Tcp,
                "udp" => self.transport = TransportKind::Udp,
                other => log::warn!("Ignoring unknown BRAINLINK_TRANSPORT={other}"),
            }
        }

        if let Ok(name) = std::env::var("BRAINLINK_CLIENT_NAME") {
            self.client_name = name;
        }

        if let Ok(secs) = std::env::var("BRAINLINK_RECONNECT_DELAY") {
            if let Ok(secs) = secs.parse::<u64>() {
                self.reconnect_delay_secs = secs;
            }
        }

        if let Ok(secs) = std::env::var("BRAINLINK_RECEIVE_TIMEOUT") {
            if let Ok(secs) = secs.parse::<u64>() {
                self.receive_timeout_secs = secs;
            }
        }

        if let Ok(secs) = std::env::var("BRAINLINK_HEARTBEAT") {
            if let Ok(secs) = secs.parse::<u64>() {
                self.heartbeat_secs = secs;
            }
        }
    }

    /// Persists the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// The transport-level slice of this configuration.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            host: self.host.clone(),
            port: self.port,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            receive_timeout: Duration::from_secs(self.receive_timeout_secs),
        }
    }

    /// Wait between reconnect attempts.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Heartbeat period; zero means disabled.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.transport, TransportKind::Udp);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8005);
        assert_eq!(config.client_name, "body");
        assert_eq!(config.reconnect_delay_secs, 2);
        assert_eq!(config.heartbeat_secs, 20);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut config = BridgeConfig::default();
        config.transport = TransportKind::Tcp;
        config.port = 9100;

        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"tcp\""));

        let back: BridgeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.transport, TransportKind::Tcp);
        assert_eq!(back.port, 9100);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = BridgeConfig::default();
        config.host = "10.0.0.7".to_string();
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let back: BridgeConfig = serde_json::from_str(&content).unwrap();
        assert_eq!(back.host, "10.0.0.7");
    }

    #[test]
    fn test_duration_accessors() {
        let mut config = BridgeConfig::default();
        config.receive_timeout_secs = 1;
        config.heartbeat_secs = 0;

        assert_eq!(
            config.transport_config().receive_timeout,
            Duration::from_secs(1)
        );
        assert_eq!(config.reconnect_delay(), Duration::from_secs(2));
        assert!(config.heartbeat_interval().is_zero());
    }

    #[test]
    fn test_endpoint_format() {
        let config = BridgeConfig::default();
        assert_eq!(config.transport_config().endpoint(), "127.0.0.1:8005");
    }
}
