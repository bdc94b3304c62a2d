//! Configuration management for the remote pointer
//!
//! Handles loading, parsing, validation and hot-reloading of YAML configuration files.

pub mod watcher;

use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::fs;

use crate::input::{InputKind, Viewport};
use crate::normalize::NormalizerConfig;
use crate::transport::codec::engine_io_endpoint;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct AppConfig {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub transport: TransportKind,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub permission: PermissionConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub publish: PublishConfig,
}

/// Broadcast relay (Socket.IO server) configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct RelayConfig {
    #[serde(default = "default_relay_url")]
    pub url: String,
    /// Engine.IO endpoint path
    #[serde(default = "default_relay_path")]
    pub path: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Event carrying this client's position
    #[serde(default = "default_publish_event")]
    pub publish_event: String,
    /// Event carrying every client's cursor
    #[serde(default = "default_cursors_event")]
    pub cursors_event: String,
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: default_relay_url(),
            path: default_relay_path(),
            namespace: default_namespace(),
            publish_event: default_publish_event(),
            cursors_event: default_cursors_event(),
            max_reconnect_delay_ms: default_max_reconnect_delay(),
        }
    }
}

/// Where positions are sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Relay,
    /// Log positions instead of sending them
    Console,
}

/// Raw input configuration
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize, JsonSchema)]
pub struct InputConfig {
    #[serde(default)]
    pub kind: InputKind,
    #[serde(default)]
    pub feed: FeedConfig,
    /// Initial viewport for the pointer variant; resize events replace it
    #[serde(default)]
    pub viewport: Viewport,
}

/// Transport carrying raw input events
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedConfig {
    Udp {
        #[serde(default = "default_feed_bind")]
        bind: String,
    },
    Stdin,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig::Udp {
            bind: default_feed_bind(),
        }
    }
}

/// Sensor permission configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct PermissionConfig {
    #[serde(default)]
    pub mode: PermissionMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PermissionMode {
    /// Ask on the terminal
    #[default]
    Prompt,
    /// Grant without asking (headless runs)
    Auto,
}

/// Publish loop configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct PublishConfig {
    /// Frames per second
    #[serde(default = "default_fps")]
    pub fps: u32,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self { fps: default_fps() }
    }
}

impl PublishConfig {
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path))?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// JSON schema of the config file
    pub fn json_schema() -> Result<String> {
        let schema = schemars::schema_for!(AppConfig);
        serde_json::to_string_pretty(&schema).context("Failed to serialize config schema")
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        // Relay
        engine_io_endpoint(&self.relay.url, &self.relay.path).context("Invalid relay.url")?;
        if !self.relay.namespace.starts_with('/') {
            anyhow::bail!("relay.namespace must start with '/'");
        }
        if self.relay.namespace.contains(',') {
            anyhow::bail!("relay.namespace cannot contain ','");
        }
        if self.relay.publish_event.is_empty() {
            anyhow::bail!("relay.publish_event cannot be empty");
        }
        if self.relay.cursors_event.is_empty() {
            anyhow::bail!("relay.cursors_event cannot be empty");
        }
        if self.relay.max_reconnect_delay_ms == 0 {
            anyhow::bail!("relay.max_reconnect_delay_ms must be greater than 0");
        }

        // Input
        if let FeedConfig::Udp { bind } = &self.input.feed {
            bind.parse::<SocketAddr>()
                .with_context(|| format!("Invalid input.feed.bind address '{}'", bind))?;
        }
        if !self.input.viewport.has_area() {
            anyhow::bail!(
                "input.viewport must be positive (got {}x{})",
                self.input.viewport.width,
                self.input.viewport.height
            );
        }

        // Normalizer
        for (name, value) in self.normalizer.policy.constants() {
            if !value.is_finite() || value <= 0.0 {
                anyhow::bail!("normalizer.{} must be a positive number (got {})", name, value);
            }
        }
        if let Some(precision) = self.normalizer.precision {
            if precision > 9 {
                anyhow::bail!("normalizer.precision {} is invalid (must be 0-9)", precision);
            }
        }

        // Publish
        if self.publish.fps == 0 || self.publish.fps > 240 {
            anyhow::bail!("publish.fps {} is invalid (must be 1-240)", self.publish.fps);
        }

        Ok(())
    }

    /// Changes between two configs that only a restart can apply.
    pub fn restart_required_changes(&self, other: &AppConfig) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.relay != other.relay {
            changed.push("relay");
        }
        if self.transport != other.transport {
            changed.push("transport");
        }
        if self.input != other.input {
            changed.push("input");
        }
        if self.permission.mode != other.permission.mode {
            changed.push("permission");
        }
        if self.publish.fps != other.publish.fps {
            changed.push("publish");
        }
        changed
    }
}

// Default value functions
fn default_relay_url() -> String { "https://cursors-socket.onrender.com".to_string() }
fn default_relay_path() -> String { "/socket.io/".to_string() }
fn default_namespace() -> String { "/".to_string() }
fn default_publish_event() -> String { "cursor_receiver".to_string() }
fn default_cursors_event() -> String { "cursor_updates".to_string() }
fn default_max_reconnect_delay() -> u64 { 30_000 }
fn default_feed_bind() -> String { "0.0.0.0:5555".to_string() }
fn default_fps() -> u32 { 60 }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::NormalizationPolicy;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        config.validate().unwrap();

        assert_eq!(config.relay.url, "https://cursors-socket.onrender.com");
        assert_eq!(config.relay.publish_event, "cursor_receiver");
        assert_eq!(config.transport, TransportKind::Relay);
        assert_eq!(config.input.kind, InputKind::Orientation);
        assert_eq!(config.permission.mode, PermissionMode::Prompt);
        assert_eq!(config.normalizer.policy, NormalizationPolicy::default());
        assert_eq!(config.normalizer.precision, Some(3));
        assert_eq!(config.publish.fps, 60);
    }

    #[test]
    fn test_full_config_parses() {
        let yaml = r#"
relay:
  url: "http://localhost:3000"
  namespace: "/cursors"
transport: console
input:
  kind: pointer
  feed:
    type: stdin
  viewport:
    width: 800
    height: 600
permission:
  mode: auto
normalizer:
  policy: clamped_tilt
  tilt_limit_deg: 30
  precision: 2
publish:
  fps: 30
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.relay.namespace, "/cursors");
        assert_eq!(config.transport, TransportKind::Console);
        assert_eq!(config.input.kind, InputKind::Pointer);
        assert_eq!(config.input.feed, FeedConfig::Stdin);
        assert_eq!(config.permission.mode, PermissionMode::Auto);
        assert_eq!(
            config.normalizer.policy,
            NormalizationPolicy::ClampedTilt {
                tilt_limit_deg: 30.0,
                heading_limit_deg: 90.0
            }
        );
        assert_eq!(config.publish.fps, 30);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.publish.fps = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.relay.url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.input.feed = FeedConfig::Udp {
            bind: "not-an-address".to_string(),
        };
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.normalizer.policy = NormalizationPolicy::DeltaFromBaseline { span_deg: 0.0 };
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.normalizer.precision = Some(12);
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.input.viewport.height = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_restart_required_changes() {
        let old = AppConfig::default();
        let mut new = old.clone();
        new.normalizer.precision = Some(1);
        assert!(old.restart_required_changes(&new).is_empty());

        new.publish.fps = 30;
        new.relay.url = "http://localhost:1".to_string();
        assert_eq!(old.restart_required_changes(&new), vec!["relay", "publish"]);
    }

    #[tokio::test]
    async fn test_save_and_load() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.yaml");
        let path = path.to_string_lossy().to_string();

        let mut config = AppConfig::default();
        config.normalizer.policy = NormalizationPolicy::AbsoluteRange;
        config.save(&path).await?;

        let loaded = AppConfig::load(&path).await?;
        assert_eq!(loaded.normalizer.policy, NormalizationPolicy::AbsoluteRange);
        assert_eq!(loaded.relay, config.relay);
        Ok(())
    }

    #[test]
    fn test_json_schema_mentions_sections() {
        let schema = AppConfig::json_schema().unwrap();
        assert!(schema.contains("relay"));
        assert!(schema.contains("normalizer"));
    }
}
