use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Complete dashboard configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub diagrams: DiagramsConfig,
}

/// Layout persistence
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutConfig {
    /// SQLite database holding layout entries and view settings
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "topology-layout.db".to_string()
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Health event polling and edge styling
#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Edge color while the source node is alerting or degraded
    #[serde(default = "default_alert_edge_color")]
    pub alert_edge_color: String,
    #[serde(default = "default_normal_edge_color")]
    pub normal_edge_color: String,
    #[serde(default = "default_edge_hover_width")]
    pub edge_hover_width: u32,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_alert_edge_color() -> String {
    "red".to_string()
}

fn default_normal_edge_color() -> String {
    "black".to_string()
}

fn default_edge_hover_width() -> u32 {
    1
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            alert_edge_color: default_alert_edge_color(),
            normal_edge_color: default_normal_edge_color(),
            edge_hover_width: default_edge_hover_width(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Capacity of the model's change broadcast channel
    #[serde(default = "default_change_buffer")]
    pub change_buffer: usize,
}

fn default_change_buffer() -> usize {
    1000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            change_buffer: default_change_buffer(),
        }
    }
}

/// Views opened at startup
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiagramsConfig {
    #[serde(default)]
    pub names: Vec<String>,
}

impl DashboardConfig {
    /// Apply `TOPOLOGY_LAYOUT_DB` and `TOPOLOGY_ALERT_POLL_SECONDS`
    pub fn with_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("TOPOLOGY_LAYOUT_DB") {
            if !path.is_empty() {
                self.layout.database_path = path;
            }
        }
        if let Some(v) = lookup("TOPOLOGY_ALERT_POLL_SECONDS") {
            if let Ok(secs) = v.parse::<u64>() {
                self.alerts.poll_interval_seconds = secs;
            }
        }
        self
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<DashboardConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: DashboardConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    Ok(config)
}
