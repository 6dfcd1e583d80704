use super::event::AlertEvent;
use super::propagate::AlertPropagator;
use crate::model::GraphModel;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Current and previous alert snapshots
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertSnapshots {
    #[serde(default)]
    pub current: Vec<AlertEvent>,
    #[serde(default)]
    pub previous: Vec<AlertEvent>,
}

/// Alarm a resource is subscribed to
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlarmSubscription {
    #[serde(rename = "AlarmName")]
    pub alarm_name: String,

    #[serde(rename = "Namespace", default)]
    pub namespace: String,

    /// `OK`, `ALARM` or `INSUFFICIENT_DATA`
    #[serde(rename = "StateValue")]
    pub state_value: String,
}

impl AlarmSubscription {
    pub fn is_alarming(&self) -> bool {
        self.state_value == "ALARM"
    }
}

/// Source of health events
#[async_trait]
pub trait HealthEventSource: Send + Sync {
    async fn alert_snapshots(&self) -> Result<AlertSnapshots>;

    /// Alarms subscribed to by one resource
    async fn alarm_subscriptions(&self, resource_id: &str) -> Result<Vec<AlarmSubscription>>;
}

#[derive(Deserialize)]
struct HealthFile {
    #[serde(flatten)]
    snapshots: AlertSnapshots,
    #[serde(default)]
    alarms: HashMap<String, Vec<AlarmSubscription>>,
}

/// Health events read from a JSON file on every call:
/// `{"current": [...], "previous": [...], "alarms": {"<id>": [...]}}`
pub struct FileHealthSource {
    path: PathBuf,
}

impl FileHealthSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read(&self) -> Result<HealthFile> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read health file {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse health file {}", self.path.display()))
    }
}

#[async_trait]
impl HealthEventSource for FileHealthSource {
    async fn alert_snapshots(&self) -> Result<AlertSnapshots> {
        Ok(self.read().await?.snapshots)
    }

    async fn alarm_subscriptions(&self, resource_id: &str) -> Result<Vec<AlarmSubscription>> {
        let mut file = self.read().await?;
        Ok(file.alarms.remove(resource_id).unwrap_or_default())
    }
}

/// Keeps each node's count of alarms in ALARM state current
pub struct AlarmIndicators {
    model: Arc<GraphModel>,
    source: Arc<dyn HealthEventSource>,
}

impl AlarmIndicators {
    pub fn new(model: Arc<GraphModel>, source: Arc<dyn HealthEventSource>) -> Self {
        Self { model, source }
    }

    /// Look up alarms for every id at once and store the counts.
    ///
    /// Nodes whose count changed are re-submitted after all lookups have
    /// finished. Failed lookups are logged and leave the node untouched.
    /// Returns how many nodes changed.
    pub async fn refresh(&self, ids: &[String]) -> usize {
        let lookups = ids.iter().map(|id| async move {
            let result = self.source.alarm_subscriptions(id).await;
            (id, result)
        });
        let results = join_all(lookups).await;

        let mut changed = Vec::new();
        for (id, result) in results {
            let subscriptions = match result {
                Ok(subscriptions) => subscriptions,
                Err(e) => {
                    warn!(resource_id = %id, error = %e, "Alarm lookup failed");
                    continue;
                }
            };
            let count = subscriptions.iter().filter(|s| s.is_alarming()).count();
            let updated = self.model.modify_node(id, |node| {
                let differs = node.alarm_count != count;
                node.alarm_count = count;
                differs
            });
            match updated {
                Some(true) => changed.push(id.clone()),
                Some(false) => {}
                None => debug!(resource_id = %id, "Alarm lookup for unknown resource"),
            }
        }

        let nodes = self.model.get_nodes(&changed);
        let count = nodes.len();
        if count > 0 {
            self.model.update_nodes(nodes);
        }
        count
    }
}

/// Periodically apply health snapshots and refresh alarm counts.
///
/// A failed snapshot fetch is logged and the previous alert state kept.
/// Runs until the task is cancelled.
pub async fn run_alert_poller(
    propagator: Arc<AlertPropagator>,
    indicators: Arc<AlarmIndicators>,
    source: Arc<dyn HealthEventSource>,
    model: Arc<GraphModel>,
    interval_seconds: u64,
) {
    let mut ticker = interval(Duration::from_secs(interval_seconds.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(interval_seconds, "Starting alert poller");

    loop {
        ticker.tick().await;

        match source.alert_snapshots().await {
            Ok(snapshots) => {
                propagator.update_event_alert_state(&snapshots.current, &snapshots.previous);
            }
            Err(e) => {
                error!(error = %e, "Failed to fetch alert snapshots");
                continue;
            }
        }

        let changed = indicators.refresh(&model.all_node_ids()).await;
        debug!(changed, "Alarm indicators refreshed");
    }
}
