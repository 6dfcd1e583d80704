use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Selected/unselected image pair drawn for a node
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePair {
    pub selected: String,
    pub unselected: String,
}

/// Rendering directives for each visual state of a node.
///
/// The images themselves are produced by the icon renderer outside this
/// crate; the core only picks which pair is current.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderDirectives {
    pub normal: ImagePair,
    pub alert: ImagePair,
    pub degraded: ImagePair,
}

impl RenderDirectives {
    /// Image pair for the given visual state
    pub fn for_state(&self, state: VisualState) -> &ImagePair {
        match state {
            VisualState::Normal => &self.normal,
            VisualState::Alerting => &self.alert,
            VisualState::Degraded => &self.degraded,
        }
    }
}

/// Derived visual state of a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualState {
    Normal,
    Alerting,
    Degraded,
}

/// Node represents one resource in the topology graph
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    /// Globally unique resource identifier (usually an ARN)
    pub id: String,

    /// Display title (resource type, e.g. "MediaLive Channel")
    #[serde(default)]
    pub title: String,

    /// Display name of the resource
    #[serde(default)]
    pub name: String,

    /// Free-form resource payload from inventory
    #[serde(default)]
    pub data: Value,

    #[serde(default)]
    pub render: RenderDirectives,

    /// Currently displayed image pair
    #[serde(default)]
    pub image: ImagePair,

    #[serde(default)]
    pub alerting: bool,

    #[serde(default)]
    pub degraded: bool,

    /// Per-pipeline liveness (1 = up, 0 = down), allocated on first
    /// pipeline alert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_pipelines: Option<Vec<u8>>,

    /// Number of alarm subscriptions currently in ALARM state
    #[serde(default)]
    pub alarm_count: usize,

    /// Inventory cache timestamp
    #[serde(default = "Utc::now")]
    pub cache_update: DateTime<Utc>,
}

impl Node {
    /// Create a node with empty payload and rendering directives
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            name: String::new(),
            data: Value::Null,
            render: RenderDirectives::default(),
            image: ImagePair::default(),
            alerting: false,
            degraded: false,
            running_pipelines: None,
            alarm_count: 0,
            cache_update: Utc::now(),
        }
    }

    /// Degraded wins over alerting; neither flag means normal
    pub fn visual_state(&self) -> VisualState {
        if self.degraded {
            VisualState::Degraded
        } else if self.alerting {
            VisualState::Alerting
        } else {
            VisualState::Normal
        }
    }

    /// Point `image` at the pair for the current visual state.
    ///
    /// Returns true if the displayed image changed.
    pub fn apply_visual_state(&mut self) -> bool {
        let wanted = self.render.for_state(self.visual_state());
        if *wanted == self.image {
            return false;
        }
        self.image = wanted.clone();
        true
    }
}
