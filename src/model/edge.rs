use serde::{Deserialize, Serialize};

/// Edge is a directed connection between two nodes.
///
/// Identity is the composite `from:to` with an optional `:pipeline`
/// discriminator for resources that run redundant pipelines.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub from: String,
    pub to: String,

    #[serde(default)]
    pub label: String,

    /// Pipeline number carried by the edge id suffix, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<u32>,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub dashes: bool,

    #[serde(default = "default_hover_width", rename = "hoverWidth")]
    pub hover_width: u32,
}

fn default_color() -> String {
    "black".to_string()
}

fn default_hover_width() -> u32 {
    1
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let to = to.into();
        Self {
            id: format!("{}:{}", from, to),
            from,
            to,
            label: String::new(),
            pipeline: None,
            color: default_color(),
            dashes: false,
            hover_width: default_hover_width(),
        }
    }

    /// Edge belonging to one pipeline of a multi-pipeline resource
    pub fn with_pipeline(from: impl Into<String>, to: impl Into<String>, pipeline: u32) -> Self {
        let mut edge = Self::new(from, to);
        edge.id = format!("{}:{}", edge.id, pipeline);
        edge.pipeline = Some(pipeline);
        edge
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.from == node_id || self.to == node_id
    }

    /// The endpoint that is not `node_id` (or `from` for self-loops)
    pub fn other_end(&self, node_id: &str) -> &str {
        if self.from == node_id {
            &self.to
        } else {
            &self.from
        }
    }
}
