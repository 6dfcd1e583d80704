use super::{Edge, GraphModel, Node};
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Resource inventory: the nodes and edges loaded into the graph model
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Inventory {
    /// Load inventory from a JSON file, gzip-compressed if the extension
    /// is `.gz`
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open inventory file {}", path.display()))?;

        let is_compressed = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext == "gz")
            .unwrap_or(false);

        let mut json = String::new();
        if is_compressed {
            GzDecoder::new(file)
                .read_to_string(&mut json)
                .context("Failed to decompress inventory file")?;
        } else {
            let mut file = file;
            file.read_to_string(&mut json)
                .context("Failed to read inventory file")?;
        }

        serde_json::from_str(&json).context("Failed to deserialize inventory JSON")
    }

    /// Load into the model, nodes first so edges find their endpoints.
    ///
    /// Returns the number of edges stored; edges with a missing endpoint
    /// are skipped.
    pub fn apply(self, model: &GraphModel) -> usize {
        model.update_nodes(self.nodes);
        model.update_edges(self.edges)
    }
}
