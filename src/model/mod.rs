// Graph model: the single authoritative store of nodes and edges

mod edge;
mod inventory;
mod node;

pub use edge::Edge;
pub use inventory::Inventory;
pub use node::{ImagePair, Node, RenderDirectives, VisualState};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

#[cfg(test)]
mod tests;

/// Kind of change carried by a change event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Update,
    Remove,
}

/// Which half of the model changed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Nodes,
    Edges,
}

/// Change notification emitted after every model mutation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelChange {
    pub dataset: Dataset,
    pub kind: ChangeKind,
    pub ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Synchronous change listener, invoked on the mutating thread
pub type ChangeListener = Arc<dyn Fn(&ModelChange) + Send + Sync>;

/// Graph model maintains the in-memory node and edge sets.
///
/// Mutations notify synchronous listeners first (in registration order),
/// then the broadcast stream. No map guard is held while listeners run,
/// so a listener may read or mutate the model again.
pub struct GraphModel {
    nodes: DashMap<String, Node>,
    edges: DashMap<String, Edge>,

    /// Listeners called inline on every change
    listeners: RwLock<Vec<ChangeListener>>,

    /// Broadcast channel for asynchronous observers
    change_tx: broadcast::Sender<ModelChange>,
}

impl GraphModel {
    pub fn new() -> Self {
        Self::with_change_buffer(1000)
    }

    /// Create a model whose broadcast stream buffers `capacity` changes
    pub fn with_change_buffer(capacity: usize) -> Self {
        let (change_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            nodes: DashMap::new(),
            edges: DashMap::new(),
            listeners: RwLock::new(Vec::new()),
            change_tx,
        }
    }

    // ── Nodes ────────────────────────────────────────────────────────────

    pub fn get_node(&self, id: &str) -> Option<Node> {
        self.nodes.get(id).map(|n| n.clone())
    }

    /// Resolve ids to nodes, silently dropping ids that no longer exist
    pub fn get_nodes(&self, ids: &[String]) -> Vec<Node> {
        ids.iter().filter_map(|id| self.get_node(id)).collect()
    }

    pub fn filter_nodes<F>(&self, predicate: F) -> Vec<Node>
    where
        F: Fn(&Node) -> bool,
    {
        self.nodes
            .iter()
            .filter(|n| predicate(n.value()))
            .map(|n| n.value().clone())
            .collect()
    }

    pub fn all_node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.iter().map(|n| n.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Mutate a node in place without notifying anyone.
    ///
    /// Callers publish the result later with `update_node`.
    pub fn modify_node<R, F>(&self, id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut Node) -> R,
    {
        self.nodes.get_mut(id).map(|mut n| f(n.value_mut()))
    }

    pub fn update_node(&self, node: Node) {
        self.update_nodes(vec![node]);
    }

    /// Insert or replace nodes.
    ///
    /// Emits one `add` change for new ids and one `update` change for
    /// ids that were already present.
    pub fn update_nodes(&self, nodes: Vec<Node>) {
        let mut added = Vec::new();
        let mut updated = Vec::new();

        for node in nodes {
            let id = node.id.clone();
            if self.nodes.insert(id.clone(), node).is_some() {
                updated.push(id);
            } else {
                added.push(id);
            }
        }

        if !added.is_empty() {
            self.publish(Dataset::Nodes, ChangeKind::Add, added);
        }
        if !updated.is_empty() {
            self.publish(Dataset::Nodes, ChangeKind::Update, updated);
        }
    }

    /// Remove nodes and every edge touching them
    pub fn remove_nodes(&self, ids: &[String]) -> Vec<Node> {
        let removed: Vec<Node> = ids
            .iter()
            .filter_map(|id| self.nodes.remove(id).map(|(_, node)| node))
            .collect();

        if removed.is_empty() {
            return removed;
        }

        let gone: HashSet<&str> = removed.iter().map(|n| n.id.as_str()).collect();
        let orphaned: Vec<String> = self
            .edges
            .iter()
            .filter(|e| gone.contains(e.from.as_str()) || gone.contains(e.to.as_str()))
            .map(|e| e.key().clone())
            .collect();

        let removed_ids = removed.iter().map(|n| n.id.clone()).collect();
        self.publish(Dataset::Nodes, ChangeKind::Remove, removed_ids);

        if !orphaned.is_empty() {
            self.remove_edges(&orphaned);
        }

        removed
    }

    // ── Edges ────────────────────────────────────────────────────────────

    pub fn get_edge(&self, id: &str) -> Option<Edge> {
        self.edges.get(id).map(|e| e.clone())
    }

    /// Edges matching a predicate, sorted by id
    pub fn filter_edges<F>(&self, predicate: F) -> Vec<Edge>
    where
        F: Fn(&Edge) -> bool,
    {
        let mut edges: Vec<Edge> = self
            .edges
            .iter()
            .filter(|e| predicate(e.value()))
            .map(|e| e.value().clone())
            .collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        edges
    }

    /// Edges with `node_id` at either end
    pub fn edges_touching(&self, node_id: &str) -> Vec<Edge> {
        self.filter_edges(|e| e.touches(node_id))
    }

    /// Edges whose source is `node_id`
    pub fn outbound_edges(&self, node_id: &str) -> Vec<Edge> {
        self.filter_edges(|e| e.from == node_id)
    }

    /// Edges touching `node_id` in either direction that belong to `pipeline`
    pub fn pipeline_edges(&self, node_id: &str, pipeline: u32) -> Vec<Edge> {
        self.filter_edges(|e| e.touches(node_id) && e.pipeline == Some(pipeline))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Insert or replace an edge. Returns false if an endpoint is missing.
    pub fn update_edge(&self, edge: Edge) -> bool {
        self.update_edges(vec![edge]) == 1
    }

    /// Insert or replace edges whose endpoints both exist.
    ///
    /// Returns the number of edges stored.
    pub fn update_edges(&self, edges: Vec<Edge>) -> usize {
        let mut added = Vec::new();
        let mut updated = Vec::new();

        for edge in edges {
            if !self.contains_node(&edge.from) || !self.contains_node(&edge.to) {
                debug!(edge_id = %edge.id, "Edge endpoint missing from model, skipping");
                continue;
            }
            let id = edge.id.clone();
            if self.edges.insert(id.clone(), edge).is_some() {
                updated.push(id);
            } else {
                added.push(id);
            }
        }

        let stored = added.len() + updated.len();
        if !added.is_empty() {
            self.publish(Dataset::Edges, ChangeKind::Add, added);
        }
        if !updated.is_empty() {
            self.publish(Dataset::Edges, ChangeKind::Update, updated);
        }
        stored
    }

    pub fn remove_edges(&self, ids: &[String]) -> Vec<Edge> {
        let removed: Vec<Edge> = ids
            .iter()
            .filter_map(|id| self.edges.remove(id).map(|(_, edge)| edge))
            .collect();

        if !removed.is_empty() {
            let removed_ids = removed.iter().map(|e| e.id.clone()).collect();
            self.publish(Dataset::Edges, ChangeKind::Remove, removed_ids);
        }
        removed
    }

    // ── Notifications ────────────────────────────────────────────────────

    /// Register a synchronous change listener
    pub fn on_change(&self, listener: ChangeListener) {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    /// Subscribe to the asynchronous change stream
    pub fn subscribe(&self) -> broadcast::Receiver<ModelChange> {
        self.change_tx.subscribe()
    }

    fn publish(&self, dataset: Dataset, kind: ChangeKind, ids: Vec<String>) {
        let change = ModelChange {
            dataset,
            kind,
            ids,
            timestamp: Utc::now(),
        };

        // Snapshot so listeners may register more listeners
        let listeners: Vec<ChangeListener> = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        for listener in listeners {
            listener(&change);
        }

        // No subscribers is fine
        let _ = self.change_tx.send(change);
    }
}

impl Default for GraphModel {
    fn default() -> Self {
        Self::new()
    }
}
