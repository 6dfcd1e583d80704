// Synchronization engine: keeps view edge subsets and persisted layout
// consistent with the graph model and with each view's node set

use crate::diagram::arrange;
use crate::diagram::{Callback, ChangeOrigin, DiagramRegistry, DiagramView, NodeSetEvent};
use crate::layout::LayoutHandle;
use crate::model::{ChangeKind, Dataset, Edge, GraphModel, ModelChange, Node};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

#[cfg(test)]
mod tests;

pub struct SyncEngine {
    model: Arc<GraphModel>,
    layout: LayoutHandle,
}

impl SyncEngine {
    pub fn new(model: Arc<GraphModel>, layout: LayoutHandle) -> Self {
        Self { model, layout }
    }

    pub fn layout(&self) -> &LayoutHandle {
        &self.layout
    }

    /// Add every model edge whose endpoints are both in the view.
    ///
    /// Edges already shown are skipped, so repeated calls add nothing.
    /// Returns how many edges were added.
    pub fn restore_edges(&self, view: &DiagramView) -> usize {
        let mut candidates: BTreeMap<String, Edge> = BTreeMap::new();
        for node_id in view.node_ids() {
            for edge in self.model.edges_touching(&node_id) {
                if view.has_edge(&edge.id) {
                    continue;
                }
                if view.has_node(&edge.from) && view.has_node(&edge.to) {
                    candidates.insert(edge.id.clone(), edge);
                }
            }
        }
        let edges: Vec<Edge> = candidates.into_values().collect();
        view.upsert_edges(&edges)
    }

    /// Bring the view's edges in line with a node-set change.
    ///
    /// On add/update, model edges touching the affected nodes are offered
    /// to the view when at least one endpoint is shown; the view itself
    /// still refuses an edge whose other end is missing. On remove, every
    /// shown edge touching the affected nodes is dropped.
    pub fn synchronize_edges(&self, view: &DiagramView, kind: ChangeKind, ids: &[String]) {
        match kind {
            ChangeKind::Add | ChangeKind::Update => {
                let mut touching: BTreeMap<String, Edge> = BTreeMap::new();
                for id in ids {
                    for edge in self.model.edges_touching(id) {
                        if view.has_node(&edge.from) || view.has_node(&edge.to) {
                            touching.insert(edge.id.clone(), edge);
                        }
                    }
                }
                let edges: Vec<Edge> = touching.into_values().collect();
                let shown = view.upsert_edges(&edges);
                debug!(
                    view_id = %view.view_id(),
                    offered = edges.len(),
                    shown,
                    "Edges synchronized"
                );
            }
            ChangeKind::Remove => {
                let stale: Vec<String> = view
                    .edge_endpoints()
                    .into_iter()
                    .filter(|(_, from, to)| ids.contains(from) || ids.contains(to))
                    .map(|(id, _, _)| id)
                    .collect();
                view.remove_edges(&stale);
            }
        }
    }

    /// Persist or delete layout entries for a node-set change
    pub fn synchronize_content(&self, view: &DiagramView, kind: ChangeKind, ids: &[String]) {
        match kind {
            ChangeKind::Add => {
                self.layout.save(view.view_id(), view.positions(ids));
            }
            ChangeKind::Remove => {
                self.layout.delete(view.view_id(), ids.to_vec());
            }
            ChangeKind::Update => {}
        }
    }

    /// Register the node-set listener that keeps the view synchronized.
    ///
    /// Edges are synchronized before layout so that persistence reads the
    /// final node set. Layout follows user-originated changes only.
    pub fn attach(self: &Arc<Self>, view: &Arc<DiagramView>) {
        let engine = Arc::downgrade(self);
        let target = Arc::downgrade(view);
        let listener: Callback<NodeSetEvent> = Arc::new(move |event: &NodeSetEvent| {
            let (Some(engine), Some(view)) = (engine.upgrade(), target.upgrade()) else {
                return;
            };
            engine.synchronize_edges(&view, event.kind, &event.items);
            if event.origin == ChangeOrigin::User {
                engine.synchronize_content(&view, event.kind, &event.items);
            }
        });
        view.add_node_dataset_callback(listener, false);
    }

    /// Save positions of nodes the user just dragged. Refused while the
    /// view is locked.
    pub fn persist_positions(&self, view: &DiagramView, ids: &[String]) -> bool {
        if view.is_locked() {
            debug!(view_id = %view.view_id(), "Diagram locked, not saving dragged positions");
            return false;
        }
        let shown: Vec<String> = ids.iter().filter(|id| view.has_node(id)).cloned().collect();
        self.layout.save(view.view_id(), view.positions(&shown));
        true
    }

    /// Save the position of every node in the view
    pub fn save_view_layout(&self, view: &DiagramView) {
        self.layout.save(view.view_id(), view.positions(&view.node_ids()));
    }

    /// Fan a model change out to every open view
    pub fn apply_model_change(&self, registry: &DiagramRegistry, change: &ModelChange) {
        match (change.dataset, change.kind) {
            // New inventory does not appear in curated views by itself
            (Dataset::Nodes, ChangeKind::Add) => {}
            (Dataset::Nodes, ChangeKind::Update) => {
                let nodes = self.model.get_nodes(&change.ids);
                for view in registry.all() {
                    let shown: Vec<Node> = nodes
                        .iter()
                        .filter(|n| view.has_node(&n.id))
                        .cloned()
                        .collect();
                    if !shown.is_empty() {
                        view.update_nodes(&shown, ChangeOrigin::Model);
                    }
                }
            }
            (Dataset::Nodes, ChangeKind::Remove) => {
                for view in registry.all() {
                    view.remove_nodes(&change.ids, ChangeOrigin::Model);
                }
            }
            (Dataset::Edges, ChangeKind::Add | ChangeKind::Update) => {
                let edges: Vec<Edge> = change
                    .ids
                    .iter()
                    .filter_map(|id| self.model.get_edge(id))
                    .collect();
                for view in registry.all() {
                    let visible: Vec<Edge> = edges
                        .iter()
                        .filter(|e| view.has_node(&e.from) && view.has_node(&e.to))
                        .cloned()
                        .collect();
                    view.upsert_edges(&visible);
                }
            }
            (Dataset::Edges, ChangeKind::Remove) => {
                for view in registry.all() {
                    view.remove_edges(&change.ids);
                }
            }
        }
    }

    /// Move nodes with no visible connection into per-title grids to the
    /// right of the drawing. Returns how many nodes moved.
    pub fn layout_isolated(&self, view: &DiagramView, save: bool) -> usize {
        let Some(surface) = view.surface() else {
            return 0;
        };

        let node_ids = view.node_ids();
        let connected: HashSet<String> = view
            .edge_endpoints()
            .into_iter()
            .flat_map(|(_, from, to)| [from, to])
            .collect();

        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for id in node_ids.iter().filter(|id| !connected.contains(*id)) {
            let title = self
                .model
                .get_node(id)
                .map(|n| n.title)
                .unwrap_or_default();
            groups.entry(title).or_default().push(id.clone());
        }
        if groups.is_empty() {
            return 0;
        }

        let groups: Vec<Vec<String>> = groups.into_values().collect();
        let moved = arrange::isolated_grid(&view.positions(&node_ids), &groups, surface.node_size());
        for entry in &moved {
            view.move_node(&entry.id, entry.x, entry.y);
        }
        if save {
            self.save_view_layout(view);
        }
        moved.len()
    }
}
