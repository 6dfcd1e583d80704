//! In-memory rendering surface.
//!
//! Records everything the core asks it to draw. Used by the binary when
//! no display is attached and by tests to observe redraws.

use super::{RenderSurface, SurfaceFactory};
use crate::layout::LayoutEntry;
use crate::model::{Edge, Node};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

const DEFAULT_NODE_SIZE: (f64, f64) = (80.0, 60.0);

#[derive(Default)]
struct HeadlessState {
    nodes: BTreeMap<String, Node>,
    edges: BTreeMap<String, Edge>,
    positions: HashMap<String, (f64, f64)>,
    fits: Vec<Option<Vec<String>>>,
    alert_indicator: bool,
    edge_redraws: usize,
    node_redraws: usize,
    draw_waiters: Vec<oneshot::Sender<()>>,
}

/// Rendering surface that keeps its drawing in memory
pub struct HeadlessSurface {
    state: Mutex<HeadlessState>,
    /// Complete draw passes immediately instead of waiting for `complete_draw`
    auto_draw: bool,
}

impl HeadlessSurface {
    pub fn new(auto_draw: bool) -> Self {
        Self {
            state: Mutex::new(HeadlessState::default()),
            auto_draw,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Finish a draw pass, waking every `after_drawing` waiter
    pub fn complete_draw(&self) {
        let waiters = std::mem::take(&mut self.lock().draw_waiters);
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    /// Number of callers waiting on the next draw pass
    pub fn pending_draw_waiters(&self) -> usize {
        self.lock().draw_waiters.len()
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.lock().nodes.keys().cloned().collect()
    }

    pub fn edge_ids(&self) -> Vec<String> {
        self.lock().edges.keys().cloned().collect()
    }

    pub fn drawn_node(&self, id: &str) -> Option<Node> {
        self.lock().nodes.get(id).cloned()
    }

    pub fn drawn_edge(&self, id: &str) -> Option<Edge> {
        self.lock().edges.get(id).cloned()
    }

    pub fn position(&self, id: &str) -> Option<(f64, f64)> {
        self.lock().positions.get(id).copied()
    }

    /// Every fit request so far (`None` = fit all)
    pub fn fits(&self) -> Vec<Option<Vec<String>>> {
        self.lock().fits.clone()
    }

    pub fn alert_indicator(&self) -> bool {
        self.lock().alert_indicator
    }

    /// Count of individual edge redraw requests
    pub fn edge_redraws(&self) -> usize {
        self.lock().edge_redraws
    }

    /// Count of individual node redraw requests
    pub fn node_redraws(&self) -> usize {
        self.lock().node_redraws
    }
}

impl RenderSurface for HeadlessSurface {
    fn upsert_nodes(&self, nodes: &[Node]) {
        let mut state = self.lock();
        for node in nodes {
            state.positions.entry(node.id.clone()).or_insert((0.0, 0.0));
            state.nodes.insert(node.id.clone(), node.clone());
            state.node_redraws += 1;
        }
    }

    fn remove_nodes(&self, ids: &[String]) {
        let mut state = self.lock();
        for id in ids {
            state.nodes.remove(id);
            state.positions.remove(id);
        }
    }

    fn upsert_edges(&self, edges: &[Edge]) {
        let mut state = self.lock();
        for edge in edges {
            state.edges.insert(edge.id.clone(), edge.clone());
            state.edge_redraws += 1;
        }
    }

    fn remove_edges(&self, ids: &[String]) {
        let mut state = self.lock();
        for id in ids {
            state.edges.remove(id);
        }
    }

    fn move_node(&self, id: &str, x: f64, y: f64) {
        let mut state = self.lock();
        if state.nodes.contains_key(id) {
            state.positions.insert(id.to_string(), (x, y));
        }
    }

    fn positions(&self, ids: &[String]) -> Vec<LayoutEntry> {
        let state = self.lock();
        ids.iter()
            .filter_map(|id| {
                state
                    .positions
                    .get(id)
                    .map(|&(x, y)| LayoutEntry::new(id.clone(), x, y))
            })
            .collect()
    }

    fn node_size(&self) -> (f64, f64) {
        DEFAULT_NODE_SIZE
    }

    fn fit(&self, node_ids: Option<&[String]>) {
        self.lock().fits.push(node_ids.map(|ids| ids.to_vec()));
    }

    fn after_drawing(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        if self.auto_draw {
            let _ = tx.send(());
        } else {
            self.lock().draw_waiters.push(tx);
        }
        rx
    }

    fn set_alert_indicator(&self, alerting: bool) {
        self.lock().alert_indicator = alerting;
    }
}

/// Factory handing out headless surfaces and tracking tab order
pub struct HeadlessFactory {
    surfaces: DashMap<String, Arc<HeadlessSurface>>,
    /// (view_id, name) in display order
    containers: Mutex<Vec<(String, String)>>,
    auto_draw: bool,
}

impl HeadlessFactory {
    pub fn new(auto_draw: bool) -> Self {
        Self {
            surfaces: DashMap::new(),
            containers: Mutex::new(Vec::new()),
            auto_draw,
        }
    }

    pub fn surface(&self, view_id: &str) -> Option<Arc<HeadlessSurface>> {
        self.surfaces.get(view_id).map(|s| Arc::clone(s.value()))
    }

    /// Tab names in display order
    pub fn container_names(&self) -> Vec<String> {
        self.containers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, name)| name.clone())
            .collect()
    }
}

impl SurfaceFactory for HeadlessFactory {
    fn create_container(&self, view_id: &str, name: &str, position: usize) {
        let mut containers = self
            .containers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let position = position.min(containers.len());
        containers.insert(position, (view_id.to_string(), name.to_string()));
    }

    fn create_surface(&self, view_id: &str) -> Arc<dyn RenderSurface> {
        let surface = Arc::new(HeadlessSurface::new(self.auto_draw));
        self.surfaces.insert(view_id.to_string(), Arc::clone(&surface));
        surface
    }

    fn remove_container(&self, view_id: &str) {
        self.containers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|(id, _)| id != view_id);
        self.surfaces.remove(view_id);
    }
}
