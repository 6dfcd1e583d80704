use super::arrange;
use super::callbacks::{Callback, CallbackQueue};
use super::lifecycle::DiagramState;
use crate::layout::LayoutEntry;
use crate::model::{ChangeKind, Edge, Node};
use crate::surface::{PointerEvent, RenderSurface};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tokio::sync::watch;
use tracing::{debug, info};

/// Where a node-set change came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// User curation (drop, merge, add); layout follows the change
    User,
    /// Graph model fan-out; layout entries are left alone
    Model,
    /// Lifecycle restore from persisted layout
    Restore,
}

/// Change to a view's node subset, delivered to node-set callbacks
#[derive(Clone, Debug, PartialEq)]
pub struct NodeSetEvent {
    pub kind: ChangeKind,
    pub items: Vec<String>,
    pub origin: ChangeOrigin,
}

/// Click or double-click on a view
#[derive(Clone, Debug, PartialEq)]
pub struct DiagramClick {
    pub view_id: String,
    pub pointer: PointerEvent,
}

/// A named, user-curated projection of the graph model.
///
/// Holds only ids: node ids, and edge ids with their endpoints so the
/// endpoint invariant can be enforced locally. Node data is re-resolved
/// through the model by whoever mutates the view.
pub struct DiagramView {
    view_id: String,
    name: String,

    nodes: Mutex<BTreeSet<String>>,
    /// edge id -> (from, to)
    edges: Mutex<BTreeMap<String, (String, String)>>,

    surface: OnceLock<Arc<dyn RenderSurface>>,

    locked: AtomicBool,
    first_fit: AtomicBool,
    alerting: AtomicBool,
    handlers_connected: AtomicBool,
    removed: AtomicBool,

    node_callbacks: CallbackQueue<NodeSetEvent>,
    click_callbacks: CallbackQueue<DiagramClick>,
    doubleclick_callbacks: CallbackQueue<DiagramClick>,

    state_tx: watch::Sender<DiagramState>,
}

impl std::fmt::Debug for DiagramView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagramView")
            .field("view_id", &self.view_id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl DiagramView {
    pub fn new(name: impl Into<String>, view_id: impl Into<String>) -> Self {
        let (state_tx, _) = watch::channel(DiagramState::Uninitialized);
        Self {
            view_id: view_id.into(),
            name: name.into(),
            nodes: Mutex::new(BTreeSet::new()),
            edges: Mutex::new(BTreeMap::new()),
            surface: OnceLock::new(),
            locked: AtomicBool::new(false),
            first_fit: AtomicBool::new(false),
            alerting: AtomicBool::new(false),
            handlers_connected: AtomicBool::new(false),
            removed: AtomicBool::new(false),
            node_callbacks: CallbackQueue::new(),
            click_callbacks: CallbackQueue::new(),
            doubleclick_callbacks: CallbackQueue::new(),
            state_tx,
        }
    }

    pub fn view_id(&self) -> &str {
        &self.view_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ── Lifecycle plumbing ───────────────────────────────────────────────

    pub fn state(&self) -> DiagramState {
        *self.state_tx.borrow()
    }

    /// Watch lifecycle transitions; `ReadyToView` is the diagram-ready signal
    pub fn subscribe_state(&self) -> watch::Receiver<DiagramState> {
        self.state_tx.subscribe()
    }

    /// Wait until the view reaches `ReadyToView`
    pub async fn wait_ready(&self) {
        let mut rx = self.subscribe_state();
        let _ = rx.wait_for(|state| *state == DiagramState::ReadyToView).await;
    }

    pub(crate) fn set_state(&self, state: DiagramState) {
        self.state_tx.send_replace(state);
    }

    pub(crate) fn attach_surface(&self, surface: Arc<dyn RenderSurface>) -> bool {
        self.surface.set(surface).is_ok()
    }

    pub fn surface(&self) -> Option<Arc<dyn RenderSurface>> {
        self.surface.get().cloned()
    }

    pub(crate) fn connect_handlers(&self) {
        self.handlers_connected.store(true, Ordering::SeqCst);
    }

    pub fn handlers_connected(&self) -> bool {
        self.handlers_connected.load(Ordering::SeqCst)
    }

    /// Latch the one-time viewport framing. True only for the first caller.
    pub(crate) fn take_first_fit(&self) -> bool {
        !self.first_fit.swap(true, Ordering::SeqCst)
    }

    pub fn first_fit_done(&self) -> bool {
        self.first_fit.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::SeqCst);
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    // ── Flags ────────────────────────────────────────────────────────────

    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// Set the alert indicator on the view's tab
    pub fn alert(&self, alerting: bool) {
        self.alerting.store(alerting, Ordering::SeqCst);
        if let Some(surface) = self.surface.get() {
            surface.set_alert_indicator(alerting);
        }
    }

    pub fn is_alerting(&self) -> bool {
        self.alerting.load(Ordering::SeqCst)
    }

    // ── Node subset ──────────────────────────────────────────────────────

    pub fn has_node(&self, id: &str) -> bool {
        lock(&self.nodes).contains(id)
    }

    pub fn has_all<S: AsRef<str>>(&self, ids: &[S]) -> bool {
        let nodes = lock(&self.nodes);
        ids.iter().all(|id| nodes.contains(id.as_ref()))
    }

    pub fn node_ids(&self) -> Vec<String> {
        lock(&self.nodes).iter().cloned().collect()
    }

    pub fn node_count(&self) -> usize {
        lock(&self.nodes).len()
    }

    /// Add or redraw nodes.
    ///
    /// New ids are reported as one `add` event, ids already shown as one
    /// `update` event.
    pub fn add_nodes(&self, nodes: &[Node], origin: ChangeOrigin) {
        if self.is_removed() || nodes.is_empty() {
            return;
        }

        let mut added = Vec::new();
        let mut updated = Vec::new();
        {
            let mut shown = lock(&self.nodes);
            for node in nodes {
                if shown.insert(node.id.clone()) {
                    added.push(node.id.clone());
                } else {
                    updated.push(node.id.clone());
                }
            }
        }

        if let Some(surface) = self.surface.get() {
            surface.upsert_nodes(nodes);
        }

        if !added.is_empty() {
            self.dispatch_node_event(ChangeKind::Add, added, origin);
        }
        if !updated.is_empty() {
            self.dispatch_node_event(ChangeKind::Update, updated, origin);
        }
    }

    /// Add nodes at canvas coordinates
    pub fn add_nodes_at(&self, placed: &[(Node, f64, f64)], origin: ChangeOrigin) {
        if self.is_removed() || placed.is_empty() {
            return;
        }
        // Positions go in before the add event so layout persistence sees them
        if let Some(surface) = self.surface.get() {
            let nodes: Vec<Node> = placed.iter().map(|(node, _, _)| node.clone()).collect();
            surface.upsert_nodes(&nodes);
            for (node, x, y) in placed {
                surface.move_node(&node.id, *x, *y);
            }
        }
        let nodes: Vec<Node> = placed.iter().map(|(node, _, _)| node.clone()).collect();
        self.add_nodes(&nodes, origin);
    }

    /// Redraw nodes already shown; others are ignored
    pub fn update_nodes(&self, nodes: &[Node], origin: ChangeOrigin) {
        if self.is_removed() {
            return;
        }
        let present: Vec<Node> = {
            let shown = lock(&self.nodes);
            nodes.iter().filter(|n| shown.contains(&n.id)).cloned().collect()
        };
        if present.is_empty() {
            return;
        }

        if let Some(surface) = self.surface.get() {
            surface.upsert_nodes(&present);
        }
        let ids = present.into_iter().map(|n| n.id).collect();
        self.dispatch_node_event(ChangeKind::Update, ids, origin);
    }

    /// Remove nodes, along with any shown edge that loses an endpoint
    pub fn remove_nodes(&self, ids: &[String], origin: ChangeOrigin) {
        if self.is_removed() {
            return;
        }
        let removed: Vec<String> = {
            let mut shown = lock(&self.nodes);
            ids.iter().filter(|id| shown.remove(id.as_str())).cloned().collect()
        };
        if removed.is_empty() {
            return;
        }

        let dangling: Vec<String> = {
            let edges = lock(&self.edges);
            edges
                .iter()
                .filter(|(_, (from, to))| removed.contains(from) || removed.contains(to))
                .map(|(id, _)| id.clone())
                .collect()
        };
        self.remove_edges(&dangling);

        if let Some(surface) = self.surface.get() {
            surface.remove_nodes(&removed);
        }
        self.dispatch_node_event(ChangeKind::Remove, removed, origin);
    }

    pub fn move_node(&self, id: &str, x: f64, y: f64) -> bool {
        if !self.has_node(id) {
            return false;
        }
        if let Some(surface) = self.surface.get() {
            surface.move_node(id, x, y);
        }
        true
    }

    /// Current on-screen coordinates of shown nodes
    pub fn positions(&self, ids: &[String]) -> Vec<LayoutEntry> {
        match self.surface.get() {
            Some(surface) => surface.positions(ids),
            None => Vec::new(),
        }
    }

    // ── Edge subset ──────────────────────────────────────────────────────

    pub fn has_edge(&self, id: &str) -> bool {
        lock(&self.edges).contains_key(id)
    }

    pub fn edge_ids(&self) -> Vec<String> {
        lock(&self.edges).keys().cloned().collect()
    }

    pub fn edge_count(&self) -> usize {
        lock(&self.edges).len()
    }

    /// Endpoints of every shown edge
    pub fn edge_endpoints(&self) -> Vec<(String, String, String)> {
        lock(&self.edges)
            .iter()
            .map(|(id, (from, to))| (id.clone(), from.clone(), to.clone()))
            .collect()
    }

    /// Add or redraw edges whose endpoints are both shown.
    ///
    /// Edges with a missing endpoint are held back. Returns how many were
    /// drawn.
    pub fn upsert_edges(&self, edges: &[Edge]) -> usize {
        if self.is_removed() || edges.is_empty() {
            return 0;
        }

        let accepted: Vec<Edge> = {
            let shown = lock(&self.nodes);
            let mut subset = lock(&self.edges);
            edges
                .iter()
                .filter(|edge| {
                    let visible = shown.contains(&edge.from) && shown.contains(&edge.to);
                    if !visible {
                        debug!(
                            view_id = %self.view_id,
                            edge_id = %edge.id,
                            "Edge endpoint not in view, holding back"
                        );
                    }
                    visible
                })
                .inspect(|edge| {
                    subset.insert(edge.id.clone(), (edge.from.clone(), edge.to.clone()));
                })
                .cloned()
                .collect()
        };

        if !accepted.is_empty() {
            if let Some(surface) = self.surface.get() {
                surface.upsert_edges(&accepted);
            }
        }
        accepted.len()
    }

    pub fn remove_edges(&self, ids: &[String]) -> usize {
        let removed: Vec<String> = {
            let mut subset = lock(&self.edges);
            ids.iter()
                .filter(|id| subset.remove(id.as_str()).is_some())
                .cloned()
                .collect()
        };
        if !removed.is_empty() {
            if let Some(surface) = self.surface.get() {
                surface.remove_edges(&removed);
            }
        }
        removed.len()
    }

    // ── Callbacks ────────────────────────────────────────────────────────

    pub fn add_node_dataset_callback(&self, callback: Callback<NodeSetEvent>, once: bool) -> bool {
        self.node_callbacks.register(callback, once)
    }

    pub fn add_singleclick_callback(&self, callback: Callback<DiagramClick>, once: bool) -> bool {
        self.click_callbacks.register(callback, once)
    }

    pub fn add_doubleclick_callback(&self, callback: Callback<DiagramClick>, once: bool) -> bool {
        self.doubleclick_callbacks.register(callback, once)
    }

    fn dispatch_node_event(&self, kind: ChangeKind, items: Vec<String>, origin: ChangeOrigin) {
        if !self.handlers_connected() {
            return;
        }
        let event = NodeSetEvent {
            kind,
            items,
            origin,
        };
        self.node_callbacks.dispatch(&event);
    }

    pub fn click(&self, pointer: PointerEvent) {
        if !self.handlers_connected() {
            return;
        }
        if !pointer.nodes.is_empty() {
            info!(view_id = %self.view_id, selected = pointer.nodes.len(), "Nodes selected");
        }
        let event = DiagramClick {
            view_id: self.view_id.clone(),
            pointer,
        };
        self.click_callbacks.dispatch(&event);
    }

    /// Run double-click callbacks, then zoom to the clicked nodes or, on
    /// empty canvas, to the node nearest the pointer
    pub fn double_click(&self, pointer: PointerEvent) {
        if !self.handlers_connected() {
            return;
        }
        debug!(view_id = %self.view_id, name = %self.name, "Diagram double click");
        let event = DiagramClick {
            view_id: self.view_id.clone(),
            pointer,
        };
        self.doubleclick_callbacks.dispatch(&event);

        let pointer = event.pointer;
        if !pointer.nodes.is_empty() {
            self.fit_to_nodes(&pointer.nodes);
        } else if pointer.edges.is_empty() {
            self.fit_to_nearest(pointer.x, pointer.y);
        }
    }

    // ── Viewport ─────────────────────────────────────────────────────────

    pub fn fit(&self) {
        if let Some(surface) = self.surface.get() {
            surface.fit(None);
        }
    }

    pub fn fit_to_nodes(&self, ids: &[String]) {
        if let Some(surface) = self.surface.get() {
            surface.fit(Some(ids));
        }
    }

    /// Zoom to the node closest to canvas point (x, y). Returns its id.
    pub fn fit_to_nearest(&self, x: f64, y: f64) -> Option<String> {
        let positions = self.positions(&self.node_ids());
        let closest = arrange::nearest(&positions, x, y)?.id.clone();
        self.fit_to_nodes(std::slice::from_ref(&closest));
        Some(closest)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
