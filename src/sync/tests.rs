use super::*;
use crate::diagram::DiagramRegistry;
use crate::layout::{LayoutEntry, LayoutStore, LayoutWriter, SqliteLayoutStore};
use crate::model::Node;
use crate::surface::{HeadlessSurface, RenderSurface};

struct Harness {
    model: Arc<GraphModel>,
    store: Arc<SqliteLayoutStore>,
    engine: Arc<SyncEngine>,
}

fn harness(nodes: &[&str], edges: &[(&str, &str)]) -> Harness {
    let model = Arc::new(GraphModel::new());
    model.update_nodes(nodes.iter().map(|id| Node::new(*id, "Channel")).collect());
    model.update_edges(edges.iter().map(|(from, to)| Edge::new(*from, *to)).collect());

    let store = Arc::new(SqliteLayoutStore::new(":memory:").unwrap());
    let engine = Arc::new(SyncEngine::new(
        Arc::clone(&model),
        LayoutWriter::spawn(store.clone()),
    ));
    Harness {
        model,
        store,
        engine,
    }
}

fn attached_view(h: &Harness, view_id: &str) -> (Arc<DiagramView>, Arc<HeadlessSurface>) {
    let view = Arc::new(DiagramView::new(view_id, view_id));
    let surface = Arc::new(HeadlessSurface::new(true));
    view.attach_surface(surface.clone());
    view.connect_handlers();
    h.engine.attach(&view);
    (view, surface)
}

fn add(h: &Harness, view: &DiagramView, ids: &[&str], origin: ChangeOrigin) {
    let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    view.add_nodes(&h.model.get_nodes(&ids), origin);
}

fn assert_endpoints_present(view: &DiagramView) {
    for (id, from, to) in view.edge_endpoints() {
        assert!(
            view.has_node(&from) && view.has_node(&to),
            "edge {} shown without both endpoints",
            id
        );
    }
}

#[tokio::test]
async fn test_restore_needs_both_ends() {
    let h = harness(&["A", "B"], &[("A", "B")]);
    let view = DiagramView::new("V", "V");
    add(&h, &view, &["A"], ChangeOrigin::Restore);

    assert_eq!(h.engine.restore_edges(&view), 0);
    assert_eq!(view.node_ids(), vec!["A"]);
    assert!(view.edge_ids().is_empty());
    assert_endpoints_present(&view);
}

#[tokio::test]
async fn test_restore_edges_is_idempotent() {
    let h = harness(&["A", "B", "C"], &[("A", "B"), ("B", "C")]);
    let view = DiagramView::new("V", "V");
    add(&h, &view, &["A", "B", "C"], ChangeOrigin::Restore);

    assert_eq!(h.engine.restore_edges(&view), 2);
    assert_eq!(h.engine.restore_edges(&view), 0);
    assert_eq!(view.edge_ids(), vec!["A:B", "B:C"]);
}

#[tokio::test]
async fn test_incremental_add_surfaces_edge_to_new_node() {
    let h = harness(&["A", "B", "C"], &[("A", "B"), ("A", "C")]);
    let (view, surface) = attached_view(&h, "V");
    add(&h, &view, &["A"], ChangeOrigin::Restore);
    h.engine.restore_edges(&view);

    add(&h, &view, &["C"], ChangeOrigin::User);

    assert_eq!(view.edge_ids(), vec!["A:C"]);
    assert_eq!(surface.edge_ids(), vec!["A:C"]);
    assert_endpoints_present(&view);
}

#[tokio::test]
async fn test_user_changes_persist_layout() {
    let h = harness(&["A", "B"], &[]);
    let (view, _surface) = attached_view(&h, "V");

    add(&h, &view, &["A", "B"], ChangeOrigin::User);
    view.move_node("B", 40.0, 30.0);
    h.engine.persist_positions(&view, &["B".to_string()]);
    h.engine.layout().flush().await;

    let entries = h.store.retrieve_layout("V").await.unwrap();
    assert_eq!(
        entries,
        vec![LayoutEntry::new("A", 0.0, 0.0), LayoutEntry::new("B", 40.0, 30.0)]
    );

    view.remove_nodes(&["A".to_string()], ChangeOrigin::User);
    h.engine.layout().flush().await;
    let entries = h.store.retrieve_layout("V").await.unwrap();
    assert_eq!(entries, vec![LayoutEntry::new("B", 40.0, 30.0)]);
}

#[tokio::test]
async fn test_model_and_restore_changes_leave_layout_alone() {
    let h = harness(&["A", "B"], &[]);
    let (view, _surface) = attached_view(&h, "V");

    add(&h, &view, &["A"], ChangeOrigin::Restore);
    add(&h, &view, &["B"], ChangeOrigin::Model);
    h.engine.layout().flush().await;

    assert!(h.store.retrieve_layout("V").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_locked_view_refuses_drag_persistence() {
    let h = harness(&["A"], &[]);
    let (view, _surface) = attached_view(&h, "V");
    add(&h, &view, &["A"], ChangeOrigin::Restore);
    view.set_locked(true);

    assert!(!h.engine.persist_positions(&view, &["A".to_string()]));
    h.engine.layout().flush().await;
    assert!(h.store.retrieve_layout("V").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_model_changes_fan_out_to_views() {
    let h = harness(&["A", "B", "C"], &[]);
    let registry = DiagramRegistry::new();
    let (left, left_surface) = attached_view(&h, "left");
    let (right, _right_surface) = attached_view(&h, "right");
    registry.insert(Arc::clone(&left));
    registry.insert(Arc::clone(&right));

    add(&h, &left, &["A", "B"], ChangeOrigin::Restore);
    add(&h, &right, &["A", "C"], ChangeOrigin::Restore);

    let engine = Arc::clone(&h.engine);
    let registry = Arc::new(registry);
    let fan_out = Arc::clone(&registry);
    h.model.on_change(Arc::new(move |change: &ModelChange| {
        engine.apply_model_change(&fan_out, change);
    }));

    // Edge appears only where both ends are shown
    h.model.update_edge(Edge::new("A", "B"));
    assert_eq!(left.edge_ids(), vec!["A:B"]);
    assert!(right.edge_ids().is_empty());

    // Node update redraws it wherever shown
    let redraws = left_surface.node_redraws();
    let mut a = h.model.get_node("A").unwrap();
    a.name = "renamed".to_string();
    h.model.update_node(a);
    assert_eq!(left_surface.node_redraws(), redraws + 1);
    assert_eq!(left_surface.drawn_node("A").unwrap().name, "renamed");

    // Node removal drops it, and its edges, from every view
    h.model.remove_nodes(&["A".to_string()]);
    assert_eq!(left.node_ids(), vec!["B"]);
    assert!(left.edge_ids().is_empty());
    assert_eq!(right.node_ids(), vec!["C"]);
    assert_endpoints_present(&left);
    assert_endpoints_present(&right);
}

#[tokio::test]
async fn test_layout_isolated_moves_unconnected_nodes() {
    let h = harness(&["A", "B", "lonely"], &[("A", "B")]);
    let (view, surface) = attached_view(&h, "V");
    add(&h, &view, &["A", "B", "lonely"], ChangeOrigin::Restore);
    h.engine.restore_edges(&view);
    view.move_node("B", 100.0, 0.0);

    let moved = h.engine.layout_isolated(&view, true);
    h.engine.layout().flush().await;

    assert_eq!(moved, 1);
    let (w, hgt) = surface.node_size();
    let pad_x = (w * 1.25).ceil();
    let pad_y = (hgt * 1.25).ceil();
    assert_eq!(surface.position("lonely"), Some((100.0 + 2.0 * pad_x, pad_y)));
    assert_eq!(surface.position("A"), Some((0.0, 0.0)));
    assert_eq!(h.store.retrieve_layout("V").await.unwrap().len(), 3);
}

/// Surface that records the order of edge draws and position reads
struct OrderedSurface {
    inner: HeadlessSurface,
    calls: std::sync::Mutex<Vec<&'static str>>,
}

impl OrderedSurface {
    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

impl RenderSurface for OrderedSurface {
    fn upsert_nodes(&self, nodes: &[Node]) {
        self.inner.upsert_nodes(nodes);
    }

    fn remove_nodes(&self, ids: &[String]) {
        self.inner.remove_nodes(ids);
    }

    fn upsert_edges(&self, edges: &[Edge]) {
        self.record("edges");
        self.inner.upsert_edges(edges);
    }

    fn remove_edges(&self, ids: &[String]) {
        self.inner.remove_edges(ids);
    }

    fn move_node(&self, id: &str, x: f64, y: f64) {
        self.inner.move_node(id, x, y);
    }

    fn positions(&self, ids: &[String]) -> Vec<LayoutEntry> {
        self.record("positions");
        self.inner.positions(ids)
    }

    fn node_size(&self) -> (f64, f64) {
        self.inner.node_size()
    }

    fn fit(&self, node_ids: Option<&[String]>) {
        self.inner.fit(node_ids);
    }

    fn after_drawing(&self) -> tokio::sync::oneshot::Receiver<()> {
        self.inner.after_drawing()
    }

    fn set_alert_indicator(&self, alerting: bool) {
        self.inner.set_alert_indicator(alerting);
    }
}

#[tokio::test]
async fn test_edges_synchronized_before_layout_is_read() {
    let h = harness(&["A", "C"], &[("A", "C")]);
    let view = Arc::new(DiagramView::new("V", "V"));
    let surface = Arc::new(OrderedSurface {
        inner: HeadlessSurface::new(true),
        calls: std::sync::Mutex::new(Vec::new()),
    });
    view.attach_surface(surface.clone());
    view.connect_handlers();
    h.engine.attach(&view);

    add(&h, &view, &["A"], ChangeOrigin::Restore);
    assert!(surface.calls.lock().unwrap().is_empty());

    add(&h, &view, &["C"], ChangeOrigin::User);
    assert_eq!(*surface.calls.lock().unwrap(), vec!["edges", "positions"]);
    assert_eq!(view.edge_ids(), vec!["A:C"]);

    h.engine.layout().flush().await;
    let saved = h.store.retrieve_layout("V").await.unwrap();
    assert_eq!(saved, vec![LayoutEntry::new("C", 0.0, 0.0)]);
}
