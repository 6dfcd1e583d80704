use super::*;
use std::sync::Mutex;

fn model_with(ids: &[&str]) -> GraphModel {
    let model = GraphModel::new();
    model.update_nodes(ids.iter().map(|id| Node::new(*id, "Test")).collect());
    model
}

fn recorder(model: &GraphModel) -> Arc<Mutex<Vec<ModelChange>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    model.on_change(Arc::new(move |change: &ModelChange| {
        sink.lock().unwrap().push(change.clone());
    }));
    seen
}

#[test]
fn test_update_nodes_splits_add_and_update() {
    let model = model_with(&["a"]);
    let seen = recorder(&model);

    model.update_nodes(vec![Node::new("a", "Test"), Node::new("b", "Test")]);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].kind, ChangeKind::Add);
    assert_eq!(seen[0].ids, vec!["b".to_string()]);
    assert_eq!(seen[1].kind, ChangeKind::Update);
    assert_eq!(seen[1].ids, vec!["a".to_string()]);
}

#[test]
fn test_get_nodes_drops_missing_ids() {
    let model = model_with(&["a", "b"]);
    let ids = vec!["a".to_string(), "gone".to_string(), "b".to_string()];

    let nodes = model.get_nodes(&ids);
    let found: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(found, vec!["a", "b"]);
}

#[test]
fn test_edge_requires_both_endpoints() {
    let model = model_with(&["a"]);
    assert!(!model.update_edge(Edge::new("a", "b")));
    assert_eq!(model.edge_count(), 0);

    model.update_node(Node::new("b", "Test"));
    assert!(model.update_edge(Edge::new("a", "b")));
    assert_eq!(model.edge_count(), 1);
}

#[test]
fn test_remove_node_removes_touching_edges() {
    let model = model_with(&["a", "b", "c"]);
    model.update_edges(vec![Edge::new("a", "b"), Edge::new("b", "c"), Edge::new("a", "c")]);
    let seen = recorder(&model);

    model.remove_nodes(&["b".to_string()]);

    assert_eq!(model.edge_count(), 1);
    assert!(model.get_edge("a:c").is_some());

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].dataset, Dataset::Nodes);
    assert_eq!(seen[0].kind, ChangeKind::Remove);
    assert_eq!(seen[1].dataset, Dataset::Edges);
    assert_eq!(seen[1].ids.len(), 2);
}

#[test]
fn test_edge_queries() {
    let model = model_with(&["ch", "in", "out"]);
    model.update_edges(vec![
        Edge::with_pipeline("in", "ch", 0),
        Edge::with_pipeline("in", "ch", 1),
        Edge::with_pipeline("ch", "out", 0),
        Edge::with_pipeline("ch", "out", 1),
    ]);

    assert_eq!(model.edges_touching("ch").len(), 4);
    assert_eq!(model.outbound_edges("ch").len(), 2);

    let pipeline_zero = model.pipeline_edges("ch", 0);
    let ids: Vec<&str> = pipeline_zero.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["ch:out:0", "in:ch:0"]);
}

#[test]
fn test_modify_node_is_silent() {
    let model = model_with(&["a"]);
    let seen = recorder(&model);

    let result = model.modify_node("a", |node| {
        node.alerting = true;
        42
    });

    assert_eq!(result, Some(42));
    assert!(model.get_node("a").unwrap().alerting);
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(model.modify_node("missing", |_| ()), None);
}

#[test]
fn test_listener_may_reenter_model() {
    let model = Arc::new(model_with(&["a"]));
    let weak = Arc::downgrade(&model);
    model.on_change(Arc::new(move |change: &ModelChange| {
        if change.kind == ChangeKind::Add {
            if let Some(model) = weak.upgrade() {
                // Reads during dispatch must not deadlock
                assert!(model.get_node(&change.ids[0]).is_some());
                model.modify_node("a", |n| n.alarm_count += 1);
            }
        }
    }));

    model.update_node(Node::new("b", "Test"));
    assert_eq!(model.get_node("a").unwrap().alarm_count, 1);
}

#[test]
fn test_changes_broadcast() {
    let model = GraphModel::new();
    let mut rx = model.subscribe();

    model.update_node(Node::new("a", "Test"));

    let change = rx.try_recv().unwrap();
    assert_eq!(change.dataset, Dataset::Nodes);
    assert_eq!(change.kind, ChangeKind::Add);
}

#[test]
fn test_visual_state_precedence() {
    let mut node = Node::new("a", "Test");
    node.render.normal.selected = "normal-sel".to_string();
    node.render.alert.selected = "alert-sel".to_string();
    node.render.degraded.selected = "degraded-sel".to_string();

    assert_eq!(node.visual_state(), VisualState::Normal);
    assert!(node.apply_visual_state());
    assert!(!node.apply_visual_state());

    node.alerting = true;
    assert_eq!(node.visual_state(), VisualState::Alerting);
    node.degraded = true;
    assert_eq!(node.visual_state(), VisualState::Degraded);
    assert!(node.apply_visual_state());
    assert_eq!(node.image.selected, "degraded-sel");
}
