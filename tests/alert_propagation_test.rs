// Integration tests for alert propagation onto open diagrams

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use topology_sync::alert::{run_alert_poller, AlarmIndicators, AlertEvent, FileHealthSource};
use topology_sync::config::DashboardConfig;
use topology_sync::layout::{LayoutEntry, LayoutStore, SqliteLayoutStore};
use topology_sync::model::{Edge, GraphModel, ImagePair, Node, RenderDirectives};
use topology_sync::surface::HeadlessFactory;
use topology_sync::Dashboard;

const INPUT: &str = "arn:aws:medialive:us-west-2:1:input:3";
const CHANNEL: &str = "arn:aws:medialive:us-west-2:1:channel:9";
const ORIGIN: &str = "arn:aws:mediapackage:us-west-2:1:channels/pkg";

fn pair(prefix: &str) -> ImagePair {
    ImagePair {
        selected: format!("{}-selected", prefix),
        unselected: format!("{}-unselected", prefix),
    }
}

fn resource(id: &str, title: &str) -> Node {
    let mut node = Node::new(id, title);
    node.render = RenderDirectives {
        normal: pair("normal"),
        alert: pair("alert"),
        degraded: pair("degraded"),
    };
    node.apply_visual_state();
    node
}

fn graph() -> Arc<GraphModel> {
    let mut channel = resource(CHANNEL, "MediaLive Channel");
    channel.data = serde_json::json!({"ChannelClass": "STANDARD"});

    let model = Arc::new(GraphModel::new());
    model.update_nodes(vec![
        resource(INPUT, "MediaLive Input"),
        channel,
        resource(ORIGIN, "MediaPackage Channel"),
        resource("X", "S3 Bucket"),
    ]);
    model.update_edges(vec![
        Edge::with_pipeline(INPUT, CHANNEL, 0),
        Edge::with_pipeline(INPUT, CHANNEL, 1),
        Edge::with_pipeline(CHANNEL, ORIGIN, 0),
        Edge::with_pipeline(CHANNEL, ORIGIN, 1),
    ]);
    model
}

/// Open a ready view showing the channel chain, plus an empty second view
async fn open_dashboard(model: Arc<GraphModel>) -> (Dashboard, Arc<HeadlessFactory>) {
    let store = Arc::new(SqliteLayoutStore::new(":memory:").unwrap());
    store
        .save_layout(
            "chain",
            &[
                LayoutEntry::new(INPUT, 0.0, 0.0),
                LayoutEntry::new(CHANNEL, 100.0, 0.0),
                LayoutEntry::new(ORIGIN, 200.0, 0.0),
            ],
        )
        .await
        .unwrap();

    let factory = Arc::new(HeadlessFactory::new(true));
    let dashboard = Dashboard::new(&DashboardConfig::default(), model, store, factory.clone());
    for (name, id) in [("Chain", "chain"), ("Empty", "empty")] {
        dashboard.open_diagram_with_id(name, id).await.unwrap();
        dashboard.wait_ready(id).await.unwrap();
    }
    (dashboard, factory)
}

#[tokio::test]
async fn test_pipeline_alert_reaches_surface() {
    let model = graph();
    let (dashboard, factory) = open_dashboard(Arc::clone(&model)).await;
    let surface = factory.surface("chain").unwrap();
    assert_eq!(surface.edge_ids().len(), 4);

    let report = dashboard.apply_alerts(&[AlertEvent::new(CHANNEL, Some(0))], &[]);
    assert_eq!(report.alerting, vec![CHANNEL.to_string()]);

    // Only pipeline 0 edges, in both directions
    let mut recolored = report.recolored.clone();
    recolored.sort();
    let mut expected = vec![
        Edge::with_pipeline(INPUT, CHANNEL, 0).id,
        Edge::with_pipeline(CHANNEL, ORIGIN, 0).id,
    ];
    expected.sort();
    assert_eq!(recolored, expected);

    for id in &expected {
        let edge = surface.drawn_edge(id).unwrap();
        assert_eq!(edge.color, "red");
        assert!(edge.dashes);
    }
    let healthy = surface
        .drawn_edge(&Edge::with_pipeline(INPUT, CHANNEL, 1).id)
        .unwrap();
    assert_eq!(healthy.color, "black");

    assert_eq!(surface.drawn_node(CHANNEL).unwrap().image, pair("degraded"));
    assert!(surface.alert_indicator());
    assert!(dashboard.view("chain").unwrap().is_alerting());
    assert!(!factory.surface("empty").unwrap().alert_indicator());

    // Clearing restores the normal drawing
    let report = dashboard.apply_alerts(&[], &[AlertEvent::new(CHANNEL, Some(0))]);
    assert_eq!(report.cleared.len(), 1);
    assert_eq!(surface.drawn_node(CHANNEL).unwrap().image, pair("normal"));
    for id in &expected {
        let edge = surface.drawn_edge(id).unwrap();
        assert_eq!(edge.color, "black");
        assert!(!edge.dashes);
    }
    assert!(!surface.alert_indicator());
}

/// X alerted on pipelines 0 and 1; only 1 clears, so X stays degraded
#[tokio::test]
async fn test_partial_clear_keeps_resource_alerting() {
    let model = graph();
    let (dashboard, _factory) = open_dashboard(Arc::clone(&model)).await;

    let current = vec![AlertEvent::new("X", Some(0))];
    let previous = vec![AlertEvent::new("X", Some(0)), AlertEvent::new("X", Some(1))];
    let report = dashboard.apply_alerts(&current, &previous);

    assert_eq!(report.alerting, vec!["X".to_string()]);
    assert_eq!(report.cleared.len(), 1);
    assert_eq!(report.cleared[0].to_string(), "X:1");

    let x = model.get_node("X").unwrap();
    assert!(x.alerting);
    assert!(x.degraded);
    assert_eq!(x.running_pipelines, Some(vec![0, 1]));
}

#[tokio::test]
async fn test_alert_poller_applies_health_file() {
    let model = graph();
    let (dashboard, factory) = open_dashboard(Arc::clone(&model)).await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "current": [{{"resource_arn": "{channel}", "detail": {{"pipeline": 1}}, "timestamp": 5}}],
            "previous": [],
            "alarms": {{"{channel}": [{{"AlarmName": "input-loss", "StateValue": "ALARM"}}]}}
        }}"#,
        channel = CHANNEL
    )
    .unwrap();

    let source = Arc::new(FileHealthSource::new(file.path()));
    let indicators = Arc::new(AlarmIndicators::new(Arc::clone(&model), source.clone()));
    let poller = tokio::spawn(run_alert_poller(
        Arc::clone(dashboard.propagator()),
        indicators,
        source,
        Arc::clone(&model),
        1,
    ));

    let polled = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let channel = model.get_node(CHANNEL).unwrap();
            if channel.alarm_count == 1 {
                return channel;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("poller never applied the health file");
    poller.abort();

    assert!(polled.alerting);
    assert_eq!(polled.running_pipelines, Some(vec![1, 0]));

    let surface = factory.surface("chain").unwrap();
    let edge = surface
        .drawn_edge(&Edge::with_pipeline(CHANNEL, ORIGIN, 1).id)
        .unwrap();
    assert_eq!(edge.color, "red");
    assert_eq!(surface.drawn_node(CHANNEL).unwrap().alarm_count, 1);
}
