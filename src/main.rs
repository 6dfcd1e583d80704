use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use topology_sync::alert::{AlarmIndicators, FileHealthSource, HealthEventSource};
use topology_sync::config::{load_config, DashboardConfig};
use topology_sync::layout::SqliteLayoutStore;
use topology_sync::model::{GraphModel, Inventory};
use topology_sync::surface::HeadlessFactory;
use topology_sync::Dashboard;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "topology_sync=info".into()),
        )
        .init();

    info!("Topology sync starting...");

    let config = match std::env::var("TOPOLOGY_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => DashboardConfig::default(),
    }
    .with_env_overrides();

    let mut args = std::env::args().skip(1);
    let inventory_path = args.next();
    let health_path = args.next();

    let model = Arc::new(GraphModel::with_change_buffer(config.model.change_buffer));
    if let Some(path) = &inventory_path {
        let inventory = Inventory::load_from_file(Path::new(path))?;
        let nodes = inventory.nodes.len();
        let edges = inventory.apply(&model);
        info!(path = %path, nodes, edges, "Inventory loaded");
    }

    let store = Arc::new(
        SqliteLayoutStore::new(&config.layout.database_path)
            .context("Failed to open layout database")?,
    );
    info!(path = %config.layout.database_path, "Layout store opened");

    let dashboard = Dashboard::new(
        &config,
        Arc::clone(&model),
        store,
        Arc::new(HeadlessFactory::new(true)),
    );

    let mut opened = Vec::new();
    for name in &config.diagrams.names {
        match dashboard.open_diagram(name).await {
            Ok(view) => opened.push(view),
            Err(e) => warn!(name = %name, error = %e, "Failed to open diagram"),
        }
    }
    for view in &opened {
        view.wait_ready().await;
    }

    if let Some(path) = &health_path {
        let source = Arc::new(FileHealthSource::new(path));
        let snapshots = source.alert_snapshots().await?;
        let report = dashboard.apply_alerts(&snapshots.current, &snapshots.previous);
        info!(
            alerting = report.alerting.len(),
            cleared = report.cleared.len(),
            recolored = report.recolored.len(),
            "Health snapshot applied"
        );

        let indicators = AlarmIndicators::new(Arc::clone(&model), source);
        let changed = indicators.refresh(&model.all_node_ids()).await;
        info!(changed, "Alarm counts refreshed");
    }

    dashboard.flush_layout().await;

    for view in dashboard.views() {
        info!(
            name = %view.name(),
            view_id = %view.view_id(),
            state = %view.state(),
            nodes = view.node_count(),
            edges = view.edge_count(),
            alerting = view.is_alerting(),
            locked = view.is_locked(),
            "Diagram summary"
        );
    }

    Ok(())
}
