use super::event::{dedup, AlertEvent, AlertKey};
use super::pipeline;
use crate::config::AlertsConfig;
use crate::diagram::DiagramRegistry;
use crate::model::{Edge, GraphModel, Node, VisualState};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// What one propagation pass changed
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PropagationReport {
    /// Nodes marked alerting by the current snapshot, sorted
    pub alerting: Vec<String>,
    /// Keys present in the previous snapshot but not the current one
    pub cleared: Vec<AlertKey>,
    /// Nodes re-submitted because their displayed image changed
    pub resubmitted: Vec<String>,
    /// Edges whose color or dash state changed
    pub recolored: Vec<String>,
    /// Alerts for resources no longer in the model
    pub skipped: usize,
}

/// Applies alert snapshots to the graph model and the views showing it
pub struct AlertPropagator {
    model: Arc<GraphModel>,
    registry: Arc<DiagramRegistry>,
    style: AlertsConfig,
}

impl AlertPropagator {
    pub fn new(model: Arc<GraphModel>, registry: Arc<DiagramRegistry>, style: AlertsConfig) -> Self {
        Self {
            model,
            registry,
            style,
        }
    }

    /// Mark resources in `current` as alerting and clear those that
    /// dropped out since `previous`.
    ///
    /// Both snapshots are de-duplicated by key first. A resource still
    /// alerting on another key stays alerting when one of its keys clears.
    pub fn update_event_alert_state(
        &self,
        current: &[AlertEvent],
        previous: &[AlertEvent],
    ) -> PropagationReport {
        let current = dedup(current);
        let previous = dedup(previous);
        let mut report = PropagationReport::default();
        let mut alerting: BTreeSet<String> = BTreeSet::new();

        for alert in &current {
            let found = self
                .model
                .modify_node(&alert.resource_arn, |node| node.alerting = true);
            if found.is_none() {
                debug!(resource_id = %alert.resource_arn, "Alert for unknown resource, skipping");
                report.skipped += 1;
                continue;
            }
            alerting.insert(alert.resource_arn.clone());
            self.apply(alert, false, &mut report);
        }

        let active: HashSet<AlertKey> = current.iter().map(AlertEvent::key).collect();
        let cleared: Vec<&AlertEvent> = previous
            .iter()
            .filter(|alert| !active.contains(&alert.key()))
            .collect();

        for alert in cleared {
            report.cleared.push(alert.key());
            let still_alerting = alerting.contains(&alert.resource_arn);
            let found = self.model.modify_node(&alert.resource_arn, |node| {
                if !still_alerting {
                    node.alerting = false;
                }
            });
            if found.is_none() {
                debug!(resource_id = %alert.resource_arn, "Cleared alert for unknown resource, skipping");
                report.skipped += 1;
                continue;
            }
            self.apply(alert, true, &mut report);
        }

        report.alerting = alerting.into_iter().collect();
        info!(
            alerting = report.alerting.len(),
            cleared = report.cleared.len(),
            resubmitted = report.resubmitted.len(),
            recolored = report.recolored.len(),
            "Alert state updated"
        );
        report
    }

    /// Update liveness for one alert, then redraw what changed
    fn apply(&self, alert: &AlertEvent, running: bool, report: &mut PropagationReport) {
        let slot = alert.detail.pipeline;
        let Some((changed, node)) = self.model.modify_node(&alert.resource_arn, |node| {
            match slot {
                Some(index) => {
                    pipeline::mark_pipeline(node, index, running);
                }
                None => node.degraded = false,
            }
            (node.apply_visual_state(), node.clone())
        }) else {
            return;
        };

        let active = !running;
        if changed {
            self.resubmit(node.clone(), active);
            report.resubmitted.push(node.id.clone());
        }

        let abnormal = active && node.visual_state() != VisualState::Normal;
        let color = if abnormal {
            &self.style.alert_edge_color
        } else {
            &self.style.normal_edge_color
        };

        for mut edge in self.edges_for(&node, slot) {
            if edge.color == *color && edge.dashes == abnormal {
                continue;
            }
            edge.color = color.clone();
            edge.dashes = abnormal;
            edge.hover_width = self.style.edge_hover_width;
            report.recolored.push(edge.id.clone());
            self.recolor(edge, active);
        }
    }

    fn resubmit(&self, node: Node, active: bool) {
        let id = node.id.clone();
        self.model.update_node(node);
        for view in self.registry.have_all(&[id.as_str()]) {
            view.alert(active);
        }
    }

    fn recolor(&self, edge: Edge, active: bool) {
        let (from, to) = (edge.from.clone(), edge.to.clone());
        self.model.update_edge(edge);
        for view in self.registry.have_all(&[from.as_str(), to.as_str()]) {
            view.alert(active);
        }
    }

    /// Pipeline resources recolor only that pipeline's edges, in either
    /// direction; everything else recolors its outbound edges
    fn edges_for(&self, node: &Node, slot: Option<u32>) -> Vec<Edge> {
        match slot {
            Some(index) if pipeline::is_pipeline_resource(&node.id) => {
                self.model.pipeline_edges(&node.id, index)
            }
            _ => self.model.outbound_edges(&node.id),
        }
    }
}
