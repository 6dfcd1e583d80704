//! Dashboard facade.
//!
//! Owns the graph model, the open views and their lifecycles, and routes
//! user operations and health snapshots to the engines that handle them.

use crate::alert::{AlertEvent, AlertPropagator, PropagationReport};
use crate::config::DashboardConfig;
use crate::diagram::{
    ChangeOrigin, DiagramLifecycle, DiagramRegistry, DiagramView, LifecycleContext, LifecycleError,
};
use crate::layout::{LayoutStore, LayoutWriter, SettingsStore};
use crate::model::{GraphModel, ModelChange};
use crate::surface::{SurfaceEvent, SurfaceFactory};
use crate::sync::SyncEngine;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Settings key holding the saved view list
const DIAGRAMS_KEY: &str = "diagrams";

#[derive(Debug)]
pub enum DashboardError {
    UnknownDiagram(String),
    /// View is locked against user edits
    Locked(String),
    DuplicateName(String),
    DuplicateId(String),
    Storage(String),
    Lifecycle(LifecycleError),
}

impl fmt::Display for DashboardError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DashboardError::UnknownDiagram(id) => write!(f, "Unknown diagram: {}", id),
            DashboardError::Locked(name) => write!(f, "Diagram is locked: {}", name),
            DashboardError::DuplicateName(name) => write!(f, "Diagram name already in use: {}", name),
            DashboardError::DuplicateId(id) => write!(f, "Diagram id already in use: {}", id),
            DashboardError::Storage(msg) => write!(f, "Settings storage failed: {}", msg),
            DashboardError::Lifecycle(e) => write!(f, "Diagram lifecycle failed: {}", e),
        }
    }
}

impl std::error::Error for DashboardError {}

impl From<LifecycleError> for DashboardError {
    fn from(e: LifecycleError) -> Self {
        DashboardError::Lifecycle(e)
    }
}

/// Saved view identity, so layouts restore across restarts
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedDiagram {
    pub name: String,
    pub view_id: String,
}

pub struct Dashboard {
    model: Arc<GraphModel>,
    registry: Arc<DiagramRegistry>,
    sync: Arc<SyncEngine>,
    settings: Arc<dyn SettingsStore>,
    propagator: Arc<AlertPropagator>,
    context: LifecycleContext,
    lifecycles: DashMap<String, Arc<Mutex<DiagramLifecycle>>>,
}

impl Dashboard {
    /// Build the dashboard and start the layout writer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<S>(
        config: &DashboardConfig,
        model: Arc<GraphModel>,
        store: Arc<S>,
        surfaces: Arc<dyn SurfaceFactory>,
    ) -> Self
    where
        S: LayoutStore + SettingsStore + 'static,
    {
        let layout_store: Arc<dyn LayoutStore> = store.clone();
        let settings: Arc<dyn SettingsStore> = store;

        let registry = Arc::new(DiagramRegistry::new());
        let sync = Arc::new(SyncEngine::new(
            Arc::clone(&model),
            LayoutWriter::spawn(Arc::clone(&layout_store)),
        ));
        let propagator = Arc::new(AlertPropagator::new(
            Arc::clone(&model),
            Arc::clone(&registry),
            config.alerts.clone(),
        ));

        // The model owns this listener, so it holds the rest weakly
        let fan_sync = Arc::downgrade(&sync);
        let fan_registry = Arc::downgrade(&registry);
        model.on_change(Arc::new(move |change: &ModelChange| {
            if let (Some(sync), Some(registry)) = (fan_sync.upgrade(), fan_registry.upgrade()) {
                sync.apply_model_change(&registry, change);
            }
        }));

        let context = LifecycleContext {
            model: Arc::clone(&model),
            layout_store,
            sync: Arc::clone(&sync),
            surfaces,
            registry: Arc::clone(&registry),
        };

        Self {
            model,
            registry,
            sync,
            settings,
            propagator,
            context,
            lifecycles: DashMap::new(),
        }
    }

    pub fn model(&self) -> &Arc<GraphModel> {
        &self.model
    }

    pub fn registry(&self) -> &Arc<DiagramRegistry> {
        &self.registry
    }

    pub fn sync(&self) -> &Arc<SyncEngine> {
        &self.sync
    }

    pub fn propagator(&self) -> &Arc<AlertPropagator> {
        &self.propagator
    }

    /// Open views in tab order
    pub fn views(&self) -> Vec<Arc<DiagramView>> {
        self.registry.all()
    }

    pub fn view(&self, view_id: &str) -> Result<Arc<DiagramView>, DashboardError> {
        self.registry
            .get(view_id)
            .ok_or_else(|| DashboardError::UnknownDiagram(view_id.to_string()))
    }

    // ── View lifetime ────────────────────────────────────────────────────

    /// Open a view by name, reusing its saved id so persisted layout
    /// comes back
    pub async fn open_diagram(&self, name: &str) -> Result<Arc<DiagramView>, DashboardError> {
        if self.registry.get_by_name(name).is_some() {
            return Err(DashboardError::DuplicateName(name.to_string()));
        }

        let mut saved = self.saved_diagrams().await?;
        let view_id = match saved.iter().find(|d| d.name == name) {
            Some(existing) => existing.view_id.clone(),
            None => {
                let view_id = Uuid::new_v4().to_string();
                saved.push(SavedDiagram {
                    name: name.to_string(),
                    view_id: view_id.clone(),
                });
                self.put_saved_diagrams(&saved).await?;
                view_id
            }
        };

        self.open_diagram_with_id(name, &view_id).await
    }

    /// Open a view with a known id and start its lifecycle in the
    /// background
    pub async fn open_diagram_with_id(
        &self,
        name: &str,
        view_id: &str,
    ) -> Result<Arc<DiagramView>, DashboardError> {
        if self.registry.get(view_id).is_some() {
            return Err(DashboardError::DuplicateId(view_id.to_string()));
        }
        if self.registry.get_by_name(name).is_some() {
            return Err(DashboardError::DuplicateName(name.to_string()));
        }

        let view = Arc::new(DiagramView::new(name, view_id));
        view.set_locked(self.read_lock(view_id).await?);
        self.registry.insert(Arc::clone(&view));

        let handle = Arc::new(Mutex::new(DiagramLifecycle::new(
            Arc::clone(&view),
            self.context.clone(),
        )));
        self.lifecycles
            .insert(view_id.to_string(), Arc::clone(&handle));

        info!(view_id = %view_id, name = %name, "Opening diagram");
        tokio::spawn(async move {
            let mut lifecycle = handle.lock().await;
            if let Err(e) = lifecycle.start().await {
                warn!(
                    view_id = %lifecycle.view().view_id(),
                    error = %e,
                    "Diagram restore incomplete, refresh to retry"
                );
            }
        });

        Ok(view)
    }

    /// Close a view, drop its tab and saved layout.
    ///
    /// A lifecycle still restoring the view finds it removed and stops.
    pub async fn remove_diagram(&self, view_id: &str) -> Result<(), DashboardError> {
        let view = self
            .registry
            .remove(view_id)
            .ok_or_else(|| DashboardError::UnknownDiagram(view_id.to_string()))?;
        self.lifecycles.remove(view_id);
        self.context.surfaces.remove_container(view_id);
        self.sync.layout().delete_view(view_id);

        let mut saved = self.saved_diagrams().await?;
        saved.retain(|d| d.view_id != view_id);
        self.put_saved_diagrams(&saved).await?;
        self.put_setting(&lock_key(view_id), serde_json::Value::Null)
            .await?;

        info!(view_id = %view_id, name = %view.name(), "Diagram removed");
        Ok(())
    }

    /// Re-run a lifecycle left in a failed state. A lifecycle that is
    /// still running is left alone.
    pub async fn refresh_diagram(&self, view_id: &str) -> Result<(), DashboardError> {
        let handle = self
            .lifecycles
            .get(view_id)
            .map(|l| Arc::clone(l.value()))
            .ok_or_else(|| DashboardError::UnknownDiagram(view_id.to_string()))?;

        let Ok(mut lifecycle) = handle.try_lock() else {
            debug!(view_id = %view_id, "Diagram lifecycle busy, not refreshing");
            return Ok(());
        };
        lifecycle.retry().await?;
        Ok(())
    }

    /// Wait until the view has finished restoring
    pub async fn wait_ready(&self, view_id: &str) -> Result<(), DashboardError> {
        self.view(view_id)?.wait_ready().await;
        Ok(())
    }

    // ── User operations ──────────────────────────────────────────────────

    /// Route a gesture from the rendering surface
    pub fn surface_event(&self, view_id: &str, event: SurfaceEvent) -> Result<(), DashboardError> {
        let view = self.view(view_id)?;
        match event {
            SurfaceEvent::Click(pointer) => view.click(pointer),
            SurfaceEvent::DoubleClick(pointer) => view.double_click(pointer),
            SurfaceEvent::DragEnd { nodes } => {
                if !view.handlers_connected() {
                    debug!(view_id = %view_id, "Drag before handlers connected, ignoring");
                } else {
                    self.sync.persist_positions(&view, &nodes);
                }
            }
        }
        Ok(())
    }

    /// Place a model node on a view at canvas coordinates.
    ///
    /// Returns false if the node is not in the model.
    pub fn drop_node(&self, view_id: &str, node_id: &str, x: f64, y: f64) -> Result<bool, DashboardError> {
        let view = self.unlocked_view(view_id)?;
        let Some(node) = self.model.get_node(node_id) else {
            debug!(view_id = %view_id, node_id = %node_id, "Dropped node not in model");
            return Ok(false);
        };
        view.add_nodes_at(&[(node, x, y)], ChangeOrigin::User);
        Ok(true)
    }

    /// Copy every node of `source` onto `target` at the same positions.
    ///
    /// Returns how many nodes were copied.
    pub fn merge_diagram(&self, source_id: &str, target_id: &str) -> Result<usize, DashboardError> {
        let source = self.view(source_id)?;
        let target = self.unlocked_view(target_id)?;

        let placed: Vec<_> = source
            .positions(&source.node_ids())
            .into_iter()
            .filter_map(|entry| {
                self.model
                    .get_node(&entry.id)
                    .map(|node| (node, entry.x, entry.y))
            })
            .collect();

        target.add_nodes_at(&placed, ChangeOrigin::User);
        info!(
            source = %source.name(),
            target = %target.name(),
            nodes = placed.len(),
            "Diagrams merged"
        );
        Ok(placed.len())
    }

    /// Add model nodes by id; ids not in the model are dropped.
    ///
    /// Returns how many nodes were added.
    pub fn add_nodes(&self, view_id: &str, ids: &[String]) -> Result<usize, DashboardError> {
        let view = self.unlocked_view(view_id)?;
        let nodes = self.model.get_nodes(ids);
        if nodes.len() < ids.len() {
            debug!(
                view_id = %view_id,
                missing = ids.len() - nodes.len(),
                "Skipping ids not in the model"
            );
        }
        view.add_nodes(&nodes, ChangeOrigin::User);
        Ok(nodes.len())
    }

    pub fn layout_isolated(&self, view_id: &str, save: bool) -> Result<usize, DashboardError> {
        let view = self.view(view_id)?;
        Ok(self.sync.layout_isolated(&view, save))
    }

    /// Lock or unlock a view and persist the flag
    pub async fn lock(&self, view_id: &str, locked: bool) -> Result<(), DashboardError> {
        let view = self.view(view_id)?;
        view.set_locked(locked);
        self.put_setting(
            &lock_key(view_id),
            json!({ "name": view.name(), "locked": locked }),
        )
        .await?;
        info!(view_id = %view_id, locked, "Diagram lock changed");
        Ok(())
    }

    /// Persisted lock flag of a view, applied to the open view
    pub async fn is_locked(&self, view_id: &str) -> Result<bool, DashboardError> {
        let view = self.view(view_id)?;
        let locked = self.read_lock(view_id).await?;
        view.set_locked(locked);
        Ok(locked)
    }

    // ── Alerts and layout ────────────────────────────────────────────────

    pub fn apply_alerts(&self, current: &[AlertEvent], previous: &[AlertEvent]) -> PropagationReport {
        self.propagator.update_event_alert_state(current, previous)
    }

    /// Wait for every queued layout write to land
    pub async fn flush_layout(&self) {
        self.sync.layout().flush().await;
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn unlocked_view(&self, view_id: &str) -> Result<Arc<DiagramView>, DashboardError> {
        let view = self.view(view_id)?;
        if view.is_locked() {
            return Err(DashboardError::Locked(view.name().to_string()));
        }
        Ok(view)
    }

    async fn read_lock(&self, view_id: &str) -> Result<bool, DashboardError> {
        let value = self
            .settings
            .get_setting(&lock_key(view_id))
            .await
            .map_err(|e| DashboardError::Storage(format!("{:#}", e)))?;
        Ok(value
            .as_ref()
            .and_then(|v| v.get("locked"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false))
    }

    async fn saved_diagrams(&self) -> Result<Vec<SavedDiagram>, DashboardError> {
        let value = self
            .settings
            .get_setting(DIAGRAMS_KEY)
            .await
            .map_err(|e| DashboardError::Storage(format!("{:#}", e)))?;
        match value {
            Some(value) => serde_json::from_value(value).map_err(|e| DashboardError::Storage(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn put_saved_diagrams(&self, saved: &[SavedDiagram]) -> Result<(), DashboardError> {
        let value = serde_json::to_value(saved).map_err(|e| DashboardError::Storage(e.to_string()))?;
        self.put_setting(DIAGRAMS_KEY, value).await
    }

    async fn put_setting(&self, key: &str, value: serde_json::Value) -> Result<(), DashboardError> {
        self.settings
            .put_setting(key, value)
            .await
            .map_err(|e| DashboardError::Storage(format!("{:#}", e)))
    }
}

fn lock_key(view_id: &str) -> String {
    format!("diagram_lock_{}", view_id)
}
