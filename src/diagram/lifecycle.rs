use super::registry::DiagramRegistry;
use super::view::{ChangeOrigin, DiagramView};
use crate::layout::{LayoutEntry, LayoutStore};
use crate::model::GraphModel;
use crate::surface::SurfaceFactory;
use crate::sync::SyncEngine;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Lifecycle states of a diagram view, in the order they are visited
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagramState {
    Uninitialized,
    CreatePageContainer,
    CreateDiagram,
    ConnectEventHandlers,
    RestoreNodes,
    RestoreLayout,
    RestoreEdges,
    ScaleFirstView,
    ReadyToView,
}

impl DiagramState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagramState::Uninitialized => "uninitialized",
            DiagramState::CreatePageContainer => "create-page-container",
            DiagramState::CreateDiagram => "create-diagram",
            DiagramState::ConnectEventHandlers => "connect-event-handlers",
            DiagramState::RestoreNodes => "restore-nodes",
            DiagramState::RestoreLayout => "restore-layout",
            DiagramState::RestoreEdges => "restore-edges",
            DiagramState::ScaleFirstView => "scale-first-view",
            DiagramState::ReadyToView => "ready-to-view",
        }
    }

    pub fn is_ready(&self) -> bool {
        *self == DiagramState::ReadyToView
    }
}

impl fmt::Display for DiagramState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completion signals fed to the lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    Start,
    PageContainerCreated,
    DiagramCreated,
    HandlersConnected,
    NodesRestored,
    LayoutRestored,
    EdgesRestored,
    DrawComplete,
}

/// Outcome of feeding a trigger to a state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Queue the trigger, then move to the given state
    Defer(DiagramState),
    Advance(DiagramState),
    /// Trigger does not apply to this state
    Ignore,
}

/// Transition table
pub fn transition(state: DiagramState, trigger: Trigger) -> Step {
    use DiagramState::*;
    match (state, trigger) {
        (Uninitialized, _) => Step::Defer(CreatePageContainer),
        (CreatePageContainer, Trigger::PageContainerCreated) => Step::Advance(CreateDiagram),
        (CreateDiagram, Trigger::DiagramCreated) => Step::Advance(ConnectEventHandlers),
        (ConnectEventHandlers, Trigger::HandlersConnected) => Step::Advance(RestoreNodes),
        (RestoreNodes, Trigger::NodesRestored) => Step::Advance(RestoreLayout),
        (RestoreLayout, Trigger::LayoutRestored) => Step::Advance(RestoreEdges),
        (RestoreEdges, Trigger::EdgesRestored) => Step::Advance(ScaleFirstView),
        (ScaleFirstView, Trigger::DrawComplete) => Step::Advance(ReadyToView),
        _ => Step::Ignore,
    }
}

#[derive(Debug)]
pub enum LifecycleError {
    /// Layout store rejected the fetch
    LayoutFetch(String),
    /// Rendering surface went away before finishing a draw pass
    DrawSignalDropped,
    SurfaceMissing,
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LifecycleError::LayoutFetch(msg) => write!(f, "Layout fetch failed: {}", msg),
            LifecycleError::DrawSignalDropped => write!(f, "Draw complete signal dropped"),
            LifecycleError::SurfaceMissing => write!(f, "Diagram has no rendering surface"),
        }
    }
}

impl std::error::Error for LifecycleError {}

/// Collaborators shared by every lifecycle
#[derive(Clone)]
pub struct LifecycleContext {
    pub model: Arc<GraphModel>,
    pub layout_store: Arc<dyn LayoutStore>,
    pub sync: Arc<SyncEngine>,
    pub surfaces: Arc<dyn SurfaceFactory>,
    pub registry: Arc<DiagramRegistry>,
}

/// Drives one diagram view from creation to `ReadyToView`.
///
/// Each state runs its effect on entry; the effect's completion trigger
/// moves the machine on. A failed effect leaves the view in that state
/// until `retry`.
pub struct DiagramLifecycle {
    view: Arc<DiagramView>,
    ctx: LifecycleContext,
    queue: VecDeque<Trigger>,
    deferred: VecDeque<Trigger>,
    /// Layout resolved by `RestoreNodes`, applied by `RestoreLayout`
    carried: Option<Vec<LayoutEntry>>,
}

impl DiagramLifecycle {
    pub fn new(view: Arc<DiagramView>, ctx: LifecycleContext) -> Self {
        Self {
            view,
            ctx,
            queue: VecDeque::new(),
            deferred: VecDeque::new(),
            carried: None,
        }
    }

    pub fn view(&self) -> &Arc<DiagramView> {
        &self.view
    }

    pub fn state(&self) -> DiagramState {
        self.view.state()
    }

    pub async fn start(&mut self) -> Result<(), LifecycleError> {
        self.handle(Trigger::Start).await
    }

    /// Feed a trigger and run the machine until it settles
    pub async fn handle(&mut self, trigger: Trigger) -> Result<(), LifecycleError> {
        self.queue.push_back(trigger);

        while let Some(trigger) = self.queue.pop_front() {
            if self.view.is_removed() {
                debug!(view_id = %self.view.view_id(), "Diagram removed, dropping lifecycle work");
                self.queue.clear();
                self.deferred.clear();
                return Ok(());
            }

            let state = self.view.state();
            match transition(state, trigger) {
                Step::Defer(next) => {
                    self.deferred.push_back(trigger);
                    self.advance(next).await?;
                    self.queue.extend(self.deferred.drain(..));
                }
                Step::Advance(next) => self.advance(next).await?,
                Step::Ignore => {
                    debug!(
                        view_id = %self.view.view_id(),
                        state = %state,
                        trigger = ?trigger,
                        "Trigger ignored"
                    );
                }
            }
        }
        Ok(())
    }

    /// Re-run the effect of the current state after a failure
    pub async fn retry(&mut self) -> Result<(), LifecycleError> {
        let state = self.view.state();
        match state {
            DiagramState::Uninitialized => self.start().await,
            DiagramState::ReadyToView => Ok(()),
            _ => {
                info!(view_id = %self.view.view_id(), state = %state, "Retrying diagram state");
                self.queue.clear();
                if let Some(trigger) = self.run_logged(state).await? {
                    self.handle(trigger).await?;
                }
                Ok(())
            }
        }
    }

    async fn advance(&mut self, next: DiagramState) -> Result<(), LifecycleError> {
        info!(
            view_id = %self.view.view_id(),
            name = %self.view.name(),
            from = %self.view.state(),
            to = %next,
            "Diagram state transition"
        );

        if next.is_ready() {
            // Listener goes in before the ready signal is observable
            self.ctx.sync.attach(&self.view);
            self.view.set_state(next);
            info!(view_id = %self.view.view_id(), name = %self.view.name(), "Diagram ready");
            return Ok(());
        }

        self.view.set_state(next);
        if let Some(trigger) = self.run_logged(next).await? {
            self.queue.push_front(trigger);
        }
        Ok(())
    }

    async fn run_logged(&mut self, state: DiagramState) -> Result<Option<Trigger>, LifecycleError> {
        self.run_effect(state).await.map_err(|e| {
            error!(
                view_id = %self.view.view_id(),
                state = %state,
                error = %e,
                "Diagram state failed, staying put"
            );
            self.queue.clear();
            e
        })
    }

    async fn run_effect(&mut self, state: DiagramState) -> Result<Option<Trigger>, LifecycleError> {
        let view_id = self.view.view_id().to_string();

        match state {
            DiagramState::Uninitialized | DiagramState::ReadyToView => Ok(None),

            DiagramState::CreatePageContainer => {
                let position = self.ctx.registry.insert_tab(self.view.name(), &view_id);
                self.ctx
                    .surfaces
                    .create_container(&view_id, self.view.name(), position);
                Ok(Some(Trigger::PageContainerCreated))
            }

            DiagramState::CreateDiagram => {
                if self.view.surface().is_none() {
                    let surface = self.ctx.surfaces.create_surface(&view_id);
                    self.view.attach_surface(surface);
                }
                Ok(Some(Trigger::DiagramCreated))
            }

            DiagramState::ConnectEventHandlers => {
                self.view.connect_handlers();
                Ok(Some(Trigger::HandlersConnected))
            }

            DiagramState::RestoreNodes => {
                let entries = self.fetch_layout(&view_id).await?;
                if self.view.is_removed() {
                    return Ok(None);
                }

                let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
                let nodes = self.ctx.model.get_nodes(&ids);
                if nodes.len() < entries.len() {
                    debug!(
                        view_id = %view_id,
                        stale = entries.len() - nodes.len(),
                        "Skipping layout entries for nodes no longer in the model"
                    );
                }
                self.view.add_nodes(&nodes, ChangeOrigin::Restore);

                let resolved = entries
                    .into_iter()
                    .filter(|e| self.ctx.model.contains_node(&e.id))
                    .collect();
                self.carried = Some(resolved);
                Ok(Some(Trigger::NodesRestored))
            }

            DiagramState::RestoreLayout => {
                let entries = match self.carried.take() {
                    Some(entries) => entries,
                    None => self.fetch_layout(&view_id).await?,
                };
                if self.view.is_removed() {
                    return Ok(None);
                }

                for entry in &entries {
                    if !self.view.move_node(&entry.id, entry.x, entry.y) {
                        debug!(view_id = %view_id, node_id = %entry.id, "Node not in view, skipping position");
                    }
                }
                Ok(Some(Trigger::LayoutRestored))
            }

            DiagramState::RestoreEdges => {
                let added = self.ctx.sync.restore_edges(&self.view);
                debug!(view_id = %view_id, edges = added, "Edges restored");
                Ok(Some(Trigger::EdgesRestored))
            }

            DiagramState::ScaleFirstView => {
                if self.view.first_fit_done() {
                    return Ok(Some(Trigger::DrawComplete));
                }
                let surface = self.view.surface().ok_or(LifecycleError::SurfaceMissing)?;
                surface
                    .after_drawing()
                    .await
                    .map_err(|_| LifecycleError::DrawSignalDropped)?;
                if self.view.is_removed() {
                    return Ok(None);
                }
                if self.view.take_first_fit() {
                    self.view.fit();
                }
                Ok(Some(Trigger::DrawComplete))
            }
        }
    }

    async fn fetch_layout(&self, view_id: &str) -> Result<Vec<LayoutEntry>, LifecycleError> {
        self.ctx
            .layout_store
            .retrieve_layout(view_id)
            .await
            .map_err(|e| LifecycleError::LayoutFetch(format!("{:#}", e)))
    }
}
