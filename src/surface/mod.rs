// Rendering surface boundary: the core draws only through these traits

mod headless;

pub use headless::{HeadlessFactory, HeadlessSurface};

use crate::layout::LayoutEntry;
use crate::model::{Edge, Node};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Rendering surface owned by one diagram view
pub trait RenderSurface: Send + Sync {
    /// Add or redraw nodes
    fn upsert_nodes(&self, nodes: &[Node]);

    fn remove_nodes(&self, ids: &[String]);

    /// Add or redraw edges
    fn upsert_edges(&self, edges: &[Edge]);

    fn remove_edges(&self, ids: &[String]);

    /// Move a node to canvas coordinates
    fn move_node(&self, id: &str, x: f64, y: f64);

    /// Current canvas coordinates of the given nodes (unknown ids are omitted)
    fn positions(&self, ids: &[String]) -> Vec<LayoutEntry>;

    /// Width and height of a drawn node
    fn node_size(&self) -> (f64, f64);

    /// Fit the viewport to the given nodes, or to everything when `None`
    fn fit(&self, node_ids: Option<&[String]>);

    /// Resolves once, after the next completed draw pass
    fn after_drawing(&self) -> oneshot::Receiver<()>;

    /// Switch the view's tab icon between normal and warning
    fn set_alert_indicator(&self, alerting: bool);
}

/// Allocates tab containers and rendering surfaces for views
pub trait SurfaceFactory: Send + Sync {
    /// Create the tab/container placeholder at `position` in display order
    fn create_container(&self, view_id: &str, name: &str, position: usize);

    fn create_surface(&self, view_id: &str) -> Arc<dyn RenderSurface>;

    fn remove_container(&self, view_id: &str);
}

/// Pointer gesture reported by the surface
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    /// Nodes under the pointer
    #[serde(default)]
    pub nodes: Vec<String>,
    /// Edges under the pointer
    #[serde(default)]
    pub edges: Vec<String>,
    /// Pointer position in canvas coordinates
    pub x: f64,
    pub y: f64,
}

/// User interaction forwarded by the rendering surface
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurfaceEvent {
    Click(PointerEvent),
    DoubleClick(PointerEvent),
    DragEnd { nodes: Vec<String> },
}
