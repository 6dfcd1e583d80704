// Graph model, nodes and edges
pub mod model;

// Layout persistence and background writer
pub mod layout;

// Rendering surface boundary
pub mod surface;

// Diagram views, callbacks and lifecycle
pub mod diagram;

// View/model synchronization
pub mod sync;

// Health events and alert propagation
pub mod alert;

// Configuration
pub mod config;

// Facade tying the engines together
pub mod dashboard;

pub use dashboard::{Dashboard, DashboardError};
