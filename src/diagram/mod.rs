// Diagram views: per-view node/edge subsets, their callbacks, the
// lifecycle that restores them, and the registry of open views

pub mod arrange;
mod callbacks;
mod lifecycle;
mod registry;
mod view;

pub use callbacks::{Callback, CallbackQueue};
pub use lifecycle::{
    transition, DiagramLifecycle, DiagramState, LifecycleContext, LifecycleError, Step, Trigger,
};
pub use registry::DiagramRegistry;
pub use view::{ChangeOrigin, DiagramClick, DiagramView, NodeSetEvent};
