// Alert propagation: health snapshots in, alerting/degraded node state,
// edge recoloring and view alert indicators out

mod event;
pub mod pipeline;
mod propagate;
mod source;

pub use event::{dedup, AlertDetail, AlertEvent, AlertKey};
pub use propagate::{AlertPropagator, PropagationReport};
pub use source::{
    run_alert_poller, AlarmIndicators, AlarmSubscription, AlertSnapshots, FileHealthSource,
    HealthEventSource,
};
