// Per-pipeline liveness of multi-pipeline resources

use crate::model::Node;
use serde_json::Value;
use tracing::debug;

/// Highest slot count a resource can grow to from alert indices alone
pub const MAX_PIPELINES: usize = 8;

/// Number of pipelines a resource runs.
///
/// The channel class wins, then an explicit running-pipeline count,
/// then one.
pub fn slot_count(data: &Value) -> usize {
    match data.get("ChannelClass").and_then(Value::as_str) {
        Some("SINGLE_PIPELINE") => return 1,
        Some("STANDARD") => return 2,
        _ => {}
    }

    data.get("PipelinesRunningCount")
        .and_then(|v| match v {
            Value::Number(n) => n.as_u64().map(|n| n as usize),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .filter(|count| *count > 0)
        .unwrap_or(1)
}

/// Record one pipeline as running or down and recompute `degraded`.
///
/// Slots are allocated on first use, all up. An index past the end grows
/// the slots, new ones up, up to `MAX_PIPELINES` (or the resource's own
/// slot count if larger). Indices beyond that are skipped and leave the
/// node unchanged.
pub fn mark_pipeline(node: &mut Node, pipeline: u32, running: bool) -> bool {
    let count = slot_count(&node.data);
    let index = pipeline as usize;
    if index >= count.max(MAX_PIPELINES) {
        debug!(resource_id = %node.id, pipeline, "Pipeline index out of range, skipping");
        return node.degraded;
    }

    let slots = node.running_pipelines.get_or_insert_with(|| vec![1; count]);
    if index >= slots.len() {
        slots.resize(index + 1, 1);
    }
    slots[index] = u8::from(running);

    let up: usize = slots.iter().map(|s| usize::from(*s)).sum();
    node.degraded = up > 0 && up < slots.len();
    node.degraded
}

/// True for resources whose edges carry a pipeline discriminator
pub fn is_pipeline_resource(id: &str) -> bool {
    id.contains(":medialive:") && id.contains(":channel:")
}
