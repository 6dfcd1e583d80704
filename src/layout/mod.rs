// Per-view node layout persistence

mod store;
mod writer;

pub use store::SqliteLayoutStore;
pub use writer::{LayoutCommand, LayoutHandle, LayoutWriter};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Persisted position of one node within one view
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayoutEntry {
    /// Node id
    pub id: String,
    pub x: f64,
    pub y: f64,
}

impl LayoutEntry {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self { id: id.into(), x, y }
    }
}

/// Storage for per-view layout entries.
///
/// Entries may reference nodes that no longer exist in the graph model;
/// readers must tolerate them.
#[async_trait]
pub trait LayoutStore: Send + Sync {
    /// All entries stored for a view
    async fn retrieve_layout(&self, view_id: &str) -> Result<Vec<LayoutEntry>>;

    /// Insert or replace entries for a view
    async fn save_layout(&self, view_id: &str, entries: &[LayoutEntry]) -> Result<()>;

    /// Delete entries for the given nodes of a view
    async fn delete_layout(&self, view_id: &str, node_ids: &[String]) -> Result<()>;

    /// Delete every entry of a view, stale ones included
    async fn delete_view_layout(&self, view_id: &str) -> Result<()>;
}

/// Key/value settings storage (view lock flags)
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_setting(&self, key: &str) -> Result<Option<Value>>;

    async fn put_setting(&self, key: &str, value: Value) -> Result<()>;
}
