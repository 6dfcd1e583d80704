//! Layout and settings persistence using SQLite.
//!
//! Layout rows are keyed by (view, node) and are never cleaned up when a
//! node disappears from the graph model; stale rows are filtered on read
//! by the caller.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::sync::{Mutex, MutexGuard};

use super::{LayoutEntry, LayoutStore, SettingsStore};

/// Persists layout entries and settings in SQLite.
pub struct SqliteLayoutStore {
    conn: Mutex<Connection>,
}

impl SqliteLayoutStore {
    /// Opens (or creates) the SQLite database and ensures the tables exist.
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open layout DB at {}", db_path))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS layout (
                view_id TEXT NOT NULL,
                node_id TEXT NOT NULL,
                x       REAL NOT NULL,
                y       REAL NOT NULL,
                PRIMARY KEY (view_id, node_id)
            );
            CREATE TABLE IF NOT EXISTS settings (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .context("Failed to create layout tables")?;
        Ok(())
    }
}

#[async_trait]
impl LayoutStore for SqliteLayoutStore {
    async fn retrieve_layout(&self, view_id: &str) -> Result<Vec<LayoutEntry>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT node_id, x, y FROM layout WHERE view_id = ?1 ORDER BY node_id ASC")
            .context("Failed to prepare retrieve_layout query")?;
        let rows = stmt
            .query_map(params![view_id], |row| {
                Ok(LayoutEntry {
                    id: row.get(0)?,
                    x: row.get(1)?,
                    y: row.get(2)?,
                })
            })
            .context("Failed to query layout")?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.context("Failed to read layout row")?);
        }
        Ok(entries)
    }

    async fn save_layout(&self, view_id: &str, entries: &[LayoutEntry]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction().context("Failed to begin layout transaction")?;
        for entry in entries {
            tx.execute(
                "INSERT INTO layout (view_id, node_id, x, y) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(view_id, node_id) DO UPDATE SET x = excluded.x, y = excluded.y",
                params![view_id, entry.id, entry.x, entry.y],
            )
            .with_context(|| format!("Failed to save layout for node {}", entry.id))?;
        }
        tx.commit().context("Failed to commit layout")?;
        Ok(())
    }

    async fn delete_layout(&self, view_id: &str, node_ids: &[String]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction().context("Failed to begin layout transaction")?;
        for node_id in node_ids {
            tx.execute(
                "DELETE FROM layout WHERE view_id = ?1 AND node_id = ?2",
                params![view_id, node_id],
            )
            .context("Failed to delete layout entry")?;
        }
        tx.commit().context("Failed to commit layout deletion")?;
        Ok(())
    }

    async fn delete_view_layout(&self, view_id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM layout WHERE view_id = ?1", params![view_id])
            .context("Failed to delete view layout")?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for SqliteLayoutStore {
    async fn get_setting(&self, key: &str) -> Result<Option<Value>> {
        let conn = self.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query setting")?;

        match raw {
            Some(text) => {
                let value = serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse setting {}", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn put_setting(&self, key: &str, value: Value) -> Result<()> {
        let text = serde_json::to_string(&value).context("Failed to serialize setting")?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, text],
        )
        .context("Failed to store setting")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn in_memory_store() -> SqliteLayoutStore {
        SqliteLayoutStore::new(":memory:").expect("in-memory store failed")
    }

    #[tokio::test]
    async fn test_save_and_retrieve() {
        let store = in_memory_store();
        store
            .save_layout(
                "view-1",
                &[LayoutEntry::new("b", 10.0, 20.0), LayoutEntry::new("a", -5.0, 3.5)],
            )
            .await
            .unwrap();

        let entries = store.retrieve_layout("view-1").await.unwrap();
        assert_eq!(
            entries,
            vec![LayoutEntry::new("a", -5.0, 3.5), LayoutEntry::new("b", 10.0, 20.0)]
        );
        assert!(store.retrieve_layout("view-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_overwrites_position() {
        let store = in_memory_store();
        store
            .save_layout("v", &[LayoutEntry::new("a", 1.0, 1.0)])
            .await
            .unwrap();
        store
            .save_layout("v", &[LayoutEntry::new("a", 2.0, 3.0)])
            .await
            .unwrap();

        let entries = store.retrieve_layout("v").await.unwrap();
        assert_eq!(entries, vec![LayoutEntry::new("a", 2.0, 3.0)]);
    }

    #[tokio::test]
    async fn test_delete_only_named_nodes() {
        let store = in_memory_store();
        store
            .save_layout(
                "v",
                &[LayoutEntry::new("a", 0.0, 0.0), LayoutEntry::new("b", 0.0, 0.0)],
            )
            .await
            .unwrap();
        store
            .save_layout("other", &[LayoutEntry::new("a", 0.0, 0.0)])
            .await
            .unwrap();

        store
            .delete_layout("v", &["a".to_string(), "missing".to_string()])
            .await
            .unwrap();

        let ids: Vec<String> = store
            .retrieve_layout("v")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["b".to_string()]);
        assert_eq!(store.retrieve_layout("other").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_view_layout_clears_every_row() {
        let store = in_memory_store();
        store
            .save_layout(
                "v",
                &[LayoutEntry::new("a", 0.0, 0.0), LayoutEntry::new("gone", 1.0, 1.0)],
            )
            .await
            .unwrap();
        store
            .save_layout("other", &[LayoutEntry::new("a", 0.0, 0.0)])
            .await
            .unwrap();

        store.delete_view_layout("v").await.unwrap();
        store.delete_view_layout("never-saved").await.unwrap();

        assert!(store.retrieve_layout("v").await.unwrap().is_empty());
        assert_eq!(store.retrieve_layout("other").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let store = in_memory_store();
        assert!(store.get_setting("diagram_lock_v").await.unwrap().is_none());

        store
            .put_setting("diagram_lock_v", json!({"name": "Main", "locked": true}))
            .await
            .unwrap();
        let value = store.get_setting("diagram_lock_v").await.unwrap().unwrap();
        assert_eq!(value["locked"], json!(true));
    }

    #[tokio::test]
    async fn test_layout_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("layout.db");
        let path = path.to_str().unwrap();

        {
            let store = SqliteLayoutStore::new(path).unwrap();
            store
                .save_layout("v", &[LayoutEntry::new("a", 4.0, 2.0)])
                .await
                .unwrap();
        }

        let store = SqliteLayoutStore::new(path).unwrap();
        let entries = store.retrieve_layout("v").await.unwrap();
        assert_eq!(entries, vec![LayoutEntry::new("a", 4.0, 2.0)]);
    }
}
