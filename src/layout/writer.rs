use super::{LayoutEntry, LayoutStore};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Queued layout write
#[derive(Debug)]
pub enum LayoutCommand {
    Save {
        view_id: String,
        entries: Vec<LayoutEntry>,
    },
    Delete {
        view_id: String,
        node_ids: Vec<String>,
    },
    /// Drop the whole view
    DeleteView { view_id: String },
    /// Acknowledged once every earlier command has been applied
    Flush(oneshot::Sender<()>),
}

/// Background task applying layout writes in submission order.
///
/// Synchronous code (node-set listeners, drag handlers) cannot await the
/// store, so writes are queued here instead. Failures are logged and the
/// write is dropped.
pub struct LayoutWriter {
    store: Arc<dyn LayoutStore>,
    rx: mpsc::UnboundedReceiver<LayoutCommand>,
}

impl LayoutWriter {
    /// Spawn the writer on the current tokio runtime
    pub fn spawn(store: Arc<dyn LayoutStore>) -> LayoutHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = Self { store, rx };
        tokio::spawn(writer.run());
        LayoutHandle { tx }
    }

    async fn run(mut self) {
        info!("Layout writer started");

        while let Some(command) = self.rx.recv().await {
            match command {
                LayoutCommand::Save { view_id, entries } => {
                    if let Err(e) = self.store.save_layout(&view_id, &entries).await {
                        error!(view_id = %view_id, error = %e, "Failed to save layout");
                    } else {
                        debug!(view_id = %view_id, count = entries.len(), "Layout saved");
                    }
                }
                LayoutCommand::Delete { view_id, node_ids } => {
                    if let Err(e) = self.store.delete_layout(&view_id, &node_ids).await {
                        error!(view_id = %view_id, error = %e, "Failed to delete layout");
                    } else {
                        debug!(view_id = %view_id, count = node_ids.len(), "Layout deleted");
                    }
                }
                LayoutCommand::DeleteView { view_id } => {
                    if let Err(e) = self.store.delete_view_layout(&view_id).await {
                        error!(view_id = %view_id, error = %e, "Failed to delete view layout");
                    } else {
                        debug!(view_id = %view_id, "View layout deleted");
                    }
                }
                LayoutCommand::Flush(ack) => {
                    let _ = ack.send(());
                }
            }
        }

        info!("Layout writer stopped");
    }
}

/// Cheap cloneable handle for queueing layout writes
#[derive(Clone)]
pub struct LayoutHandle {
    tx: mpsc::UnboundedSender<LayoutCommand>,
}

impl LayoutHandle {
    pub fn save(&self, view_id: &str, entries: Vec<LayoutEntry>) {
        if entries.is_empty() {
            return;
        }
        self.send(LayoutCommand::Save {
            view_id: view_id.to_string(),
            entries,
        });
    }

    pub fn delete(&self, view_id: &str, node_ids: Vec<String>) {
        if node_ids.is_empty() {
            return;
        }
        self.send(LayoutCommand::Delete {
            view_id: view_id.to_string(),
            node_ids,
        });
    }

    pub fn delete_view(&self, view_id: &str) {
        self.send(LayoutCommand::DeleteView {
            view_id: view_id.to_string(),
        });
    }

    /// Wait until every write queued before this call has been applied
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(LayoutCommand::Flush(ack_tx));
        let _ = ack_rx.await;
    }

    fn send(&self, command: LayoutCommand) {
        if self.tx.send(command).is_err() {
            warn!("Layout writer stopped, dropping layout write");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::SqliteLayoutStore;

    #[tokio::test]
    async fn test_writes_apply_in_order() {
        let store = Arc::new(SqliteLayoutStore::new(":memory:").unwrap());
        let handle = LayoutWriter::spawn(store.clone());

        handle.save("v", vec![LayoutEntry::new("a", 1.0, 1.0)]);
        handle.save("v", vec![LayoutEntry::new("b", 2.0, 2.0)]);
        handle.delete("v", vec!["a".to_string()]);
        handle.save("v", vec![LayoutEntry::new("b", 5.0, 6.0)]);
        handle.flush().await;

        let entries = store.retrieve_layout("v").await.unwrap();
        assert_eq!(entries, vec![LayoutEntry::new("b", 5.0, 6.0)]);
    }

    #[tokio::test]
    async fn test_delete_view_after_queued_saves() {
        let store = Arc::new(SqliteLayoutStore::new(":memory:").unwrap());
        let handle = LayoutWriter::spawn(store.clone());

        handle.save("v", vec![LayoutEntry::new("a", 1.0, 1.0)]);
        handle.delete_view("v");
        handle.save("w", vec![LayoutEntry::new("a", 3.0, 3.0)]);
        handle.flush().await;

        assert!(store.retrieve_layout("v").await.unwrap().is_empty());
        assert_eq!(store.retrieve_layout("w").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_writes_are_skipped() {
        let store = Arc::new(SqliteLayoutStore::new(":memory:").unwrap());
        let handle = LayoutWriter::spawn(store.clone());

        handle.save("v", Vec::new());
        handle.delete("v", Vec::new());
        handle.flush().await;

        assert!(store.retrieve_layout("v").await.unwrap().is_empty());
    }
}
