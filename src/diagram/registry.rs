use super::view::DiagramView;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// All open diagram views, plus their tab display order
pub struct DiagramRegistry {
    views: DashMap<String, Arc<DiagramView>>,
    /// (name, view_id), kept sorted by name
    tabs: Mutex<Vec<(String, String)>>,
}

impl DiagramRegistry {
    pub fn new() -> Self {
        Self {
            views: DashMap::new(),
            tabs: Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, view: Arc<DiagramView>) {
        self.views.insert(view.view_id().to_string(), view);
    }

    /// Unregister a view and its tab. The view is marked removed so that
    /// late asynchronous results referencing it are dropped.
    pub fn remove(&self, view_id: &str) -> Option<Arc<DiagramView>> {
        let (_, view) = self.views.remove(view_id)?;
        view.mark_removed();
        self.tabs().retain(|(_, id)| id != view_id);
        Some(view)
    }

    pub fn get(&self, view_id: &str) -> Option<Arc<DiagramView>> {
        self.views.get(view_id).map(|v| Arc::clone(v.value()))
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<DiagramView>> {
        self.views
            .iter()
            .find(|v| v.name() == name)
            .map(|v| Arc::clone(v.value()))
    }

    /// Every view, in tab order; views without a tab yet come last
    pub fn all(&self) -> Vec<Arc<DiagramView>> {
        let ordered: Vec<String> = self.tabs().iter().map(|(_, id)| id.clone()).collect();
        let mut views: Vec<Arc<DiagramView>> =
            ordered.iter().filter_map(|id| self.get(id)).collect();

        let mut untabbed: Vec<Arc<DiagramView>> = self
            .views
            .iter()
            .filter(|v| !ordered.contains(v.key()))
            .map(|v| Arc::clone(v.value()))
            .collect();
        untabbed.sort_by(|a, b| a.name().cmp(b.name()));
        views.extend(untabbed);
        views
    }

    /// Views containing every one of `ids`
    pub fn have_all<S: AsRef<str>>(&self, ids: &[S]) -> Vec<Arc<DiagramView>> {
        self.all().into_iter().filter(|v| v.has_all(ids)).collect()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Insert a tab in name order. Returns its display position.
    pub fn insert_tab(&self, name: &str, view_id: &str) -> usize {
        let mut tabs = self.tabs();
        if let Some(index) = tabs.iter().position(|(_, id)| id == view_id) {
            return index;
        }
        let index = tabs
            .iter()
            .position(|(existing, _)| existing.as_str() > name)
            .unwrap_or(tabs.len());
        tabs.insert(index, (name.to_string(), view_id.to_string()));
        index
    }

    pub fn tab_names(&self) -> Vec<String> {
        self.tabs().iter().map(|(name, _)| name.clone()).collect()
    }

    fn tabs(&self) -> MutexGuard<'_, Vec<(String, String)>> {
        self.tabs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for DiagramRegistry {
    fn default() -> Self {
        Self::new()
    }
}
