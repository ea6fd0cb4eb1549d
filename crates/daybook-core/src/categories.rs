//! Ordered category labels and their lifecycle.
//!
//! Tasks only hold the category name, so every rename or removal here
//! rewrites the affected tasks in the [`TaskStore`] as part of the same call.

use tracing::{debug, info, warn};

use crate::storage::{self, CATEGORIES_KEY, LEGACY_CUSTOM_CATEGORIES_KEY, SharedStorage};
use crate::store::TaskStore;

pub const BUILTIN_CATEGORIES: [&str; 5] = ["personal", "work", "shopping", "health", "education"];

/// Fallback when the registry would otherwise be empty.
pub const DEFAULT_CATEGORY: &str = "personal";

pub struct CategoryRegistry {
    names: Vec<String>,
    storage: SharedStorage,
}

impl std::fmt::Debug for CategoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategoryRegistry")
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

impl CategoryRegistry {
    /// Loads the registry, migrating the custom-only list when the full
    /// list was never written.
    #[tracing::instrument(skip(storage))]
    pub fn load(storage: SharedStorage) -> Self {
        let names = match storage::load::<Vec<String>>(storage.as_ref(), CATEGORIES_KEY) {
            Some(stored) => stored,
            None => {
                let custom: Vec<String> =
                    storage::load_or(storage.as_ref(), LEGACY_CUSTOM_CATEGORIES_KEY, Vec::new());
                if !custom.is_empty() {
                    info!(count = custom.len(), "migrating legacy custom categories");
                }
                BUILTIN_CATEGORIES
                    .iter()
                    .map(|name| (*name).to_string())
                    .chain(custom)
                    .collect()
            }
        };

        let mut registry = Self {
            names: Vec::new(),
            storage,
        };
        for name in names {
            let name = name.trim();
            if !name.is_empty() && !registry.contains(name) {
                registry.names.push(name.to_string());
            }
        }
        if registry.names.is_empty() {
            registry.names.push(DEFAULT_CATEGORY.to_string());
        }

        debug!(names = ?registry.names, "loaded categories");
        registry
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Where orphaned tasks go: the first entry.
    pub fn fallback(&self) -> &str {
        self.names
            .first()
            .map_or(DEFAULT_CATEGORY, String::as_str)
    }

    /// Registers categories used by tasks but missing from the list.
    pub fn adopt_orphans(&mut self, store: &TaskStore) -> usize {
        let mut adopted = 0;
        for name in store.referenced_categories() {
            if !self.contains(&name) {
                warn!(category = %name, "task references unknown category; registering it");
                self.names.push(name);
                adopted += 1;
            }
        }
        if adopted > 0 {
            self.persist();
        }
        adopted
    }

    /// Appends `name`. Blank and duplicate names are ignored.
    #[tracing::instrument(skip(self))]
    pub fn add(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.contains(name) {
            debug!(name, "category add ignored");
            return false;
        }
        self.names.push(name.to_string());
        self.persist();
        info!(name, "category added");
        true
    }

    /// Renames `old` to `new` in place and moves its tasks along with it.
    #[tracing::instrument(skip(self, store))]
    pub fn rename(&mut self, old: &str, new: &str, store: &mut TaskStore) -> bool {
        let new = new.trim();
        if new.is_empty() || self.contains(new) {
            debug!(old, new, "category rename ignored");
            return false;
        }
        let Some(slot) = self.names.iter_mut().find(|n| n.as_str() == old) else {
            debug!(old, "category rename ignored; unknown category");
            return false;
        };

        *slot = new.to_string();
        let moved = store.reassign_category(old, new);
        self.persist();
        info!(old, new, moved, "category renamed");
        true
    }

    /// Removes `name` and reassigns its tasks to the fallback category.
    #[tracing::instrument(skip(self, store))]
    pub fn remove(&mut self, name: &str, store: &mut TaskStore) -> bool {
        let Some(index) = self.names.iter().position(|n| n == name) else {
            debug!(name, "category remove ignored; unknown category");
            return false;
        };

        self.names.remove(index);
        if self.names.is_empty() {
            self.names.push(DEFAULT_CATEGORY.to_string());
        }

        let fallback = self.fallback().to_string();
        let moved = if fallback == name {
            0
        } else {
            store.reassign_category(name, &fallback)
        };
        self.persist();
        info!(name, fallback = %fallback, moved, "category removed");
        true
    }

    fn persist(&self) {
        storage::save_or_log(self.storage.as_ref(), CATEGORIES_KEY, &self.names);
    }
}
