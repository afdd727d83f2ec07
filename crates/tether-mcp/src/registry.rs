//! Registry of tools, resources and prompts

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::item::{Arguments, Category, Item};

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Duplicate {category} name: {name}")]
    DuplicateName { category: Category, name: String },

    #[error("{} not found: {name}", .category.title())]
    NotFound { category: Category, name: String },
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Items grouped by category, each group kept in registration order
#[derive(Default)]
pub struct Registry {
    tools: RwLock<Vec<Arc<Item>>>,
    resources: RwLock<Vec<Arc<Item>>>,
    prompts: RwLock<Vec<Arc<Item>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, category: Category) -> &RwLock<Vec<Arc<Item>>> {
        match category {
            Category::Tool => &self.tools,
            Category::Resource => &self.resources,
            Category::Prompt => &self.prompts,
        }
    }

    /// Add an item; names are unique within a category
    pub fn register(&self, item: Item) -> RegistryResult<Arc<Item>> {
        let category = item.category();
        let mut items = self.collection(category).write();

        if items.iter().any(|existing| existing.name() == item.name()) {
            return Err(RegistryError::DuplicateName {
                category,
                name: item.name().to_string(),
            });
        }

        let item = Arc::new(item);
        items.push(Arc::clone(&item));
        info!(
            category = %category,
            name = item.name(),
            main_thread_only = item.main_thread_only(),
            "Registered item"
        );
        Ok(item)
    }

    /// Register several items, stopping at the first failure
    pub fn register_all(&self, items: impl IntoIterator<Item = Item>) -> RegistryResult<()> {
        for item in items {
            self.register(item)?;
        }
        Ok(())
    }

    pub fn unregister(&self, category: Category, name: &str) -> RegistryResult<Arc<Item>> {
        let mut items = self.collection(category).write();
        let position = items
            .iter()
            .position(|item| item.name() == name)
            .ok_or_else(|| RegistryError::NotFound {
                category,
                name: name.to_string(),
            })?;

        let removed = items.remove(position);
        debug!(category = %category, name, "Unregistered item");
        Ok(removed)
    }

    pub fn get(&self, category: Category, name: &str) -> RegistryResult<Arc<Item>> {
        self.collection(category)
            .read()
            .iter()
            .find(|item| item.name() == name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                category,
                name: name.to_string(),
            })
    }

    pub fn contains(&self, category: Category, name: &str) -> bool {
        self.collection(category)
            .read()
            .iter()
            .any(|item| item.name() == name)
    }

    /// Snapshot of one category in registration order
    pub fn list(&self, category: Category) -> Vec<Arc<Item>> {
        self.collection(category).read().clone()
    }

    pub fn count(&self, category: Category) -> usize {
        self.collection(category).read().len()
    }

    pub fn len(&self) -> usize {
        Category::ALL.iter().map(|c| self.count(*c)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        for category in Category::ALL {
            self.collection(category).write().clear();
        }
    }

    /// Resource registered under exactly this URI
    pub fn find_resource_by_uri(&self, uri: &str) -> Option<Arc<Item>> {
        self.resources
            .read()
            .iter()
            .find(|item| item.uri() == Some(uri))
            .cloned()
    }

    /// First template resource matching `uri`, with its captured path variables
    pub fn find_resource_by_template(&self, uri: &str) -> Option<(Arc<Item>, Arguments)> {
        self.resources.read().iter().find_map(|item| {
            let captured = item.template()?.matches(uri)?;
            Some((Arc::clone(item), captured))
        })
    }

    /// Resolve a URI, preferring an exact registration over any template
    pub fn resolve_resource(&self, uri: &str) -> Option<(Arc<Item>, Arguments)> {
        self.find_resource_by_uri(uri)
            .map(|item| (item, Arguments::new()))
            .or_else(|| self.find_resource_by_template(uri))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("tools", &self.count(Category::Tool))
            .field("resources", &self.count(Category::Resource))
            .field("prompts", &self.count(Category::Prompt))
            .finish()
    }
}
