//! Relationship column configuration and loading
//!
//! Relationships name their target models by string. The registry resolves
//! those names into [`ModelId`] handles once every model is registered, so
//! models can reference each other (and themselves) in any order.

mod belongs_to_id;
mod category_tree;
mod category_tree_children;
mod has_many;
mod many_to_many_ids;
mod many_to_many_ids_with_data;

use std::collections::HashMap;

pub use belongs_to_id::BelongsToId;
pub use category_tree::{CategoryTree, TreeColumns};
pub use category_tree_children::CategoryTreeChildren;
pub use has_many::HasMany;
pub use many_to_many_ids::ManyToManyIds;
pub use many_to_many_ids_with_data::ManyToManyIdsWithData;

use crate::backend::Capabilities;
use crate::error::{OrmError, Result};
use crate::registry::ModelId;

/// A reference to another model by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub name: String,
    id: Option<ModelId>,
}

impl ModelRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
        }
    }

    /// The resolved handle; errors before the registry has been built
    pub fn id(&self) -> Result<ModelId> {
        self.id.ok_or_else(|| {
            OrmError::configuration(format!(
                "Model reference '{}' was used before the registry resolved it",
                self.name
            ))
        })
    }

    pub(crate) fn resolve(&mut self, ids: &HashMap<String, ModelId>, referenced_from: &str) -> Result<()> {
        let id = ids.get(&self.name).copied().ok_or_else(|| {
            OrmError::configuration(format!(
                "Column '{}' references model '{}', which was not registered",
                referenced_from, self.name
            ))
        })?;
        self.id = Some(id);
        Ok(())
    }
}

/// How tree relatives and many-to-many records are fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadStrategy {
    /// Join through the pivot/tree table in one query
    Join,
    /// Fetch the ids first, then load with one `IN` query
    WhereIn,
    /// Fetch the ids first, then load each record separately
    Individual,
    /// The best strategy the backend supports
    #[default]
    Auto,
}

impl LoadStrategy {
    /// Pick a concrete strategy, downgrading what the backend cannot do
    pub fn resolve(self, capabilities: Capabilities) -> LoadStrategy {
        let preferred = match self {
            LoadStrategy::Auto => LoadStrategy::Join,
            other => other,
        };
        match preferred {
            LoadStrategy::Join if capabilities.supports_joins => LoadStrategy::Join,
            LoadStrategy::Join | LoadStrategy::WhereIn if capabilities.supports_where_in => LoadStrategy::WhereIn,
            _ => LoadStrategy::Individual,
        }
    }
}

/// Which relatives a tree-children column returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeScope {
    /// Direct children only
    Children,
    /// Every record below this one
    Descendants,
    /// Every record above this one, root first
    Ancestors,
}

impl TreeScope {
    pub(crate) fn include_all(self) -> bool {
        !matches!(self, TreeScope::Children)
    }

    pub(crate) fn find_parents(self) -> bool {
        matches!(self, TreeScope::Ancestors)
    }
}
