use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::column::Column;
use crate::config::RegistryConfig;
use crate::error::{OrmError, Result};
use crate::query::{Condition, JoinType};
use crate::registry::{ModelId, Registry};
use crate::relationship::{BelongsToId, LoadStrategy, ModelRef};
use crate::types::{Record, condition_string, is_truthy, same_id};

/// Column names in the tree model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeColumns {
    pub parent_id: String,
    pub child_id: String,
    pub is_parent: String,
    pub level: String,
}

impl Default for TreeColumns {
    fn default() -> Self {
        Self {
            parent_id: "parent_id".to_string(),
            child_id: "child_id".to_string(),
            is_parent: "is_parent".to_string(),
            level: "level".to_string(),
        }
    }
}

/// A parent pointer within the same model, mirrored into a flattened tree model
///
/// Every save that changes the parent rewrites the record's rows in the tree
/// model: one row per ancestor, with the root at level 0 and `is_parent` set
/// on the direct parent only.
#[derive(Debug, Clone)]
pub struct CategoryTree {
    /// The parent relationship; its model is the owning model
    pub parent: BelongsToId,
    pub tree: ModelRef,
    pub tree_columns: TreeColumns,
    /// Filled from the registry config when left unset
    pub max_iterations: Option<usize>,
    pub load_relatives_strategy: LoadStrategy,
}

impl CategoryTree {
    pub fn new(tree_model: impl Into<String>) -> Self {
        Self {
            parent: BelongsToId::new(""),
            tree: ModelRef::new(tree_model),
            tree_columns: TreeColumns::default(),
            max_iterations: None,
            load_relatives_strategy: LoadStrategy::Auto,
        }
    }

    pub fn tree_columns(mut self, columns: TreeColumns) -> Self {
        self.tree_columns = columns;
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn load_relatives_strategy(mut self, strategy: LoadStrategy) -> Self {
        self.load_relatives_strategy = strategy;
        self
    }

    pub fn readable_parent_columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.parent = self.parent.readable_parent_columns(columns);
        self
    }

    pub fn join_type(mut self, join_type: JoinType) -> Self {
        self.parent = self.parent.join_type(join_type);
        self
    }

    /// Restrict valid parents with a condition string
    pub fn filter(mut self, condition: &str) -> Result<Self> {
        self.parent = self.parent.filter(condition)?;
        Ok(self)
    }

    pub(crate) fn resolve(
        &mut self,
        own_model: &str,
        ids: &HashMap<String, ModelId>,
        referenced_from: &str,
    ) -> Result<()> {
        if self.parent.parent.name.is_empty() {
            self.parent.parent = ModelRef::new(own_model);
        }
        self.parent.resolve(ids, referenced_from)?;
        self.tree.resolve(ids, referenced_from)
    }

    pub(crate) fn finalize(&mut self, config: &RegistryConfig) {
        self.parent.finalize(config);
        self.max_iterations.get_or_insert(config.tree_max_iterations);
    }

    /// Rewrite the tree rows for one record
    ///
    /// Existing rows are deleted first when the record already existed. A
    /// record without a parent is a root and gets no rows.
    pub(crate) fn rebuild(
        &self,
        column: &Column,
        registry: &Arc<Registry>,
        child_id: &serde_json::Value,
        direct_parent_id: &serde_json::Value,
        existed: bool,
    ) -> Result<()> {
        let tree_models = registry.models_for(self.tree.id()?);
        let columns = &self.tree_columns;

        if existed {
            let stale = tree_models
                .filter_condition(Condition::equals(&columns.child_id, condition_string(child_id)))?
                .all()?;
            debug!(column = %column.qualified_name(), rows = stale.len(), "Clearing tree rows");
            for row in stale {
                row.delete()?;
            }
        }

        if !is_truthy(direct_parent_id) {
            return Ok(());
        }

        let own_id = self.parent.parent.id()?;
        let id_column = &registry.schema(own_id).id_column_name;
        let max_iterations = self.max_iterations.unwrap_or(registry.config().tree_max_iterations);

        let mut lineage = Vec::new();
        let mut next_parent = Some(direct_parent_id.clone());
        while let Some(parent_id) = next_parent {
            if lineage.len() >= max_iterations {
                return Err(OrmError::relationship(format!(
                    "Error for column {}: I've climbed through {} parents and haven't found the root yet. You may have accidentally created a circular category tree. If not, and your category tree really is that deep, then adjust the 'max_iterations' configuration for this column accordingly.",
                    column.qualified_name(),
                    max_iterations
                )));
            }
            let parent = registry
                .models_for(own_id)
                .filter_condition(Condition::equals(id_column, condition_string(&parent_id)))?
                .first()?
                .ok_or_else(|| {
                    OrmError::relationship(format!(
                        "Error for column {}: parent record '{}' does not exist",
                        column.qualified_name(),
                        condition_string(&parent_id)
                    ))
                })?;
            next_parent = parent.get_raw(&column.name).filter(|v| is_truthy(v)).cloned();
            lineage.push(parent.id().cloned().unwrap_or(parent_id));
        }
        lineage.reverse();

        debug!(
            column = %column.qualified_name(),
            child = %child_id,
            depth = lineage.len(),
            "Rebuilding tree rows"
        );
        for (level, parent_id) in lineage.iter().enumerate() {
            let is_direct = same_id(parent_id, direct_parent_id);
            let mut row = Record::new();
            row.insert(columns.parent_id.clone(), parent_id.clone());
            row.insert(columns.child_id.clone(), child_id.clone());
            row.insert(columns.is_parent.clone(), serde_json::Value::from(u8::from(is_direct)));
            row.insert(columns.level.clone(), serde_json::Value::from(level));
            tree_models.create(row)?;
        }
        Ok(())
    }
}
