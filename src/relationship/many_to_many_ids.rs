use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::column::Column;
use crate::entity::Entity;
use crate::error::Result;
use crate::models::Models;
use crate::query::{Condition, Join, Query};
use crate::registry::{ModelId, Registry};
use crate::relationship::{LoadStrategy, ModelRef};
use crate::schema::snake_case;
use crate::types::{Record, condition_string, id_list, same_id, unique_ids};

/// A list of related ids stored in a pivot model
///
/// The column's value never reaches the backend. After the owning record is
/// saved, pivot rows are created and deleted so they match the saved list.
#[derive(Debug, Clone)]
pub struct ManyToManyIds {
    pub related: ModelRef,
    pub pivot: ModelRef,
    /// Defaults to `{snake_case(own model)}_id`
    pub own_column_name_in_pivot: Option<String>,
    /// Defaults to `{snake_case(related model)}_id`
    pub related_column_name_in_pivot: Option<String>,
    pub load_strategy: LoadStrategy,
}

impl ManyToManyIds {
    pub fn new(related_model: impl Into<String>, pivot_model: impl Into<String>) -> Self {
        Self {
            related: ModelRef::new(related_model),
            pivot: ModelRef::new(pivot_model),
            own_column_name_in_pivot: None,
            related_column_name_in_pivot: None,
            load_strategy: LoadStrategy::Auto,
        }
    }

    pub fn own_column_name_in_pivot(mut self, name: impl Into<String>) -> Self {
        self.own_column_name_in_pivot = Some(name.into());
        self
    }

    pub fn related_column_name_in_pivot(mut self, name: impl Into<String>) -> Self {
        self.related_column_name_in_pivot = Some(name.into());
        self
    }

    pub fn load_strategy(mut self, strategy: LoadStrategy) -> Self {
        self.load_strategy = strategy;
        self
    }

    pub(crate) fn resolve(
        &mut self,
        own_model: &str,
        ids: &HashMap<String, ModelId>,
        referenced_from: &str,
    ) -> Result<()> {
        self.related.resolve(ids, referenced_from)?;
        self.pivot.resolve(ids, referenced_from)?;
        self.own_column_name_in_pivot
            .get_or_insert_with(|| format!("{}_id", snake_case(own_model)));
        let related_name = self.related.name.clone();
        self.related_column_name_in_pivot
            .get_or_insert_with(|| format!("{}_id", snake_case(&related_name)));
        Ok(())
    }

    pub(crate) fn own_column(&self) -> &str {
        self.own_column_name_in_pivot.as_deref().unwrap_or_default()
    }

    pub(crate) fn related_column(&self) -> &str {
        self.related_column_name_in_pivot.as_deref().unwrap_or_default()
    }

    /// Pivot rows belonging to the record with the given id
    pub(crate) fn pivots(&self, registry: &Arc<Registry>, own_id: &serde_json::Value) -> Result<Models> {
        registry
            .models_for(self.pivot.id()?)
            .filter_condition(Condition::equals(self.own_column(), condition_string(own_id)))
    }

    /// Ids of the related records, read from the pivot table
    pub(crate) fn related_ids(&self, registry: &Arc<Registry>, own_id: &serde_json::Value) -> Result<Vec<serde_json::Value>> {
        Ok(self
            .pivots(registry, own_id)?
            .all()?
            .iter()
            .filter_map(|pivot| pivot.get_raw(self.related_column()).cloned())
            .collect())
    }

    /// Load the related records
    pub(crate) fn related(&self, registry: &Arc<Registry>, own_id: &serde_json::Value) -> Result<Vec<Entity>> {
        let related_id = self.related.id()?;
        let related_schema = registry.schema(related_id);
        let strategy = self.load_strategy.resolve(registry.backend(related_id).capabilities());

        if strategy == LoadStrategy::Join {
            let pivot_table = &registry.schema(self.pivot.id()?).destination_name;
            let join = Join::parse(&format!(
                "JOIN {} ON {}.{}={}.{}",
                pivot_table,
                pivot_table,
                self.related_column(),
                related_schema.destination_name,
                related_schema.id_column_name
            ))?;
            return registry
                .models_for(related_id)
                .join_parsed(join)
                .filter_condition(Condition::qualified_equals(
                    pivot_table.as_str(),
                    self.own_column(),
                    condition_string(own_id),
                ))?
                .all();
        }

        let ids = self.related_ids(registry, own_id)?;
        registry.models_for(related_id).load_by_ids(&ids, strategy)
    }

    /// Sync the pivot table with the saved id list
    pub(crate) fn post_save(&self, column: &Column, data: &Record, entity: &Entity, id: &serde_json::Value) -> Result<()> {
        let Some(value) = data.get(&column.name).filter(|v| !v.is_null()) else {
            return Ok(());
        };
        let registry = entity.registry();
        let old_ids = if entity.exists() {
            self.related_ids(registry, id)?
        } else {
            Vec::new()
        };
        let new_ids = unique_ids(value);
        self.sync_pivots(column, registry, id, &old_ids, &new_ids)?;

        for related_id in new_ids.iter().filter(|n| !old_ids.iter().any(|o| same_id(o, n))) {
            let mut pivot = Record::new();
            pivot.insert(self.related_column().to_string(), related_id.clone());
            pivot.insert(self.own_column().to_string(), id.clone());
            registry.models_for(self.pivot.id()?).create(pivot)?;
        }
        Ok(())
    }

    /// Delete pivot rows for ids no longer present
    pub(crate) fn sync_pivots(
        &self,
        column: &Column,
        registry: &Arc<Registry>,
        own_id: &serde_json::Value,
        old_ids: &[serde_json::Value],
        new_ids: &[serde_json::Value],
    ) -> Result<()> {
        let to_delete: Vec<String> = old_ids
            .iter()
            .filter(|o| !new_ids.iter().any(|n| same_id(o, n)))
            .map(condition_string)
            .collect();
        let Some(condition) = Condition::is_in(self.related_column(), to_delete) else {
            return Ok(());
        };
        debug!(column = %column.qualified_name(), ids = ?condition.values, "Removing pivot rows");
        for pivot in self.pivots(registry, own_id)?.filter_condition(condition)?.all()? {
            pivot.delete()?;
        }
        Ok(())
    }

    /// Search through the pivot table: `pivot.related IN (...)`
    pub(crate) fn add_search(
        &self,
        column: &Column,
        registry: &Registry,
        query: &Query,
        value: &serde_json::Value,
    ) -> Result<Query> {
        let own = query.model();
        let pivot_table = &registry.schema(self.pivot.id()?).destination_name;
        let values: Vec<String> = id_list(value).iter().map(condition_string).collect();
        let joined = if query.is_joined(pivot_table, None) {
            query.clone()
        } else {
            query.add_join(Join::parse(&format!(
                "JOIN {} ON {}.{}={}.{}",
                pivot_table,
                pivot_table,
                self.own_column(),
                own.destination_name,
                own.id_column_name
            ))?)
        };
        let condition = Condition::from_parts(self.related_column(), "in", values, pivot_table.as_str())?;
        debug!(column = %column.qualified_name(), "Searching through pivot table");
        joined.add_where(condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pivot_column_defaults() {
        let mut ids = HashMap::new();
        ids.insert("ProductTag".to_string(), ModelId::from_index(0));
        ids.insert("Tag".to_string(), ModelId::from_index(1));
        let mut config = ManyToManyIds::new("Tag", "ProductTag");
        config.resolve("Product", &ids, "Product.tag_ids").unwrap();
        assert_eq!(config.own_column(), "product_id");
        assert_eq!(config.related_column(), "tag_id");
    }

    #[test]
    fn test_missing_pivot_model() {
        let mut ids = HashMap::new();
        ids.insert("Tag".to_string(), ModelId::from_index(1));
        let mut config = ManyToManyIds::new("Tag", "ProductTag");
        assert!(config.resolve("Product", &ids, "Product.tag_ids").is_err());
    }
}
