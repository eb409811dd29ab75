use std::collections::HashMap;

use tracing::debug;

use crate::column::Column;
use crate::entity::Entity;
use crate::error::{OrmError, Result};
use crate::query::Condition;
use crate::registry::ModelId;
use crate::relationship::{LoadStrategy, ManyToManyIds};
use crate::types::{Record, condition_string, is_truthy};

/// A many-to-many relationship whose pivot rows carry extra data
///
/// The saved value is a list of objects. Each one names its related record
/// either by the related id (under the pivot's related column) or by a value
/// of one of the related model's unique columns; the rest of the object is
/// stored on the pivot row.
#[derive(Debug, Clone)]
pub struct ManyToManyIdsWithData {
    pub ids: ManyToManyIds,
    /// Keep a unique lookup column on the pivot row instead of stripping it
    pub persist_unique_lookup_column_to_pivot_table: bool,
}

impl ManyToManyIdsWithData {
    pub fn new(related_model: impl Into<String>, pivot_model: impl Into<String>) -> Self {
        Self {
            ids: ManyToManyIds::new(related_model, pivot_model),
            persist_unique_lookup_column_to_pivot_table: false,
        }
    }

    pub fn own_column_name_in_pivot(mut self, name: impl Into<String>) -> Self {
        self.ids = self.ids.own_column_name_in_pivot(name);
        self
    }

    pub fn related_column_name_in_pivot(mut self, name: impl Into<String>) -> Self {
        self.ids = self.ids.related_column_name_in_pivot(name);
        self
    }

    pub fn load_strategy(mut self, strategy: LoadStrategy) -> Self {
        self.ids = self.ids.load_strategy(strategy);
        self
    }

    pub fn persist_unique_lookup_column_to_pivot_table(mut self) -> Self {
        self.persist_unique_lookup_column_to_pivot_table = true;
        self
    }

    pub(crate) fn resolve(
        &mut self,
        own_model: &str,
        ids: &HashMap<String, ModelId>,
        referenced_from: &str,
    ) -> Result<()> {
        self.ids.resolve(own_model, ids, referenced_from)
    }

    /// Upsert a pivot row per entry, then drop rows for related ids no longer listed
    pub(crate) fn post_save(&self, column: &Column, data: &Record, entity: &Entity, id: &serde_json::Value) -> Result<()> {
        let Some(entries) = data.get(&column.name).filter(|v| !v.is_null()) else {
            return Ok(());
        };
        let entries = match entries {
            serde_json::Value::Array(entries) => entries.as_slice(),
            other => std::slice::from_ref(other),
        };

        let registry = entity.registry();
        let related_column = self.ids.related_column();
        let own_column = self.ids.own_column();
        let pivot_id = self.ids.pivot.id()?;
        let related_id = self.ids.related.id()?;
        let related_schema = registry.schema(related_id);
        let unique_columns = related_schema.unique_column_names();

        let old_ids = if entity.exists() {
            self.ids.related_ids(registry, id)?
        } else {
            Vec::new()
        };

        let mut new_ids = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut pivot_data = match entry {
                serde_json::Value::Object(map) => map.clone(),
                _ => Record::new(),
            };

            let mut matched = pivot_data.get(related_column).filter(|v| is_truthy(v)).cloned();
            if matched.is_none() {
                for unique_column in &unique_columns {
                    let Some(lookup) = pivot_data.get(*unique_column).cloned() else {
                        continue;
                    };
                    let found = registry
                        .models_for(related_id)
                        .filter_condition(Condition::equals(*unique_column, condition_string(&lookup)))?
                        .first()?;
                    if let Some(related) = found.and_then(|r| r.id().cloned()) {
                        if !self.persist_unique_lookup_column_to_pivot_table {
                            pivot_data.remove(*unique_column);
                        }
                        matched = Some(related);
                        break;
                    }
                }
            }

            let Some(matched) = matched else {
                return Err(OrmError::relationship(format!(
                    "Missing data for {}: Unable to match related record for a record in the many-to-many relationship: you must provide either '{}' with the id column for the related table, or a value from one of the unique columns: '{}'",
                    column.name,
                    related_column,
                    unique_columns.join("', '")
                )));
            };

            pivot_data.insert(related_column.to_string(), matched.clone());
            pivot_data.insert(own_column.to_string(), id.clone());
            let pivots = registry
                .models_for(pivot_id)
                .filter_condition(Condition::equals(related_column, condition_string(&matched)))?
                .filter_condition(Condition::equals(own_column, condition_string(id)))?;
            let mut pivot = match pivots.first()? {
                Some(existing) => existing,
                None => pivots.empty(),
            };
            debug!(column = %column.qualified_name(), related = %matched, "Saving pivot row");
            pivot.save(pivot_data)?;
            new_ids.push(matched);
        }

        self.ids.sync_pivots(column, registry, id, &old_ids, &new_ids)
    }
}
