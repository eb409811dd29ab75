use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::column::Column;
use crate::config::RegistryConfig;
use crate::entity::Entity;
use crate::error::{OrmError, Result};
use crate::models::Models;
use crate::query::{Condition, Join, JoinType, Query};
use crate::registry::{ModelId, Registry};
use crate::relationship::ModelRef;
use crate::schema::ModelSchema;
use crate::types::{Record, condition_string, is_truthy};

/// A foreign key pointing at a parent record
///
/// # Example
/// ```
/// use strata::column::Column;
/// use strata::relationship::BelongsToId;
///
/// let column = Column::belongs_to_id(
///     "category_id",
///     BelongsToId::new("Category")
///         .readable_parent_columns(["id", "name"])
///         .filter("status=active")
///         .unwrap(),
/// );
/// assert!(column.belongs_to().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct BelongsToId {
    pub parent: ModelRef,
    /// Parent columns selected by the N+1 join
    pub readable_parent_columns: Vec<String>,
    /// Filled from the registry config when left unset
    pub join_type: Option<JoinType>,
    /// Extra filters a record must pass to count as a valid parent
    pub wheres: Vec<Condition>,
}

impl BelongsToId {
    pub fn new(parent_model: impl Into<String>) -> Self {
        Self {
            parent: ModelRef::new(parent_model),
            readable_parent_columns: Vec::new(),
            join_type: None,
            wheres: Vec::new(),
        }
    }

    pub fn readable_parent_columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.readable_parent_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = Some(join_type);
        self
    }

    /// Restrict valid parents with a condition string
    pub fn filter(mut self, condition: &str) -> Result<Self> {
        self.wheres.push(Condition::parse(condition)?);
        Ok(self)
    }

    pub(crate) fn resolve(&mut self, ids: &HashMap<String, ModelId>, referenced_from: &str) -> Result<()> {
        self.parent.resolve(ids, referenced_from)
    }

    pub(crate) fn finalize(&mut self, config: &RegistryConfig) {
        self.join_type.get_or_insert(config.relationship_join_type);
    }

    pub(crate) fn parent_schema<'r>(&self, registry: &'r Registry) -> Result<&'r Arc<ModelSchema>> {
        Ok(registry.schema(self.parent.id()?))
    }

    /// A column on the parent model, for searches through the relationship
    pub(crate) fn parent_column<'r>(&self, registry: &'r Registry, reference: &str) -> Result<&'r Column> {
        let parent = self.parent_schema(registry)?;
        parent.get_column(reference).ok_or_else(|| {
            OrmError::column_not_found(format!(
                "Cannot search on '{}' through a relationship because model {} has no such column",
                reference, parent.name
            ))
        })
    }

    /// Parent records, with the configured filters applied
    pub(crate) fn parent_models(&self, registry: &Arc<Registry>) -> Result<Models> {
        let mut parents = registry.models_for(self.parent.id()?);
        for condition in &self.wheres {
            parents = parents.filter_condition(condition.clone())?;
        }
        Ok(parents)
    }

    /// Alias used for the parent table in joins: `{parent_table}_{column}`
    pub fn join_table_alias(&self, registry: &Registry, column_name: &str) -> Result<String> {
        Ok(format!("{}_{}", self.parent_schema(registry)?.destination_name, column_name))
    }

    pub(crate) fn input_error_for_value(
        &self,
        column: &Column,
        registry: &Arc<Registry>,
        value: &serde_json::Value,
    ) -> Result<String> {
        let parent = self.parent_schema(registry)?;
        let matching = self
            .parent_models(registry)?
            .filter_condition(Condition::equals(&parent.id_column_name, condition_string(value)))?;
        if matching.count()? == 0 {
            return Ok(format!("Invalid selection for {}: record does not exist", column.name));
        }
        Ok(String::new())
    }

    pub(crate) fn add_join(&self, column: &Column, registry: &Registry, query: &Query) -> Result<Query> {
        let parent = self.parent_schema(registry)?;
        let alias = self.join_table_alias(registry, &column.name)?;
        if query.is_joined(&parent.destination_name, Some(&alias)) {
            return Ok(query.clone());
        }

        let join_type = self.join_type.unwrap_or(JoinType::Left);
        let raw = format!(
            "{} JOIN {} AS {} ON {}.{}={}.{}",
            join_type.as_str(),
            parent.destination_name,
            alias,
            alias,
            parent.id_column_name,
            query.destination_name(),
            column.name
        );
        trace!(column = %column.qualified_name(), join = %raw, "Joining parent table");
        Ok(query.add_join(Join::parse(&raw)?))
    }

    pub(crate) fn n_plus_one_add_joins(
        &self,
        column: &Column,
        registry: &Registry,
        query: &Query,
        column_names: &[&str],
    ) -> Result<Query> {
        let mut names: Vec<&str> = if column_names.is_empty() {
            self.readable_parent_columns.iter().map(String::as_str).collect()
        } else {
            column_names.to_vec()
        };
        if names.is_empty() {
            return Ok(query.clone());
        }

        let parent = self.parent_schema(registry)?;
        if !names.contains(&parent.id_column_name.as_str()) {
            names.push(&parent.id_column_name);
        }
        let alias = self.join_table_alias(registry, &column.name)?;
        let selects = names
            .iter()
            .map(|name| format!("{alias}.{name} AS {alias}_{name}"))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(self.add_join(column, registry, query)?.add_select(selects))
    }

    pub(crate) fn add_search(
        &self,
        column: &Column,
        registry: &Registry,
        query: &Query,
        value: &serde_json::Value,
        operator: Option<&str>,
        reference: &str,
    ) -> Result<Query> {
        let parent_column = self.parent_column(registry, reference)?;
        let alias = self.join_table_alias(registry, &column.name)?;
        let joined = self.add_join(column, registry, query)?;
        let raw = parent_column.build_condition(value, operator, &format!("{}.", alias));
        joined.add_where(Condition::parse(&raw)?)
    }

    /// Load the parent of an entity
    ///
    /// Data selected by an N+1 join is used directly; otherwise the parent is
    /// looked up by id.
    pub(crate) fn parent(&self, column: &Column, entity: &Entity) -> Result<Option<Entity>> {
        let Some(parent_id) = entity.get_raw(&column.name).filter(|v| is_truthy(v)) else {
            return Ok(None);
        };
        let registry = entity.registry();
        let parent = self.parent_schema(registry)?;
        let alias = self.join_table_alias(registry, &column.name)?;

        let prefixed_id = format!("{}_{}", alias, parent.id_column_name);
        if let Some(joined_id) = entity.get_raw(&prefixed_id).filter(|v| is_truthy(v)) {
            let mut data = Record::new();
            data.insert(parent.id_column_name.clone(), joined_id.clone());
            // whatever the join selected, whether the configured columns or an explicit list
            for parent_column in &parent.columns {
                if let Some(value) = entity.get_raw(&format!("{}_{}", alias, parent_column.name)) {
                    data.insert(parent_column.name.clone(), value.clone());
                }
            }
            for name in &self.readable_parent_columns {
                data.entry(name.clone()).or_insert(serde_json::Value::Null);
            }
            return Ok(Some(Entity::from_record(Arc::clone(registry), self.parent.id()?, data)));
        }

        registry
            .models_for(self.parent.id()?)
            .filter_condition(Condition::equals(&parent.id_column_name, condition_string(parent_id)))?
            .first()
    }
}
