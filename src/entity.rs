//! A single record bound to its model
//!
//! An [`Entity`] holds the raw data the backend returned, a memoized cache of
//! decoded values and the bookkeeping the save lifecycle needs for change
//! detection. Query-set operations live on [`Models`](crate::models::Models);
//! an entity only ever represents one record (or one record to be).

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use crate::column::{Column, ColumnKind};
use crate::error::{OrmError, Result};
use crate::models::Models;
use crate::registry::{ModelId, Registry};
use crate::relationship::{CategoryTreeChildren, TreeScope};
use crate::schema::ModelSchema;
use crate::types::{Record, Value, is_truthy};

/// One record of a registered model
#[derive(Debug, Clone)]
pub struct Entity {
    registry: Arc<Registry>,
    model_id: ModelId,
    schema: Arc<ModelSchema>,
    data: Record,
    next_data: Record,
    /// Data before the last save; `None` until a save has finished
    previous_data: Option<Record>,
    touched_columns: BTreeSet<String>,
    transformed: RefCell<BTreeMap<String, Value>>,
}

impl Entity {
    /// Wrap raw backend data (an empty record makes a new, unsaved entity)
    pub fn from_record(registry: Arc<Registry>, model_id: ModelId, data: Record) -> Self {
        let schema = Arc::clone(registry.schema(model_id));
        Self {
            registry,
            model_id,
            schema,
            data,
            next_data: Record::new(),
            previous_data: None,
            touched_columns: BTreeSet::new(),
            transformed: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    pub fn model_id(&self) -> ModelId {
        self.model_id
    }

    /// Query set for this entity's model
    pub fn models(&self) -> Models {
        self.registry.models_for(self.model_id)
    }

    /// Raw data as the backend returned it
    pub fn data(&self) -> &Record {
        &self.data
    }

    pub fn get_raw(&self, name: &str) -> Option<&serde_json::Value> {
        self.data.get(name)
    }

    pub fn id(&self) -> Option<&serde_json::Value> {
        self.data
            .get(&self.schema.id_column_name)
            .filter(|id| is_truthy(id))
    }

    /// Whether this entity corresponds to a stored record
    pub fn exists(&self) -> bool {
        self.id().is_some()
    }

    fn column(&self, name: &str) -> Result<&Column> {
        self.schema.get_column(name).ok_or_else(|| {
            OrmError::column_not_found(format!(
                "Unknown column '{}' requested from model '{}'",
                name, self.schema.name
            ))
        })
    }

    // ========================================================================
    // Reading values
    // ========================================================================

    /// Decoded value of a column
    ///
    /// Relationship collections resolve to the list of related ids. Results
    /// are cached until the next save.
    pub fn get(&self, name: &str) -> Result<Value> {
        if let Some(cached) = self.transformed.borrow().get(name) {
            return Ok(cached.clone());
        }

        let column = self.column(name)?;
        let value = match &column.kind {
            ColumnKind::HasMany(_)
            | ColumnKind::ManyToManyIds(_)
            | ColumnKind::ManyToManyIdsWithData(_)
            | ColumnKind::CategoryTreeChildren(_) => {
                let ids = self.collection_ids(column)?;
                Value::List(ids.into_iter().map(Value::from).collect())
            }
            _ => match self.data.get(name) {
                Some(raw) => column.from_backend(raw)?,
                None => Value::Null,
            },
        };

        self.transformed
            .borrow_mut()
            .insert(name.to_string(), value.clone());
        Ok(value)
    }

    fn collection_ids(&self, column: &Column) -> Result<Vec<serde_json::Value>> {
        let Some(id) = self.id() else {
            return Ok(Vec::new());
        };
        match &column.kind {
            ColumnKind::HasMany(config) => Ok(config
                .children(&self.registry, id)?
                .all()?
                .iter()
                .filter_map(|child| child.id().cloned())
                .collect()),
            ColumnKind::ManyToManyIds(config) => config.related_ids(&self.registry, id),
            ColumnKind::ManyToManyIdsWithData(config) => config.ids.related_ids(&self.registry, id),
            ColumnKind::CategoryTreeChildren(config) => Ok(config
                .relatives(self)?
                .iter()
                .filter_map(|relative| relative.id().cloned())
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    /// Stage a value for the next save
    pub fn set(&mut self, name: &str, value: serde_json::Value) -> Result<()> {
        self.column(name)?;
        self.next_data.insert(name.to_string(), value);
        Ok(())
    }

    /// Readable, non-collection columns as a JSON object
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut output = serde_json::Map::new();
        for column in self
            .schema
            .columns
            .iter()
            .filter(|c| c.is_readable && !c.is_collection())
        {
            output.insert(column.name.clone(), self.get(&column.name)?.to_json());
        }
        Ok(serde_json::Value::Object(output))
    }

    // ========================================================================
    // Saving
    // ========================================================================

    /// Create or update the record
    ///
    /// Staged values from [`Entity::set`] are merged with `data`, which wins
    /// on conflicts. Columns see the save in definition order: `pre_save`,
    /// then the backend write, then `post_save` (with the entity still holding
    /// its old data), then `save_finished` once the entity is updated.
    pub fn save(&mut self, data: Record) -> Result<()> {
        let mut save_data = std::mem::take(&mut self.next_data);
        save_data.extend(data);
        if save_data.is_empty() {
            return Err(OrmError::invalid_state(format!(
                "Nothing to save for model '{}': pass data to save or set column values first",
                self.schema.name
            )));
        }

        let schema = Arc::clone(&self.schema);
        let existed = self.exists();
        debug!(model = %schema.name, existed, "Running pre-save");
        for column in &schema.columns {
            save_data = column.pre_save(save_data, self)?;
        }

        let (to_save, temporary_data) = schema.columns_to_backend(&save_data)?;
        let backend = Arc::clone(self.registry.backend(self.model_id));
        let stored = match self.id().cloned() {
            Some(id) => {
                debug!(model = %schema.name, id = %id, "Updating record");
                backend.update(&id, &to_save, &schema)?
            }
            None => {
                debug!(model = %schema.name, "Creating record");
                backend.create(&to_save, &schema)?
            }
        };
        let id = stored
            .get(&schema.id_column_name)
            .filter(|id| is_truthy(id))
            .or_else(|| self.id())
            .cloned()
            .ok_or_else(|| {
                OrmError::invalid_state(format!(
                    "The backend did not return an id for model '{}'",
                    schema.name
                ))
            })?;

        debug!(model = %schema.name, id = %id, "Running post-save");
        for column in &schema.columns {
            column.post_save(&save_data, self, &id)?;
        }

        let mut new_data = self.data.clone();
        new_data.extend(stored);
        new_data.extend(temporary_data);
        let old_data = std::mem::replace(&mut self.data, new_data);
        self.transformed.borrow_mut().clear();
        self.previous_data = Some(old_data);
        self.touched_columns = save_data.keys().cloned().collect();

        debug!(model = %schema.name, id = %id, "Running save-finished");
        for column in &schema.columns {
            column.save_finished(self)?;
        }
        Ok(())
    }

    /// Delete the stored record
    pub fn delete(&self) -> Result<()> {
        let Some(id) = self.id() else {
            return Err(OrmError::invalid_state(format!(
                "Cannot delete a record of model '{}' that does not exist",
                self.schema.name
            )));
        };
        for column in &self.schema.columns {
            column.pre_delete(self)?;
        }
        debug!(model = %self.schema.name, id = %id, "Deleting record");
        self.registry
            .backend(self.model_id)
            .delete(id, &self.schema)?;
        for column in &self.schema.columns {
            column.post_delete(self)?;
        }
        Ok(())
    }

    // ========================================================================
    // Change tracking
    // ========================================================================

    /// Whether the save in progress changes `key`
    pub fn is_changing(&self, key: &str, data: &Record) -> bool {
        let Some(new_value) = data.get(key) else {
            return false;
        };
        let Some(old_value) = self.data.get(key).filter(|_| self.exists()) else {
            return true;
        };
        match self.schema.get_column(key) {
            Some(column) => !column.values_match(old_value, new_value),
            None => old_value != new_value,
        }
    }

    /// The value `key` will have after the save in progress
    pub fn latest(&self, key: &str, data: &Record) -> serde_json::Value {
        data.get(key)
            .or_else(|| self.data.get(key))
            .cloned()
            .unwrap_or_default()
    }

    /// Whether the last save changed `key`
    pub fn was_changed(&self, key: &str) -> Result<bool> {
        let Some(previous) = &self.previous_data else {
            return Err(OrmError::invalid_state(format!(
                "was_changed('{}') was called on model '{}' before a save finished",
                key, self.schema.name
            )));
        };
        if !self.touched_columns.contains(key) {
            return Ok(false);
        }

        let old_value = previous.get(key).filter(|v| is_truthy(v));
        let new_value = self.data.get(key).filter(|v| is_truthy(v));
        match (old_value, new_value) {
            (None, None) => Ok(false),
            (Some(old_value), Some(new_value)) => Ok(match self.schema.get_column(key) {
                Some(column) => !column.values_match(old_value, new_value),
                None => old_value != new_value,
            }),
            _ => Ok(true),
        }
    }

    /// Decoded value of `key` before the last save
    pub fn previous_value(&self, key: &str) -> Result<Value> {
        let column = self.column(key)?;
        match self.previous_data.as_ref().and_then(|p| p.get(key)) {
            Some(raw) => column.from_backend(raw),
            None => Ok(Value::Null),
        }
    }

    /// Validation errors for save data, keyed by column name
    pub fn input_errors(&self, data: &Record) -> Result<BTreeMap<String, String>> {
        let mut errors = BTreeMap::new();
        for column in &self.schema.columns {
            errors.extend(column.input_errors(self, data)?);
        }
        Ok(errors)
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    /// The parent record of a belongs-to (or category tree) column
    pub fn parent(&self, column_name: &str) -> Result<Option<Entity>> {
        let column = self.column(column_name)?;
        let belongs_to = column.belongs_to().ok_or_else(|| {
            OrmError::configuration(format!(
                "Column '{}' is not a belongs-to relationship",
                column.qualified_name()
            ))
        })?;
        belongs_to.parent(column, self)
    }

    /// Children of a has-many column
    pub fn children(&self, column_name: &str) -> Result<Vec<Entity>> {
        let column = self.column(column_name)?;
        let ColumnKind::HasMany(config) = &column.kind else {
            return Err(OrmError::configuration(format!(
                "Column '{}' is not a has-many relationship",
                column.qualified_name()
            )));
        };
        match self.id() {
            Some(id) => config.children(&self.registry, id)?.all(),
            None => Ok(Vec::new()),
        }
    }

    /// Related records of a many-to-many column
    pub fn related(&self, column_name: &str) -> Result<Vec<Entity>> {
        let column = self.column(column_name)?;
        let config = match &column.kind {
            ColumnKind::ManyToManyIds(config) => config,
            ColumnKind::ManyToManyIdsWithData(config) => &config.ids,
            _ => {
                return Err(OrmError::configuration(format!(
                    "Column '{}' is not a many-to-many relationship",
                    column.qualified_name()
                )));
            }
        };
        match self.id() {
            Some(id) => config.related(&self.registry, id),
            None => Ok(Vec::new()),
        }
    }

    /// Ids of the related records of a many-to-many column
    pub fn related_ids(&self, column_name: &str) -> Result<Vec<serde_json::Value>> {
        let column = self.column(column_name)?;
        match &column.kind {
            ColumnKind::ManyToManyIds(_) | ColumnKind::ManyToManyIdsWithData(_) => self.collection_ids(column),
            _ => Err(OrmError::configuration(format!(
                "Column '{}' is not a many-to-many relationship",
                column.qualified_name()
            ))),
        }
    }

    /// Pivot rows of a many-to-many column
    pub fn pivots(&self, column_name: &str) -> Result<Vec<Entity>> {
        let column = self.column(column_name)?;
        let config = match &column.kind {
            ColumnKind::ManyToManyIds(config) => config,
            ColumnKind::ManyToManyIdsWithData(config) => &config.ids,
            _ => {
                return Err(OrmError::configuration(format!(
                    "Column '{}' is not a many-to-many relationship",
                    column.qualified_name()
                )));
            }
        };
        match self.id() {
            Some(id) => config.pivots(&self.registry, id)?.all(),
            None => Ok(Vec::new()),
        }
    }

    /// Records loaded by a tree-relatives column
    pub fn tree_relatives(&self, column_name: &str) -> Result<Vec<Entity>> {
        let column = self.column(column_name)?;
        let ColumnKind::CategoryTreeChildren(config) = &column.kind else {
            return Err(OrmError::configuration(format!(
                "Column '{}' does not load category tree relatives",
                column.qualified_name()
            )));
        };
        config.relatives(self)
    }

    /// Direct children in the tree held by a category tree column
    pub fn tree_children(&self, tree_column_name: &str) -> Result<Vec<Entity>> {
        CategoryTreeChildren::new(tree_column_name, TreeScope::Children).relatives(self)
    }

    pub fn tree_descendants(&self, tree_column_name: &str) -> Result<Vec<Entity>> {
        CategoryTreeChildren::new(tree_column_name, TreeScope::Descendants).relatives(self)
    }

    /// Every ancestor, root first
    pub fn tree_ancestors(&self, tree_column_name: &str) -> Result<Vec<Entity>> {
        CategoryTreeChildren::new(tree_column_name, TreeScope::Ancestors).relatives(self)
    }

    /// Rebuild this record's tree rows from its current parent
    pub fn force_tree_update(&self, tree_column_name: &str) -> Result<()> {
        let column = self.column(tree_column_name)?;
        let ColumnKind::CategoryTree(tree) = &column.kind else {
            return Err(OrmError::configuration(format!(
                "Column '{}' is not a category tree",
                column.qualified_name()
            )));
        };
        let Some(id) = self.id() else {
            return Err(OrmError::invalid_state(format!(
                "Cannot rebuild the category tree for an unsaved record of model '{}'",
                self.schema.name
            )));
        };
        let parent_id = self.data.get(&column.name).cloned().unwrap_or_default();
        tree.rebuild(column, &self.registry, id, &parent_id, true)
    }
}
