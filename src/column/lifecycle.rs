//! The per-column save lifecycle
//!
//! [`Entity::save`](crate::entity::Entity::save) calls these in column
//! definition order: `pre_save` shapes the outgoing data, `post_save` runs once
//! the backend has assigned an id, and `save_finished` runs after the entity
//! holds its new data. Deletes get a `pre_delete` and `post_delete` pass
//! around the backend call.

use std::collections::BTreeMap;

use tracing::debug;
use uuid::Uuid;

use crate::action::Action;
use crate::column::temporal::AutoTimestamp;
use crate::column::{Column, ColumnKind};
use crate::entity::Entity;
use crate::error::{OrmError, Result};
use crate::types::{Record, is_truthy};

impl Column {
    /// Adjust the save data before it is sent to the backend
    pub fn pre_save(&self, data: Record, entity: &Entity) -> Result<Record> {
        let data = match &self.kind {
            ColumnKind::Uuid => {
                let mut data = data;
                if !entity.exists() {
                    data.insert(self.name.clone(), Uuid::new_v4().to_string().into());
                }
                data
            }
            ColumnKind::Datetime(settings) if settings.auto.is_some() => {
                let mut data = data;
                if settings.auto == Some(AutoTimestamp::Updated) || !entity.exists() {
                    data.insert(self.name.clone(), settings.now());
                }
                data
            }
            ColumnKind::HasMany(_) if !self.is_writeable && data.contains_key(&self.name) => {
                return Err(OrmError::invalid_state(format!(
                    "Column '{}' is a has-many relationship that is not writeable, so it cannot be set",
                    self.qualified_name()
                )));
            }
            _ => self.base_pre_save(data, entity)?,
        };

        if self.on_change_pre_save.is_empty() || !entity.is_changing(&self.name, &data) {
            return Ok(data);
        }
        let mut data = data;
        for action in &self.on_change_pre_save {
            if let Some(extra) = action.invoke(entity, &data)? {
                data.extend(extra);
            }
        }
        Ok(data)
    }

    fn base_pre_save(&self, mut data: Record, entity: &Entity) -> Result<Record> {
        if let Some(created_by) = &self.created_by {
            if !entity.exists() {
                let registry = entity.registry();
                let value = match registry.context().get(created_by.source, &created_by.key) {
                    Some(value) => value.clone(),
                    None if created_by.strict => {
                        return Err(OrmError::invalid_state(format!(
                            "Column '{}' needs '{}' from the {} but it was not present",
                            self.qualified_name(),
                            created_by.key,
                            created_by.source.as_str()
                        )));
                    }
                    None => registry.config().created_by_placeholder.clone().into(),
                };
                data.insert(self.name.clone(), value);
            }
        }

        if let Some(setable) = &self.setable {
            let value = setable.resolve(&data, entity)?;
            data.insert(self.name.clone(), value);
        }

        if let Some(default) = &self.default {
            if !entity.exists() && !data.contains_key(&self.name) {
                data.insert(self.name.clone(), default.clone());
            }
        }

        Ok(data)
    }

    /// Run relationship synchronization and post-save actions
    ///
    /// `data` is the save data (before `to_backend`) and `id` is the id the
    /// backend returned. The entity still holds its pre-save data.
    pub fn post_save(&self, data: &Record, entity: &Entity, id: &serde_json::Value) -> Result<()> {
        match &self.kind {
            ColumnKind::HasMany(config) if self.is_writeable => config.post_save(self, data, entity, id)?,
            ColumnKind::ManyToManyIds(config) => config.post_save(self, data, entity, id)?,
            ColumnKind::ManyToManyIdsWithData(config) => config.post_save(self, data, entity, id)?,
            ColumnKind::CategoryTree(tree) if entity.is_changing(&self.name, data) => {
                let parent_id = data.get(&self.name).cloned().unwrap_or_default();
                tree.rebuild(self, entity.registry(), id, &parent_id, entity.exists())?;
            }
            _ => {}
        }

        if self.on_change_post_save.is_empty() || !entity.is_changing(&self.name, data) {
            return Ok(());
        }
        let mut with_id = data.clone();
        with_id.insert(entity.schema().id_column_name.clone(), id.clone());
        debug!(column = %self.qualified_name(), "Running post-save actions");
        run_actions(&self.on_change_post_save, entity, &with_id)
    }

    /// Run actions that need the entity to already hold its saved data
    pub fn save_finished(&self, entity: &Entity) -> Result<()> {
        if !self.on_change_save_finished.is_empty() && entity.was_changed(&self.name)? {
            run_actions(&self.on_change_save_finished, entity, entity.data())?;
        }

        if let ColumnKind::Boolean { on_true, on_false } = &self.kind {
            if (on_true.is_empty() && on_false.is_empty()) || !entity.was_changed(&self.name)? {
                return Ok(());
            }
            let current = entity
                .get_raw(&self.name)
                .is_some_and(super::scalar::boolean_from_backend);
            let actions = if current { on_true } else { on_false };
            run_actions(actions, entity, entity.data())?;
        }
        Ok(())
    }

    /// Run before the entity's record is removed from the backend
    pub fn pre_delete(&self, entity: &Entity) -> Result<()> {
        run_actions(&self.on_pre_delete, entity, entity.data())
    }

    /// Run after the backend delete; the entity still holds the deleted data
    pub fn post_delete(&self, entity: &Entity) -> Result<()> {
        run_actions(&self.on_post_delete, entity, entity.data())
    }

    /// Validation errors for this column in the given save data
    ///
    /// Kind checks run first (only for truthy values), then validators in
    /// order; the first error wins.
    pub fn input_errors(&self, entity: &Entity, data: &Record) -> Result<BTreeMap<String, String>> {
        let mut errors = BTreeMap::new();
        if let Some(value) = data.get(&self.name).filter(|v| is_truthy(v)) {
            let error = self.input_error_for_value(entity.registry(), value, None)?;
            if !error.is_empty() {
                errors.insert(self.name.clone(), error);
                return Ok(errors);
            }
        }

        for validator in &self.validators {
            let error = validator.check(entity, &self.name, data)?;
            if !error.is_empty() {
                errors.insert(self.name.clone(), error);
                break;
            }
        }
        Ok(errors)
    }
}

fn run_actions(actions: &[Action], entity: &Entity, data: &Record) -> Result<()> {
    for action in actions {
        action.invoke(entity, data)?;
    }
    Ok(())
}
