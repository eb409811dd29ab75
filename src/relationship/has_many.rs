use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::column::Column;
use crate::entity::Entity;
use crate::error::Result;
use crate::models::Models;
use crate::query::Condition;
use crate::registry::{ModelId, Registry};
use crate::relationship::ModelRef;
use crate::schema::snake_case;
use crate::types::{Record, condition_string, same_id, unique_ids};

/// Child records whose foreign key points back at this record
#[derive(Debug, Clone)]
pub struct HasMany {
    pub child: ModelRef,
    /// Defaults to `{snake_case(own model)}_id`
    pub foreign_column_name: Option<String>,
    pub wheres: Vec<Condition>,
    /// Allow saving a list of child ids, re-pointing children as needed
    pub writeable: bool,
}

impl HasMany {
    pub fn new(child_model: impl Into<String>) -> Self {
        Self {
            child: ModelRef::new(child_model),
            foreign_column_name: None,
            wheres: Vec::new(),
            writeable: false,
        }
    }

    pub fn foreign_column_name(mut self, name: impl Into<String>) -> Self {
        self.foreign_column_name = Some(name.into());
        self
    }

    pub fn filter(mut self, condition: &str) -> Result<Self> {
        self.wheres.push(Condition::parse(condition)?);
        Ok(self)
    }

    pub fn writeable(mut self) -> Self {
        self.writeable = true;
        self
    }

    pub(crate) fn resolve(
        &mut self,
        own_model: &str,
        ids: &HashMap<String, ModelId>,
        referenced_from: &str,
    ) -> Result<()> {
        self.child.resolve(ids, referenced_from)?;
        self.foreign_column_name
            .get_or_insert_with(|| format!("{}_id", snake_case(own_model)));
        Ok(())
    }

    pub(crate) fn foreign_column(&self) -> &str {
        self.foreign_column_name.as_deref().unwrap_or_default()
    }

    /// Children of the record with the given id
    pub(crate) fn children(&self, registry: &Arc<Registry>, id: &serde_json::Value) -> Result<Models> {
        let mut children = registry
            .models_for(self.child.id()?)
            .filter_condition(Condition::equals(self.foreign_column(), condition_string(id)))?;
        for condition in &self.wheres {
            children = children.filter_condition(condition.clone())?;
        }
        Ok(children)
    }

    /// Re-point children so exactly the saved ids belong to this record
    pub(crate) fn post_save(&self, column: &Column, data: &Record, entity: &Entity, id: &serde_json::Value) -> Result<()> {
        let Some(value) = data.get(&column.name).filter(|v| !v.is_null()) else {
            return Ok(());
        };
        let wanted = unique_ids(value);
        let registry = entity.registry();
        let child_schema = registry.schema(self.child.id()?);
        let foreign_column = self.foreign_column();

        let mut current = Vec::new();
        for mut child in self.children(registry, id)?.all()? {
            let child_id = child.id().cloned().unwrap_or_default();
            if !wanted.iter().any(|w| same_id(w, &child_id)) {
                debug!(column = %column.qualified_name(), child = %child_id, "Detaching child");
                let mut update = Record::new();
                update.insert(foreign_column.to_string(), serde_json::Value::Null);
                child.save(update)?;
            }
            current.push(child_id);
        }

        for wanted_id in wanted.iter().filter(|w| !current.iter().any(|c| same_id(c, w))) {
            let found = registry
                .models_for(self.child.id()?)
                .filter_condition(Condition::equals(&child_schema.id_column_name, condition_string(wanted_id)))?
                .first()?;
            if let Some(mut child) = found {
                debug!(column = %column.qualified_name(), child = %wanted_id, "Attaching child");
                let mut update = Record::new();
                update.insert(foreign_column.to_string(), id.clone());
                child.save(update)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_column_default() {
        let mut ids = HashMap::new();
        ids.insert("Order".to_string(), ModelId::from_index(0));
        let mut config = HasMany::new("Order");
        config.resolve("BlogUser", &ids, "BlogUser.orders").unwrap();
        assert_eq!(config.foreign_column(), "blog_user_id");
    }

    #[test]
    fn test_explicit_foreign_column_is_kept() {
        let mut ids = HashMap::new();
        ids.insert("Order".to_string(), ModelId::from_index(0));
        let mut config = HasMany::new("Order").foreign_column_name("owner_id").writeable();
        config.resolve("User", &ids, "User.orders").unwrap();
        assert_eq!(config.foreign_column(), "owner_id");
        assert!(config.writeable);
    }
}
