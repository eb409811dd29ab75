use crate::column::ColumnKind;
use crate::entity::Entity;
use crate::error::{OrmError, Result};
use crate::query::{Condition, Join, Sort};
use crate::relationship::{CategoryTree, LoadStrategy, TreeScope};
use crate::schema::ModelSchema;
use crate::types::condition_string;

/// Read-only access to relatives in a category tree
#[derive(Debug, Clone)]
pub struct CategoryTreeChildren {
    /// The CategoryTree column on the same model
    pub category_tree_column_name: String,
    pub scope: TreeScope,
}

impl CategoryTreeChildren {
    pub fn new(category_tree_column_name: impl Into<String>, scope: TreeScope) -> Self {
        Self {
            category_tree_column_name: category_tree_column_name.into(),
            scope,
        }
    }

    /// The tree configuration this column reads from
    pub(crate) fn tree<'s>(&self, schema: &'s ModelSchema) -> Result<&'s CategoryTree> {
        match schema.get_column(&self.category_tree_column_name).map(|c| &c.kind) {
            Some(ColumnKind::CategoryTree(tree)) => Ok(tree),
            _ => Err(OrmError::configuration(format!(
                "Tree relatives on model {} need '{}' to be a CategoryTree column",
                schema.name, self.category_tree_column_name
            ))),
        }
    }

    /// Load the entity's relatives in this column's scope
    pub(crate) fn relatives(&self, entity: &Entity) -> Result<Vec<Entity>> {
        let Some(id) = entity.id().cloned() else {
            return Ok(Vec::new());
        };
        let schema = entity.schema();
        let tree = self.tree(schema)?;
        let registry = entity.registry();
        let tree_schema = registry.schema(tree.tree.id()?);
        let columns = &tree.tree_columns;
        let include_all = self.scope.include_all();
        let find_parents = self.scope.find_parents();

        let (join_on, search_on) = if find_parents {
            (&columns.parent_id, &columns.child_id)
        } else {
            (&columns.child_id, &columns.parent_id)
        };

        let strategy = tree
            .load_relatives_strategy
            .resolve(registry.backend(entity.model_id()).capabilities());

        if strategy == LoadStrategy::Join {
            let join = Join::parse(&format!(
                "JOIN {} AS tree ON tree.{}={}.{}",
                tree_schema.destination_name, join_on, schema.destination_name, schema.id_column_name
            ))?;
            let mut relatives = tree
                .parent
                .parent_models(registry)?
                .join_parsed(join)
                .filter_condition(Condition::qualified_equals("tree", search_on, condition_string(&id)))?;
            if !include_all {
                relatives = relatives.filter_condition(Condition::qualified_equals("tree", &columns.is_parent, "1"))?;
            }
            if find_parents {
                relatives = relatives.sort_by_sorts(Sort::qualified("tree", &columns.level, "ASC")?, None)?;
            }
            return relatives.all();
        }

        let mut branches = registry
            .models_for(tree.tree.id()?)
            .filter_condition(Condition::equals(search_on, condition_string(&id)))?;
        if !include_all {
            branches = branches.filter_condition(Condition::equals(&columns.is_parent, "1"))?;
        }
        if find_parents {
            branches = branches.sort_by(&columns.level, "ASC")?;
        }
        let ids: Vec<serde_json::Value> = branches
            .all()?
            .iter()
            .filter_map(|branch| branch.get_raw(join_on).cloned())
            .collect();
        tree.parent.parent_models(registry)?.load_by_ids(&ids, strategy)
    }
}
