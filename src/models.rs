//! Query sets
//!
//! [`Models`] pairs an immutable [`Query`] with the registry handle needed to
//! run it. Every builder method returns a new query set, so a base query can
//! be refined along several branches without interference.

use std::sync::Arc;

use tracing::trace;

use crate::column::Column;
use crate::entity::Entity;
use crate::error::{OrmError, Result};
use crate::query::{Condition, Join, Query, Sort};
use crate::registry::{ModelId, Registry};
use crate::relationship::LoadStrategy;
use crate::schema::ModelSchema;
use crate::types::{Record, condition_string, same_id};

/// A lazily evaluated set of records of one model
#[derive(Debug, Clone)]
pub struct Models {
    registry: Arc<Registry>,
    model_id: ModelId,
    query: Query,
}

impl Models {
    pub(crate) fn new(registry: Arc<Registry>, model_id: ModelId) -> Self {
        let query = Query::new(Arc::clone(registry.schema(model_id)));
        Self {
            registry,
            model_id,
            query,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        self.query.model()
    }

    pub fn model_id(&self) -> ModelId {
        self.model_id
    }

    fn with_query(&self, query: Query) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            model_id: self.model_id,
            query,
        }
    }

    // ========================================================================
    // Refining
    // ========================================================================

    /// Add a condition string, e.g. `"age>=18"` or `"status IN ('a','b')"`
    pub fn filter(&self, condition: &str) -> Result<Self> {
        self.filter_condition(Condition::parse(condition)?)
    }

    pub fn filter_condition(&self, condition: Condition) -> Result<Self> {
        Ok(self.with_query(self.query.add_where(condition)?))
    }

    /// Add a join string, e.g. `"LEFT JOIN tags ON tags.id=posts.tag_id"`
    pub fn join(&self, join: &str) -> Result<Self> {
        Ok(self.join_parsed(Join::parse(join)?))
    }

    pub fn join_parsed(&self, join: Join) -> Self {
        self.with_query(self.query.add_join(join))
    }

    /// Sort by a column, optionally qualified as `table.column`
    pub fn sort_by(&self, column: &str, direction: &str) -> Result<Self> {
        self.sort_by_sorts(Sort::from_column_reference(column, direction)?, None)
    }

    pub fn sort_by_sorts(&self, sort: Sort, secondary_sort: Option<Sort>) -> Result<Self> {
        Ok(self.with_query(self.query.set_sort(sort, secondary_sort)?))
    }

    pub fn limit(&self, limit: usize) -> Self {
        self.with_query(self.query.set_limit(limit))
    }

    pub fn group_by(&self, column: &str) -> Result<Self> {
        Ok(self.with_query(self.query.set_group_by(column)?))
    }

    /// Set backend pagination data, checked by the backend first
    pub fn pagination(&self, pagination: Record) -> Result<Self> {
        let error = self.validate_pagination_data(&pagination, &|key: &str| key.to_string());
        if !error.is_empty() {
            return Err(OrmError::invalid_data(error));
        }
        Ok(self.with_query(self.query.set_pagination(pagination)))
    }

    pub fn select(&self, select: &str) -> Self {
        self.with_query(self.query.add_select(select))
    }

    pub fn select_all(&self, select_all: bool) -> Self {
        self.with_query(self.query.set_select_all(select_all))
    }

    /// Load a belongs-to column's parent with the main query
    pub fn n_plus_one(&self, column_name: &str) -> Result<Self> {
        self.n_plus_one_columns(column_name, &[])
    }

    /// Like [`n_plus_one`](Self::n_plus_one), selecting the given parent columns
    /// instead of the configured readable ones
    pub fn n_plus_one_columns(&self, column_name: &str, parent_columns: &[&str]) -> Result<Self> {
        let column = self.column(column_name)?;
        if column.belongs_to().is_none() {
            return Err(OrmError::configuration(format!(
                "Column '{}' is not a belongs-to relationship, so it cannot be joined for N+1 loading",
                column.qualified_name()
            )));
        }
        let query = column.n_plus_one_add_joins(&self.registry, &self.query, parent_columns)?;
        Ok(self.with_query(query))
    }

    /// Apply an end-user search through a column
    ///
    /// `relationship_reference` names a column on a belongs-to parent to
    /// search through the relationship instead.
    pub fn search(
        &self,
        column_name: &str,
        value: &serde_json::Value,
        operator: Option<&str>,
        relationship_reference: Option<&str>,
    ) -> Result<Self> {
        let column = self.column(column_name)?;
        let effective = operator.filter(|op| !op.trim().is_empty()).unwrap_or("=");
        if !column.is_allowed_operator(effective, relationship_reference, &self.registry)? {
            return Err(OrmError::operator_not_allowed(format!(
                "The operator '{}' is not allowed for '{}'.",
                effective,
                column.qualified_name()
            )));
        }
        let query = column.add_search(&self.registry, &self.query, value, operator, relationship_reference)?;
        Ok(self.with_query(query))
    }

    fn column(&self, name: &str) -> Result<&Column> {
        let schema = self.query.model();
        schema.get_column(name).ok_or_else(|| {
            OrmError::column_not_found(format!(
                "Unknown column '{}' requested from model '{}'",
                name, schema.name
            ))
        })
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// One page of records plus the data needed to fetch the next page
    ///
    /// Empty pagination data means there are no more pages.
    pub fn page(&self) -> Result<(Vec<Entity>, Record)> {
        trace!(model = %self.schema().name, query = ?self.query, "Fetching records");
        let mut next_page_data = Record::new();
        let records = self
            .registry
            .backend(self.model_id)
            .records(&self.query, &mut next_page_data)?;
        let entities = records
            .into_iter()
            .map(|record| Entity::from_record(Arc::clone(&self.registry), self.model_id, record))
            .collect();
        Ok((entities, next_page_data))
    }

    pub fn all(&self) -> Result<Vec<Entity>> {
        Ok(self.page()?.0)
    }

    /// Every page, following the backend's pagination data until it runs out
    pub fn paginate_all(&self) -> Result<Vec<Entity>> {
        let (mut entities, mut next_page_data) = self.page()?;
        while !next_page_data.is_empty() {
            let (page, next) = self.pagination(next_page_data)?.page()?;
            entities.extend(page);
            next_page_data = next;
        }
        Ok(entities)
    }

    pub fn first(&self) -> Result<Option<Entity>> {
        Ok(self.limit(1).all()?.into_iter().next())
    }

    /// The first record matching a condition string
    pub fn find(&self, condition: &str) -> Result<Option<Entity>> {
        self.filter(condition)?.first()
    }

    pub fn count(&self) -> Result<usize> {
        trace!(model = %self.schema().name, query = ?self.query, "Counting records");
        self.registry.backend(self.model_id).count(&self.query)
    }

    /// Load records by id, keeping the order of `ids`
    ///
    /// Ids with no matching record are skipped. A join strategy is treated as
    /// an `IN` query here since there is nothing to join through.
    pub fn load_by_ids(&self, ids: &[serde_json::Value], strategy: LoadStrategy) -> Result<Vec<Entity>> {
        let id_column = &self.schema().id_column_name;
        match strategy {
            LoadStrategy::Individual => {
                let mut entities = Vec::with_capacity(ids.len());
                for id in ids {
                    let found = self
                        .filter_condition(Condition::equals(id_column, condition_string(id)))?
                        .first()?;
                    entities.extend(found);
                }
                Ok(entities)
            }
            _ => {
                let values = ids.iter().map(condition_string).collect();
                let Some(condition) = Condition::is_in(id_column, values) else {
                    return Ok(Vec::new());
                };
                let mut found = self.filter_condition(condition)?.all()?;
                let mut ordered = Vec::with_capacity(found.len());
                for id in ids {
                    if let Some(index) = found
                        .iter()
                        .position(|e| e.id().is_some_and(|own| same_id(own, id)))
                    {
                        ordered.push(found.swap_remove(index));
                    }
                }
                Ok(ordered)
            }
        }
    }

    // ========================================================================
    // Writing
    // ========================================================================

    /// Create and save a new record
    pub fn create(&self, data: Record) -> Result<Entity> {
        let mut entity = self.empty();
        entity.save(data)?;
        Ok(entity)
    }

    /// A new, unsaved entity of this model
    pub fn empty(&self) -> Entity {
        Entity::from_record(Arc::clone(&self.registry), self.model_id, Record::new())
    }

    // ========================================================================
    // Pagination helpers
    // ========================================================================

    pub fn validate_pagination_data(&self, data: &Record, case_mapping: &dyn Fn(&str) -> String) -> String {
        self.registry
            .backend(self.model_id)
            .validate_pagination_data(data, case_mapping)
    }

    pub fn allowed_pagination_keys(&self) -> Vec<String> {
        self.registry.backend(self.model_id).allowed_pagination_keys()
    }
}
