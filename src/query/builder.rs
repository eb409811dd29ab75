//! The immutable query accumulator
//!
//! Every mutator returns a new [`Query`] built from the previous one's full
//! state plus the change, so a query can be branched freely.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{OrmError, Result};
use crate::query::{Condition, Join, Sort};
use crate::schema::ModelSchema;
use crate::types::Record;

/// Conditions, joins, sorts and pagination for one model
#[derive(Debug, Clone)]
pub struct Query {
    model: Arc<ModelSchema>,
    conditions: Vec<Condition>,
    joins: Vec<Join>,
    sorts: Vec<Sort>,
    limit: usize,
    group_by: String,
    pagination: Record,
    selects: Vec<String>,
    select_all: bool,
}

impl Query {
    /// Create an empty query for a model
    pub fn new(model: Arc<ModelSchema>) -> Self {
        Self {
            model,
            conditions: Vec::new(),
            joins: Vec::new(),
            sorts: Vec::new(),
            limit: 0,
            group_by: String::new(),
            pagination: Record::new(),
            selects: Vec::new(),
            select_all: true,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn model(&self) -> &Arc<ModelSchema> {
        &self.model
    }

    /// Table the query's own model is stored in
    pub fn destination_name(&self) -> &str {
        &self.model.destination_name
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Conditions grouped by column name, each list in insertion order
    pub fn conditions_by_column(&self) -> BTreeMap<&str, Vec<&Condition>> {
        let mut grouped: BTreeMap<&str, Vec<&Condition>> = BTreeMap::new();
        for condition in &self.conditions {
            grouped
                .entry(condition.column_name.as_str())
                .or_default()
                .push(condition);
        }
        grouped
    }

    /// Conditions on a single column
    pub fn conditions_for(&self, column_name: &str) -> Vec<&Condition> {
        self.conditions
            .iter()
            .filter(|c| c.column_name == column_name)
            .collect()
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn sorts(&self) -> &[Sort] {
        &self.sorts
    }

    /// Maximum number of records (0 = unlimited)
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn group_by(&self) -> &str {
        &self.group_by
    }

    pub fn pagination(&self) -> &Record {
        &self.pagination
    }

    pub fn selects(&self) -> &[String] {
        &self.selects
    }

    pub fn select_all(&self) -> bool {
        self.select_all
    }

    /// Whether a table (optionally under a specific alias) is already joined
    pub fn is_joined(&self, table_name: &str, alias: Option<&str>) -> bool {
        self.joins.iter().any(|join| {
            join.unaliased_table_name == table_name && alias.is_none_or(|a| join.alias == a)
        })
    }

    // ========================================================================
    // Mutators (each returns a new query)
    // ========================================================================

    /// Add a condition, checking the column exists on the model
    pub fn add_where(&self, condition: Condition) -> Result<Self> {
        self.validate_column(&condition.column_name, "filter", &condition.table_name)?;
        let mut next = self.clone();
        next.conditions.push(condition);
        Ok(next)
    }

    /// Add a join; joined tables are not validated
    pub fn add_join(&self, join: Join) -> Self {
        let mut next = self.clone();
        next.joins.push(join);
        next
    }

    /// Replace the sort directives with a primary and optional secondary sort
    pub fn set_sort(&self, sort: Sort, secondary_sort: Option<Sort>) -> Result<Self> {
        self.validate_column(&sort.column_name, "sort", &sort.table_name)?;
        if let Some(secondary) = &secondary_sort {
            self.validate_column(&secondary.column_name, "sort", &secondary.table_name)?;
        }
        let mut next = self.clone();
        next.sorts = std::iter::once(sort).chain(secondary_sort).collect();
        Ok(next)
    }

    pub fn set_limit(&self, limit: usize) -> Self {
        let mut next = self.clone();
        next.limit = limit;
        next
    }

    pub fn set_group_by(&self, column_name: &str) -> Result<Self> {
        let (table, column) = match column_name.split_once('.') {
            Some((table, column)) => (table, column),
            None => ("", column_name),
        };
        self.validate_column(column, "group", table)?;
        let mut next = self.clone();
        next.group_by = column_name.to_string();
        Ok(next)
    }

    /// Set backend-specific pagination data
    pub fn set_pagination(&self, pagination: Record) -> Self {
        let mut next = self.clone();
        next.pagination = pagination;
        next
    }

    /// Add an explicit select expression
    pub fn add_select(&self, select: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.selects.push(select.into());
        next
    }

    pub fn set_select_all(&self, select_all: bool) -> Self {
        let mut next = self.clone();
        next.select_all = select_all;
        next
    }

    /// Check that a column exists on the query's own model
    ///
    /// References to another table are skipped, since the remote schema is unknown.
    fn validate_column(&self, column_name: &str, action: &str, table_name: &str) -> Result<()> {
        let destination_name = self.destination_name();
        if !table_name.is_empty() && table_name != destination_name {
            return Ok(());
        }

        let column_name = match column_name.split_once('.') {
            Some((prefix, _)) if prefix != destination_name => return Ok(()),
            Some((_, column)) => column,
            None => column_name,
        };

        if self.model.has_column(column_name) {
            return Ok(());
        }

        Err(OrmError::column_not_found(format!(
            "Cannot {} by column '{}' for model class {} because this column does not exist for the model. \
             You can suppress this error by adding a matching column to your model definition",
            action, column_name, self.model.name
        )))
    }
}
