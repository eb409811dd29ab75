//! The storage backend contract
//!
//! The core never talks to storage directly. Every read and write goes through
//! a [`Backend`] trait object registered alongside the model's schema, and
//! backend failures are propagated unchanged as [`OrmError::Backend`](crate::error::OrmError::Backend).

use std::fmt::Debug;

use crate::error::Result;
use crate::query::Query;
use crate::schema::ModelSchema;
use crate::types::Record;

/// Optional query features a backend can support
///
/// Relationship loaders consult these to pick between a join, an `IN` list
/// and one lookup per id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_joins: bool,
    pub supports_where_in: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supports_joins: true,
            supports_where_in: true,
        }
    }
}

/// A storage adapter
pub trait Backend: Send + Sync + Debug {
    /// Store a new record and return it as stored, including any generated id
    fn create(&self, data: &Record, model: &ModelSchema) -> Result<Record>;

    /// Update a record and return it as stored
    fn update(&self, id: &serde_json::Value, data: &Record, model: &ModelSchema) -> Result<Record>;

    fn delete(&self, id: &serde_json::Value, model: &ModelSchema) -> Result<bool>;

    fn count(&self, query: &Query) -> Result<usize>;

    /// Fetch matching records
    ///
    /// Pagination data for the following page is written into `next_page_data`;
    /// leaving it empty signals the last page.
    fn records(&self, query: &Query, next_page_data: &mut Record) -> Result<Vec<Record>>;

    /// Check user-supplied pagination data, returning an error message or an empty string
    ///
    /// `case_mapping` converts key names into the caller's casing for messages.
    fn validate_pagination_data(&self, data: &Record, case_mapping: &dyn Fn(&str) -> String) -> String;

    fn allowed_pagination_keys(&self) -> Vec<String>;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }
}
