//! Model schemas
//!
//! A [`ModelSchema`] is the static description of a model: its name, the
//! table it lives in, its id column and its ordered column definitions.
//! Schemas are built once, finalized by the [`Registry`](crate::registry::Registry)
//! and shared behind an `Arc` afterwards.

use crate::column::Column;
use crate::error::Result;
use crate::types::Record;

/// Static description of a model
#[derive(Debug, Clone)]
pub struct ModelSchema {
    /// Model name, used in error messages and to resolve relationships
    pub name: String,
    /// Table (or collection) the backend stores records in
    pub destination_name: String,
    pub id_column_name: String,
    /// Columns in definition order, which is also the save lifecycle order
    pub columns: Vec<Column>,
}

impl ModelSchema {
    /// Create a schema whose destination is the snake-case plural of the name
    ///
    /// # Example
    /// ```
    /// use strata::schema::ModelSchema;
    ///
    /// assert_eq!(ModelSchema::new("User").destination_name, "users");
    /// assert_eq!(ModelSchema::new("OrderCategory").destination_name, "order_categories");
    /// assert_eq!(ModelSchema::new("Address").destination_name, "addresses");
    /// ```
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            destination_name: pluralize(&snake_case(&name)),
            name,
            id_column_name: "id".to_string(),
            columns: Vec::new(),
        }
    }

    /// Override the destination table name
    pub fn table(mut self, destination_name: impl Into<String>) -> Self {
        self.destination_name = destination_name.into();
        self
    }

    /// Override the id column name (default: "id")
    pub fn id_column(mut self, id_column_name: impl Into<String>) -> Self {
        self.id_column_name = id_column_name.into();
        self
    }

    /// Append a column
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.get_column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Columns that carry a `Unique` validator
    pub fn unique_column_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_unique())
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Encode save data for the backend
    ///
    /// Values for temporary columns are split out first and returned as the
    /// second record; everything else passes through each column's
    /// `to_backend` in definition order.
    pub fn columns_to_backend(&self, data: &Record) -> Result<(Record, Record)> {
        let mut backend_data = data.clone();
        let mut temporary_data = Record::new();
        for column in self.columns.iter().filter(|c| c.is_temporary) {
            if let Some(value) = backend_data.remove(&column.name) {
                temporary_data.insert(column.name.clone(), value);
            }
        }

        for column in &self.columns {
            backend_data = column.to_backend(backend_data)?;
        }
        Ok((backend_data, temporary_data))
    }
}

/// Convert a CamelCase name into snake_case
///
/// # Example
/// ```
/// use strata::schema::snake_case;
///
/// assert_eq!(snake_case("OrderCategory"), "order_category");
/// assert_eq!(snake_case("user"), "user");
/// ```
pub fn snake_case(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 4);
    let mut previous_lower = false;
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            if previous_lower {
                result.push('_');
            }
            result.push(ch.to_ascii_lowercase());
            previous_lower = false;
        } else {
            previous_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
            result.push(ch);
        }
    }
    result
}

fn pluralize(name: &str) -> String {
    if let Some(stem) = name.strip_suffix('y') {
        format!("{}ies", stem)
    } else if name.ends_with('s') {
        format!("{}es", name)
    } else {
        format!("{}s", name)
    }
}
