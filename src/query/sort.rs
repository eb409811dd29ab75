//! Sort directives

use std::fmt;
use std::str::FromStr;

use crate::error::{OrmError, Result};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

impl FromStr for Direction {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "ASC" => Ok(Direction::Asc),
            "DESC" => Ok(Direction::Desc),
            _ => Err(OrmError::parse(format!(
                "Invalid sort direction: should be ASC or DESC, not '{}'",
                trimmed
            ))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single sort directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// Table qualifier (empty for the query's own table)
    pub table_name: String,
    pub column_name: String,
    pub direction: Direction,
}

impl Sort {
    /// Create a sort on the query's own table
    pub fn new(column_name: impl Into<String>, direction: &str) -> Result<Self> {
        Self::qualified("", column_name, direction)
    }

    /// Create a sort on a specific (usually joined) table
    pub fn qualified(
        table_name: impl Into<String>,
        column_name: impl Into<String>,
        direction: &str,
    ) -> Result<Self> {
        let column_name = column_name.into();
        if column_name.trim().is_empty() {
            return Err(OrmError::parse("Missing 'column_name' for sort"));
        }
        Ok(Self {
            table_name: table_name.into(),
            column_name,
            direction: direction.parse()?,
        })
    }

    /// Parse `table.column` into a qualified sort, or an unqualified one otherwise
    pub fn from_column_reference(reference: &str, direction: &str) -> Result<Self> {
        match reference.split_once('.') {
            Some((table, column)) => Self::qualified(table.trim(), column.trim(), direction),
            None => Self::new(reference.trim(), direction),
        }
    }
}
