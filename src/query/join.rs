//! Join parsing
//!
//! Accepts `[TYPE] JOIN table [[AS] alias] ON a.col=b.col` with
//! case-insensitive keywords and optional backtick quoting. Whichever side of
//! the `ON` clause names the joined table (or its alias) becomes the right side.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::{OrmError, Result};

const UNALIASED: &str = r"(?i)^\s*(?:(\w+)\s+)?join\s+`?([^\s`]+)`?\s+on\s+`?([^\s`.=]+)`?\.`?([^\s`.=]+)`?\s*=\s*`?([^\s`.=]+)`?\.`?([^\s`.=]+)`?\s*$";
const ALIASED: &str = r"(?i)^\s*(?:(\w+)\s+)?join\s+`?([^\s`]+)`?\s+(?:as\s+)?`?([^\s`]+)`?\s+on\s+`?([^\s`.=]+)`?\.`?([^\s`.=]+)`?\s*=\s*`?([^\s`.=]+)`?\.`?([^\s`.=]+)`?\s*$";

static UNALIASED_JOIN: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(UNALIASED));
static ALIASED_JOIN: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(ALIASED));

/// The kind of join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    #[default]
    Inner,
    Outer,
    Left,
    Right,
}

impl JoinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER",
            JoinType::Outer => "OUTER",
            JoinType::Left => "LEFT",
            JoinType::Right => "RIGHT",
        }
    }
}

impl FromStr for JoinType {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INNER" => Ok(JoinType::Inner),
            "OUTER" => Ok(JoinType::Outer),
            "LEFT" => Ok(JoinType::Left),
            "RIGHT" => Ok(JoinType::Right),
            other => Err(OrmError::parse(format!(
                "Unsupported join type '{}': should be INNER, OUTER, LEFT, or RIGHT",
                other
            ))),
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed join clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub left_table_name: String,
    pub left_column_name: String,
    /// The joined table, or its alias when one was given
    pub right_table_name: String,
    pub right_column_name: String,
    pub join_type: JoinType,
    /// Alias of the joined table (empty when none was given)
    pub alias: String,
    /// The joined table's real name
    pub unaliased_table_name: String,
    /// The original join string
    pub raw: String,
}

impl Join {
    /// Parse a join string
    ///
    /// # Example
    /// ```
    /// use strata::query::{Join, JoinType};
    ///
    /// let join = Join::parse("LEFT JOIN orders ON users.id=orders.user_id").unwrap();
    /// assert_eq!(join.join_type, JoinType::Left);
    /// assert_eq!(join.left_table_name, "users");
    /// assert_eq!(join.right_table_name, "orders");
    /// assert_eq!(join.right_column_name, "user_id");
    /// ```
    pub fn parse(raw: &str) -> Result<Self> {
        let unaliased = UNALIASED_JOIN
            .as_ref()
            .map_err(|e| OrmError::parse(e.to_string()))?;
        let aliased = ALIASED_JOIN
            .as_ref()
            .map_err(|e| OrmError::parse(e.to_string()))?;

        let (join_type, table, alias, on) = if let Some(caps) = unaliased.captures(raw) {
            (caps.get(1), group(&caps, 2), String::new(), on_clause(&caps, 3))
        } else if let Some(caps) = aliased.captures(raw) {
            (caps.get(1), group(&caps, 2), group(&caps, 3), on_clause(&caps, 4))
        } else {
            return Err(OrmError::parse(format!(
                "Specified join condition, '{}' does not appear to be a valid join statement",
                raw
            )));
        };

        let join_type = match join_type {
            Some(m) => m.as_str().parse()?,
            None => JoinType::Inner,
        };

        let [first_table, first_column, second_table, second_column] = on;
        let match_by = if alias.is_empty() { &table } else { &alias };
        let ((left_table_name, left_column_name), (right_table_name, right_column_name)) =
            if &first_table == match_by {
                ((second_table, second_column), (first_table, first_column))
            } else if &second_table == match_by {
                ((first_table, first_column), (second_table, second_column))
            } else {
                return Err(OrmError::parse(format!(
                    "Join error in '{}': joined table is not referenced in the 'on' clause",
                    raw
                )));
            };

        let join = Self {
            left_table_name,
            left_column_name,
            right_table_name,
            right_column_name,
            join_type,
            alias,
            unaliased_table_name: table,
            raw: raw.to_string(),
        };
        tracing::trace!(raw, join_type = %join.join_type, "Parsed join");
        Ok(join)
    }

    /// Name the joined table is referenced by in conditions and selects
    pub fn reference_name(&self) -> &str {
        if self.alias.is_empty() {
            &self.unaliased_table_name
        } else {
            &self.alias
        }
    }
}

impl FromStr for Join {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self> {
        Join::parse(s)
    }
}

fn group(caps: &Captures<'_>, index: usize) -> String {
    caps.get(index)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn on_clause(caps: &Captures<'_>, start: usize) -> [String; 4] {
    [
        group(caps, start),
        group(caps, start + 1),
        group(caps, start + 2),
        group(caps, start + 3),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Unaliased joins
    // =========================================================================

    #[test]
    fn test_simple_join() {
        let join = Join::parse("JOIN orders ON users.id=orders.user_id").unwrap();
        assert_eq!(join.left_table_name, "users");
        assert_eq!(join.left_column_name, "id");
        assert_eq!(join.right_table_name, "orders");
        assert_eq!(join.right_column_name, "user_id");
        assert_eq!(join.unaliased_table_name, "orders");
        assert_eq!(join.alias, "");
        assert_eq!(join.join_type, JoinType::Inner);
    }

    #[test]
    fn test_right_side_detected_when_listed_first() {
        let join = Join::parse("join orders on orders.user_id = users.id").unwrap();
        assert_eq!(join.left_table_name, "users");
        assert_eq!(join.left_column_name, "id");
        assert_eq!(join.right_table_name, "orders");
        assert_eq!(join.right_column_name, "user_id");
    }

    #[test]
    fn test_backtick_quotes() {
        let join = Join::parse("JOIN `orders` ON `users`.`id`=`orders`.`user_id`").unwrap();
        assert_eq!(join.left_table_name, "users");
        assert_eq!(join.right_table_name, "orders");
        assert_eq!(join.right_column_name, "user_id");
    }

    #[test]
    fn test_join_type_is_uppercased() {
        let join = Join::parse("left JOIN orders ON users.id=orders.user_id").unwrap();
        assert_eq!(join.join_type, JoinType::Left);

        let join = Join::parse("Right join orders ON users.id=orders.user_id").unwrap();
        assert_eq!(join.join_type, JoinType::Right);
    }

    #[test]
    fn test_unsupported_join_type() {
        assert!(Join::parse("CROSS JOIN orders ON users.id=orders.user_id").is_err());
    }

    // =========================================================================
    // Aliased joins
    // =========================================================================

    #[test]
    fn test_as_alias() {
        let join = Join::parse("JOIN new_table AS a ON old.id=a.old_id").unwrap();
        assert_eq!(join.right_table_name, "a");
        assert_eq!(join.right_column_name, "old_id");
        assert_eq!(join.left_table_name, "old");
        assert_eq!(join.left_column_name, "id");
        assert_eq!(join.alias, "a");
        assert_eq!(join.unaliased_table_name, "new_table");
        assert_eq!(join.reference_name(), "a");
    }

    #[test]
    fn test_bare_alias() {
        let join = Join::parse("INNER JOIN categories parent ON parent.id=products.category_id")
            .unwrap();
        assert_eq!(join.alias, "parent");
        assert_eq!(join.unaliased_table_name, "categories");
        assert_eq!(join.right_table_name, "parent");
        assert_eq!(join.left_table_name, "products");
        assert_eq!(join.left_column_name, "category_id");
    }

    #[test]
    fn test_lowercase_as() {
        let join =
            Join::parse("LEFT JOIN categories as categories_parent_id on categories_parent_id.id=categories.parent_id")
                .unwrap();
        assert_eq!(join.alias, "categories_parent_id");
        assert_eq!(join.right_column_name, "id");
        assert_eq!(join.left_table_name, "categories");
    }

    // =========================================================================
    // Errors
    // =========================================================================

    #[test]
    fn test_not_a_join() {
        let err = Join::parse("SELECT * FROM users").unwrap_err();
        assert!(err.to_string().contains("valid join statement"));
    }

    #[test]
    fn test_joined_table_not_referenced() {
        let err = Join::parse("JOIN orders ON users.id=accounts.user_id").unwrap_err();
        assert!(err.to_string().contains("not referenced"));
    }

    #[test]
    fn test_aliased_table_must_use_alias_in_on_clause() {
        assert!(Join::parse("JOIN orders AS o ON users.id=orders.user_id").is_err());
    }

    #[test]
    fn test_raw_is_kept() {
        let raw = "JOIN orders ON users.id=orders.user_id";
        assert_eq!(Join::parse(raw).unwrap().raw, raw);
    }
}
