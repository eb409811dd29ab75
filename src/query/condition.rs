//! Condition parsing
//!
//! Turns a constrained `[table.]column OPERATOR value` string into a structured
//! [`Condition`]. Values never become part of executable backend syntax: the
//! `parsed` template only carries `%s` placeholders, and the values travel
//! separately.
//!
//! The value grammar is deliberately small. Single quotes around a value are
//! stripped, and an `IN` list is split on commas. There is no escaping, so a
//! quoted list element cannot itself contain a comma.

use std::fmt;
use std::str::FromStr;

use crate::error::{OrmError, Result};
use crate::query::sanitize::quote_identifier;

/// A condition operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Spaceship,
    NotEquals,
    LessThanEquals,
    GreaterThanEquals,
    GreaterThan,
    LessThan,
    Equals,
    In,
    IsNotNull,
    IsNull,
    IsNot,
    Is,
    Like,
}

impl Operator {
    /// Every operator, in match precedence order
    ///
    /// When two operators match at the same position the earlier one wins, so
    /// `<=>` must come before `<=` and `is not null` before `is not`.
    pub const ALL: [Operator; 13] = [
        Operator::Spaceship,
        Operator::NotEquals,
        Operator::LessThanEquals,
        Operator::GreaterThanEquals,
        Operator::GreaterThan,
        Operator::LessThan,
        Operator::Equals,
        Operator::In,
        Operator::IsNotNull,
        Operator::IsNull,
        Operator::IsNot,
        Operator::Is,
        Operator::Like,
    ];

    /// Canonical lowercase token
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Spaceship => "<=>",
            Operator::NotEquals => "!=",
            Operator::LessThanEquals => "<=",
            Operator::GreaterThanEquals => ">=",
            Operator::GreaterThan => ">",
            Operator::LessThan => "<",
            Operator::Equals => "=",
            Operator::In => "in",
            Operator::IsNotNull => "is not null",
            Operator::IsNull => "is null",
            Operator::IsNot => "is not",
            Operator::Is => "is",
            Operator::Like => "like",
        }
    }

    /// Uppercase token used in parsed templates
    pub fn sql(&self) -> &'static str {
        match self {
            Operator::In => "IN",
            Operator::IsNotNull => "IS NOT NULL",
            Operator::IsNull => "IS NULL",
            Operator::IsNot => "IS NOT",
            Operator::Is => "IS",
            Operator::Like => "LIKE",
            symbolic => symbolic.as_str(),
        }
    }

    /// The string searched for in the lowercased raw condition
    ///
    /// Word operators need surrounding whitespace so that column names like
    /// `login` or `island` do not collide with them.
    fn match_str(&self) -> &'static str {
        match self {
            Operator::In => " in ",
            Operator::IsNotNull => " is not null",
            Operator::IsNull => " is null",
            Operator::IsNot => " is not ",
            Operator::Is => " is ",
            Operator::Like => " like ",
            symbolic => symbolic.as_str(),
        }
    }

    /// Operators that never carry a value
    pub fn takes_no_value(&self) -> bool {
        matches!(self, Operator::IsNull | Operator::IsNotNull)
    }
}

impl FromStr for Operator {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        Operator::ALL
            .iter()
            .find(|op| op.as_str() == lowered)
            .copied()
            .ok_or_else(|| OrmError::parse(format!("Unknown operator '{}'", s)))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}

/// A single parsed condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// Table qualifier (empty when the condition targets the query's own model)
    pub table_name: String,
    pub column_name: String,
    pub operator: Operator,
    /// Values in order; empty for `IS NULL`/`IS NOT NULL`
    pub values: Vec<String>,
    /// Placeholder template, e.g. `` `age`>=%s ``
    pub parsed: String,
}

impl Condition {
    /// Parse a condition string
    ///
    /// # Example
    /// ```
    /// use strata::query::{Condition, Operator};
    ///
    /// let condition = Condition::parse("status_id IN (1, 2, 3)").unwrap();
    /// assert_eq!(condition.operator, Operator::In);
    /// assert_eq!(condition.values, vec!["1", "2", "3"]);
    /// assert_eq!(condition.parsed, "`status_id` IN (%s, %s, %s)");
    /// ```
    pub fn parse(raw: &str) -> Result<Self> {
        // ASCII lowercasing keeps byte offsets identical to `raw`
        let lowered = raw.to_ascii_lowercase();
        let mut found: Option<(usize, Operator)> = None;
        for operator in Operator::ALL {
            if let Some(index) = lowered.find(operator.match_str()) {
                if found.is_none_or(|(best, _)| index < best) {
                    found = Some((index, operator));
                }
            }
        }

        let Some((index, operator)) = found else {
            return Err(OrmError::parse(format!(
                "No supported operators found in condition '{}'",
                raw
            )));
        };

        let column = raw[..index].trim().replace('`', "");
        let value = strip_quotes(raw[index + operator.match_str().len()..].trim());

        let (table_name, column_name) = match column.split_once('.') {
            Some((table, column)) => (table.trim().to_string(), column.trim().to_string()),
            None => (String::new(), column),
        };
        if column_name.is_empty() {
            return Err(OrmError::parse(format!(
                "Missing column name in condition '{}'",
                raw
            )));
        }

        let values = match operator {
            Operator::IsNull | Operator::IsNotNull => Vec::new(),
            Operator::In => parse_in_list(value, raw)?,
            _ => vec![value.to_string()],
        };

        let condition = Self::build(table_name, column_name, operator, values);
        tracing::trace!(raw, parsed = %condition.parsed, "Parsed condition");
        Ok(condition)
    }

    /// Build a condition from already separated parts
    ///
    /// `operator` is matched case-insensitively against the supported set.
    pub fn from_parts(
        column_name: impl Into<String>,
        operator: &str,
        values: Vec<String>,
        table_name: impl Into<String>,
    ) -> Result<Self> {
        let operator: Operator = operator.parse()?;
        let column_name = column_name.into();
        if operator.takes_no_value() && !values.is_empty() {
            return Err(OrmError::parse(format!(
                "Operator '{}' does not accept values, but {} were given for '{}'",
                operator.as_str(),
                values.len(),
                column_name
            )));
        }
        match operator {
            Operator::IsNull | Operator::IsNotNull => {}
            Operator::In if values.is_empty() => {
                return Err(OrmError::parse(format!(
                    "Operator 'in' requires at least one value for '{}'",
                    column_name
                )));
            }
            Operator::In => {}
            _ if values.len() != 1 => {
                return Err(OrmError::parse(format!(
                    "Operator '{}' requires exactly one value for '{}', got {}",
                    operator.as_str(),
                    column_name,
                    values.len()
                )));
            }
            _ => {}
        }
        Ok(Self::build(table_name.into(), column_name, operator, values))
    }

    /// `column = value` against the query's own table
    pub fn equals(column_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::build(String::new(), column_name.into(), Operator::Equals, vec![value.into()])
    }

    /// `table.column = value`
    pub fn qualified_equals(
        table_name: impl Into<String>,
        column_name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::build(
            table_name.into(),
            column_name.into(),
            Operator::Equals,
            vec![value.into()],
        )
    }

    /// `column IN (values...)` against the query's own table
    ///
    /// Returns `None` for an empty list, which can never match.
    pub fn is_in(column_name: impl Into<String>, values: Vec<String>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        Some(Self::build(String::new(), column_name.into(), Operator::In, values))
    }

    fn build(table_name: String, column_name: String, operator: Operator, values: Vec<String>) -> Self {
        let column = if table_name.is_empty() {
            quote_identifier(&column_name)
        } else {
            format!("{}.{}", table_name, column_name)
        };
        let parsed = match operator {
            Operator::IsNull | Operator::IsNotNull => format!("{} {}", column, operator.sql()),
            Operator::Is | Operator::IsNot | Operator::Like => {
                format!("{} {} %s", column, operator.sql())
            }
            Operator::In => format!("{} IN ({})", column, vec!["%s"; values.len()].join(", ")),
            _ => format!("{}{}%s", column, operator.sql()),
        };
        Self {
            table_name,
            column_name,
            operator,
            values,
            parsed,
        }
    }

    /// `table.column`, or just `column` when unqualified
    pub fn qualified_column(&self) -> String {
        if self.table_name.is_empty() {
            self.column_name.clone()
        } else {
            format!("{}.{}", self.table_name, self.column_name)
        }
    }

    /// The single value of a one-value condition
    pub fn value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}

impl FromStr for Condition {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self> {
        Condition::parse(s)
    }
}

fn strip_quotes(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn parse_in_list(value: &str, raw: &str) -> Result<Vec<String>> {
    if !(value.starts_with('(') && value.ends_with(')')) {
        return Err(OrmError::parse(format!(
            "IN conditions must wrap their values in parentheses, e.g. 'column IN (1, 2)', but found '{}'",
            raw
        )));
    }
    Ok(value[1..value.len() - 1]
        .split(',')
        .map(|item| item.trim().trim_matches('\'').to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Operator Tests
    // =========================================================================

    #[test]
    fn test_operator_from_str_is_case_insensitive() {
        assert_eq!("IS NOT NULL".parse::<Operator>().unwrap(), Operator::IsNotNull);
        assert_eq!("Like".parse::<Operator>().unwrap(), Operator::Like);
        assert_eq!("<=>".parse::<Operator>().unwrap(), Operator::Spaceship);
    }

    #[test]
    fn test_unknown_operator() {
        let err = "between".parse::<Operator>().unwrap_err();
        assert!(err.to_string().contains("Unknown operator"));
    }

    #[test]
    fn test_operator_display_is_uppercase() {
        assert_eq!(Operator::IsNull.to_string(), "IS NULL");
        assert_eq!(Operator::NotEquals.to_string(), "!=");
    }

    // =========================================================================
    // Basic parsing
    // =========================================================================

    #[test]
    fn test_parse_equals() {
        let condition = Condition::parse("user_id=5").unwrap();
        assert_eq!(condition.table_name, "");
        assert_eq!(condition.column_name, "user_id");
        assert_eq!(condition.operator, Operator::Equals);
        assert_eq!(condition.values, vec!["5"]);
        assert_eq!(condition.parsed, "`user_id`=%s");
    }

    #[test]
    fn test_every_symbolic_operator_round_trips() {
        let cases = [
            ("<=>", Operator::Spaceship),
            ("!=", Operator::NotEquals),
            ("<=", Operator::LessThanEquals),
            (">=", Operator::GreaterThanEquals),
            (">", Operator::GreaterThan),
            ("<", Operator::LessThan),
            ("=", Operator::Equals),
        ];
        for (token, expected) in cases {
            let condition = Condition::parse(&format!("col{}val", token)).unwrap();
            assert_eq!(condition.operator, expected, "token {}", token);
            assert_eq!(condition.values, vec!["val"]);
            assert_eq!(condition.parsed, format!("`col`{}%s", token));
        }
    }

    #[test]
    fn test_word_operators_round_trip() {
        let condition = Condition::parse("created IS TRUE").unwrap();
        assert_eq!(condition.operator, Operator::Is);
        assert_eq!(condition.values, vec!["TRUE"]);
        assert_eq!(condition.parsed, "`created` IS %s");

        let condition = Condition::parse("created is not FALSE").unwrap();
        assert_eq!(condition.operator, Operator::IsNot);
        assert_eq!(condition.values, vec!["FALSE"]);
        assert_eq!(condition.parsed, "`created` IS NOT %s");
    }

    #[test]
    fn test_quoted_value_keeps_embedded_operators() {
        let condition = Condition::parse("person_id<='asdf!=qwerty'").unwrap();
        assert_eq!(condition.operator, Operator::LessThanEquals);
        assert_eq!(condition.values, vec!["asdf!=qwerty"]);
    }

    #[test]
    fn test_backticks_are_removed_from_column() {
        let condition = Condition::parse("`name`='bob'").unwrap();
        assert_eq!(condition.column_name, "name");
        assert_eq!(condition.values, vec!["bob"]);
    }

    #[test]
    fn test_like() {
        let condition = Condition::parse("name LIKE '%HEY%'").unwrap();
        assert_eq!(condition.operator, Operator::Like);
        assert_eq!(condition.values, vec!["%HEY%"]);
        assert_eq!(condition.parsed, "`name` LIKE %s");
    }

    // =========================================================================
    // Null checks
    // =========================================================================

    #[test]
    fn test_is_null_has_no_values() {
        let condition = Condition::parse("created Is Null").unwrap();
        assert_eq!(condition.operator, Operator::IsNull);
        assert!(condition.values.is_empty());
        assert_eq!(condition.parsed, "`created` IS NULL");
    }

    #[test]
    fn test_is_not_null_beats_is_not_and_is() {
        let condition = Condition::parse("created is not null").unwrap();
        assert_eq!(condition.operator, Operator::IsNotNull);
        assert!(condition.values.is_empty());
        assert_eq!(condition.parsed, "`created` IS NOT NULL");
    }

    // =========================================================================
    // Precedence
    // =========================================================================

    #[test]
    fn test_earliest_operator_wins() {
        let condition = Condition::parse("age=name<=5").unwrap();
        assert_eq!(condition.operator, Operator::Equals);
        assert_eq!(condition.column_name, "age");
        assert_eq!(condition.values, vec!["name<=5"]);
    }

    #[test]
    fn test_spaceship_is_not_misread() {
        let condition = Condition::parse("x<=>5").unwrap();
        assert_eq!(condition.operator, Operator::Spaceship);
        assert_eq!(condition.values, vec!["5"]);
    }

    #[test]
    fn test_not_equals_is_not_misread_as_equals() {
        let condition = Condition::parse("status!=closed").unwrap();
        assert_eq!(condition.operator, Operator::NotEquals);
        assert_eq!(condition.values, vec!["closed"]);
    }

    #[test]
    fn test_word_operator_inside_column_name_is_ignored() {
        let condition = Condition::parse("login_count>3").unwrap();
        assert_eq!(condition.column_name, "login_count");
        assert_eq!(condition.operator, Operator::GreaterThan);
    }

    // =========================================================================
    // IN lists
    // =========================================================================

    #[test]
    fn test_in_list() {
        let condition = Condition::parse("status_id IN (1, 2, 3,4,5)").unwrap();
        assert_eq!(condition.operator, Operator::In);
        assert_eq!(condition.values, vec!["1", "2", "3", "4", "5"]);
        assert_eq!(condition.parsed, "`status_id` IN (%s, %s, %s, %s, %s)");
    }

    #[test]
    fn test_in_list_with_table_and_quotes() {
        let condition = Condition::parse("orders.status_id in ('ACTIVE', 'PENDING')").unwrap();
        assert_eq!(condition.table_name, "orders");
        assert_eq!(condition.column_name, "status_id");
        assert_eq!(condition.values, vec!["ACTIVE", "PENDING"]);
        assert_eq!(condition.parsed, "orders.status_id IN (%s, %s)");
    }

    #[test]
    fn test_in_requires_parentheses() {
        let err = Condition::parse("status_id IN 1, 2").unwrap_err();
        assert!(matches!(err, OrmError::Parse(_)));
    }

    #[test]
    fn test_in_list_does_not_escape_commas() {
        // quoted commas still split, and each piece loses its own quotes
        let condition = Condition::parse("name IN ('a,b', 'c')").unwrap();
        assert_eq!(condition.values, vec!["a", "b", "c"]);
        assert_eq!(condition.parsed, "`name` IN (%s, %s, %s)");
    }

    #[test]
    fn test_in_list_strips_unbalanced_quotes() {
        let condition = Condition::parse("code IN ('x, y', z')").unwrap();
        assert_eq!(condition.values, vec!["x", "y", "z"]);
    }

    // =========================================================================
    // Table qualifiers
    // =========================================================================

    #[test]
    fn test_table_qualifier_is_not_quoted() {
        let condition = Condition::parse("orders.total>=10").unwrap();
        assert_eq!(condition.table_name, "orders");
        assert_eq!(condition.column_name, "total");
        assert_eq!(condition.parsed, "orders.total>=%s");
        assert_eq!(condition.qualified_column(), "orders.total");
    }

    // =========================================================================
    // Errors
    // =========================================================================

    #[test]
    fn test_no_operator() {
        let err = Condition::parse("just some text").unwrap_err();
        assert!(err.to_string().contains("No supported operators"));
    }

    #[test]
    fn test_missing_column() {
        assert!(Condition::parse("=5").is_err());
    }

    // =========================================================================
    // Structured construction
    // =========================================================================

    #[test]
    fn test_from_parts() {
        let condition =
            Condition::from_parts("status", "in", vec!["a".into(), "b".into()], "").unwrap();
        assert_eq!(condition.operator, Operator::In);
        assert_eq!(condition.parsed, "`status` IN (%s, %s)");

        let condition = Condition::from_parts("id", "=", vec!["5".into()], "tree").unwrap();
        assert_eq!(condition.parsed, "tree.id=%s");
    }

    #[test]
    fn test_from_parts_unknown_operator() {
        let err = Condition::from_parts("id", "~~", vec!["5".into()], "").unwrap_err();
        assert!(err.to_string().contains("Unknown operator"));
    }

    #[test]
    fn test_from_parts_checks_value_count() {
        assert!(Condition::from_parts("id", "=", vec![], "").is_err());
        assert!(Condition::from_parts("id", "is null", vec!["x".into()], "").is_err());
        assert!(Condition::from_parts("id", "in", vec![], "").is_err());
        assert!(Condition::from_parts("id", "is null", vec![], "").is_ok());
    }

    #[test]
    fn test_is_in_helper_skips_empty_lists() {
        assert!(Condition::is_in("id", Vec::new()).is_none());
        let condition = Condition::is_in("id", vec!["1".into()]).unwrap();
        assert_eq!(condition.parsed, "`id` IN (%s)");
    }

    #[test]
    fn test_from_str() {
        let condition: Condition = "age>21".parse().unwrap();
        assert_eq!(condition.operator, Operator::GreaterThan);
    }
}
