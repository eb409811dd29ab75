//! Search operators, condition builders and query joins for columns

use std::sync::Arc;

use crate::column::{Column, ColumnKind};
use crate::error::{OrmError, Result};
use crate::query::{Condition, Operator, Query};
use crate::registry::Registry;
use crate::types::{Record, condition_string};

const TEXT_OPERATORS: &[Operator] = &[
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
    Operator::Like,
];

const ORDERED_OPERATORS: &[Operator] = &[
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
];

const EQUALITY_OPERATORS: &[Operator] = &[Operator::Equals];
const NULL_CHECK_OPERATORS: &[Operator] = &[Operator::IsNotNull, Operator::IsNull];
const MEMBERSHIP_OPERATORS: &[Operator] = &[Operator::Equals, Operator::In];

impl Column {
    /// Operators end users may search this column with
    pub fn allowed_search_operators(&self) -> &'static [Operator] {
        match &self.kind {
            ColumnKind::String | ColumnKind::Select(_) | ColumnKind::Uuid | ColumnKind::Phone { .. } => {
                TEXT_OPERATORS
            }
            ColumnKind::Integer
            | ColumnKind::Float
            | ColumnKind::Date(_)
            | ColumnKind::Datetime(_)
            | ColumnKind::Timestamp(_) => ORDERED_OPERATORS,
            ColumnKind::Boolean { .. } | ColumnKind::BelongsToId(_) | ColumnKind::CategoryTree(_) => {
                EQUALITY_OPERATORS
            }
            ColumnKind::Json => NULL_CHECK_OPERATORS,
            ColumnKind::ManyToManyIds(_) | ColumnKind::ManyToManyIdsWithData(_) => MEMBERSHIP_OPERATORS,
            ColumnKind::HasMany(_) | ColumnKind::CategoryTreeChildren(_) => &[],
        }
    }

    /// Whether `operator` may be used to search this column
    ///
    /// With a relationship reference, a belongs-to column defers to the
    /// referenced column on its parent model.
    pub fn is_allowed_operator(
        &self,
        operator: &str,
        relationship_reference: Option<&str>,
        registry: &Registry,
    ) -> Result<bool> {
        if let Some(reference) = relationship_reference.filter(|r| !r.is_empty()) {
            if let Some(belongs_to) = self.belongs_to() {
                let parent_column = belongs_to.parent_column(registry, reference)?;
                return parent_column.is_allowed_operator(operator, None, registry);
            }
        }
        Ok(operator
            .parse::<Operator>()
            .is_ok_and(|op| self.allowed_search_operators().contains(&op)))
    }

    /// Validate a user-supplied search value, returning an error message or ""
    pub fn check_search_value(
        &self,
        registry: &Arc<Registry>,
        value: &serde_json::Value,
        operator: Option<&str>,
        relationship_reference: Option<&str>,
    ) -> Result<String> {
        if let Some(reference) = relationship_reference.filter(|r| !r.is_empty()) {
            if let Some(belongs_to) = self.belongs_to() {
                let parent_column = belongs_to.parent_column(registry, reference)?;
                return parent_column.check_search_value(registry, value, operator, None);
            }
        }
        self.input_error_for_value(registry, value, operator)
    }

    /// Render a search as a condition string for [`Condition::parse`]
    ///
    /// # Example
    /// ```
    /// use serde_json::json;
    /// use strata::column::Column;
    ///
    /// let name = Column::string("name");
    /// assert_eq!(name.build_condition(&json!("bob"), None, ""), "name=bob");
    /// assert_eq!(name.build_condition(&json!("bo"), Some("like"), "u."), "u.name LIKE '%bo%'");
    /// ```
    pub fn build_condition(&self, value: &serde_json::Value, operator: Option<&str>, column_prefix: &str) -> String {
        let operator = operator.filter(|op| !op.trim().is_empty()).unwrap_or("=").trim();
        let value = match &self.kind {
            ColumnKind::Boolean { .. } => {
                let digit = if super::scalar::boolean_from_backend(value) { "1" } else { "0" };
                digit.to_string()
            }
            // stored numbers are digits only; IN lists keep their separators
            ColumnKind::Phone { .. } if !operator.eq_ignore_ascii_case("in") => {
                let raw = condition_string(value);
                super::scalar::phone_digits(&raw).unwrap_or(raw)
            }
            _ => condition_string(value),
        };

        match operator.parse::<Operator>() {
            Ok(Operator::Like) => format!("{}{} LIKE '%{}%'", column_prefix, self.name, value),
            Ok(op) if op.takes_no_value() => format!("{}{} {}", column_prefix, self.name, op.sql()),
            Ok(Operator::In) => {
                let list = if value.starts_with('(') {
                    value
                } else {
                    format!("({})", value)
                };
                format!("{}{} IN {}", column_prefix, self.name, list)
            }
            Ok(op @ (Operator::Is | Operator::IsNot)) => {
                format!("{}{} {} {}", column_prefix, self.name, op.sql(), value)
            }
            _ => format!("{}{}{}{}", column_prefix, self.name, operator, value),
        }
    }

    // ========================================================================
    // Condition builders
    // ========================================================================

    pub fn equals(&self, value: serde_json::Value) -> Result<Condition> {
        self.condition("=", value)
    }

    pub fn spaceship(&self, value: serde_json::Value) -> Result<Condition> {
        self.condition("<=>", value)
    }

    pub fn not_equals(&self, value: serde_json::Value) -> Result<Condition> {
        self.condition("!=", value)
    }

    pub fn less_than_equals(&self, value: serde_json::Value) -> Result<Condition> {
        self.condition("<=", value)
    }

    pub fn greater_than_equals(&self, value: serde_json::Value) -> Result<Condition> {
        self.condition(">=", value)
    }

    pub fn less_than(&self, value: serde_json::Value) -> Result<Condition> {
        self.condition("<", value)
    }

    pub fn greater_than(&self, value: serde_json::Value) -> Result<Condition> {
        self.condition(">", value)
    }

    pub fn like(&self, value: serde_json::Value) -> Result<Condition> {
        self.condition("like", value)
    }

    /// `column IN (values...)`; a scalar is treated as a one-element list
    pub fn is_in(&self, values: serde_json::Value) -> Result<Condition> {
        self.condition("in", values)
    }

    pub fn is_null(&self) -> Result<Condition> {
        self.condition("is null", serde_json::Value::Null)
    }

    pub fn is_not_null(&self) -> Result<Condition> {
        self.condition("is not null", serde_json::Value::Null)
    }

    /// Build a condition for any allowed operator
    ///
    /// Values are passed through `to_backend` first so the condition carries
    /// what the backend actually stores.
    pub fn condition(&self, operator: &str, value: serde_json::Value) -> Result<Condition> {
        let parsed = operator.parse::<Operator>().ok();
        let Some(operator) = parsed.filter(|op| self.allowed_search_operators().contains(op)) else {
            return Err(OrmError::operator_not_allowed(format!(
                "The operator '{}' is not allowed for '{}'.",
                operator.trim().to_ascii_lowercase(),
                self.qualified_name()
            )));
        };

        let values = match operator {
            Operator::IsNull | Operator::IsNotNull => Vec::new(),
            Operator::In => crate::types::id_list(&value)
                .into_iter()
                .map(|item| self.backend_condition_value(item))
                .collect::<Result<Vec<_>>>()?,
            _ => vec![self.backend_condition_value(value)?],
        };
        Condition::from_parts(self.name.clone(), operator.as_str(), values, "")
    }

    fn backend_condition_value(&self, value: serde_json::Value) -> Result<String> {
        let mut data = Record::new();
        data.insert(self.name.clone(), value.clone());
        let encoded = self.to_backend(data)?;
        Ok(condition_string(encoded.get(&self.name).unwrap_or(&value)))
    }

    // ========================================================================
    // Query integration
    // ========================================================================

    /// Apply an end-user search to a query
    pub fn add_search(
        &self,
        registry: &Registry,
        query: &Query,
        value: &serde_json::Value,
        operator: Option<&str>,
        relationship_reference: Option<&str>,
    ) -> Result<Query> {
        let reference = relationship_reference.filter(|r| !r.is_empty());
        match (&self.kind, reference) {
            (ColumnKind::BelongsToId(config), Some(reference)) => {
                config.add_search(self, registry, query, value, operator, reference)
            }
            (ColumnKind::CategoryTree(tree), Some(reference)) => {
                tree.parent.add_search(self, registry, query, value, operator, reference)
            }
            (ColumnKind::ManyToManyIds(config), _) => config.add_search(self, registry, query, value),
            (ColumnKind::ManyToManyIdsWithData(config), _) => {
                config.ids.add_search(self, registry, query, value)
            }
            _ => {
                let operator = operator.filter(|op| !op.trim().is_empty()).unwrap_or("=");
                query.add_where(self.condition(operator, value.clone())?)
            }
        }
    }

    /// Join whatever this column needs to be searched or sorted through
    pub fn add_join(&self, registry: &Registry, query: &Query) -> Result<Query> {
        match self.belongs_to() {
            Some(belongs_to) => belongs_to.add_join(self, registry, query),
            None => Ok(query.clone()),
        }
    }

    /// Join and select parent columns so related records load with the main query
    ///
    /// An empty `column_names` falls back to the configured readable parent
    /// columns. Non belongs-to columns return the query unchanged.
    pub fn n_plus_one_add_joins(&self, registry: &Registry, query: &Query, column_names: &[&str]) -> Result<Query> {
        match self.belongs_to() {
            Some(belongs_to) => belongs_to.n_plus_one_add_joins(self, registry, query, column_names),
            None => Ok(query.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn named(column: Column) -> Column {
        let mut column = column;
        column.model_name = "User".to_string();
        column
    }

    // =========================================================================
    // Operator lists
    // =========================================================================

    #[test]
    fn test_allowed_operators_by_kind() {
        assert!(Column::string("name").allowed_search_operators().contains(&Operator::Like));
        assert!(!Column::integer("age").allowed_search_operators().contains(&Operator::Like));
        assert_eq!(Column::boolean("active").allowed_search_operators(), &[Operator::Equals]);
        assert_eq!(
            Column::json("data").allowed_search_operators(),
            &[Operator::IsNotNull, Operator::IsNull]
        );
    }

    // =========================================================================
    // build_condition
    // =========================================================================

    #[test]
    fn test_build_condition_defaults_to_equals() {
        let column = Column::integer("age");
        assert_eq!(column.build_condition(&json!(5), None, ""), "age=5");
        assert_eq!(column.build_condition(&json!(5), Some(""), ""), "age=5");
        assert_eq!(column.build_condition(&json!(5), Some(">="), "users."), "users.age>=5");
    }

    #[test]
    fn test_build_condition_word_operators() {
        let column = Column::string("name");
        assert_eq!(column.build_condition(&json!(null), Some("is null"), ""), "name IS NULL");
        assert_eq!(column.build_condition(&json!("a, b"), Some("in"), ""), "name IN (a, b)");
        assert_eq!(column.build_condition(&json!("x"), Some("LIKE"), ""), "name LIKE '%x%'");
    }

    #[test]
    fn test_build_condition_round_trips_through_parser() {
        let column = Column::integer("age");
        let condition = Condition::parse(&column.build_condition(&json!(18), Some(">"), "")).unwrap();
        assert_eq!(condition.operator, Operator::GreaterThan);
        assert_eq!(condition.values, vec!["18"]);
    }

    #[test]
    fn test_phone_build_condition_searches_digits() {
        let column = Column::phone("phone");
        assert_eq!(column.build_condition(&json!("(555) 123-4567"), None, ""), "phone=5551234567");
        assert_eq!(column.build_condition(&json!("555-12"), Some("like"), ""), "phone LIKE '%55512%'");
        assert!(column.allowed_search_operators().contains(&Operator::Like));
    }

    #[test]
    fn test_boolean_build_condition_emits_digits() {
        let column = Column::boolean("active");
        assert_eq!(column.build_condition(&json!(true), None, ""), "active=1");
        assert_eq!(column.build_condition(&json!(false), None, ""), "active=0");
    }

    // =========================================================================
    // Condition builders
    // =========================================================================

    #[test]
    fn test_builders_encode_values() {
        let column = named(Column::integer("age"));
        let condition = column.equals(json!("42")).unwrap();
        assert_eq!(condition.operator, Operator::Equals);
        assert_eq!(condition.values, vec!["42"]);

        let condition = column.is_in(json!([1, "2"])).unwrap();
        assert_eq!(condition.values, vec!["1", "2"]);
        assert_eq!(condition.parsed, "`age` IN (%s, %s)");

        let condition = column.is_null().unwrap();
        assert!(condition.values.is_empty());
    }

    #[test]
    fn test_builders_reject_disallowed_operators() {
        let column = named(Column::integer("age"));
        let err = column.like(json!("4")).unwrap_err();
        assert!(matches!(err, OrmError::OperatorNotAllowed(_)));
        assert!(err.to_string().contains("The operator 'like' is not allowed for 'User.age'."));

        let err = column.condition("IS", json!("4")).unwrap_err();
        assert!(matches!(err, OrmError::OperatorNotAllowed(_)));
    }

    #[test]
    fn test_boolean_builder_stores_digit() {
        let column = named(Column::boolean("active"));
        let condition = column.equals(json!(true)).unwrap();
        assert_eq!(condition.values, vec!["1"]);
    }
}
