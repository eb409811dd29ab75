//! Shared fixtures for integration tests
//!
//! `MemoryBackend` keeps every table in memory and evaluates queries well
//! enough for the relationship and lifecycle tests: joins (with aliases),
//! table-qualified conditions, `IN` lists, sorts, limits, offset pagination
//! and explicit `alias.column AS name` selects.

#![allow(dead_code)]

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::json;
use strata::query::{Condition, JoinType, Operator};
use strata::types::{condition_string, same_id};
use strata::{Backend, Capabilities, ModelSchema, OrmError, Query, Record, Result};

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<String, Vec<Record>>,
    next_ids: HashMap<String, i64>,
}

/// In-memory backend shared by every model in a test registry
#[derive(Debug)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    capabilities: Capabilities,
    writes: Mutex<Vec<String>>,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Self::with_capabilities(Capabilities::default())
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Arc<Self> {
        Arc::new(Self {
            tables: Mutex::new(Tables::default()),
            capabilities,
            writes: Mutex::new(Vec::new()),
        })
    }

    /// Backend without join or `IN` support, forcing one lookup per id
    pub fn individual_only() -> Arc<Self> {
        Self::with_capabilities(Capabilities {
            supports_joins: false,
            supports_where_in: false,
        })
    }

    pub fn where_in_only() -> Arc<Self> {
        Self::with_capabilities(Capabilities {
            supports_joins: false,
            supports_where_in: true,
        })
    }

    /// Current rows of a table
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.lock().rows.get(table).cloned().unwrap_or_default()
    }

    /// Insert a row directly, bypassing the save pipeline
    pub fn seed(&self, table: &str, row: serde_json::Value) {
        let row = row.as_object().cloned().unwrap_or_default();
        let mut tables = self.lock();
        if let Some(id) = row.get("id").and_then(serde_json::Value::as_i64) {
            let next = tables.next_ids.entry(table.to_string()).or_insert(0);
            *next = (*next).max(id);
        }
        tables.rows.entry(table.to_string()).or_default().push(row);
    }

    /// Log of `create:{table}` / `update:{table}` / `delete:{table}` calls
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        match self.tables.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn log(&self, entry: String) {
        if let Ok(mut writes) = self.writes.lock() {
            writes.push(entry);
        }
    }

    /// Rows matching the query's joins and conditions, as table-name -> row maps
    fn matching(&self, query: &Query) -> Vec<HashMap<String, Record>> {
        let tables = self.lock();
        let own = query.destination_name().to_string();
        let mut contexts: Vec<HashMap<String, Record>> = tables
            .rows
            .get(&own)
            .map(|rows| {
                rows.iter()
                    .map(|row| HashMap::from([(own.clone(), row.clone())]))
                    .collect()
            })
            .unwrap_or_default();

        for join in query.joins() {
            let joined_rows = tables
                .rows
                .get(&join.unaliased_table_name)
                .cloned()
                .unwrap_or_default();
            let reference = join.reference_name().to_string();
            let mut next = Vec::new();
            for context in contexts {
                let left = context
                    .get(&join.left_table_name)
                    .and_then(|row| row.get(&join.left_column_name))
                    .cloned()
                    .unwrap_or_default();
                let matches: Vec<&Record> = joined_rows
                    .iter()
                    .filter(|row| {
                        !left.is_null()
                            && row
                                .get(&join.right_column_name)
                                .is_some_and(|right| same_id(right, &left))
                    })
                    .collect();
                if matches.is_empty() {
                    if matches!(join.join_type, JoinType::Left | JoinType::Outer) {
                        next.push(context);
                    }
                    continue;
                }
                for row in matches {
                    let mut joined = context.clone();
                    joined.insert(reference.clone(), row.clone());
                    next.push(joined);
                }
            }
            contexts = next;
        }

        contexts
            .into_iter()
            .filter(|context| {
                query
                    .conditions()
                    .iter()
                    .all(|condition| condition_matches(condition, context, &own))
            })
            .collect()
    }
}

fn lookup<'a>(context: &'a HashMap<String, Record>, table: &str, column: &str) -> Option<&'a serde_json::Value> {
    context
        .get(table)
        .and_then(|row| row.get(column))
        .filter(|value| !value.is_null())
}

fn compare(a: &serde_json::Value, b: &str) -> Ordering {
    let left = condition_string(a);
    match (left.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => left.as_str().cmp(b),
    }
}

fn condition_matches(condition: &Condition, context: &HashMap<String, Record>, own: &str) -> bool {
    let table = if condition.table_name.is_empty() {
        own
    } else {
        condition.table_name.as_str()
    };
    let value = lookup(context, table, &condition.column_name);
    let expected = condition.value().unwrap_or_default();
    match condition.operator {
        Operator::IsNull => value.is_none(),
        Operator::IsNotNull => value.is_some(),
        Operator::In => value.is_some_and(|v| {
            condition
                .values
                .iter()
                .any(|candidate| condition_string(v) == *candidate)
        }),
        Operator::Like => value.is_some_and(|v| {
            let haystack = condition_string(v).to_lowercase();
            let needle = expected.to_lowercase();
            match (needle.strip_prefix('%'), needle.strip_suffix('%')) {
                (Some(rest), Some(_)) => haystack.contains(rest.trim_end_matches('%')),
                (Some(rest), None) => haystack.ends_with(rest),
                (None, Some(rest)) => haystack.starts_with(rest),
                (None, None) => haystack == needle,
            }
        }),
        Operator::Equals | Operator::Spaceship | Operator::Is => {
            value.map(condition_string).unwrap_or_default() == expected
        }
        Operator::NotEquals | Operator::IsNot => value.map(condition_string).unwrap_or_default() != expected,
        Operator::LessThan => value.is_some_and(|v| compare(v, expected) == Ordering::Less),
        Operator::LessThanEquals => value.is_some_and(|v| compare(v, expected) != Ordering::Greater),
        Operator::GreaterThan => value.is_some_and(|v| compare(v, expected) == Ordering::Greater),
        Operator::GreaterThanEquals => value.is_some_and(|v| compare(v, expected) != Ordering::Less),
    }
}

impl Backend for MemoryBackend {
    fn create(&self, data: &Record, model: &ModelSchema) -> Result<Record> {
        let table = model.destination_name.clone();
        let mut row = data.clone();
        let mut tables = self.lock();
        if !row.get(&model.id_column_name).is_some_and(|id| !id.is_null()) {
            let next = tables.next_ids.entry(table.clone()).or_insert(0);
            *next += 1;
            row.insert(model.id_column_name.clone(), json!(*next));
        }
        tables.rows.entry(table.clone()).or_default().push(row.clone());
        drop(tables);
        self.log(format!("create:{}", table));
        Ok(row)
    }

    fn update(&self, id: &serde_json::Value, data: &Record, model: &ModelSchema) -> Result<Record> {
        let table = model.destination_name.clone();
        let mut tables = self.lock();
        let row = tables
            .rows
            .get_mut(&table)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|row| row.get(&model.id_column_name).is_some_and(|own| same_id(own, id)))
            })
            .ok_or_else(|| OrmError::backend(format!("no row {} in {}", id, table)))?;
        row.extend(data.clone());
        let updated = row.clone();
        drop(tables);
        self.log(format!("update:{}", table));
        Ok(updated)
    }

    fn delete(&self, id: &serde_json::Value, model: &ModelSchema) -> Result<bool> {
        let table = model.destination_name.clone();
        let mut tables = self.lock();
        let Some(rows) = tables.rows.get_mut(&table) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|row| !row.get(&model.id_column_name).is_some_and(|own| same_id(own, id)));
        let deleted = rows.len() != before;
        drop(tables);
        self.log(format!("delete:{}", table));
        Ok(deleted)
    }

    fn count(&self, query: &Query) -> Result<usize> {
        Ok(self.matching(query).len())
    }

    fn records(&self, query: &Query, next_page_data: &mut Record) -> Result<Vec<Record>> {
        let own = query.destination_name().to_string();
        let mut contexts = self.matching(query);

        for sort in query.sorts().iter().rev() {
            let table = if sort.table_name.is_empty() {
                own.clone()
            } else {
                sort.table_name.clone()
            };
            contexts.sort_by(|a, b| {
                let left = lookup(a, &table, &sort.column_name).cloned().unwrap_or_default();
                let right = condition_string(lookup(b, &table, &sort.column_name).unwrap_or(&serde_json::Value::Null));
                let ordering = compare(&left, &right);
                if sort.direction.as_str() == "DESC" {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let start = query
            .pagination()
            .get("start")
            .map(condition_string)
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        let total = contexts.len();
        let mut page: Vec<HashMap<String, Record>> = contexts.into_iter().skip(start).collect();
        if query.limit() > 0 {
            page.truncate(query.limit());
            if start + query.limit() < total {
                next_page_data.insert("start".to_string(), json!(start + query.limit()));
            }
        }

        Ok(page
            .into_iter()
            .map(|context| {
                let mut row = context.get(&own).cloned().unwrap_or_default();
                for select in query.selects() {
                    for expression in select.split(',') {
                        let Some((source, name)) = expression.split_once(" AS ") else {
                            continue;
                        };
                        let Some((table, column)) = source.trim().split_once('.') else {
                            continue;
                        };
                        let value = lookup(&context, table, column).cloned().unwrap_or_default();
                        row.insert(name.trim().to_string(), value);
                    }
                }
                row
            })
            .collect())
    }

    fn validate_pagination_data(&self, data: &Record, case_mapping: &dyn Fn(&str) -> String) -> String {
        let extra: Vec<&str> = data.keys().map(String::as_str).filter(|k| *k != "start").collect();
        if !extra.is_empty() {
            return format!(
                "Invalid pagination key(s): '{}'. Only '{}' is allowed",
                extra.join("', '"),
                case_mapping("start")
            );
        }
        match data.get("start") {
            Some(start) if condition_string(start).parse::<usize>().is_err() => {
                format!("Invalid pagination data: '{}' must be a number", case_mapping("start"))
            }
            _ => String::new(),
        }
    }

    fn allowed_pagination_keys(&self) -> Vec<String> {
        vec!["start".to_string()]
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

/// Turn a `json!` object into a record
pub fn record(value: serde_json::Value) -> Record {
    value.as_object().cloned().unwrap_or_default()
}
