//! Lifecycle actions and computed column values
//!
//! Columns hold lists of [`Action`]s that run when their value changes. An
//! action is either a closure or a named handler object; both are invoked the
//! same way.

use std::fmt;
use std::sync::Arc;

use crate::entity::Entity;
use crate::error::Result;
use crate::types::Record;

type ActionFn = dyn Fn(&Entity, &Record) -> Result<Option<Record>> + Send + Sync;
type SetableFn = dyn Fn(&Record, &Entity) -> Result<serde_json::Value> + Send + Sync;

/// A reusable, named action
pub trait ActionHandler: Send + Sync + fmt::Debug {
    /// Run the action against the entity being saved
    ///
    /// Returning a record only has an effect from `on_change_pre_save`, where
    /// it is merged into the outgoing save data.
    fn invoke(&self, entity: &Entity, data: &Record) -> Result<Option<Record>>;
}

/// Something to run when a column changes
#[derive(Clone)]
pub enum Action {
    Callback(Arc<ActionFn>),
    Named(Arc<dyn ActionHandler>),
}

impl Action {
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&Entity, &Record) -> Result<Option<Record>> + Send + Sync + 'static,
    {
        Action::Callback(Arc::new(f))
    }

    pub fn named(handler: impl ActionHandler + 'static) -> Self {
        Action::Named(Arc::new(handler))
    }

    pub fn invoke(&self, entity: &Entity, data: &Record) -> Result<Option<Record>> {
        match self {
            Action::Callback(f) => f(entity, data),
            Action::Named(handler) => handler.invoke(entity, data),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Callback(_) => f.write_str("Action::Callback"),
            Action::Named(handler) => f.debug_tuple("Action::Named").field(handler).finish(),
        }
    }
}

/// A value a column is always set to on save
#[derive(Clone)]
pub enum Setable {
    Value(serde_json::Value),
    /// Computed from the outgoing save data and the entity
    Callback(Arc<SetableFn>),
}

impl Setable {
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&Record, &Entity) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        Setable::Callback(Arc::new(f))
    }

    pub fn resolve(&self, data: &Record, entity: &Entity) -> Result<serde_json::Value> {
        match self {
            Setable::Value(value) => Ok(value.clone()),
            Setable::Callback(f) => f(data, entity),
        }
    }
}

impl fmt::Debug for Setable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Setable::Value(value) => f.debug_tuple("Setable::Value").field(value).finish(),
            Setable::Callback(_) => f.write_str("Setable::Callback"),
        }
    }
}
