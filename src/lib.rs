//! # strata
//!
//! Declarative model columns, a constrained condition grammar and a
//! column-driven save pipeline for backend-agnostic records.
//!
//! Models are described by a [`ModelSchema`] of typed [`Column`]s and stored
//! through a [`Backend`] trait object. The crate never talks to storage
//! itself: it validates input, builds immutable [`Query`] values, encodes
//! data for the backend and keeps relationships in sync around each save.
//!
//! ## Features
//!
//! - **Column Pipeline**: Every save runs `pre_save`, the backend write, `post_save` and `save_finished` per column in definition order
//! - **Condition Grammar**: Strings like `age>=18` or `status IN ('a','b')` parse into structured conditions with placeholder templates
//! - **Immutable Queries**: Each refinement returns a new query, so base queries can be branched safely
//! - **Relationships**: Belongs-to, has-many, many-to-many (with or without pivot data) and flattened category trees
//! - **N+1 Avoidance**: Parent columns can be joined and selected with the main query
//! - **Validators**: Required, length, value, uniqueness and date validators with user-facing messages
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use serde_json::json;
//! use strata::{Column, ModelSchema, Registry, RegistryConfig};
//! use strata::validators::{MaximumLength, Required};
//!
//! let user = ModelSchema::new("User")
//!     .column(Column::integer("id"))
//!     .column(Column::string("name").validator(Required).validator(MaximumLength(255)))
//!     .column(Column::created("created_at"));
//!
//! // `my_backend` is any `Arc<dyn Backend>`
//! let registry = Registry::builder(RegistryConfig::default())
//!     .model(user, my_backend)
//!     .build()?;
//!
//! let users = registry.models("User")?;
//! let ada = users.create(json!({"name": "Ada"}).as_object().cloned().unwrap_or_default())?;
//! let found = users.filter("name=Ada")?.sort_by("created_at", "desc")?.first()?;
//! ```
//!
//! ## Configuration
//!
//! Registry-wide defaults are set with `RegistryConfig`:
//!
//! ```rust
//! use strata::RegistryConfig;
//! use strata::query::JoinType;
//!
//! let config = RegistryConfig::builder()
//!     .tree_max_iterations(100)                   // Category tree parent-walk limit
//!     .created_by_placeholder("N/A")              // Stored when a non-strict created_by key is missing
//!     .relationship_join_type(JoinType::Left)     // Join type for belongs-to columns
//!     .build();
//! ```

pub mod action;
pub mod backend;
pub mod column;
pub mod config;
pub mod entity;
pub mod error;
pub mod models;
pub mod query;
pub mod registry;
pub mod relationship;
pub mod schema;
pub mod types;
pub mod validators;

// Re-export main types for convenience
pub use action::{Action, ActionHandler, Setable};
pub use backend::{Backend, Capabilities};
pub use column::{Column, ColumnKind, SourceType};
pub use config::{RegistryConfig, RegistryConfigBuilder};
pub use entity::Entity;
pub use error::{OrmError, Result};
pub use models::Models;
pub use query::{Condition, Join, JoinType, Operator, Query, Sort};
pub use registry::{ModelId, Registry, RegistryBuilder, RequestContext};
pub use relationship::{
    BelongsToId, CategoryTree, CategoryTreeChildren, HasMany, LoadStrategy, ManyToManyIds,
    ManyToManyIdsWithData, TreeColumns, TreeScope,
};
pub use schema::ModelSchema;
pub use types::{Record, Value};
