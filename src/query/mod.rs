//! Query construction
//!
//! Provides the constrained condition and join grammars, sort directives and
//! the immutable [`Query`] accumulator handed to backends.

pub mod builder;
pub mod condition;
pub mod join;
pub mod sanitize;
pub mod sort;

pub use builder::Query;
pub use condition::{Condition, Operator};
pub use join::{Join, JoinType};
pub use sanitize::{quote_identifier, validate_identifier};
pub use sort::{Direction, Sort};
