//! Configuration for a model registry
//!
//! Provides a builder pattern for the registry-wide defaults that individual
//! columns fall back to when they do not configure a value themselves.

use chrono::{FixedOffset, Offset, Utc};

use crate::query::JoinType;

/// Registry-wide column defaults
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Parent-walk limit for category trees (default: 100)
    pub tree_max_iterations: usize,
    /// Value stored when a non-strict `created_by` source lacks its key (default: "N/A")
    pub created_by_placeholder: String,
    /// Zone for timezone-aware datetime columns without their own (default: UTC)
    pub timezone: FixedOffset,
    /// Join type for belongs-to columns without their own (default: LEFT)
    pub relationship_join_type: JoinType,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfigBuilder::new().build()
    }
}

impl RegistryConfig {
    /// Create a new configuration builder
    pub fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder::new()
    }
}

/// Builder for RegistryConfig
#[derive(Debug)]
pub struct RegistryConfigBuilder {
    tree_max_iterations: usize,
    created_by_placeholder: String,
    timezone: FixedOffset,
    relationship_join_type: JoinType,
}

impl Default for RegistryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryConfigBuilder {
    pub fn new() -> Self {
        Self {
            tree_max_iterations: 100,
            created_by_placeholder: "N/A".to_string(),
            timezone: Utc.fix(),
            relationship_join_type: JoinType::Left,
        }
    }

    /// Set the category tree parent-walk limit (default: 100)
    pub fn tree_max_iterations(mut self, max_iterations: usize) -> Self {
        self.tree_max_iterations = max_iterations;
        self
    }

    /// Set the placeholder for missing non-strict `created_by` keys (default: "N/A")
    pub fn created_by_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.created_by_placeholder = placeholder.into();
        self
    }

    /// Set the default timezone (default: UTC)
    pub fn timezone(mut self, timezone: FixedOffset) -> Self {
        self.timezone = timezone;
        self
    }

    /// Set the default belongs-to join type (default: LEFT)
    pub fn relationship_join_type(mut self, join_type: JoinType) -> Self {
        self.relationship_join_type = join_type;
        self
    }

    /// Build the configuration
    pub fn build(self) -> RegistryConfig {
        RegistryConfig {
            tree_max_iterations: self.tree_max_iterations,
            created_by_placeholder: self.created_by_placeholder,
            timezone: self.timezone,
            relationship_join_type: self.relationship_join_type,
        }
    }
}
