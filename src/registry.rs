//! Registry - the entry point tying schemas to backends
//!
//! Models are registered in two phases. [`RegistryBuilder::model`] collects
//! schema shells; [`RegistryBuilder::build`] then validates names, resolves
//! every relationship's model name into a [`ModelId`] and finalizes columns.
//! Relationships can therefore reference any registered model, including
//! their own, regardless of registration order.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::backend::Backend;
use crate::column::{ColumnKind, SourceType};
use crate::config::RegistryConfig;
use crate::entity::Entity;
use crate::error::{OrmError, Result};
use crate::models::Models;
use crate::query::validate_identifier;
use crate::schema::ModelSchema;
use crate::types::Record;

/// Handle to a registered model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(usize);

impl ModelId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// Request-scoped data that `created_by` columns read from
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    authorization_data: Record,
    headers: Record,
    routing_data: Record,
    client_ip: Option<serde_json::Value>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_authorization_data(mut self, data: Record) -> Self {
        self.authorization_data = data;
        self
    }

    /// Set the request headers; names are matched case-insensitively
    pub fn with_headers(mut self, headers: Record) -> Self {
        self.headers = headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        self
    }

    pub fn with_routing_data(mut self, data: Record) -> Self {
        self.routing_data = data;
        self
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(serde_json::Value::String(ip.into()));
        self
    }

    /// Look up a value; `key` is ignored by the keyless sources
    pub fn get(&self, source: SourceType, key: &str) -> Option<&serde_json::Value> {
        match source {
            SourceType::AuthorizationData => self.authorization_data.get(key),
            SourceType::HttpHeader => self.headers.get(&key.to_ascii_lowercase()),
            SourceType::RoutingData => self.routing_data.get(key),
            SourceType::ClientIp => self.client_ip.as_ref(),
            SourceType::UserAgent => self.headers.get("user-agent"),
        }
    }
}

#[derive(Debug, Clone)]
struct RegisteredModel {
    schema: Arc<ModelSchema>,
    backend: Arc<dyn Backend>,
}

/// Every registered model with its backend
#[derive(Debug)]
pub struct Registry {
    config: RegistryConfig,
    models: Vec<RegisteredModel>,
    ids: HashMap<String, ModelId>,
    context: RequestContext,
}

impl Registry {
    /// Start registering models
    pub fn builder(config: RegistryConfig) -> RegistryBuilder {
        RegistryBuilder::new(config)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// A handle on the same models that saves with the given request context
    pub fn with_context(&self, context: RequestContext) -> Arc<Registry> {
        Arc::new(Self {
            config: self.config.clone(),
            models: self.models.clone(),
            ids: self.ids.clone(),
            context,
        })
    }

    pub fn model_id(&self, name: &str) -> Result<ModelId> {
        self.ids
            .get(name)
            .copied()
            .ok_or_else(|| OrmError::model_not_found(format!("No model named '{}' is registered", name)))
    }

    pub fn model_names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.schema.name.as_str()).collect()
    }

    /// Schema of a registered model
    ///
    /// Ids only come from this registry (or a context handle cloned from it),
    /// so they always index a registered model.
    pub fn schema(&self, id: ModelId) -> &Arc<ModelSchema> {
        &self.models[id.0].schema
    }

    pub fn backend(&self, id: ModelId) -> &Arc<dyn Backend> {
        &self.models[id.0].backend
    }

    /// Query set for a model, by name
    pub fn models(self: &Arc<Self>, name: &str) -> Result<Models> {
        Ok(self.models_for(self.model_id(name)?))
    }

    pub fn models_for(self: &Arc<Self>, id: ModelId) -> Models {
        Models::new(Arc::clone(self), id)
    }

    /// A new, unsaved entity of a model
    pub fn empty(self: &Arc<Self>, name: &str) -> Result<Entity> {
        Ok(Entity::from_record(Arc::clone(self), self.model_id(name)?, Record::new()))
    }
}

/// Collects models for a [`Registry`]
#[derive(Debug)]
pub struct RegistryBuilder {
    config: RegistryConfig,
    models: Vec<(ModelSchema, Arc<dyn Backend>)>,
}

impl RegistryBuilder {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            models: Vec::new(),
        }
    }

    /// Register a model with the backend that stores it
    pub fn model(mut self, schema: ModelSchema, backend: Arc<dyn Backend>) -> Self {
        self.models.push((schema, backend));
        self
    }

    /// Resolve relationships, finalize columns and check cross-model references
    pub fn build(self) -> Result<Arc<Registry>> {
        let config = self.config;
        let mut ids = HashMap::new();
        for (index, (schema, _)) in self.models.iter().enumerate() {
            if ids.insert(schema.name.clone(), ModelId(index)).is_some() {
                return Err(OrmError::configuration(format!(
                    "Model '{}' was registered more than once",
                    schema.name
                )));
            }
        }

        let mut schemas = Vec::with_capacity(self.models.len());
        let mut backends = Vec::with_capacity(self.models.len());
        for (mut schema, backend) in self.models {
            check_identifiers(&schema)?;
            let model_name = schema.name.clone();
            for column in &mut schema.columns {
                let referenced_from = format!("{}.{}", model_name, column.name);
                match &mut column.kind {
                    ColumnKind::BelongsToId(config) => config.resolve(&ids, &referenced_from)?,
                    ColumnKind::HasMany(config) => config.resolve(&model_name, &ids, &referenced_from)?,
                    ColumnKind::ManyToManyIds(config) => config.resolve(&model_name, &ids, &referenced_from)?,
                    ColumnKind::ManyToManyIdsWithData(config) => {
                        config.resolve(&model_name, &ids, &referenced_from)?
                    }
                    ColumnKind::CategoryTree(tree) => tree.resolve(&model_name, &ids, &referenced_from)?,
                    _ => {}
                }
                column.finalize(&model_name, &config)?;
            }
            schemas.push(schema);
            backends.push(backend);
        }

        for schema in &schemas {
            check_references(schema, &schemas)?;
        }

        debug!(models = schemas.len(), "Built model registry");
        Ok(Arc::new(Registry {
            config,
            models: schemas
                .into_iter()
                .zip(backends)
                .map(|(schema, backend)| RegisteredModel {
                    schema: Arc::new(schema),
                    backend,
                })
                .collect(),
            ids,
            context: RequestContext::default(),
        }))
    }
}

fn check_identifiers(schema: &ModelSchema) -> Result<()> {
    let invalid = |e: String| OrmError::configuration(format!("Model '{}': {}", schema.name, e));
    validate_identifier(&schema.destination_name).map_err(invalid)?;
    for column in &schema.columns {
        validate_identifier(&column.name).map_err(invalid)?;
    }
    if !schema.has_column(&schema.id_column_name) {
        return Err(OrmError::configuration(format!(
            "Model '{}' has no column for its id '{}'",
            schema.name, schema.id_column_name
        )));
    }
    Ok(())
}

/// Check that columns named by relationships exist on the models they point at
fn check_references(schema: &ModelSchema, schemas: &[ModelSchema]) -> Result<()> {
    let require = |target: &ModelSchema, column_name: &str, column: &str| -> Result<()> {
        if target.has_column(column_name) {
            return Ok(());
        }
        Err(OrmError::configuration(format!(
            "Column '{}.{}' needs column '{}' on model '{}', which does not exist",
            schema.name, column, column_name, target.name
        )))
    };

    for column in &schema.columns {
        match &column.kind {
            ColumnKind::BelongsToId(config) => {
                let parent = &schemas[config.parent.id()?.0];
                for name in &config.readable_parent_columns {
                    require(parent, name, &column.name)?;
                }
            }
            ColumnKind::HasMany(config) => {
                require(&schemas[config.child.id()?.0], config.foreign_column(), &column.name)?;
            }
            ColumnKind::ManyToManyIds(config) => {
                let pivot = &schemas[config.pivot.id()?.0];
                require(pivot, config.own_column(), &column.name)?;
                require(pivot, config.related_column(), &column.name)?;
            }
            ColumnKind::ManyToManyIdsWithData(config) => {
                let pivot = &schemas[config.ids.pivot.id()?.0];
                require(pivot, config.ids.own_column(), &column.name)?;
                require(pivot, config.ids.related_column(), &column.name)?;
            }
            ColumnKind::CategoryTree(tree) => {
                let tree_model = &schemas[tree.tree.id()?.0];
                let columns = &tree.tree_columns;
                for name in [&columns.parent_id, &columns.child_id, &columns.is_parent, &columns.level] {
                    require(tree_model, name, &column.name)?;
                }
            }
            ColumnKind::CategoryTreeChildren(children) => {
                children.tree(schema)?;
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Capabilities;
    use crate::column::Column;
    use crate::query::Query;
    use crate::relationship::{BelongsToId, CategoryTree, ManyToManyIds};
    use serde_json::json;

    #[derive(Debug)]
    struct NullBackend;

    impl Backend for NullBackend {
        fn create(&self, data: &Record, _model: &ModelSchema) -> Result<Record> {
            Ok(data.clone())
        }

        fn update(&self, _id: &serde_json::Value, data: &Record, _model: &ModelSchema) -> Result<Record> {
            Ok(data.clone())
        }

        fn delete(&self, _id: &serde_json::Value, _model: &ModelSchema) -> Result<bool> {
            Ok(true)
        }

        fn count(&self, _query: &Query) -> Result<usize> {
            Ok(0)
        }

        fn records(&self, _query: &Query, _next_page_data: &mut Record) -> Result<Vec<Record>> {
            Ok(Vec::new())
        }

        fn validate_pagination_data(&self, _data: &Record, _case_mapping: &dyn Fn(&str) -> String) -> String {
            String::new()
        }

        fn allowed_pagination_keys(&self) -> Vec<String> {
            Vec::new()
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }
    }

    fn backend() -> Arc<dyn Backend> {
        Arc::new(NullBackend)
    }

    fn user() -> ModelSchema {
        ModelSchema::new("User")
            .column(Column::integer("id"))
            .column(Column::string("name"))
    }

    // =========================================================================
    // Build
    // =========================================================================

    #[test]
    fn test_build_resolves_models_in_any_order() {
        let order = ModelSchema::new("Order")
            .column(Column::integer("id"))
            .column(Column::belongs_to_id(
                "user_id",
                BelongsToId::new("User").readable_parent_columns(["name"]),
            ));
        let registry = Registry::builder(RegistryConfig::default())
            .model(order, backend())
            .model(user(), backend())
            .build()
            .unwrap();

        let order_id = registry.model_id("Order").unwrap();
        let column = registry.schema(order_id).get_column("user_id").unwrap();
        assert_eq!(column.model_name, "Order");
        let parent = column.belongs_to().unwrap();
        assert_eq!(parent.parent.id().unwrap(), registry.model_id("User").unwrap());
    }

    #[test]
    fn test_duplicate_models_are_rejected() {
        let err = Registry::builder(RegistryConfig::default())
            .model(user(), backend())
            .model(user(), backend())
            .build()
            .unwrap_err();
        assert!(matches!(err, OrmError::Configuration(_)));
    }

    #[test]
    fn test_unknown_relationship_target_is_rejected() {
        let order = ModelSchema::new("Order")
            .column(Column::integer("id"))
            .column(Column::belongs_to_id("user_id", BelongsToId::new("Customer")));
        let err = Registry::builder(RegistryConfig::default())
            .model(order, backend())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("'Customer'"));
    }

    #[test]
    fn test_invalid_identifiers_are_rejected() {
        let bad_table = user().table("drop table");
        assert!(Registry::builder(RegistryConfig::default())
            .model(bad_table, backend())
            .build()
            .is_err());

        let bad_column = user().column(Column::string("bad-name"));
        assert!(Registry::builder(RegistryConfig::default())
            .model(bad_column, backend())
            .build()
            .is_err());
    }

    #[test]
    fn test_missing_id_column_is_rejected() {
        let schema = ModelSchema::new("Thing").column(Column::string("name"));
        assert!(Registry::builder(RegistryConfig::default())
            .model(schema, backend())
            .build()
            .is_err());
    }

    #[test]
    fn test_missing_pivot_columns_are_rejected() {
        let product = ModelSchema::new("Product")
            .column(Column::integer("id"))
            .column(Column::many_to_many_ids("tag_ids", ManyToManyIds::new("Tag", "ProductTag")));
        let tag = ModelSchema::new("Tag").column(Column::integer("id"));
        let pivot = ModelSchema::new("ProductTag")
            .column(Column::integer("id"))
            .column(Column::integer("product_id"));
        let err = Registry::builder(RegistryConfig::default())
            .model(product, backend())
            .model(tag, backend())
            .model(pivot, backend())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("'tag_id'"));
    }

    #[test]
    fn test_tree_children_must_point_at_a_tree() {
        let category = ModelSchema::new("Category")
            .column(Column::integer("id"))
            .column(Column::string("name"))
            .column(Column::category_tree_children("children", "name"));
        assert!(Registry::builder(RegistryConfig::default())
            .model(category, backend())
            .build()
            .is_err());
    }

    #[test]
    fn test_category_tree_defaults_to_own_model() {
        let category = ModelSchema::new("Category")
            .column(Column::integer("id"))
            .column(Column::category_tree("parent_id", CategoryTree::new("CategoryTreeRow")))
            .column(Column::category_tree_children("children", "parent_id"));
        let tree = ModelSchema::new("CategoryTreeRow")
            .column(Column::integer("id"))
            .column(Column::integer("parent_id"))
            .column(Column::integer("child_id"))
            .column(Column::integer("is_parent"))
            .column(Column::integer("level"));
        let registry = Registry::builder(RegistryConfig::builder().tree_max_iterations(9).build())
            .model(category, backend())
            .model(tree, backend())
            .build()
            .unwrap();

        let schema = registry.schema(registry.model_id("Category").unwrap());
        match &schema.get_column("parent_id").unwrap().kind {
            ColumnKind::CategoryTree(tree) => {
                assert_eq!(tree.parent.parent.name, "Category");
                assert_eq!(tree.max_iterations, Some(9));
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    #[test]
    fn test_unknown_model_lookup() {
        let registry = Registry::builder(RegistryConfig::default())
            .model(user(), backend())
            .build()
            .unwrap();
        assert!(matches!(registry.models("Nope"), Err(OrmError::ModelNotFound(_))));
        assert!(registry.empty("User").is_ok());
        assert_eq!(registry.model_names(), vec!["User"]);
    }

    #[test]
    fn test_request_context_headers_are_case_insensitive() {
        let mut headers = Record::new();
        headers.insert("X-User-Id".to_string(), json!("u-1"));
        let context = RequestContext::new().with_headers(headers);
        assert_eq!(context.get(SourceType::HttpHeader, "x-user-id"), Some(&json!("u-1")));
        assert_eq!(context.get(SourceType::HttpHeader, "X-USER-ID"), Some(&json!("u-1")));
        assert_eq!(context.get(SourceType::RoutingData, "x-user-id"), None);
    }

    #[test]
    fn test_with_context_keeps_models() {
        let registry = Registry::builder(RegistryConfig::default())
            .model(user(), backend())
            .build()
            .unwrap();
        let mut auth = Record::new();
        auth.insert("sub".to_string(), json!("abc"));
        let scoped = registry.with_context(RequestContext::new().with_authorization_data(auth));
        assert_eq!(scoped.model_id("User").unwrap(), registry.model_id("User").unwrap());
        assert_eq!(scoped.context().get(SourceType::AuthorizationData, "sub"), Some(&json!("abc")));
        assert!(registry.context().get(SourceType::AuthorizationData, "sub").is_none());
    }

    #[test]
    fn test_context_keyless_sources() {
        let mut headers = Record::new();
        headers.insert("User-Agent".to_string(), json!("curl/8.0"));
        let context = RequestContext::new().with_headers(headers).with_client_ip("10.0.0.7");
        assert_eq!(context.get(SourceType::ClientIp, ""), Some(&json!("10.0.0.7")));
        assert_eq!(context.get(SourceType::UserAgent, ""), Some(&json!("curl/8.0")));
        assert!(RequestContext::new().get(SourceType::ClientIp, "").is_none());
    }
}
