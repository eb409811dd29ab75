//! Column definitions
//!
//! A [`Column`] is configuration plus behavior for one field of a model. It
//! never holds per-record data: entities keep their own data maps and call
//! into their columns to decode values, encode them for the backend, validate
//! input and run the save lifecycle.
//!
//! The kind-specific behavior is selected by [`ColumnKind`]; the shared
//! configuration (defaults, setable values, validators, change actions and
//! `created_by` extraction) lives on [`Column`] itself.

mod lifecycle;
mod scalar;
mod search;
mod temporal;

use std::sync::Arc;

use chrono::FixedOffset;

use crate::action::{Action, Setable};
use crate::config::RegistryConfig;
use crate::error::{OrmError, Result};
use crate::registry::Registry;
use crate::relationship::{
    BelongsToId, CategoryTree, CategoryTreeChildren, HasMany, ManyToManyIds,
    ManyToManyIdsWithData, TreeScope,
};
use crate::types::{Record, Value};
use crate::validators::Validator;

pub use temporal::{
    AutoTimestamp, DateSettings, DatetimeSettings, ParsedDatetime, TimestampSettings, parse_datetime,
};

// ============================================================================
// Configuration types
// ============================================================================

/// Where a `created_by` column pulls its value from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    AuthorizationData,
    HttpHeader,
    RoutingData,
    /// The client's IP address; takes no key
    ClientIp,
    /// The `User-Agent` request header; takes no key
    UserAgent,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::AuthorizationData => "authorization_data",
            SourceType::HttpHeader => "http_header",
            SourceType::RoutingData => "routing_data",
            SourceType::ClientIp => "client_ip",
            SourceType::UserAgent => "user_agent",
        }
    }

    /// Whether the source needs a key to look the value up
    pub fn is_keyed(&self) -> bool {
        !matches!(self, SourceType::ClientIp | SourceType::UserAgent)
    }
}

/// Fill a column from the request context when a record is created
#[derive(Debug, Clone)]
pub struct CreatedBy {
    pub source: SourceType,
    pub key: String,
    /// Fail the save when the key is missing (otherwise store the placeholder)
    pub strict: bool,
}

/// The kind of a column and its kind-specific configuration
#[derive(Debug, Clone)]
pub enum ColumnKind {
    String,
    Integer,
    Float,
    Boolean {
        on_true: Vec<Action>,
        on_false: Vec<Action>,
    },
    /// A string restricted to a list of allowed values
    Select(Vec<String>),
    /// A phone number, stored as digits only
    Phone {
        usa_only: bool,
    },
    Uuid,
    Json,
    Date(DateSettings),
    Datetime(DatetimeSettings),
    Timestamp(TimestampSettings),
    BelongsToId(BelongsToId),
    HasMany(HasMany),
    ManyToManyIds(ManyToManyIds),
    ManyToManyIdsWithData(ManyToManyIdsWithData),
    CategoryTree(CategoryTree),
    CategoryTreeChildren(CategoryTreeChildren),
}

impl ColumnKind {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnKind::String => "String",
            ColumnKind::Integer => "Integer",
            ColumnKind::Float => "Float",
            ColumnKind::Boolean { .. } => "Boolean",
            ColumnKind::Select(_) => "Select",
            ColumnKind::Phone { .. } => "Phone",
            ColumnKind::Uuid => "Uuid",
            ColumnKind::Json => "Json",
            ColumnKind::Date(_) => "Date",
            ColumnKind::Datetime(settings) => match settings.auto {
                Some(AutoTimestamp::Created) => "Created",
                Some(AutoTimestamp::Updated) => "Updated",
                None => "Datetime",
            },
            ColumnKind::Timestamp(_) => "Timestamp",
            ColumnKind::BelongsToId(_) => "BelongsToId",
            ColumnKind::HasMany(_) => "HasMany",
            ColumnKind::ManyToManyIds(_) => "ManyToManyIds",
            ColumnKind::ManyToManyIdsWithData(_) => "ManyToManyIdsWithData",
            ColumnKind::CategoryTree(_) => "CategoryTree",
            ColumnKind::CategoryTreeChildren(_) => "CategoryTreeChildren",
        }
    }
}

// ============================================================================
// Column
// ============================================================================

/// A column definition
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    /// Value used on create when the save data does not set one
    pub default: Option<serde_json::Value>,
    /// Value that always overwrites the save data
    pub setable: Option<Setable>,
    pub is_readable: bool,
    pub is_writeable: bool,
    pub is_searchable: bool,
    /// Temporary columns flow through the lifecycle but are never sent to the backend
    pub is_temporary: bool,
    pub validators: Vec<Arc<dyn Validator>>,
    pub on_change_pre_save: Vec<Action>,
    pub on_change_post_save: Vec<Action>,
    pub on_change_save_finished: Vec<Action>,
    /// Run before the record is deleted from the backend
    pub on_pre_delete: Vec<Action>,
    pub on_post_delete: Vec<Action>,
    pub created_by: Option<CreatedBy>,
    /// Owning model, filled in when the registry finalizes the column
    pub model_name: String,
}

impl Column {
    /// Create a column of the given kind with the shared defaults
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            setable: None,
            is_readable: true,
            is_writeable: true,
            is_searchable: true,
            is_temporary: false,
            validators: Vec::new(),
            on_change_pre_save: Vec::new(),
            on_change_post_save: Vec::new(),
            on_change_save_finished: Vec::new(),
            on_pre_delete: Vec::new(),
            on_post_delete: Vec::new(),
            created_by: None,
            model_name: String::new(),
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(
            name,
            ColumnKind::Boolean {
                on_true: Vec::new(),
                on_false: Vec::new(),
            },
        )
    }

    pub fn select<S: Into<String>>(name: impl Into<String>, allowed_values: impl IntoIterator<Item = S>) -> Self {
        Self::new(
            name,
            ColumnKind::Select(allowed_values.into_iter().map(Into::into).collect()),
        )
    }

    /// A phone number limited to US numbers unless [`usa_only`](Self::usa_only) is turned off
    pub fn phone(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Phone { usa_only: true })
    }

    /// The client's IP address, recorded on create; not writeable
    pub fn created_by_ip(name: impl Into<String>) -> Self {
        Self::string(name)
            .created_by(SourceType::ClientIp, "", false)
            .writeable(false)
    }

    /// The request's user agent, recorded on create; not writeable
    pub fn created_by_user_agent(name: impl Into<String>) -> Self {
        Self::string(name)
            .created_by(SourceType::UserAgent, "", false)
            .writeable(false)
    }

    /// A v4 UUID assigned on create; not writeable
    pub fn uuid(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Uuid).writeable(false)
    }

    /// Arbitrary JSON, stored as a serialized string; not searchable
    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Json).searchable(false)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Date(DateSettings::default()))
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Datetime(DatetimeSettings::default()))
    }

    /// A datetime stamped with the current time when the record is created
    pub fn created(name: impl Into<String>) -> Self {
        Self::new(
            name,
            ColumnKind::Datetime(DatetimeSettings {
                auto: Some(AutoTimestamp::Created),
                ..DatetimeSettings::default()
            }),
        )
        .writeable(false)
    }

    /// A datetime stamped with the current time on every save
    pub fn updated(name: impl Into<String>) -> Self {
        Self::new(
            name,
            ColumnKind::Datetime(DatetimeSettings {
                auto: Some(AutoTimestamp::Updated),
                ..DatetimeSettings::default()
            }),
        )
        .writeable(false)
    }

    /// A datetime stored as a unix timestamp
    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Timestamp(TimestampSettings::default()))
    }

    pub fn belongs_to_id(name: impl Into<String>, config: BelongsToId) -> Self {
        Self::new(name, ColumnKind::BelongsToId(config))
    }

    /// Children pointing back at this model; writeable only when the config opts in
    pub fn has_many(name: impl Into<String>, config: HasMany) -> Self {
        let writeable = config.writeable;
        Self::new(name, ColumnKind::HasMany(config))
            .writeable(writeable)
            .searchable(false)
    }

    pub fn many_to_many_ids(name: impl Into<String>, config: ManyToManyIds) -> Self {
        Self::new(name, ColumnKind::ManyToManyIds(config)).searchable(false)
    }

    pub fn many_to_many_ids_with_data(name: impl Into<String>, config: ManyToManyIdsWithData) -> Self {
        Self::new(name, ColumnKind::ManyToManyIdsWithData(config)).searchable(false)
    }

    pub fn category_tree(name: impl Into<String>, config: CategoryTree) -> Self {
        Self::new(name, ColumnKind::CategoryTree(config))
    }

    /// Direct children in the category tree held by `category_tree_column_name`
    pub fn category_tree_children(name: impl Into<String>, category_tree_column_name: impl Into<String>) -> Self {
        Self::tree_relatives(name, category_tree_column_name, TreeScope::Children)
    }

    pub fn category_tree_descendants(
        name: impl Into<String>,
        category_tree_column_name: impl Into<String>,
    ) -> Self {
        Self::tree_relatives(name, category_tree_column_name, TreeScope::Descendants)
    }

    pub fn category_tree_ancestors(
        name: impl Into<String>,
        category_tree_column_name: impl Into<String>,
    ) -> Self {
        Self::tree_relatives(name, category_tree_column_name, TreeScope::Ancestors)
    }

    fn tree_relatives(
        name: impl Into<String>,
        category_tree_column_name: impl Into<String>,
        scope: TreeScope,
    ) -> Self {
        Self::new(
            name,
            ColumnKind::CategoryTreeChildren(CategoryTreeChildren::new(category_tree_column_name, scope)),
        )
        .writeable(false)
        .searchable(false)
    }

    // ========================================================================
    // Builder methods
    // ========================================================================

    pub fn default_value(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn setable(mut self, setable: Setable) -> Self {
        self.setable = Some(setable);
        self
    }

    pub fn readable(mut self, readable: bool) -> Self {
        self.is_readable = readable;
        self
    }

    pub fn writeable(mut self, writeable: bool) -> Self {
        self.is_writeable = writeable;
        self
    }

    pub fn searchable(mut self, searchable: bool) -> Self {
        self.is_searchable = searchable;
        self
    }

    pub fn temporary(mut self) -> Self {
        self.is_temporary = true;
        self
    }

    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    pub fn on_change_pre_save(mut self, action: Action) -> Self {
        self.on_change_pre_save.push(action);
        self
    }

    pub fn on_change_post_save(mut self, action: Action) -> Self {
        self.on_change_post_save.push(action);
        self
    }

    pub fn on_change_save_finished(mut self, action: Action) -> Self {
        self.on_change_save_finished.push(action);
        self
    }

    pub fn on_pre_delete(mut self, action: Action) -> Self {
        self.on_pre_delete.push(action);
        self
    }

    pub fn on_post_delete(mut self, action: Action) -> Self {
        self.on_post_delete.push(action);
        self
    }

    /// Populate the column from the request context on create
    pub fn created_by(mut self, source: SourceType, key: impl Into<String>, strict: bool) -> Self {
        self.created_by = Some(CreatedBy {
            source,
            key: key.into(),
            strict,
        });
        self
    }

    /// Action for a boolean column turning true (no effect on other kinds)
    pub fn on_true(mut self, action: Action) -> Self {
        if let ColumnKind::Boolean { on_true, .. } = &mut self.kind {
            on_true.push(action);
        }
        self
    }

    /// Action for a boolean column turning false (no effect on other kinds)
    pub fn on_false(mut self, action: Action) -> Self {
        if let ColumnKind::Boolean { on_false, .. } = &mut self.kind {
            on_false.push(action);
        }
        self
    }

    /// Accept numbers from outside the US (phone kind)
    pub fn usa_only(mut self, usa_only: bool) -> Self {
        if let ColumnKind::Phone { usa_only: current } = &mut self.kind {
            *current = usa_only;
        }
        self
    }

    /// Format used when sending dates to the backend (date and datetime kinds)
    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        match &mut self.kind {
            ColumnKind::Date(settings) => settings.date_format = format.into(),
            ColumnKind::Datetime(settings) => settings.date_format = format.into(),
            _ => {}
        }
        self
    }

    /// The value the backend stores for "no date" (date and datetime kinds)
    pub fn backend_default(mut self, sentinel: impl Into<String>) -> Self {
        match &mut self.kind {
            ColumnKind::Date(settings) => settings.backend_default = sentinel.into(),
            ColumnKind::Datetime(settings) => settings.backend_default = sentinel.into(),
            _ => {}
        }
        self
    }

    pub fn timezone_aware(mut self, aware: bool) -> Self {
        if let ColumnKind::Datetime(settings) = &mut self.kind {
            settings.timezone_aware = aware;
        }
        self
    }

    pub fn timezone(mut self, timezone: FixedOffset) -> Self {
        if let ColumnKind::Datetime(settings) = &mut self.kind {
            settings.timezone = Some(timezone);
        }
        self
    }

    pub fn include_microseconds(mut self, include: bool) -> Self {
        if let ColumnKind::Timestamp(settings) = &mut self.kind {
            settings.include_microseconds = include;
        }
        self
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn is_unique(&self) -> bool {
        self.validators.iter().any(|v| v.is_unique())
    }

    pub fn is_required(&self) -> bool {
        self.validators.iter().any(|v| v.is_required())
    }

    /// The belongs-to configuration for BelongsToId and CategoryTree columns
    pub fn belongs_to(&self) -> Option<&BelongsToId> {
        match &self.kind {
            ColumnKind::BelongsToId(config) => Some(config),
            ColumnKind::CategoryTree(tree) => Some(&tree.parent),
            _ => None,
        }
    }

    /// Whether the column's value lives somewhere other than its own record
    pub fn is_collection(&self) -> bool {
        matches!(
            self.kind,
            ColumnKind::HasMany(_)
                | ColumnKind::ManyToManyIds(_)
                | ColumnKind::ManyToManyIdsWithData(_)
                | ColumnKind::CategoryTreeChildren(_)
        )
    }

    pub(crate) fn qualified_name(&self) -> String {
        format!("{}.{}", self.model_name, self.name)
    }

    /// Check the configuration and fill in registry defaults
    pub fn finalize(&mut self, model_name: &str, config: &RegistryConfig) -> Result<()> {
        self.model_name = model_name.to_string();

        if self.setable.is_some() && self.created_by.is_some() {
            return Err(OrmError::configuration(format!(
                "Column '{}' sets both 'setable' and 'created_by', but these configurations are mutually exclusive. You can only set one for a given column",
                self.qualified_name()
            )));
        }
        if let Some(created_by) = &self.created_by {
            if created_by.source.is_keyed() && created_by.key.trim().is_empty() {
                return Err(OrmError::configuration(format!(
                    "Column '{}' loads its value from the {} but no key was given",
                    self.qualified_name(),
                    created_by.source.as_str()
                )));
            }
        }

        match &mut self.kind {
            ColumnKind::Datetime(settings) => {
                settings.timezone.get_or_insert(config.timezone);
            }
            ColumnKind::BelongsToId(belongs_to) => belongs_to.finalize(config),
            ColumnKind::CategoryTree(tree) => tree.finalize(config),
            ColumnKind::Select(allowed) if allowed.is_empty() => {
                return Err(OrmError::configuration(format!(
                    "Select column '{}' needs at least one allowed value",
                    self.qualified_name()
                )));
            }
            _ => {}
        }
        Ok(())
    }

    // ========================================================================
    // Backend conversion
    // ========================================================================

    /// Decode a raw backend value into an application value
    pub fn from_backend(&self, value: &serde_json::Value) -> Result<Value> {
        match &self.kind {
            ColumnKind::String | ColumnKind::Select(_) | ColumnKind::Uuid | ColumnKind::Phone { .. } => {
                Ok(scalar::string_from_backend(value))
            }
            ColumnKind::Integer => scalar::integer_from_backend(&self.name, value),
            ColumnKind::Float => scalar::float_from_backend(&self.name, value),
            ColumnKind::Boolean { .. } => Ok(Value::Bool(scalar::boolean_from_backend(value))),
            ColumnKind::Json => Ok(scalar::json_from_backend(value)),
            ColumnKind::Date(settings) => Ok(settings.from_backend(&self.name, value)),
            ColumnKind::Datetime(settings) => Ok(settings.from_backend(&self.name, value)),
            ColumnKind::Timestamp(settings) => settings.from_backend(&self.name, value),
            ColumnKind::BelongsToId(_) | ColumnKind::CategoryTree(_) => Ok(Value::from(value.clone())),
            ColumnKind::HasMany(_)
            | ColumnKind::ManyToManyIds(_)
            | ColumnKind::ManyToManyIdsWithData(_)
            | ColumnKind::CategoryTreeChildren(_) => Ok(Value::from(value.clone())),
        }
    }

    /// Encode this column's value in the save data for the backend
    ///
    /// Leaves the data untouched when the column's key is absent.
    pub fn to_backend(&self, mut data: Record) -> Result<Record> {
        let Some(value) = data.get(&self.name) else {
            return Ok(data);
        };

        let encoded = match &self.kind {
            ColumnKind::String | ColumnKind::Select(_) | ColumnKind::Uuid => {
                Some(scalar::string_to_backend(value))
            }
            ColumnKind::Phone { .. } => Some(scalar::phone_to_backend(value)?),
            ColumnKind::Integer => Some(scalar::integer_to_backend(&self.name, value)?),
            ColumnKind::Float => Some(scalar::float_to_backend(&self.name, value)?),
            ColumnKind::Boolean { .. } => Some(serde_json::Value::Bool(scalar::boolean_from_backend(value))),
            ColumnKind::Json => Some(scalar::json_to_backend(value)?),
            ColumnKind::Date(settings) => Some(settings.to_backend(&self.name, value)?),
            ColumnKind::Datetime(settings) => Some(settings.to_backend(&self.name, value)?),
            ColumnKind::Timestamp(settings) => Some(settings.to_backend(&self.name, value)?),
            ColumnKind::BelongsToId(_) | ColumnKind::CategoryTree(_) => Some(value.clone()),
            ColumnKind::HasMany(_)
            | ColumnKind::ManyToManyIds(_)
            | ColumnKind::ManyToManyIdsWithData(_)
            | ColumnKind::CategoryTreeChildren(_) => None,
        };

        match encoded {
            Some(encoded) => data.insert(self.name.clone(), encoded),
            None => data.remove(&self.name),
        };
        Ok(data)
    }

    /// Semantic equality of two raw values, used for change detection
    pub fn values_match(&self, a: &serde_json::Value, b: &serde_json::Value) -> bool {
        match &self.kind {
            ColumnKind::Date(settings) => {
                temporal::dates_match(a, b, &settings.backend_default)
            }
            ColumnKind::Datetime(settings) => {
                temporal::dates_match(a, b, &settings.backend_default)
            }
            ColumnKind::Integer | ColumnKind::Float => scalar::numbers_match(a, b),
            ColumnKind::Boolean { .. } => {
                scalar::boolean_from_backend(a) == scalar::boolean_from_backend(b)
            }
            _ => a == b,
        }
    }

    /// Kind-specific validation of a single value, returning an error message or ""
    ///
    /// Relationship columns check that the referenced record exists, which is
    /// why this needs the registry.
    pub fn input_error_for_value(
        &self,
        registry: &Arc<Registry>,
        value: &serde_json::Value,
        operator: Option<&str>,
    ) -> Result<String> {
        let error = match &self.kind {
            ColumnKind::String | ColumnKind::Uuid => scalar::string_input_error(value),
            // a fuzzy search only needs a string, not an exact allowed value
            ColumnKind::Select(_) if operator.is_some_and(|op| op.eq_ignore_ascii_case("like")) => {
                scalar::string_input_error(value)
            }
            ColumnKind::Select(allowed) => scalar::select_input_error(&self.name, allowed, value),
            ColumnKind::Phone { usa_only } => scalar::phone_input_error(&self.name, *usa_only, value, operator)?,
            ColumnKind::Integer => scalar::integer_input_error(value),
            ColumnKind::Float => scalar::float_input_error(value),
            ColumnKind::Boolean { .. } => scalar::boolean_input_error(&self.name, value),
            ColumnKind::Date(_) => temporal::date_input_error(value),
            ColumnKind::Datetime(settings) => settings.input_error(value),
            ColumnKind::Timestamp(_) => temporal::timestamp_input_error(&self.name, value),
            ColumnKind::BelongsToId(config) => config.input_error_for_value(self, registry, value)?,
            ColumnKind::CategoryTree(tree) => tree.parent.input_error_for_value(self, registry, value)?,
            ColumnKind::Json
            | ColumnKind::HasMany(_)
            | ColumnKind::ManyToManyIds(_)
            | ColumnKind::ManyToManyIdsWithData(_)
            | ColumnKind::CategoryTreeChildren(_) => String::new(),
        };
        Ok(error)
    }
}
