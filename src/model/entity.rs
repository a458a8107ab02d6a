//! Statically declared record types.
//!
//! A record type implements [`Entity`] and lists its fields in an
//! [`EntityDescriptor`]. Each [`FieldDescriptor`] pairs the declared column
//! options with a getter/setter pair, so records are read and written without
//! any runtime introspection.
//!
//! ```ignore
//! #[derive(Default)]
//! struct Account {
//!     guid: String,
//!     xp: i64,
//! }
//!
//! impl Entity for Account {
//!     const FAMILY: &'static str = "Account";
//!
//!     fn descriptor() -> EntityDescriptor<Self> {
//!         EntityDescriptor::new()
//!             .field(field!(Self, guid).identity())
//!             .field(field!(Self, xp).counter())
//!     }
//! }
//! ```

use super::column_field::{FieldKind, FieldSpec};
use super::metadata::EntityMetadata;
use crate::backend::StoragePort;
use crate::core::{DbError, Record, Result, Value};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;

/// What hydration hands to field types that need to call back into storage.
#[derive(Clone, Default)]
pub struct HydrationContext {
    port: Option<Arc<dyn StoragePort>>,
}

impl HydrationContext {
    pub fn new(port: Arc<dyn StoragePort>) -> Self {
        Self { port: Some(port) }
    }

    /// A context without storage; relations built from it never resolve.
    pub fn detached() -> Self {
        Self { port: None }
    }

    pub fn port(&self) -> Option<&Arc<dyn StoragePort>> {
        self.port.as_ref()
    }
}

/// Conversion between a native field type and a [`Value`].
pub trait ColumnValue: Sized + Send + Sync + 'static {
    fn kind() -> FieldKind;
    fn to_value(&self) -> Value;
    fn from_value(value: Value, ctx: &HydrationContext) -> Result<Self>;

    /// Whether the field accepts a stored null without substitution.
    fn nullable() -> bool {
        true
    }
}

fn mismatch<T>(expected: &str, value: &Value) -> Result<T> {
    Err(DbError::TypeMismatch(format!(
        "expected {}, got {}",
        expected,
        value.type_name()
    )))
}

impl ColumnValue for String {
    fn kind() -> FieldKind {
        FieldKind::Text
    }

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value, _ctx: &HydrationContext) -> Result<Self> {
        match value {
            Value::Null => Ok(String::new()),
            Value::Text(s) | Value::Reference(s) => Ok(s),
            Value::Dictionaries(_) | Value::ReferenceList(_) => mismatch("text", &value),
            other => Ok(other.to_string()),
        }
    }
}

impl ColumnValue for i64 {
    fn kind() -> FieldKind {
        FieldKind::Integer
    }

    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: Value, _ctx: &HydrationContext) -> Result<Self> {
        if value.is_null() {
            return Ok(0);
        }
        match value.as_i64() {
            Some(i) => Ok(i),
            None => mismatch("integer", &value),
        }
    }

    fn nullable() -> bool {
        false
    }
}

impl ColumnValue for i32 {
    fn kind() -> FieldKind {
        FieldKind::Integer
    }

    fn to_value(&self) -> Value {
        Value::Integer(*self as i64)
    }

    fn from_value(value: Value, _ctx: &HydrationContext) -> Result<Self> {
        if value.is_null() {
            return Ok(0);
        }
        match value.as_i64().map(i32::try_from) {
            Some(Ok(i)) => Ok(i),
            Some(Err(_)) => Err(DbError::Validation(format!("{} overflows i32", value))),
            None => mismatch("integer", &value),
        }
    }

    fn nullable() -> bool {
        false
    }
}

impl ColumnValue for f64 {
    fn kind() -> FieldKind {
        FieldKind::Float
    }

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: Value, _ctx: &HydrationContext) -> Result<Self> {
        if value.is_null() {
            return Ok(0.0);
        }
        match value.as_f64() {
            Some(f) => Ok(f),
            None => mismatch("float", &value),
        }
    }

    fn nullable() -> bool {
        false
    }
}

impl ColumnValue for bool {
    fn kind() -> FieldKind {
        FieldKind::Boolean
    }

    fn to_value(&self) -> Value {
        Value::Boolean(*self)
    }

    fn from_value(value: Value, _ctx: &HydrationContext) -> Result<Self> {
        match value {
            Value::Null => Ok(false),
            Value::Boolean(b) => Ok(b),
            Value::Integer(i) => Ok(i != 0),
            Value::Text(ref s) => s
                .parse()
                .map_err(|_| DbError::Validation(format!("'{}' is not a boolean", s))),
            other => mismatch("boolean", &other),
        }
    }

    fn nullable() -> bool {
        false
    }
}

impl ColumnValue for Decimal {
    fn kind() -> FieldKind {
        FieldKind::Decimal
    }

    fn to_value(&self) -> Value {
        Value::Decimal(*self)
    }

    fn from_value(value: Value, _ctx: &HydrationContext) -> Result<Self> {
        if value.is_null() {
            return Ok(Decimal::ZERO);
        }
        match value.as_decimal() {
            Some(d) => Ok(d),
            None => Err(DbError::Validation(format!("'{}' is not a decimal", value))),
        }
    }

    fn nullable() -> bool {
        false
    }
}

impl ColumnValue for DateTime<Utc> {
    fn kind() -> FieldKind {
        FieldKind::Timestamp
    }

    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }

    fn from_value(value: Value, _ctx: &HydrationContext) -> Result<Self> {
        match value {
            Value::Null => Ok(DateTime::<Utc>::default()),
            Value::Timestamp(ts) => Ok(ts),
            Value::Integer(millis) => DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| DbError::Validation(format!("{} is out of range", millis))),
            Value::Text(ref s) => DateTime::parse_from_rfc3339(s)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|err| DbError::Validation(err.to_string())),
            other => mismatch("timestamp", &other),
        }
    }
}

impl<V: ColumnValue> ColumnValue for Option<V> {
    fn kind() -> FieldKind {
        V::kind()
    }

    fn to_value(&self) -> Value {
        match self {
            Some(inner) => inner.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value, ctx: &HydrationContext) -> Result<Self> {
        if value.is_null() {
            return Ok(None);
        }
        V::from_value(value, ctx).map(Some)
    }
}

/// Implements [`ColumnValue`] for a fieldless enum, stored by variant name.
#[macro_export]
macro_rules! column_enum {
    ($ty:ty { $($variant:ident),+ $(,)? }) => {
        impl $crate::model::ColumnValue for $ty {
            fn kind() -> $crate::model::FieldKind {
                $crate::model::FieldKind::Enum
            }

            fn to_value(&self) -> $crate::core::Value {
                let name = match self {
                    $(Self::$variant => stringify!($variant),)+
                };
                $crate::core::Value::Text(name.to_string())
            }

            fn from_value(
                value: $crate::core::Value,
                _ctx: &$crate::model::HydrationContext,
            ) -> $crate::core::Result<Self> {
                match value.as_str() {
                    $(Some(stringify!($variant)) => Ok(Self::$variant),)+
                    _ => Err($crate::core::DbError::Validation(format!(
                        "'{}' is not a variant of {}",
                        value,
                        stringify!($ty)
                    ))),
                }
            }
        }
    };
}

trait FieldAccess<T>: Send + Sync {
    fn read(&self, entity: &T) -> Value;
    fn write(&self, entity: &mut T, value: Value, ctx: &HydrationContext) -> Result<()>;
}

struct Accessor<T, V> {
    get: fn(&T) -> &V,
    get_mut: fn(&mut T) -> &mut V,
}

impl<T: 'static, V: ColumnValue> FieldAccess<T> for Accessor<T, V> {
    fn read(&self, entity: &T) -> Value {
        (self.get)(entity).to_value()
    }

    fn write(&self, entity: &mut T, value: Value, ctx: &HydrationContext) -> Result<()> {
        *(self.get_mut)(entity) = V::from_value(value, ctx)?;
        Ok(())
    }
}

/// Field of an embedded base struct, reached through the owner.
struct Embedded<T, B> {
    inner: Arc<dyn FieldAccess<B>>,
    get: fn(&T) -> &B,
    get_mut: fn(&mut T) -> &mut B,
}

impl<T: 'static, B: 'static> FieldAccess<T> for Embedded<T, B> {
    fn read(&self, entity: &T) -> Value {
        self.inner.read((self.get)(entity))
    }

    fn write(&self, entity: &mut T, value: Value, ctx: &HydrationContext) -> Result<()> {
        self.inner.write((self.get_mut)(entity), value, ctx)
    }
}

pub struct FieldDescriptor<T> {
    spec: FieldSpec,
    access: Arc<dyn FieldAccess<T>>,
}

impl<T: 'static> FieldDescriptor<T> {
    pub fn new<V: ColumnValue>(
        field_name: &'static str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> Self {
        let mut spec = FieldSpec::new(field_name, V::kind());
        spec.allow_null = V::nullable();
        Self {
            spec,
            access: Arc::new(Accessor { get, get_mut }),
        }
    }

    pub fn identity(mut self) -> Self {
        self.spec.identity = true;
        self
    }

    /// Overrides the physical column name.
    pub fn column(mut self, name: &str) -> Self {
        self.spec.column = Some(name.to_string());
        self
    }

    pub fn counter(mut self) -> Self {
        self.spec.counter = true;
        self
    }

    /// A decimal counter stored as integer ticks of `10^-scale`.
    pub fn decimal_counter(mut self, scale: u32) -> Self {
        self.spec.counter = true;
        self.spec.scale = Some(scale);
        self
    }

    pub fn indexed(mut self) -> Self {
        self.spec.indexed = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.spec.allow_null = false;
        self
    }

    pub fn spec(&self) -> &FieldSpec {
        &self.spec
    }
}

/// Builds a [`FieldDescriptor`] for a named struct field.
#[macro_export]
macro_rules! field {
    ($entity:ty, $name:ident) => {
        $crate::model::FieldDescriptor::<$entity>::new(
            stringify!($name),
            |entity| &entity.$name,
            |entity| &mut entity.$name,
        )
    };
}

pub struct EntityDescriptor<T> {
    fields: Vec<FieldDescriptor<T>>,
}

impl<T: 'static> Default for EntityDescriptor<T> {
    fn default() -> Self {
        Self { fields: Vec::new() }
    }
}

impl<T: 'static> EntityDescriptor<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: FieldDescriptor<T>) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds every field of an embedded base struct.
    pub fn embed<B: 'static>(
        mut self,
        base: EntityDescriptor<B>,
        get: fn(&T) -> &B,
        get_mut: fn(&mut T) -> &mut B,
    ) -> Self {
        for field in base.fields {
            self.fields.push(FieldDescriptor {
                spec: field.spec,
                access: Arc::new(Embedded {
                    inner: field.access,
                    get,
                    get_mut,
                }),
            });
        }
        self
    }

    pub fn fields(&self) -> &[FieldDescriptor<T>] {
        &self.fields
    }
}

/// A record type mapped onto one column family.
pub trait Entity: Default + Send + Sync + 'static {
    const FAMILY: &'static str;

    fn descriptor() -> EntityDescriptor<Self>;
}

/// Metadata plus accessors for one record type.
pub struct EntityMapping<T> {
    metadata: Arc<EntityMetadata>,
    descriptor: EntityDescriptor<T>,
}

impl<T: Entity> EntityMapping<T> {
    pub fn build() -> Result<Self> {
        let descriptor = T::descriptor();
        let specs = descriptor.fields.iter().map(|f| f.spec.clone()).collect();
        let metadata = EntityMetadata::build(T::FAMILY, specs)?;
        Ok(Self {
            metadata: Arc::new(metadata),
            descriptor,
        })
    }

    pub fn metadata(&self) -> &Arc<EntityMetadata> {
        &self.metadata
    }

    fn identity_access(&self) -> &FieldDescriptor<T> {
        let column = self.metadata.identity_field().name();
        let position = self
            .metadata
            .fields()
            .iter()
            .position(|field| field.name() == column)
            .unwrap_or(0);
        &self.descriptor.fields[position]
    }

    /// Identity of `entity`, or `None` when it is still blank.
    pub fn identity_of(&self, entity: &T) -> Option<String> {
        match self.identity_access().access.read(entity) {
            Value::Null => None,
            value => {
                let id = value.to_string();
                if id.trim().is_empty() { None } else { Some(id) }
            }
        }
    }

    pub fn assign_identity(&self, entity: &mut T, id: &str) -> Result<()> {
        self.identity_access().access.write(
            entity,
            Value::Text(id.to_string()),
            &HydrationContext::detached(),
        )
    }

    pub fn to_record(&self, entity: &T) -> Result<Record> {
        let key = self.identity_of(entity).ok_or_else(|| {
            DbError::ExecutionError(format!(
                "{} has no value for identity '{}'",
                self.metadata.family(),
                self.metadata.identity_field().field_name()
            ))
        })?;

        let mut record = Record::new(key);
        for (column, field) in self.metadata.fields().iter().zip(&self.descriptor.fields) {
            record.set(column.name(), field.access.read(entity));
        }
        Ok(record)
    }

    /// Builds a record instance from stored values.
    ///
    /// A value that cannot be converted leaves the field at its default and is
    /// logged, except on the identity field where it is an error.
    pub fn from_record(&self, record: Record, ctx: &HydrationContext) -> Result<T> {
        let mut entity = T::default();
        let mut values = record.values;
        for (column, field) in self.metadata.fields().iter().zip(&self.descriptor.fields) {
            let value = match values.remove(column.name()) {
                Some(value) => column.parse_value(value),
                None if column.is_identity() => Value::Text(record.key.clone()),
                None => continue,
            };

            if let Err(err) = field.access.write(&mut entity, value, ctx) {
                if column.is_identity() {
                    return Err(err);
                }
                warn!(
                    family = self.metadata.family(),
                    row = %record.key,
                    column = column.name(),
                    error = %err,
                    "falling back to default value"
                );
            }
        }
        Ok(entity)
    }
}
