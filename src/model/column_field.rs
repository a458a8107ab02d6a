use crate::core::{DbError, Result, Value};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;

/// Native type tag of a mapped field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Boolean,
    Decimal,
    Timestamp,
    Enum,
    Relation { target: &'static str },
    RelationList { target: &'static str },
    DictionaryList { family: &'static str },
}

impl FieldKind {
    pub fn is_relation(&self) -> bool {
        matches!(self, Self::Relation { .. } | Self::RelationList { .. })
    }

    pub fn is_dictionary(&self) -> bool {
        matches!(self, Self::DictionaryList { .. })
    }

    /// Kinds that may back a counter column.
    pub fn supports_counter(&self) -> bool {
        matches!(self, Self::Integer | Self::Decimal)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "TEXT"),
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Decimal => write!(f, "DECIMAL"),
            Self::Timestamp => write!(f, "TIMESTAMP"),
            Self::Enum => write!(f, "ENUM"),
            Self::Relation { target } => write!(f, "RELATION<{}>", target),
            Self::RelationList { target } => write!(f, "RELATION_LIST<{}>", target),
            Self::DictionaryList { family } => write!(f, "DICTIONARIES<{}>", family),
        }
    }
}

/// Declared options of one field, before validation.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub field_name: &'static str,
    pub kind: FieldKind,
    pub column: Option<String>,
    pub identity: bool,
    pub counter: bool,
    pub scale: Option<u32>,
    pub allow_null: bool,
    pub indexed: bool,
}

impl FieldSpec {
    pub fn new(field_name: &'static str, kind: FieldKind) -> Self {
        Self {
            field_name,
            kind,
            column: None,
            identity: false,
            counter: false,
            scale: None,
            allow_null: true,
            indexed: false,
        }
    }
}

/// Validated metadata of one mapped field plus its value coercions.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnField {
    name: String,
    field_name: &'static str,
    kind: FieldKind,
    identity: bool,
    counter: bool,
    scale: u32,
    allow_null: bool,
    indexed: bool,
}

impl ColumnField {
    pub fn from_spec(spec: FieldSpec) -> Result<Self> {
        let name = match &spec.column {
            Some(column) if !column.trim().is_empty() => column.trim().to_uppercase(),
            _ => spec.field_name.to_uppercase(),
        };

        if spec.counter && !spec.kind.supports_counter() {
            return Err(DbError::Configuration(format!(
                "counter field '{}' must be an integer or decimal, found {}",
                spec.field_name, spec.kind
            )));
        }

        let scale = if spec.counter && spec.kind == FieldKind::Decimal {
            match spec.scale {
                Some(scale) if scale <= 18 => scale,
                Some(scale) => {
                    return Err(DbError::Configuration(format!(
                        "decimal counter '{}' declares unsupported scale {}",
                        spec.field_name, scale
                    )));
                }
                None => {
                    return Err(DbError::Configuration(format!(
                        "decimal counter '{}' must declare a scale",
                        spec.field_name
                    )));
                }
            }
        } else {
            0
        };

        if spec.identity && spec.counter {
            return Err(DbError::Configuration(format!(
                "identity field '{}' cannot be a counter",
                spec.field_name
            )));
        }

        Ok(Self {
            name,
            field_name: spec.field_name,
            kind: spec.kind,
            identity: spec.identity,
            counter: spec.counter,
            scale,
            allow_null: spec.allow_null,
            indexed: spec.indexed,
        })
    }

    /// Physical column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_name(&self) -> &'static str {
        self.field_name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_identity(&self) -> bool {
        self.identity
    }

    pub fn is_counter(&self) -> bool {
        self.counter
    }

    pub fn is_decimal_counter(&self) -> bool {
        self.counter && self.kind == FieldKind::Decimal
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn allow_null(&self) -> bool {
        self.allow_null
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Matches either the field name or the column name, ignoring case.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name) || self.field_name.eq_ignore_ascii_case(name)
    }

    /// Converts a raw stored value into the field's logical value.
    ///
    /// Decimal counters turn integer ticks into `ticks / 10^scale`, rounding
    /// toward zero. A null raw value on a field that does not allow null
    /// becomes the kind's zero value.
    pub fn parse_value(&self, raw: Value) -> Value {
        if self.is_decimal_counter() {
            if let Some(ticks) = raw.as_i64() {
                return Value::Decimal(self.ticks_to_decimal(ticks));
            }
        }

        if raw.is_null() && !self.allow_null {
            return self.zero_value();
        }
        raw
    }

    /// Converts a caller-supplied value into the field's native kind before it
    /// is stored or compared against an index. Counter values pass through
    /// untouched; `to_ticks` handles them.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        if value.is_null() || self.counter {
            return Ok(value);
        }

        let coerced = match (&self.kind, value) {
            (FieldKind::Integer, Value::Integer(i)) => Some(Value::Integer(i)),
            (FieldKind::Integer, value @ (Value::Float(_) | Value::Decimal(_) | Value::Text(_))) => {
                value.as_i64().map(Value::Integer)
            }
            (FieldKind::Float, Value::Float(f)) => Some(Value::Float(f)),
            (FieldKind::Float, value @ (Value::Integer(_) | Value::Decimal(_) | Value::Text(_))) => {
                value.as_f64().map(Value::Float)
            }
            (FieldKind::Decimal, Value::Decimal(d)) => Some(Value::Decimal(d)),
            (FieldKind::Decimal, value @ (Value::Integer(_) | Value::Float(_) | Value::Text(_))) => {
                value.as_decimal().map(Value::Decimal)
            }
            (FieldKind::Text | FieldKind::Enum, Value::Text(s) | Value::Reference(s)) => {
                Some(Value::Text(s))
            }
            (
                FieldKind::Text | FieldKind::Enum,
                value @ (Value::Integer(_) | Value::Float(_) | Value::Decimal(_) | Value::Boolean(_)),
            ) => Some(Value::Text(value.to_string())),
            (FieldKind::Text, Value::Timestamp(ts)) => Some(Value::Text(ts.to_rfc3339())),
            (FieldKind::Boolean, Value::Boolean(b)) => Some(Value::Boolean(b)),
            (FieldKind::Boolean, Value::Integer(i)) if i == 0 || i == 1 => Some(Value::Boolean(i == 1)),
            (FieldKind::Boolean, Value::Text(s)) => s.trim().parse().ok().map(Value::Boolean),
            (FieldKind::Timestamp, Value::Timestamp(ts)) => Some(Value::Timestamp(ts)),
            (FieldKind::Timestamp, Value::Integer(millis)) => {
                DateTime::from_timestamp_millis(millis).map(Value::Timestamp)
            }
            (FieldKind::Timestamp, Value::Text(s)) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|ts| Value::Timestamp(ts.with_timezone(&Utc))),
            (FieldKind::Relation { .. }, Value::Reference(id) | Value::Text(id)) => {
                Some(Value::Reference(id))
            }
            (FieldKind::Relation { .. }, Value::Integer(i)) => Some(Value::Reference(i.to_string())),
            (FieldKind::RelationList { .. }, Value::ReferenceList(ids)) => Some(Value::ReferenceList(ids)),
            (FieldKind::RelationList { .. }, Value::Text(json)) => {
                Some(Value::ReferenceList(serde_json::from_str(&json)?))
            }
            (FieldKind::DictionaryList { .. }, Value::Dictionaries(dicts)) => {
                Some(Value::Dictionaries(dicts))
            }
            (_, value) => {
                return Err(self.mismatch(&value));
            }
        };

        coerced.ok_or_else(|| {
            DbError::TypeMismatch(format!("'{}' cannot hold the given value as {}", self.name, self.kind))
        })
    }

    fn mismatch(&self, value: &Value) -> DbError {
        DbError::TypeMismatch(format!(
            "'{}' is {}, got {}",
            self.name,
            self.kind,
            value.type_name()
        ))
    }

    /// Converts a logical value into integer ticks, truncating extra precision.
    pub fn to_ticks(&self, value: &Value) -> Result<i64> {
        if value.is_null() {
            return Ok(0);
        }

        if self.kind == FieldKind::Decimal {
            let decimal = value.as_decimal().ok_or_else(|| {
                DbError::TypeMismatch(format!(
                    "'{}' expects a decimal, got {}",
                    self.name,
                    value.type_name()
                ))
            })?;
            let factor = Decimal::from(10i64.pow(self.scale));
            let scaled = decimal.checked_mul(factor).ok_or_else(|| {
                DbError::TypeMismatch(format!("'{}' overflows at scale {}", self.name, self.scale))
            })?;
            return scaled.trunc().to_i64().ok_or_else(|| {
                DbError::TypeMismatch(format!("'{}' does not fit in a counter", self.name))
            });
        }

        value.as_i64().ok_or_else(|| {
            DbError::TypeMismatch(format!(
                "'{}' expects an integer, got {}",
                self.name,
                value.type_name()
            ))
        })
    }

    pub fn zero_value(&self) -> Value {
        match self.kind {
            FieldKind::Integer => Value::Integer(0),
            FieldKind::Float => Value::Float(0.0),
            FieldKind::Boolean => Value::Boolean(false),
            FieldKind::Text => Value::Text(String::new()),
            FieldKind::Decimal => Value::Decimal(Decimal::new(0, self.scale)),
            FieldKind::RelationList { .. } => Value::ReferenceList(Vec::new()),
            FieldKind::DictionaryList { .. } => Value::Dictionaries(Vec::new()),
            FieldKind::Timestamp | FieldKind::Enum | FieldKind::Relation { .. } => Value::Null,
        }
    }

    fn ticks_to_decimal(&self, ticks: i64) -> Decimal {
        Decimal::from_i128_with_scale(ticks as i128, self.scale)
            .round_dp_with_strategy(self.scale, RoundingStrategy::ToZero)
    }
}
