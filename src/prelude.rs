//! Everything a record declaration and its callers usually need.
//!
//! ```ignore
//! use cfmapper::prelude::*;
//! ```

pub use crate::connection::{BackendKind, ConsistencyLevel, StoreConfig};
pub use crate::core::{DbError, Result, Value};
pub use crate::dictionary::{Dictionary, DictionaryFamily, DictionaryList};
pub use crate::facade::{Store, StoreMonitor};
pub use crate::model::{ColumnValue, Entity, EntityDescriptor, FieldDescriptor};
pub use crate::relation::{Relation, RelationList};
pub use crate::result::EntityCursor;
pub use crate::{column_enum, field};
pub use chrono::{DateTime, Utc};
pub use rust_decimal::Decimal;
