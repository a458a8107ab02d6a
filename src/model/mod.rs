pub mod column_field;
pub mod entity;
pub mod metadata;
pub mod registry;

pub use column_field::{ColumnField, FieldKind, FieldSpec};
pub use entity::{
    ColumnValue, Entity, EntityDescriptor, EntityMapping, FieldDescriptor, HydrationContext,
};
pub use metadata::EntityMetadata;
pub use registry::{mapping, metadata};
