use super::entity::{Entity, EntityMapping};
use super::metadata::EntityMetadata;
use crate::core::{DbError, Result};
use lazy_static::lazy_static;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

type AnyMapping = Arc<dyn Any + Send + Sync>;

// Process-wide mapping cache, keyed by record type.
lazy_static! {
    static ref MAPPINGS: RwLock<HashMap<TypeId, AnyMapping>> = RwLock::new(HashMap::new());
}

/// Mapping for `T`, built on first use and cached for the process lifetime.
///
/// Construction happens under the registry's write lock so concurrent first
/// use builds the mapping exactly once.
pub fn mapping<T: Entity>() -> Result<Arc<EntityMapping<T>>> {
    let type_id = TypeId::of::<T>();
    if let Some(found) = MAPPINGS.read()?.get(&type_id) {
        return downcast::<T>(found.clone());
    }

    let mut mappings = MAPPINGS.write()?;
    if let Some(found) = mappings.get(&type_id) {
        return downcast::<T>(found.clone());
    }

    let built = Arc::new(EntityMapping::<T>::build()?);
    debug!(
        family = built.metadata().family(),
        fields = built.metadata().fields().len(),
        "registered entity mapping"
    );
    mappings.insert(type_id, built.clone());
    Ok(built)
}

pub fn metadata<T: Entity>() -> Result<Arc<EntityMetadata>> {
    Ok(mapping::<T>()?.metadata().clone())
}

fn downcast<T: Entity>(mapping: AnyMapping) -> Result<Arc<EntityMapping<T>>> {
    mapping.downcast::<EntityMapping<T>>().map_err(|_| {
        DbError::ExecutionError(format!("registry holds a foreign mapping for {}", T::FAMILY))
    })
}
