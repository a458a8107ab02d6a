//! Lazy references to other records.
//!
//! A [`Relation`] stores only the target's identifier. The target is loaded
//! through the storage port on first dereference and memoized. A target that
//! cannot be loaded reads as `None`.

use crate::backend::StoragePort;
use crate::core::{DbError, Result, Value};
use crate::model::{self, ColumnValue, Entity, FieldKind, HydrationContext};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

pub struct Relation<T: Entity> {
    id: Option<String>,
    resolver: Option<Arc<dyn StoragePort>>,
    resolved: OnceLock<Option<Arc<T>>>,
}

impl<T: Entity> Relation<T> {
    /// An unresolved reference to `id`. Without a storage port it never resolves.
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_resolver(Some(id.into()), None)
    }

    /// A reference that is already resolved to `entity`.
    pub fn from_entity(entity: T) -> Result<Self> {
        let id = model::mapping::<T>()?.identity_of(&entity).ok_or_else(|| {
            DbError::ExecutionError(format!("cannot reference a {} without identity", T::FAMILY))
        })?;
        let relation = Self::with_resolver(Some(id), None);
        let _ = relation.resolved.set(Some(Arc::new(entity)));
        Ok(relation)
    }

    fn with_resolver(id: Option<String>, resolver: Option<Arc<dyn StoragePort>>) -> Self {
        Self {
            id,
            resolver,
            resolved: OnceLock::new(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// The target record, loaded on first call.
    pub fn get(&self) -> Option<Arc<T>> {
        self.resolved.get_or_init(|| self.load()).clone()
    }

    fn load(&self) -> Option<Arc<T>> {
        let id = self.id.as_deref()?;
        let Some(port) = self.resolver.as_ref() else {
            debug!(target_family = T::FAMILY, id, "relation has no resolver");
            return None;
        };
        match resolve::<T>(port, id) {
            Ok(Some(entity)) => Some(Arc::new(entity)),
            Ok(None) => {
                debug!(target_family = T::FAMILY, id, "relation target is missing");
                None
            }
            Err(err) => {
                debug!(target_family = T::FAMILY, id, error = %err, "relation did not resolve");
                None
            }
        }
    }
}

fn resolve<T: Entity>(port: &Arc<dyn StoragePort>, id: &str) -> Result<Option<T>> {
    let mapping = model::mapping::<T>()?;
    let Some(record) = port.find(mapping.metadata(), id)? else {
        return Ok(None);
    };
    mapping
        .from_record(record, &HydrationContext::new(port.clone()))
        .map(Some)
}

fn reference_id(value: Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::Reference(id) | Value::Text(id) => Ok((!id.is_empty()).then_some(id)),
        other => Err(DbError::TypeMismatch(format!(
            "expected reference, got {}",
            other.type_name()
        ))),
    }
}

impl<T: Entity> Default for Relation<T> {
    fn default() -> Self {
        Self::with_resolver(None, None)
    }
}

impl<T: Entity> Clone for Relation<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            resolver: self.resolver.clone(),
            resolved: self.resolved.clone(),
        }
    }
}

impl<T: Entity> fmt::Debug for Relation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("family", &T::FAMILY)
            .field("id", &self.id)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl<T: Entity> ColumnValue for Relation<T> {
    fn kind() -> FieldKind {
        FieldKind::Relation { target: T::FAMILY }
    }

    fn to_value(&self) -> Value {
        match &self.id {
            Some(id) => Value::Reference(id.clone()),
            None => Value::Null,
        }
    }

    fn from_value(value: Value, ctx: &HydrationContext) -> Result<Self> {
        Ok(Self::with_resolver(reference_id(value)?, ctx.port().cloned()))
    }
}

/// Ordered references, each resolved on its own when first read.
pub struct RelationList<T: Entity> {
    items: Vec<Relation<T>>,
    resolver: Option<Arc<dyn StoragePort>>,
}

impl<T: Entity> RelationList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn relation(&self, id: String) -> Relation<T> {
        Relation::with_resolver(Some(id), self.resolver.clone())
    }

    pub fn push_id(&mut self, id: impl Into<String>) {
        let relation = self.relation(id.into());
        self.items.push(relation);
    }

    pub fn push(&mut self, entity: T) -> Result<()> {
        self.items.push(Relation::from_entity(entity)?);
        Ok(())
    }

    pub fn insert(&mut self, index: usize, entity: T) -> Result<()> {
        if index > self.items.len() {
            return Err(DbError::ExecutionError(format!(
                "index {} out of bounds for {} relations",
                index,
                self.items.len()
            )));
        }
        self.items.insert(index, Relation::from_entity(entity)?);
        Ok(())
    }

    /// Replaces the reference at `index`.
    pub fn set(&mut self, index: usize, entity: T) -> Result<()> {
        let slot = self.items.get_mut(index).ok_or_else(|| {
            DbError::ExecutionError(format!("no relation at index {}", index))
        })?;
        *slot = Relation::from_entity(entity)?;
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<Relation<T>> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    pub fn get(&self, index: usize) -> Option<Arc<T>> {
        self.items.get(index).and_then(Relation::get)
    }

    pub fn relation_at(&self, index: usize) -> Option<&Relation<T>> {
        self.items.get(index)
    }

    /// Targets in order; each is loaded as the iterator reaches it.
    pub fn iter(&self) -> impl Iterator<Item = Option<Arc<T>>> + '_ {
        self.items.iter().map(Relation::get)
    }

    pub fn ids(&self) -> Vec<String> {
        self.items
            .iter()
            .filter_map(|r| r.id().map(str::to_string))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Entity> Default for RelationList<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            resolver: None,
        }
    }
}

impl<T: Entity> Clone for RelationList<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

impl<T: Entity> fmt::Debug for RelationList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationList")
            .field("family", &T::FAMILY)
            .field("ids", &self.ids())
            .finish()
    }
}

impl<T: Entity> ColumnValue for RelationList<T> {
    fn kind() -> FieldKind {
        FieldKind::RelationList { target: T::FAMILY }
    }

    fn to_value(&self) -> Value {
        Value::ReferenceList(self.ids())
    }

    fn from_value(value: Value, ctx: &HydrationContext) -> Result<Self> {
        let ids: Vec<String> = match value {
            Value::Null => Vec::new(),
            Value::ReferenceList(ids) => ids,
            Value::Text(json) if json.is_empty() => Vec::new(),
            Value::Text(json) => serde_json::from_str(&json)?,
            other => {
                return Err(DbError::TypeMismatch(format!(
                    "expected reference list, got {}",
                    other.type_name()
                )));
            }
        };

        let mut list = Self {
            items: Vec::with_capacity(ids.len()),
            resolver: ctx.port().cloned(),
        };
        for id in ids {
            list.push_id(id);
        }
        Ok(list)
    }
}
