use super::column_field::{ColumnField, FieldSpec};
use crate::core::{DbError, Result};
use std::collections::HashSet;

/// Per-record-type column layout. Built once, read many times.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMetadata {
    family: String,
    counter_family: String,
    fields: Vec<ColumnField>,
    identity: usize,
    counters: Vec<usize>,
    indexes: Vec<usize>,
}

impl EntityMetadata {
    pub fn build(family: &str, specs: Vec<FieldSpec>) -> Result<Self> {
        if family.trim().is_empty() {
            return Err(DbError::Configuration(
                "column family name cannot be empty".to_string(),
            ));
        }

        let mut fields = Vec::with_capacity(specs.len());
        let mut seen = HashSet::new();
        for spec in specs {
            let field = ColumnField::from_spec(spec)
                .map_err(|err| DbError::Configuration(format!("{}: {}", family, err)))?;
            if !seen.insert(field.name().to_string()) {
                return Err(DbError::Configuration(format!(
                    "{} maps column '{}' more than once",
                    family,
                    field.name()
                )));
            }
            fields.push(field);
        }

        let identities: Vec<usize> = positions(&fields, ColumnField::is_identity);
        let identity = match identities.as_slice() {
            [single] => *single,
            [] => {
                return Err(DbError::Configuration(format!(
                    "{} declares no identity field",
                    family
                )));
            }
            _ => {
                return Err(DbError::Configuration(format!(
                    "{} declares more than one identity field",
                    family
                )));
            }
        };

        let counters = positions(&fields, ColumnField::is_counter);
        let indexes = positions(&fields, ColumnField::is_indexed);

        Ok(Self {
            family: family.to_string(),
            counter_family: format!("{}_Counters", family),
            fields,
            identity,
            counters,
            indexes,
        })
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn counter_family(&self) -> &str {
        &self.counter_family
    }

    pub fn fields(&self) -> &[ColumnField] {
        &self.fields
    }

    /// Case-insensitive lookup by field name or column name.
    pub fn field_for(&self, name: &str) -> Option<&ColumnField> {
        self.fields.iter().find(|field| field.answers_to(name))
    }

    pub fn identity_field(&self) -> &ColumnField {
        &self.fields[self.identity]
    }

    pub fn index_fields(&self) -> impl Iterator<Item = &ColumnField> {
        self.indexes.iter().map(|&i| &self.fields[i])
    }

    pub fn counter_fields(&self) -> impl Iterator<Item = &ColumnField> {
        self.counters.iter().map(|&i| &self.fields[i])
    }

    pub fn counter_field_names(&self) -> Vec<&str> {
        self.counter_fields().map(ColumnField::name).collect()
    }

    pub fn has_counters(&self) -> bool {
        !self.counters.is_empty()
    }

    /// Families of every dictionary-list field, in declaration order.
    pub fn dictionary_families(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter_map(|field| match field.kind() {
                super::FieldKind::DictionaryList { family } => Some(*family),
                _ => None,
            })
            .collect()
    }

    /// Field lookup that reports an unknown name as an error.
    pub fn require_field(&self, name: &str) -> Result<&ColumnField> {
        self.field_for(name)
            .ok_or_else(|| DbError::ColumnNotFound(name.to_string(), self.family.clone()))
    }
}

fn positions(fields: &[ColumnField], predicate: fn(&ColumnField) -> bool) -> Vec<usize> {
    fields
        .iter()
        .enumerate()
        .filter(|(_, field)| predicate(field))
        .map(|(i, _)| i)
        .collect()
}
