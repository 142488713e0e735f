//! Normalizer: turns nested API payloads into a flat entity table plus root ids.
//!
//! Traversal is driven by the payload. Schemas may relate types in cycles because JSON
//! input is a finite tree, so recursion always bottoms out.

use serde_json::Value;

use crate::errors::NormalizeError;
use crate::models::{Entity, EntityId, EntityTable, Normalized, NormalizedResult};
use crate::schema::Schema;

/// Normalizes payloads against a [`Schema`].
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    schema: &'a Schema,
}

impl<'a> Normalizer<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Normalize `data` whose root records are of type `root`.
    ///
    /// An array yields a many-result in payload order; anything else is treated as a
    /// single record.
    pub fn normalize(&self, data: &Value, root: &str) -> Result<Normalized, NormalizeError> {
        let mut entities = EntityTable::new();

        let result = match data {
            Value::Array(items) => NormalizedResult::Many(
                items
                    .iter()
                    .map(|item| self.visit_entity(root, item, None, None, &mut entities))
                    .collect::<Result<_, _>>()?,
            ),
            _ => NormalizedResult::One(self.visit_entity(root, data, None, None, &mut entities)?),
        };

        tracing::debug!(
            root,
            types = entities.len(),
            roots = result.ids().len(),
            "Payload normalized"
        );

        Ok(Normalized { entities, result })
    }

    fn visit_entity(
        &self,
        entity_key: &str,
        value: &Value,
        parent: Option<&Entity>,
        key: Option<&str>,
        entities: &mut EntityTable,
    ) -> Result<EntityId, NormalizeError> {
        let shaper = self
            .schema
            .shaper(entity_key)
            .ok_or_else(|| NormalizeError::UnknownEntity(entity_key.to_string()))?;

        let raw = value.as_object().ok_or_else(|| NormalizeError::NotAnObject {
            entity: entity_key.to_string(),
            value: value.clone(),
        })?;

        let id_value = raw
            .get(shaper.id_attribute())
            .ok_or_else(|| NormalizeError::MissingId {
                entity: entity_key.to_string(),
                id_attribute: shaper.id_attribute().to_string(),
            })?;
        let id = EntityId::from_value(id_value).ok_or_else(|| NormalizeError::InvalidId {
            entity: entity_key.to_string(),
            value: id_value.clone(),
        })?;

        let mut shaped = shaper.shape(raw, parent, key);

        for (foreign_key, target) in self.schema.relations(entity_key) {
            let Some(nested) = shaped.get(foreign_key).cloned() else {
                continue;
            };
            let resolved = self.visit_relation(target, &nested, &shaped, foreign_key, entities)?;
            shaped.insert(foreign_key.to_string(), resolved);
        }

        // Same record seen twice in one payload: later fields win.
        let table = entities.entry(entity_key.to_string()).or_default();
        match table.get_mut(&id) {
            Some(existing) => existing.extend(shaped),
            None => {
                table.insert(id.clone(), shaped);
            }
        }

        Ok(id)
    }

    fn visit_relation(
        &self,
        target: &str,
        nested: &Value,
        parent: &Entity,
        key: &str,
        entities: &mut EntityTable,
    ) -> Result<Value, NormalizeError> {
        match nested {
            Value::Array(items) => items
                .iter()
                .map(|item| self.visit_relation(target, item, parent, key, entities))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(_) => self
                .visit_entity(target, nested, Some(parent), Some(key), entities)
                .map(|id| id.to_value()),
            // Null or an id the API already flattened.
            other => Ok(other.clone()),
        }
    }
}

/// Normalize `data` against `schema` with `root` as the type of its top-level records.
pub fn normalize(data: &Value, schema: &Schema, root: &str) -> Result<Normalized, NormalizeError> {
    Normalizer::new(schema).normalize(data, root)
}
