//! UpsertReconciler: merges freshly normalized entities into an entity collection.
//!
//! Writes that change nothing are skipped so downstream change detection only fires for
//! real updates. Updates patch the stored record: incoming fields overwrite, fields the
//! incoming record lacks are kept.

use serde::{Deserialize, Serialize};

use crate::models::{Entity, EntityId, EntityMap};

/// Entities of one type with their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityCollection {
    ids: Vec<EntityId>,
    entities: EntityMap,
}

impl EntityCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }

    pub fn entities(&self) -> &EntityMap {
        &self.entities
    }

    /// Insert records whose ids are not present yet; present ids are left alone.
    pub fn add_many(&mut self, batch: Vec<(EntityId, Entity)>) {
        for (id, entity) in batch {
            if self.entities.contains_key(&id) {
                continue;
            }
            self.ids.push(id.clone());
            self.entities.insert(id, entity);
        }
    }

    /// Patch a stored record. Returns false when the id is unknown.
    pub fn update_one(&mut self, id: &EntityId, changes: Entity) -> bool {
        match self.entities.get_mut(id) {
            Some(existing) => {
                existing.extend(changes);
                true
            }
            None => false,
        }
    }

    /// Patch the record if present, insert it otherwise.
    pub fn upsert_one(&mut self, id: EntityId, entity: Entity) {
        if !self.update_one(&id, entity.clone()) {
            self.add_many(vec![(id, entity)]);
        }
    }

    pub fn remove_one(&mut self, id: &EntityId) -> Option<Entity> {
        let removed = self.entities.remove(id)?;
        self.ids.retain(|existing| existing != id);
        Some(removed)
    }
}

/// How an incoming record is compared with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffPolicy {
    /// Compare the incoming record's non-object fields only. Nested objects are assumed
    /// unchanged; arrays and scalars compare by value.
    Shallow,
    /// Whole-record equality.
    Deep,
}

/// Whether writing `incoming` over `existing` would change anything under `policy`.
pub fn has_changes(existing: &Entity, incoming: &Entity, policy: DiffPolicy) -> bool {
    match policy {
        DiffPolicy::Shallow => incoming
            .iter()
            .filter(|(_, value)| !value.is_object())
            .any(|(field, value)| existing.get(field) != Some(value)),
        DiffPolicy::Deep => existing != incoming,
    }
}

/// Ids touched by one upsert call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub added: Vec<EntityId>,
    pub updated: Vec<EntityId>,
    pub skipped: Vec<EntityId>,
}

/// Merge `incoming` using the shallow diff. New records are added in one batch after
/// all updates are applied.
pub fn upsert_many(collection: &mut EntityCollection, incoming: &EntityMap) -> UpsertReport {
    let mut report = UpsertReport::default();
    let mut added = Vec::new();

    for (id, entity) in incoming {
        match collection.get(id) {
            None => added.push((id.clone(), entity.clone())),
            Some(existing) if has_changes(existing, entity, DiffPolicy::Shallow) => {
                collection.update_one(id, entity.clone());
                report.updated.push(id.clone());
            }
            Some(_) => report.skipped.push(id.clone()),
        }
    }

    report.added = added.iter().map(|(id, _)| id.clone()).collect();
    collection.add_many(added);

    tracing::debug!(
        added = report.added.len(),
        updated = report.updated.len(),
        skipped = report.skipped.len(),
        "Entities upserted"
    );
    report
}

/// Write every incoming record without diffing.
pub fn upsert_many_mutably(
    collection: &mut EntityCollection,
    incoming: &EntityMap,
) -> UpsertReport {
    let mut report = UpsertReport::default();
    for (id, entity) in incoming {
        if collection.contains(id) {
            report.updated.push(id.clone());
        } else {
            report.added.push(id.clone());
        }
        collection.upsert_one(id.clone(), entity.clone());
    }
    report
}

/// Write a single record unless it is deep-equal to the stored one.
pub fn upsert_one_mutably(
    collection: &mut EntityCollection,
    id: EntityId,
    entity: Entity,
) -> UpsertReport {
    let mut report = UpsertReport::default();
    match collection.get(&id) {
        Some(existing) if !has_changes(existing, &entity, DiffPolicy::Deep) => {
            report.skipped.push(id);
        }
        Some(_) => {
            report.updated.push(id.clone());
            collection.upsert_one(id, entity);
        }
        None => {
            report.added.push(id.clone());
            collection.upsert_one(id, entity);
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn entity(value: Value) -> Entity {
        value.as_object().cloned().unwrap()
    }

    fn incoming(records: Vec<(i64, Value)>) -> EntityMap {
        records
            .into_iter()
            .map(|(id, value)| (EntityId::Int(id), entity(value)))
            .collect()
    }

    fn seeded() -> EntityCollection {
        let mut collection = EntityCollection::new();
        collection.add_many(vec![(
            EntityId::Int(1),
            entity(json!({"id": 1, "name": "Ann", "meta": {"rank": 1}, "tags": ["a"]})),
        )]);
        collection
    }

    #[test]
    fn test_nested_object_change_is_ignored() {
        let mut collection = seeded();
        let report = upsert_many(
            &mut collection,
            &incoming(vec![(1, json!({"id": 1, "name": "Ann", "meta": {"rank": 99}}))]),
        );

        assert_eq!(report.skipped, vec![EntityId::Int(1)]);
        assert!(report.updated.is_empty());
        assert_eq!(collection.get(&EntityId::Int(1)).unwrap()["meta"], json!({"rank": 1}));
    }

    #[test]
    fn test_scalar_change_triggers_update() {
        let mut collection = seeded();
        let report = upsert_many(
            &mut collection,
            &incoming(vec![(1, json!({"id": 1, "name": "Annie", "meta": {"rank": 2}}))]),
        );

        assert_eq!(report.updated, vec![EntityId::Int(1)]);
        let stored = collection.get(&EntityId::Int(1)).unwrap();
        assert_eq!(stored["name"], json!("Annie"));
        assert_eq!(stored["meta"], json!({"rank": 2}));
        assert_eq!(stored["tags"], json!(["a"]));
    }

    #[test]
    fn test_array_fields_compare_by_value() {
        let mut collection = seeded();
        let same = upsert_many(
            &mut collection,
            &incoming(vec![(1, json!({"id": 1, "tags": ["a"]}))]),
        );
        assert_eq!(same.skipped, vec![EntityId::Int(1)]);

        let changed = upsert_many(
            &mut collection,
            &incoming(vec![(1, json!({"id": 1, "tags": ["a", "b"]}))]),
        );
        assert_eq!(changed.updated, vec![EntityId::Int(1)]);
    }

    #[test]
    fn test_new_entities_added_in_order() {
        let mut collection = seeded();
        let report = upsert_many(
            &mut collection,
            &incoming(vec![(3, json!({"id": 3})), (2, json!({"id": 2}))]),
        );

        assert_eq!(report.added, vec![EntityId::Int(2), EntityId::Int(3)]);
        assert_eq!(
            collection.ids(),
            &[EntityId::Int(1), EntityId::Int(2), EntityId::Int(3)]
        );
    }

    #[test]
    fn test_many_mutably_always_writes() {
        let mut collection = seeded();
        let report = upsert_many_mutably(
            &mut collection,
            &incoming(vec![
                (1, json!({"id": 1, "meta": {"rank": 5}})),
                (2, json!({"id": 2})),
            ]),
        );

        assert_eq!(report.updated, vec![EntityId::Int(1)]);
        assert_eq!(report.added, vec![EntityId::Int(2)]);
        assert_eq!(collection.get(&EntityId::Int(1)).unwrap()["meta"], json!({"rank": 5}));
    }

    #[test]
    fn test_one_mutably_skips_deep_equal() {
        let mut collection = seeded();
        let stored = collection.get(&EntityId::Int(1)).cloned().unwrap();

        let report = upsert_one_mutably(&mut collection, EntityId::Int(1), stored);
        assert_eq!(report.skipped, vec![EntityId::Int(1)]);

        let report = upsert_one_mutably(
            &mut collection,
            EntityId::Int(1),
            entity(json!({"id": 1, "name": "Ann", "meta": {"rank": 2}, "tags": ["a"]})),
        );
        assert_eq!(report.updated, vec![EntityId::Int(1)]);
        assert_eq!(collection.get(&EntityId::Int(1)).unwrap()["meta"], json!({"rank": 2}));

        let report =
            upsert_one_mutably(&mut collection, EntityId::Int(4), entity(json!({"id": 4})));
        assert_eq!(report.added, vec![EntityId::Int(4)]);
    }

    #[test]
    fn test_remove_one() {
        let mut collection = seeded();
        assert!(collection.remove_one(&EntityId::Int(1)).is_some());
        assert!(collection.is_empty());
        assert!(collection.remove_one(&EntityId::Int(1)).is_none());
    }
}
