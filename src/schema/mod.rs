//! Entity schema: shaping rules per type plus the relation graph between types.
//!
//! A [`Schema`] is built once at startup and validated eagerly. Every relation must name
//! a declared associate of its entity and a registered target type; anything else is a
//! [`ConfigError`].

mod shaper;

pub use shaper::*;

use std::collections::BTreeMap;

use crate::errors::ConfigError;

/// Validated registry of entity shapers and their relations.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    shapers: BTreeMap<String, EntityShaper>,
    /// Entity key -> foreign-key field -> target entity key
    relations: BTreeMap<String, BTreeMap<String, String>>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn shaper(&self, entity_key: &str) -> Option<&EntityShaper> {
        self.shapers.get(entity_key)
    }

    pub fn contains(&self, entity_key: &str) -> bool {
        self.shapers.contains_key(entity_key)
    }

    pub fn entity_keys(&self) -> impl Iterator<Item = &str> {
        self.shapers.keys().map(String::as_str)
    }

    /// Relations of an entity type as `(foreign_key_field, target_entity_key)`.
    pub fn relations(&self, entity_key: &str) -> impl Iterator<Item = (&str, &str)> {
        self.relations
            .get(entity_key)
            .into_iter()
            .flat_map(|r| r.iter().map(|(fk, target)| (fk.as_str(), target.as_str())))
    }
}

/// Collects shapers and relation definitions, then validates them in [`SchemaBuilder::build`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    shapers: Vec<EntityShaper>,
    definitions: Vec<(String, BTreeMap<String, String>)>,
}

impl SchemaBuilder {
    pub fn entity(mut self, shaper: EntityShaper) -> Self {
        self.shapers.push(shaper);
        self
    }

    /// Declare nested relations of `entity_key` as `(relation_name, target_entity_key)`.
    pub fn define<I, R, T>(mut self, entity_key: impl Into<String>, relations: I) -> Self
    where
        I: IntoIterator<Item = (R, T)>,
        R: Into<String>,
        T: Into<String>,
    {
        let definition = relations
            .into_iter()
            .map(|(relation, target)| (relation.into(), target.into()))
            .collect();
        self.definitions.push((entity_key.into(), definition));
        self
    }

    pub fn build(self) -> Result<Schema, ConfigError> {
        let mut shapers = BTreeMap::new();
        for shaper in self.shapers {
            let key = shaper.entity_key().to_string();
            if shapers.contains_key(&key) {
                tracing::error!("Entity {} registered twice", key);
                return Err(ConfigError::DuplicateEntity(key));
            }
            shapers.insert(key, shaper);
        }

        let mut relations: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (entity_key, definition) in self.definitions {
            let shaper = shapers
                .get(&entity_key)
                .ok_or_else(|| ConfigError::UnknownEntity(entity_key.clone()))?;

            if let Some(target) = definition.values().find(|t| !shapers.contains_key(*t)) {
                tracing::error!("Relation of {} targets unknown entity {}", entity_key, target);
                return Err(ConfigError::UnknownEntity(target.clone()));
            }

            let resolved = shaper.resolve_association_map(&definition)?;
            relations.entry(entity_key).or_default().extend(resolved);
        }

        tracing::debug!(
            entities = shapers.len(),
            "Schema built with {} relation sets",
            relations.len()
        );

        Ok(Schema { shapers, relations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> EntityShaper {
        EntityShaper::builder("user").all_fields().build()
    }

    fn post() -> EntityShaper {
        EntityShaper::builder("post")
            .associate_with("author", true)
            .whitelist(["id", "title"])
            .build()
    }

    #[test]
    fn test_build_resolves_relations() {
        let schema = Schema::builder()
            .entity(user())
            .entity(post())
            .define("post", [("author", "user")])
            .build()
            .unwrap();

        let relations: Vec<_> = schema.relations("post").collect();
        assert_eq!(relations, vec![("$authorId", "user")]);
        assert_eq!(schema.relations("user").count(), 0);
        assert!(schema.contains("user"));
        assert_eq!(schema.entity_keys().collect::<Vec<_>>(), vec!["post", "user"]);
    }

    #[test]
    fn test_build_rejects_undeclared_associate() {
        let err = Schema::builder()
            .entity(user())
            .entity(post())
            .define("post", [("editor", "user")])
            .build()
            .unwrap_err();

        assert!(matches!(err, ConfigError::UndeclaredAssociate { .. }));
    }

    #[test]
    fn test_build_rejects_unknown_target() {
        let err = Schema::builder()
            .entity(post())
            .define("post", [("author", "user")])
            .build()
            .unwrap_err();

        assert_eq!(err, ConfigError::UnknownEntity("user".to_string()));
    }

    #[test]
    fn test_build_rejects_duplicate_entity() {
        let err = Schema::builder()
            .entity(user())
            .entity(user())
            .build()
            .unwrap_err();

        assert_eq!(err, ConfigError::DuplicateEntity("user".to_string()));
    }

    #[test]
    fn test_cyclic_relations_are_allowed() {
        let schema = Schema::builder()
            .entity(
                EntityShaper::builder("user")
                    .associate("posts")
                    .all_fields()
                    .build(),
            )
            .entity(post())
            .define("user", [("posts", "post")])
            .define("post", [("author", "user")])
            .build();

        assert!(schema.is_ok());
    }
}
