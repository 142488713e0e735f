//! Per-type shaping rules.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::ConfigError;
use crate::models::Entity;

/// Prefix marking foreign-key fields. Fields carrying it always survive shaping.
pub const FOREIGN_KEY_MARKER: char = '$';

/// Foreign-key field name for a relation: `author` becomes `$authorId`.
pub fn foreign_key(relation: &str) -> String {
    format!("{}{}Id", FOREIGN_KEY_MARKER, relation)
}

/// Custom final-shape hook: `(selected_fields, original, parent, key)`.
pub type ProcessFn =
    Arc<dyn Fn(Entity, &Entity, Option<&Entity>, Option<&str>) -> Entity + Send + Sync>;

/// Pre-shaping hook, e.g. for computing derived fields: `(entity, parent, key)`.
pub type AccessorFn = Arc<dyn Fn(&mut Entity, Option<&Entity>, Option<&str>) + Send + Sync>;

/// A relation field declared on an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Associate {
    pub name: String,
    /// Remove the nested original field after copying it to its foreign key.
    pub unset_original: bool,
}

/// Fields that survive shaping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Whitelist {
    All,
    Fields(Vec<String>),
}

/// Immutable shaping configuration of one entity type.
#[derive(Clone)]
pub struct EntityShaper {
    entity_key: String,
    id_attribute: String,
    associates: Vec<Associate>,
    whitelist: Whitelist,
    process: Option<ProcessFn>,
    accessor: Option<AccessorFn>,
}

impl fmt::Debug for EntityShaper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityShaper")
            .field("entity_key", &self.entity_key)
            .field("id_attribute", &self.id_attribute)
            .field("associates", &self.associates)
            .field("whitelist", &self.whitelist)
            .field("process", &self.process.is_some())
            .field("accessor", &self.accessor.is_some())
            .finish()
    }
}

impl EntityShaper {
    pub fn builder(entity_key: impl Into<String>) -> EntityShaperBuilder {
        EntityShaperBuilder::new(entity_key)
    }

    pub fn entity_key(&self) -> &str {
        &self.entity_key
    }

    pub fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    pub fn associates(&self) -> &[Associate] {
        &self.associates
    }

    /// Foreign-key names of every declared associate.
    pub fn foreign_keys(&self) -> Vec<String> {
        self.associates.iter().map(|a| foreign_key(&a.name)).collect()
    }

    /// Shape one raw record.
    ///
    /// `parent` is the shaped record this one is nested in and `key` the field it sits
    /// under; both are `None` for root records. The raw record is never modified.
    pub fn shape(&self, raw: &Entity, parent: Option<&Entity>, key: Option<&str>) -> Entity {
        let mut entity = raw.clone();

        if let Some(accessor) = &self.accessor {
            accessor(&mut entity, parent, key);
        }

        for associate in &self.associates {
            if let Some(value) = entity.get(&associate.name).cloned() {
                entity.insert(foreign_key(&associate.name), value);
                if associate.unset_original {
                    entity.remove(&associate.name);
                }
            }
        }

        let selected = match &self.whitelist {
            Whitelist::All => entity.clone(),
            Whitelist::Fields(fields) => {
                let foreign_keys = self.foreign_keys();
                entity
                    .iter()
                    .filter(|(field, _)| {
                        fields.contains(*field)
                            || foreign_keys.contains(*field)
                            || field.starts_with(FOREIGN_KEY_MARKER)
                    })
                    .map(|(field, value)| (field.clone(), value.clone()))
                    .collect()
            }
        };

        match &self.process {
            Some(process) => process(selected, &entity, parent, key),
            None => selected,
        }
    }

    /// Rekey a relation-name keyed definition by foreign-key field name.
    ///
    /// Every relation must be a declared associate.
    pub fn resolve_association_map<V: Clone>(
        &self,
        definition: &BTreeMap<String, V>,
    ) -> Result<BTreeMap<String, V>, ConfigError> {
        let mut resolved = BTreeMap::new();
        for (relation, value) in definition {
            if !self.associates.iter().any(|a| &a.name == relation) {
                let err = ConfigError::UndeclaredAssociate {
                    entity: self.entity_key.clone(),
                    associate: relation.clone(),
                    declared: self.associates.iter().map(|a| a.name.clone()).collect(),
                };
                tracing::error!("{}", err);
                return Err(err);
            }
            resolved.insert(foreign_key(relation), value.clone());
        }
        Ok(resolved)
    }
}

/// Builder for [`EntityShaper`].
pub struct EntityShaperBuilder {
    shaper: EntityShaper,
}

impl EntityShaperBuilder {
    fn new(entity_key: impl Into<String>) -> Self {
        Self {
            shaper: EntityShaper {
                entity_key: entity_key.into(),
                id_attribute: "id".to_string(),
                associates: Vec::new(),
                whitelist: Whitelist::Fields(Vec::new()),
                process: None,
                accessor: None,
            },
        }
    }

    pub fn id_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.shaper.id_attribute = attribute.into();
        self
    }

    /// Declare a relation field, keeping the nested original.
    pub fn associate(self, name: impl Into<String>) -> Self {
        self.associate_with(name, false)
    }

    pub fn associate_with(mut self, name: impl Into<String>, unset_original: bool) -> Self {
        self.shaper.associates.push(Associate {
            name: name.into(),
            unset_original,
        });
        self
    }

    /// Restrict surviving fields. A leading `*` keeps everything.
    pub fn whitelist<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.shaper.whitelist = if fields.first().map(String::as_str) == Some("*") {
            Whitelist::All
        } else {
            Whitelist::Fields(fields)
        };
        self
    }

    pub fn all_fields(mut self) -> Self {
        self.shaper.whitelist = Whitelist::All;
        self
    }

    pub fn process<F>(mut self, process: F) -> Self
    where
        F: Fn(Entity, &Entity, Option<&Entity>, Option<&str>) -> Entity + Send + Sync + 'static,
    {
        self.shaper.process = Some(Arc::new(process));
        self
    }

    pub fn accessor<F>(mut self, accessor: F) -> Self
    where
        F: Fn(&mut Entity, Option<&Entity>, Option<&str>) + Send + Sync + 'static,
    {
        self.shaper.accessor = Some(Arc::new(accessor));
        self
    }

    pub fn build(self) -> EntityShaper {
        self.shaper
    }
}
