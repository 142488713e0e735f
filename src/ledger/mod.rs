//! SourceLedger: per-source ordered id lists and pagination state.
//!
//! Sources are created lazily; every operation on an unknown source name starts from
//! [`SourceState::default`]. Load-more unions assume pages resolve in request order.
//! Nothing here reorders or rejects late responses.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RejectErrorValue;
use crate::models::{Entity, EntityId, EntityMap, NormalizedPayload, SourceState};

/// Orders entities for a sorted source.
pub type SortComparer = Arc<dyn Fn(&Entity, &Entity) -> Ordering + Send + Sync>;

/// Global ordering applied on fetch success.
///
/// When the payload carries entities of `entity_type`, the source's id list becomes every
/// stored entity of that type (`entities`), sorted by `comparer`.
#[derive(Clone, Copy)]
pub struct SortOptions<'a> {
    pub entity_type: &'a str,
    pub comparer: &'a SortComparer,
    pub entities: &'a EntityMap,
}

/// All tracked sources of one slice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceLedger {
    sources: BTreeMap<String, SourceState>,
}

impl SourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self, name: &str) -> Option<&SourceState> {
        self.sources.get(name)
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// Mutable access to a source, creating it with defaults on first use.
    pub fn source_mut(&mut self, name: &str) -> &mut SourceState {
        self.sources.entry(name.to_string()).or_default()
    }

    /// Ids of a source; empty for unknown sources.
    pub fn ids(&self, name: &str) -> &[EntityId] {
        self.sources
            .get(name)
            .map(|s| s.all_ids.as_slice())
            .unwrap_or(&[])
    }

    /// Record a successful fetch for `payload.source`. No-op when the payload is unbound.
    pub fn apply_fetch_success(
        &mut self,
        payload: &NormalizedPayload,
        sort: Option<SortOptions<'_>>,
    ) {
        let Some(name) = payload.source.as_deref() else {
            return;
        };

        let mut ids = payload.normalized.result.ids();
        if let Some(sort) = sort {
            if payload.normalized.entities.contains_key(sort.entity_type) {
                let mut sorted: Vec<(&EntityId, &Entity)> = sort.entities.iter().collect();
                sorted.sort_by(|a, b| (sort.comparer)(a.1, b.1));
                ids = sorted.into_iter().map(|(id, _)| id.clone()).collect();
            }
        }

        let source = self.source_mut(name);
        source.all_ids = if payload.is_load_more {
            union_preserving_order(&source.all_ids, ids)
        } else {
            ids
        };
        source.paginator = payload.paginator.clone().unwrap_or_default();
        source.last_request_at = Some(Utc::now());

        // apiResponseData is reset on every fetch; a stored response is only replaced.
        set_extra(source, "apiResponseData", payload.api_response_data.clone());
        if let Some(response) = &payload.response {
            source
                .extra
                .insert("response".to_string(), Value::Object(response.clone()));
        }

        tracing::debug!(
            source = name,
            ids = source.all_ids.len(),
            load_more = payload.is_load_more,
            "Fetch applied to source"
        );
    }

    /// Remove a deleted id from every source.
    pub fn apply_delete_success(&mut self, id: &EntityId) {
        for source in self.sources.values_mut() {
            source.all_ids.retain(|existing| existing != id);
        }
    }

    /// Insert ids missing from each named source, at the head unless `append`.
    ///
    /// Head insertion happens one id at a time, so `[a, b]` added to `[x]` gives `[b, a, x]`.
    pub fn add_ids_to_sources<I, S>(&mut self, ids: &[EntityId], sources: I, append: bool)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in sources {
            let source = self.source_mut(name.as_ref());
            for id in ids {
                if source.all_ids.contains(id) {
                    continue;
                }
                if append {
                    source.all_ids.push(id.clone());
                } else {
                    source.all_ids.insert(0, id.clone());
                }
            }
        }
    }

    /// Filter ids out of each named source.
    pub fn remove_ids_from_sources<I, S>(&mut self, ids: &[EntityId], sources: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in sources {
            self.source_mut(name.as_ref())
                .all_ids
                .retain(|existing| !ids.contains(existing));
        }
    }

    /// Flag a request for the source as in flight.
    pub fn mark_pending(&mut self, name: &str) {
        let source = self.source_mut(name);
        source.loading = Some(true);
        source.error = None;
        source.err_code = None;
    }

    /// Record a rejected request on the source. Ids and paginator are left untouched.
    pub fn mark_failed(&mut self, name: &str, reject: &RejectErrorValue) {
        let source = self.source_mut(name);
        source.loading = Some(false);
        source.error = Some(reject.err_msg.clone());
        source.err_code = reject.err_code.clone();
    }
}

fn union_preserving_order(existing: &[EntityId], incoming: Vec<EntityId>) -> Vec<EntityId> {
    let mut seen = HashSet::new();
    existing
        .iter()
        .cloned()
        .chain(incoming)
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

fn set_extra(source: &mut SourceState, key: &str, value: Option<Value>) {
    match value {
        Some(value) => {
            source.extra.insert(key.to_string(), value);
        }
        None => {
            source.extra.remove(key);
        }
    }
}
