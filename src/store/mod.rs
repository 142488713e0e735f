//! Request-state store: one slice per entity type, each holding the entity collection
//! and the source ledger for that type.
//!
//! All writes go through `&mut Store` and complete synchronously, one resolved request
//! per call. Every write bumps the store revision, which memoized selectors key on.

use std::collections::BTreeMap;

use crate::errors::RejectErrorValue;
use crate::ledger::{SortComparer, SortOptions, SourceLedger};
use crate::models::{EntityId, NormalizedPayload, SourceState, SourceView};
use crate::upsert::{upsert_many, EntityCollection, UpsertReport};

/// Entities and sources of one entity type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Slice {
    pub collection: EntityCollection,
    pub ledger: SourceLedger,
}

#[derive(Default)]
pub struct Store {
    slices: BTreeMap<String, Slice>,
    sorts: BTreeMap<String, SortComparer>,
    revision: u64,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("slices", &self.slices)
            .field("sorted", &self.sorts.keys().collect::<Vec<_>>())
            .field("revision", &self.revision)
            .finish()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep sources of `slice` globally sorted by `comparer` on every fetch.
    pub fn with_sort(mut self, slice: impl Into<String>, comparer: SortComparer) -> Self {
        self.sorts.insert(slice.into(), comparer);
        self
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn slice(&self, key: &str) -> Option<&Slice> {
        self.slices.get(key)
    }

    fn slice_mut(&mut self, key: &str) -> &mut Slice {
        self.revision += 1;
        self.slices.entry(key.to_string()).or_default()
    }

    /// A request bound to `source` started.
    pub fn pending(&mut self, slice: &str, source: &str) {
        self.slice_mut(slice).ledger.mark_pending(source);
    }

    /// Apply a fulfilled request: upsert every entity type carried by the payload, then
    /// update the originating source of `slice`.
    pub fn fulfilled(
        &mut self,
        slice: &str,
        payload: &NormalizedPayload,
    ) -> BTreeMap<String, UpsertReport> {
        let mut reports = BTreeMap::new();
        for (entity_type, entities) in &payload.normalized.entities {
            let target = self.slice_mut(entity_type);
            reports.insert(
                entity_type.clone(),
                upsert_many(&mut target.collection, entities),
            );
        }

        self.revision += 1;
        let target = self.slices.entry(slice.to_string()).or_default();
        let sort = self.sorts.get(slice).map(|comparer| SortOptions {
            entity_type: slice,
            comparer,
            entities: target.collection.entities(),
        });
        target.ledger.apply_fetch_success(payload, sort);
        if let Some(source) = payload.source.as_deref() {
            target.ledger.source_mut(source).loading = Some(false);
        }

        tracing::debug!(slice, revision = self.revision, "Fulfilled payload applied");
        reports
    }

    /// Record a rejected request on `source`.
    pub fn rejected(&mut self, slice: &str, source: &str, reject: &RejectErrorValue) {
        self.slice_mut(slice).ledger.mark_failed(source, reject);
    }

    /// Drop a deleted entity and its id from every source of the slice.
    pub fn deleted(&mut self, slice: &str, id: &EntityId) {
        let target = self.slice_mut(slice);
        target.collection.remove_one(id);
        target.ledger.apply_delete_success(id);
    }

    pub fn add_ids_to_sources(
        &mut self,
        slice: &str,
        ids: &[EntityId],
        sources: &[&str],
        append: bool,
    ) {
        self.slice_mut(slice)
            .ledger
            .add_ids_to_sources(ids, sources.iter().copied(), append);
    }

    pub fn remove_ids_from_sources(&mut self, slice: &str, ids: &[EntityId], sources: &[&str]) {
        self.slice_mut(slice)
            .ledger
            .remove_ids_from_sources(ids, sources.iter().copied());
    }

    /// Join a source's id order against the slice's entities. Ids without a stored entity
    /// are dropped; unknown slices and sources read as empty defaults.
    pub fn select_source_view(&self, slice: &str, source: &str) -> SourceView {
        let default_state = SourceState::default();
        let slice = self.slices.get(slice);
        let state = slice
            .and_then(|s| s.ledger.source(source))
            .unwrap_or(&default_state);

        let data = match slice {
            Some(s) => state
                .all_ids
                .iter()
                .filter_map(|id| s.collection.get(id).cloned())
                .collect(),
            None => Vec::new(),
        };

        SourceView {
            data,
            paginator: state.paginator.clone(),
            last_request_at: state.last_request_at,
            loading: state.loading,
            error: state.error.clone(),
            err_code: state.err_code.clone(),
            extra: state.extra.clone(),
        }
    }
}

/// Memoized view of one source, recomputed only when the store revision moves.
#[derive(Debug, Clone)]
pub struct SourceSelector {
    slice: String,
    source: String,
    cached: Option<(u64, SourceView)>,
}

impl SourceSelector {
    pub fn new(slice: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            slice: slice.into(),
            source: source.into(),
            cached: None,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn select(&mut self, store: &Store) -> &SourceView {
        let revision = store.revision();
        if !matches!(&self.cached, Some((cached, _)) if *cached == revision) {
            self.cached = None;
        }
        let (_, view) = self
            .cached
            .get_or_insert_with(|| (revision, store.select_source_view(&self.slice, &self.source)));
        view
    }
}

/// One memoized selector per source name.
pub fn create_select_all_by_source(slice: &str, sources: &[&str]) -> Vec<SourceSelector> {
    sources
        .iter()
        .map(|source| SourceSelector::new(slice, *source))
        .collect()
}
