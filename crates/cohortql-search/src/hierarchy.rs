//! Criteria hierarchy resolution.
//!
//! Group parameters flagged for ancestor expansion (for example an ATC drug
//! class) stand for every concept below them. The resolver collects those
//! parameters from a request, asks the external ancestor store for their
//! descendants, and returns a [`CriteriaLookup`] the builders read while
//! generating SQL.
//!
//! # Empty expansions
//!
//! An ancestor without descendants is a legal result. The lookup records an
//! empty set and the builders bind it as an empty array, which matches no
//! rows.

use crate::error::{BuildError, ResolutionError, StoreError};
use async_trait::async_trait;
use cohortql_core::{CriteriaType, Domain, SearchParameter, SearchRequest};
use futures_util::future::try_join_all;
use indexmap::IndexSet;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Identifies one ancestor lookup within a criteria tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AncestorKey {
    pub domain: Domain,
    pub criteria_type: CriteriaType,
    pub standard: bool,
    pub ancestor_id: i64,
}

impl AncestorKey {
    /// Key for `param` if it requests ancestor expansion.
    ///
    /// Returns `None` for parameters that need no lookup or whose tags do
    /// not parse; validation rejects the latter before building.
    pub fn for_parameter(param: &SearchParameter) -> Option<Self> {
        if !param.needs_expansion() {
            return None;
        }
        Some(Self {
            domain: Domain::parse(&param.domain)?,
            criteria_type: CriteriaType::parse(&param.criteria_type)?,
            standard: param.standard,
            ancestor_id: param.concept_id?,
        })
    }
}

/// Read-only ancestor to descendant relation.
#[async_trait]
pub trait CriteriaAncestorStore: Send + Sync {
    /// All descendant ids of `key.ancestor_id`; empty when it has none.
    async fn descendants(&self, key: &AncestorKey) -> Result<Vec<i64>, StoreError>;
}

/// Ancestor relation held in memory, keyed by ancestor id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAncestorStore {
    relation: HashMap<i64, Vec<i64>>,
}

impl InMemoryAncestorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a `{"<ancestor_id>": [descendant_id, ...]}` fixture.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            relation: serde_json::from_str(json)?,
        })
    }

    pub fn insert(&mut self, ancestor_id: i64, descendants: impl IntoIterator<Item = i64>) {
        self.relation
            .entry(ancestor_id)
            .or_default()
            .extend(descendants);
    }
}

#[async_trait]
impl CriteriaAncestorStore for InMemoryAncestorStore {
    async fn descendants(&self, key: &AncestorKey) -> Result<Vec<i64>, StoreError> {
        Ok(self
            .relation
            .get(&key.ancestor_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Resolved descendants for every expansion parameter of one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CriteriaLookup {
    descendants: HashMap<AncestorKey, HashSet<i64>>,
}

impl CriteriaLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: AncestorKey, descendants: impl IntoIterator<Item = i64>) {
        self.descendants
            .entry(key)
            .or_default()
            .extend(descendants);
    }

    pub fn get(&self, key: &AncestorKey) -> Option<&HashSet<i64>> {
        self.descendants.get(key)
    }

    /// Sorted descendants for an expansion parameter.
    pub fn descendants_of(&self, param: &SearchParameter) -> Result<BTreeSet<i64>, BuildError> {
        let ancestor_id = param.concept_id.unwrap_or_default();
        let key = AncestorKey::for_parameter(param)
            .ok_or(BuildError::UnresolvedAncestor { ancestor_id })?;
        self.get(&key)
            .map(|ids| ids.iter().copied().collect())
            .ok_or(BuildError::UnresolvedAncestor { ancestor_id })
    }

    pub fn len(&self) -> usize {
        self.descendants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descendants.is_empty()
    }
}

/// Resolves ancestor expansions for a request against an external store.
#[derive(Clone)]
pub struct HierarchyResolver {
    store: Arc<dyn CriteriaAncestorStore>,
}

impl HierarchyResolver {
    pub fn new(store: Arc<dyn CriteriaAncestorStore>) -> Self {
        Self { store }
    }

    /// Look up every distinct expansion key in `request`.
    ///
    /// Lookups are independent and run concurrently; the first failure
    /// aborts resolution.
    pub async fn resolve(&self, request: &SearchRequest) -> Result<CriteriaLookup, ResolutionError> {
        let keys: IndexSet<AncestorKey> = request
            .parameters()
            .filter_map(AncestorKey::for_parameter)
            .collect();
        let mut lookup = CriteriaLookup::new();
        if keys.is_empty() {
            return Ok(lookup);
        }

        tracing::debug!(lookups = keys.len(), "Resolving criteria hierarchy");

        let resolved = try_join_all(keys.into_iter().map(|key| async move {
            let descendants = self
                .store
                .descendants(&key)
                .await
                .map_err(|source| ResolutionError::new(key.ancestor_id, source))?;
            tracing::debug!(
                ancestor_id = key.ancestor_id,
                domain = %key.domain,
                descendants = descendants.len(),
                "Resolved ancestor"
            );
            if descendants.is_empty() {
                tracing::warn!(
                    ancestor_id = key.ancestor_id,
                    "Ancestor has no descendants, criteria will match nothing"
                );
            }
            Ok::<_, ResolutionError>((key, descendants))
        }))
        .await?;

        for (key, descendants) in resolved {
            lookup.insert(key, descendants);
        }
        Ok(lookup)
    }
}
