//! Cohort compiler entry point.
//!
//! A compilation runs in two phases. Validation walks the whole request and
//! rejects it on the first rule violation, before any SQL exists. Building
//! then generates the query with a fresh parameter table, so no state is
//! shared between compilations and the same request always yields the same
//! SQL and parameter names.

use std::sync::Arc;

use cohortql_core::SearchRequest;

use crate::builders::BuildContext;
use crate::composer::{Composer, Selection};
use crate::config::CompilerContext;
use crate::dispatch::BuilderRegistry;
use crate::error::CompileError;
use crate::hierarchy::{CriteriaLookup, HierarchyResolver};
use crate::namer::QueryParameters;
use crate::sql_builder::CompiledQuery;
use crate::validation::{validate_group, validate_item, validate_request};

/// Compiles cohort definitions against one immutable context.
///
/// Cheap to clone; clones share the context and registry.
#[derive(Debug, Clone)]
pub struct CohortCompiler {
    context: Arc<CompilerContext>,
    registry: Arc<BuilderRegistry>,
}

impl CohortCompiler {
    /// Compiler with every built-in type family.
    pub fn new(context: Arc<CompilerContext>) -> Self {
        Self::with_registry(context, Arc::new(BuilderRegistry::standard()))
    }

    pub fn with_registry(context: Arc<CompilerContext>, registry: Arc<BuilderRegistry>) -> Self {
        Self { context, registry }
    }

    pub fn context(&self) -> &CompilerContext {
        &self.context
    }

    pub fn registry(&self) -> &BuilderRegistry {
        &self.registry
    }

    /// Validate `request` without building anything.
    pub fn validate(&self, request: &SearchRequest) -> Result<(), CompileError> {
        validate_request(request)?;
        for group in request.groups() {
            validate_group(group)?;
            for item in &group.items {
                let registration = self.registry.resolve(&item.item_type)?;
                validate_item(item, registration.family, &registration.rules, group.temporal)?;
            }
        }
        Ok(())
    }

    /// Compile the participant-id query for `request`.
    ///
    /// `lookup` must hold the descendants of every expansion parameter, as
    /// produced by [`HierarchyResolver::resolve`].
    pub fn compile(
        &self,
        request: &SearchRequest,
        lookup: &CriteriaLookup,
    ) -> Result<CompiledQuery, CompileError> {
        self.compile_selection(request, lookup, Selection::Participants)
    }

    /// Compile the participant-count query for `request`.
    pub fn compile_count(
        &self,
        request: &SearchRequest,
        lookup: &CriteriaLookup,
    ) -> Result<CompiledQuery, CompileError> {
        self.compile_selection(request, lookup, Selection::Count)
    }

    pub fn compile_selection(
        &self,
        request: &SearchRequest,
        lookup: &CriteriaLookup,
        selection: Selection,
    ) -> Result<CompiledQuery, CompileError> {
        self.validate(request)?;
        tracing::debug!(
            includes = request.includes.len(),
            excludes = request.excludes.len(),
            ?selection,
            "Compiling cohort query"
        );

        let mut params = QueryParameters::new();
        let mut cx = BuildContext::new(&self.context, lookup, &mut params);
        let sql = Composer::new(&self.registry).cohort_query(request, selection, &mut cx)?;

        debug_assert!(
            sql.referenced_params()
                .iter()
                .all(|name| params.get(name).is_some()),
            "every referenced parameter is bound"
        );

        tracing::debug!(
            groups = request.includes.len() + request.excludes.len(),
            parameters = params.len(),
            "Compiled cohort query"
        );
        Ok(CompiledQuery::new(&sql, params))
    }

    /// Validate, resolve hierarchy expansions, then compile.
    ///
    /// Invalid requests are rejected before the ancestor store is queried.
    pub async fn compile_with_resolver(
        &self,
        request: &SearchRequest,
        resolver: &HierarchyResolver,
        selection: Selection,
    ) -> Result<CompiledQuery, CompileError> {
        self.validate(request)?;
        let lookup = resolver.resolve(request).await?;
        self.compile_selection(request, &lookup, selection)
    }
}
