//! Group-of-codes lookups against the criteria table.

use super::{BuildContext, QueryBuilder, all_events, modifiers, prefix_pattern};
use crate::config::CompilerContext;
use crate::error::BuildError;
use crate::hierarchy::CriteriaLookup;
use crate::namer::{QueryParameterValue, QueryParameters};
use crate::sql_builder::{CompiledQuery, SqlFragment};
use cohortql_core::{CriteriaType, Domain, SearchGroupItem, TypeFamily};
use indexmap::IndexMap;

/// Columns returned by a criteria-table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Every criteria column, for browsing.
    All,
    /// Only `concept_id`, for use as a subquery.
    ConceptIds,
}

impl Projection {
    pub(crate) fn select(self) -> &'static str {
        match self {
            Projection::All => "select * from ",
            Projection::ConceptIds => "select concept_id from ",
        }
    }
}

/// Selectable leaf criteria whose code starts with any of `codes`.
///
/// Rows come back ordered by code so that paging over the result is stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeGroupQuery {
    pub domain: Domain,
    pub criteria_type: CriteriaType,
    pub standard: bool,
    pub codes: Vec<String>,
}

impl CodeGroupQuery {
    pub fn new(
        domain: Domain,
        criteria_type: CriteriaType,
        standard: bool,
        codes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            domain,
            criteria_type,
            standard,
            codes: codes.into_iter().map(Into::into).collect(),
        }
    }

    /// Compile as a standalone query returning full criteria rows.
    pub fn compile(&self, context: &CompilerContext) -> Result<CompiledQuery, BuildError> {
        let lookup = CriteriaLookup::new();
        let mut params = QueryParameters::new();
        let mut cx = BuildContext::new(context, &lookup, &mut params);
        let sql = self.fragment(Projection::All, &mut cx)?;
        Ok(CompiledQuery::new(&sql, params))
    }

    pub(crate) fn fragment(
        &self,
        projection: Projection,
        cx: &mut BuildContext<'_>,
    ) -> Result<SqlFragment, BuildError> {
        if self.codes.iter().all(|code| code.trim().is_empty()) {
            return Err(BuildError::invalid_operand("codes", ""));
        }

        let domain = cx.bind(QueryParameterValue::String(self.domain.as_str().to_string()));
        let criteria_type = cx.bind(QueryParameterValue::String(
            self.criteria_type.as_str().to_string(),
        ));
        let standard = cx.bind(QueryParameterValue::Bool(self.standard));

        let likes = self
            .codes
            .iter()
            .filter(|code| !code.trim().is_empty())
            .map(|code| {
                let code = cx.bind_code(prefix_pattern(code));
                let mut like = SqlFragment::text("code like ");
                like.param(&code);
                like
            })
            .collect::<Vec<_>>();

        let mut sql = SqlFragment::text(projection.select());
        sql.table(&cx.context.criteria)
            .push(" where domain_id = ")
            .param(&domain)
            .push(" and type = ")
            .param(&criteria_type)
            .push(" and is_standard = ")
            .param(&standard)
            .push(" and (")
            .append(SqlFragment::join(likes, " or "))
            .push(") and is_selectable = TRUE and is_group = FALSE order by code asc");
        Ok(sql)
    }
}

/// `CODES` items: every parameter's value is a code prefix. Parameters
/// sharing domain, type and standard flag become one lookup.
#[derive(Debug, Default)]
pub struct CodeGroupBuilder;

impl CodeGroupBuilder {
    fn queries(item: &SearchGroupItem) -> Result<Vec<CodeGroupQuery>, BuildError> {
        let mut grouped: IndexMap<(Domain, CriteriaType, bool), Vec<String>> = IndexMap::new();
        for param in &item.search_parameters {
            let domain = param.domain.parse::<Domain>()?;
            let criteria_type = param.criteria_type.parse::<CriteriaType>()?;
            grouped
                .entry((domain, criteria_type, param.standard))
                .or_default()
                .extend(param.value.clone());
        }
        Ok(grouped
            .into_iter()
            .map(|((domain, criteria_type, standard), codes)| {
                CodeGroupQuery::new(domain, criteria_type, standard, codes)
            })
            .collect())
    }
}

impl QueryBuilder for CodeGroupBuilder {
    fn name(&self) -> &'static str {
        "code group"
    }

    fn families(&self) -> &'static [TypeFamily] {
        &[TypeFamily::Codes]
    }

    fn build(
        &self,
        item: &SearchGroupItem,
        family: TypeFamily,
        cx: &mut BuildContext<'_>,
    ) -> Result<SqlFragment, BuildError> {
        let events = self.build_events(item, family, cx)?;
        modifiers::person_query(events, &item.modifiers, cx)
    }

    fn build_events(
        &self,
        item: &SearchGroupItem,
        family: TypeFamily,
        cx: &mut BuildContext<'_>,
    ) -> Result<SqlFragment, BuildError> {
        self.check_family(family)?;

        let mut clauses = Vec::new();
        for query in Self::queries(item)? {
            let standard = cx.bind_standard(query.standard);
            let mut clause = SqlFragment::text("is_standard = ");
            clause
                .param(&standard)
                .push(" and concept_id in (")
                .append(query.fragment(Projection::ConceptIds, cx)?)
                .push(")");
            clauses.push(clause);
        }
        Ok(all_events(cx, SqlFragment::join_nested(clauses, " or ")))
    }
}
