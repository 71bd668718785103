//! Criteria-tree lookups by parent id.

use super::code_group::Projection;
use super::{BuildContext, QueryBuilder, all_events, modifiers};
use crate::config::CompilerContext;
use crate::error::BuildError;
use crate::hierarchy::CriteriaLookup;
use crate::namer::{QueryParameterValue, QueryParameters};
use crate::sql_builder::{CompiledQuery, SqlFragment};
use cohortql_core::{CriteriaType, Domain, SearchGroupItem, TypeFamily};

/// Direct children of `parent_id`, ordered by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriteriaTreeQuery {
    pub domain: Domain,
    pub criteria_type: CriteriaType,
    pub standard: bool,
    pub parent_id: i64,
}

impl CriteriaTreeQuery {
    pub fn new(domain: Domain, criteria_type: CriteriaType, standard: bool, parent_id: i64) -> Self {
        Self {
            domain,
            criteria_type,
            standard,
            parent_id,
        }
    }

    pub fn compile(&self, context: &CompilerContext) -> CompiledQuery {
        let lookup = CriteriaLookup::new();
        let mut params = QueryParameters::new();
        let mut cx = BuildContext::new(context, &lookup, &mut params);
        let sql = self.fragment(Projection::All, &mut cx);
        CompiledQuery::new(&sql, params)
    }

    pub(crate) fn fragment(&self, projection: Projection, cx: &mut BuildContext<'_>) -> SqlFragment {
        let domain = cx.bind(QueryParameterValue::String(self.domain.as_str().to_string()));
        let criteria_type = cx.bind(QueryParameterValue::String(
            self.criteria_type.as_str().to_string(),
        ));
        let standard = cx.bind(QueryParameterValue::Bool(self.standard));
        let parent_id = cx.bind(QueryParameterValue::Int64(self.parent_id));

        let mut sql = SqlFragment::text(projection.select());
        sql.table(&cx.context.criteria)
            .push(" where domain_id = ")
            .param(&domain)
            .push(" and type = ")
            .param(&criteria_type)
            .push(" and is_standard = ")
            .param(&standard)
            .push(" and parent_id = ")
            .param(&parent_id)
            .push(" order by id asc");
        sql
    }
}

/// `TREE` items: each parameter's concept id names a tree node whose direct
/// children are matched.
#[derive(Debug, Default)]
pub struct CriteriaTreeBuilder;

impl QueryBuilder for CriteriaTreeBuilder {
    fn name(&self) -> &'static str {
        "criteria tree"
    }

    fn families(&self) -> &'static [TypeFamily] {
        &[TypeFamily::Tree]
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
        for param in &item.search_parameters {
            let parent_id = param
                .concept_id
                .ok_or_else(|| BuildError::invalid_operand("conceptId", param.label()))?;
            let query = CriteriaTreeQuery::new(
                param.domain.parse()?,
                param.criteria_type.parse()?,
                param.standard,
                parent_id,
            );
            let standard = cx.bind_standard(param.standard);
            let mut clause = SqlFragment::text("is_standard = ");
            clause
                .param(&standard)
                .push(" and concept_id in (")
                .append(query.fragment(Projection::ConceptIds, cx))
                .push(")");
            clauses.push(clause);
        }
        Ok(all_events(cx, SqlFragment::join_nested(clauses, " or ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::test_support;
    use cohortql_core::SearchParameter;

    #[test]
    fn test_standalone_query() {
        let context = test_support::context();
        let compiled = CriteriaTreeQuery::new(Domain::Drug, CriteriaType::Atc, true, 21600001).compile(&context);
        assert_eq!(
            compiled.sql,
            "select * from `proj.cdr.cb_criteria` where domain_id = @p1 and type = @p2 \
             and is_standard = @p3 and parent_id = @p4 order by id asc"
        );
        assert_eq!(compiled.parameters.get("p1"), Some(&QueryParameterValue::String("DRUG".into())));
        assert_eq!(compiled.parameters.get("p4"), Some(&QueryParameterValue::Int64(21600001)));
    }

    #[test]
    fn test_builder_children_of_each_parent() {
        let context = test_support::context();
        let lookup = CriteriaLookup::new();
        let mut params = QueryParameters::new();
        let mut cx = BuildContext::new(&context, &lookup, &mut params);

        let node = |id| SearchParameter {
            domain: "CONDITION".into(),
            criteria_type: "SNOMED".into(),
            concept_id: Some(id),
            standard: true,
            ..Default::default()
        };
        let item = SearchGroupItem {
            item_type: "TREE".into(),
            search_parameters: vec![node(10), node(20)],
            ..Default::default()
        };
        let sql = CriteriaTreeBuilder
            .build_events(&item, TypeFamily::Tree, &mut cx)
            .unwrap()
            .to_sql();

        assert_eq!(sql.matches("select concept_id from `proj.cdr.cb_criteria`").count(), 2);
        assert_eq!(sql.matches("order by id asc").count(), 2);
        assert!(sql.contains(") or ("));
        assert_eq!(params.len(), 10);
    }
}
