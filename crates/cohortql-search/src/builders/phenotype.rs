//! Custom phenotype code sets.
//!
//! A phenotype maps to source vocabulary codes through the phenotype-code
//! table. The same mapping is read from each source table below, all
//! branches sharing one bound phenotype array.

use super::{BuildContext, QueryBuilder, modifiers, occurrence_events};
use crate::error::BuildError;
use crate::namer::{ParamRef, QueryParameterValue};
use crate::sql_builder::SqlFragment;
use cohortql_core::{Domain, SearchGroupItem, TypeFamily};
use indexmap::IndexSet;

const SOURCE_DOMAINS: [Domain; 4] = [
    Domain::Condition,
    Domain::Procedure,
    Domain::Measurement,
    Domain::Observation,
];

#[derive(Debug, Default)]
pub struct PhenotypeBuilder;

impl PhenotypeBuilder {
    fn mapped_concepts(phenotypes: &ParamRef, cx: &BuildContext<'_>) -> SqlFragment {
        let mut sql = SqlFragment::text("select c.concept_id from ");
        sql.table(&cx.context.concept)
            .push(" c join ")
            .table(&cx.context.phenotype_code)
            .push(" m on m.vocabulary_id = c.vocabulary_id and m.concept_code = c.concept_code where m.phenotype in unnest(")
            .param(phenotypes)
            .push(")");
        sql
    }
}

impl QueryBuilder for PhenotypeBuilder {
    fn name(&self) -> &'static str {
        "phenotype"
    }

    fn families(&self) -> &'static [TypeFamily] {
        &[TypeFamily::Phenotype]
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

        let phenotypes: IndexSet<String> = item
            .search_parameters
            .iter()
            .filter_map(|param| param.value.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect();
        if phenotypes.is_empty() {
            return Err(BuildError::invalid_operand("value", item.item_type.clone()));
        }
        let phenotypes = cx.bind(QueryParameterValue::StringArray(phenotypes.into_iter().collect()));

        let mut branches = Vec::with_capacity(SOURCE_DOMAINS.len());
        for domain in SOURCE_DOMAINS {
            let table = cx.context.domain_table(domain)?;
            let mut predicate = SqlFragment::text("t.");
            predicate
                .ident(table.concept_column(false))
                .push(" in (")
                .append(Self::mapped_concepts(&phenotypes, cx))
                .push(")");
            branches.push(occurrence_events(cx, table, false, predicate));
        }
        Ok(SqlFragment::join_nested(branches, " union all "))
    }
}
