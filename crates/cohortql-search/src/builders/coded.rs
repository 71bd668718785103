//! ICD9, ICD10 and CPT criteria over the per-domain occurrence tables.
//!
//! Parameters are partitioned by domain and by standard/source flag; every
//! partition reads one occurrence table. Within a partition:
//!
//! - leaf parameters with a concept id, and ancestor nodes after expansion,
//!   match `concept_id in unnest(@ids)`;
//! - leaf codes match exactly through the concept table;
//! - group nodes without ancestor data and codes with a trailing `%`/`*`
//!   match as an upper-case code prefix.

use super::{BuildContext, QueryBuilder, has_wildcard, modifiers, occurrence_events, prefix_pattern};
use crate::config::DomainTable;
use crate::error::BuildError;
use crate::namer::QueryParameterValue;
use crate::sql_builder::{Identifier, SqlFragment};
use cohortql_core::{CriteriaType, Domain, SearchGroupItem, SearchParameter, TypeFamily};
use indexmap::{IndexMap, IndexSet};

#[derive(Debug, Default)]
pub struct CodedHierarchyBuilder;

/// Collected match keys of one (domain, standard) partition.
#[derive(Debug, Default)]
struct Partition {
    /// Set once any parameter matches by concept id, even if it expands to
    /// nothing.
    by_concept: bool,
    concept_ids: IndexSet<i64>,
    vocabularies: IndexSet<&'static str>,
    codes: IndexSet<String>,
    prefixes: IndexSet<String>,
}

impl Partition {
    fn add(&mut self, param: &SearchParameter, cx: &BuildContext<'_>) -> Result<(), BuildError> {
        if param.needs_expansion() {
            self.by_concept = true;
            self.concept_ids.extend(cx.lookup.descendants_of(param)?);
            return Ok(());
        }

        let code = param.value.as_deref().map(str::trim).filter(|v| !v.is_empty());
        match (param.group, param.concept_id, code) {
            (false, Some(concept_id), _) => {
                self.by_concept = true;
                self.concept_ids.insert(concept_id);
            }
            (group, _, Some(code)) => {
                let criteria_type = param.criteria_type.parse::<CriteriaType>()?;
                self.vocabularies.insert(criteria_type.vocabulary_id());
                if group || has_wildcard(code) {
                    self.prefixes.insert(prefix_pattern(code));
                } else {
                    self.codes.insert(code.to_string());
                }
            }
            _ => return Err(BuildError::invalid_operand("value", param.label())),
        }
        Ok(())
    }

    fn predicate(
        self,
        column: &Identifier,
        cx: &mut BuildContext<'_>,
    ) -> SqlFragment {
        let mut clauses = Vec::new();

        if self.by_concept {
            let ids = cx.bind(QueryParameterValue::Int64Array(
                self.concept_ids.into_iter().collect(),
            ));
            let mut clause = SqlFragment::text("t.");
            clause.ident(column).push(" in unnest(").param(&ids).push(")");
            clauses.push(clause);
        }

        if !self.codes.is_empty() || !self.prefixes.is_empty() {
            let vocabularies = cx.bind(QueryParameterValue::StringArray(
                self.vocabularies.into_iter().map(str::to_string).collect(),
            ));
            let mut matches = Vec::new();
            if !self.codes.is_empty() {
                let codes = cx.bind(QueryParameterValue::StringArray(
                    self.codes.into_iter().collect(),
                ));
                let mut exact = SqlFragment::text("c.concept_code in unnest(");
                exact.param(&codes).push(")");
                matches.push(exact);
            }
            for prefix in self.prefixes {
                let code = cx.bind_code(prefix);
                let mut like = SqlFragment::text("c.concept_code like ");
                like.param(&code);
                matches.push(like);
            }

            let mut clause = SqlFragment::text("t.");
            clause
                .ident(column)
                .push(" in (select c.concept_id from ")
                .table(&cx.context.concept)
                .push(" c where c.vocabulary_id in unnest(")
                .param(&vocabularies)
                .push(") and (")
                .append(SqlFragment::join(matches, " or "))
                .push("))");
            clauses.push(clause);
        }

        SqlFragment::join_nested(clauses, " or ")
    }
}

impl CodedHierarchyBuilder {
    fn partitions(
        item: &SearchGroupItem,
        cx: &BuildContext<'_>,
    ) -> Result<IndexMap<(Domain, bool), Partition>, BuildError> {
        let mut partitions: IndexMap<(Domain, bool), Partition> = IndexMap::new();
        for param in &item.search_parameters {
            let domain = param.domain.parse::<Domain>()?;
            partitions
                .entry((domain, param.standard))
                .or_default()
                .add(param, cx)?;
        }
        Ok(partitions)
    }

    fn partition_events(
        table: &DomainTable,
        standard: bool,
        partition: Partition,
        cx: &mut BuildContext<'_>,
    ) -> SqlFragment {
        let predicate = partition.predicate(table.concept_column(standard), cx);
        occurrence_events(cx, table, standard, predicate)
    }
}

impl QueryBuilder for CodedHierarchyBuilder {
    fn name(&self) -> &'static str {
        "coded hierarchy"
    }

    fn families(&self) -> &'static [TypeFamily] {
        &[TypeFamily::Icd9, TypeFamily::Icd10, TypeFamily::Cpt]
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

        let partitions = Self::partitions(item, cx)?;
        tracing::trace!(%family, partitions = partitions.len(), "Built coded partitions");

        let context = cx.context;
        let mut sources = Vec::with_capacity(partitions.len());
        for ((domain, standard), partition) in partitions {
            let table = context.domain_table(domain)?;
            sources.push(Self::partition_events(table, standard, partition, cx));
        }
        Ok(SqlFragment::join_nested(sources, " union distinct "))
    }
}
