//! Domain criteria over the denormalized search-all-events table.
//!
//! Parameters without attributes are pooled per standard/source flag into a
//! single `concept_id in unnest(...)` predicate. Parameters with attributes
//! each get their own predicate so the value constraints stay tied to their
//! concept. Blood pressure parameters match the concepts named by their
//! SYSTOLIC/DIASTOLIC/ANY attributes instead of their own.

use super::{BuildContext, QueryBuilder, all_events, comparison, modifiers};
use crate::error::BuildError;
use crate::namer::QueryParameterValue;
use crate::sql_builder::SqlFragment;
use crate::validation::{attribute_operand_kind, is_blood_pressure};
use cohortql_core::{AttrName, SearchGroupItem, SearchParameter, TypeFamily};
use indexmap::{IndexMap, IndexSet};

/// Builder for standard-vocabulary domains (drugs, measurements, surveys...).
#[derive(Debug, Default)]
pub struct DomainEventsBuilder;

const FAMILIES: &[TypeFamily] = &[
    TypeFamily::Condition,
    TypeFamily::Procedure,
    TypeFamily::Drug,
    TypeFamily::Measurement,
    TypeFamily::Observation,
    TypeFamily::Survey,
    TypeFamily::Visit,
    TypeFamily::PhysicalMeasurement,
];

impl DomainEventsBuilder {
    fn attribute_column(name: AttrName, family: TypeFamily) -> Option<&'static str> {
        match name {
            AttrName::Any => None,
            AttrName::Num => Some("value_as_number"),
            AttrName::Cat if family == TypeFamily::Survey => Some("value_source_concept_id"),
            AttrName::Cat => Some("value_as_concept_id"),
            AttrName::Age => Some("age_at_event"),
            AttrName::Systolic => Some("systolic"),
            AttrName::Diastolic => Some("diastolic"),
        }
    }

    /// Concept ids a parameter stands for: its own id, its resolved
    /// descendants when it is an expansion node, or its attributes' concepts
    /// for blood pressure.
    fn concept_ids(
        param: &SearchParameter,
        cx: &BuildContext<'_>,
    ) -> Result<Vec<i64>, BuildError> {
        if is_blood_pressure(param) {
            let ids: IndexSet<i64> = param.attributes.iter().filter_map(|a| a.concept_id).collect();
            return Ok(ids.into_iter().collect());
        }
        if param.needs_expansion() {
            return Ok(cx.lookup.descendants_of(param)?.into_iter().collect());
        }
        Ok(param.concept_id.into_iter().collect())
    }

    fn concept_predicate(
        standard: bool,
        ids: Vec<i64>,
        cx: &mut BuildContext<'_>,
    ) -> SqlFragment {
        let standard = cx.bind_standard(standard);
        let ids = cx.bind(QueryParameterValue::Int64Array(ids));
        let mut sql = SqlFragment::text("is_standard = ");
        sql.param(&standard)
            .push(" and concept_id in unnest(")
            .param(&ids)
            .push(")");
        sql
    }

    fn attribute_predicate(
        param: &SearchParameter,
        family: TypeFamily,
        cx: &mut BuildContext<'_>,
    ) -> Result<SqlFragment, BuildError> {
        let ids = Self::concept_ids(param, cx)?;
        let mut sql = Self::concept_predicate(param.standard, ids, cx);
        for attribute in &param.attributes {
            let name = attribute.attr_name()?;
            let Some(column) = Self::attribute_column(name, family) else {
                continue;
            };
            sql.push(" and ").push(column).append(comparison(
                cx,
                name.as_str(),
                attribute.parsed_operator()?,
                &attribute.operands,
                attribute_operand_kind(name),
            )?);
        }
        Ok(sql)
    }
}

impl QueryBuilder for DomainEventsBuilder {
    fn name(&self) -> &'static str {
        "domain events"
    }

    fn families(&self) -> &'static [TypeFamily] {
        FAMILIES
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

        let mut pooled: IndexMap<bool, IndexSet<i64>> = IndexMap::new();
        let mut with_attributes = Vec::new();
        for param in &item.search_parameters {
            if param.attributes.is_empty() {
                let ids = Self::concept_ids(param, cx)?;
                pooled.entry(param.standard).or_default().extend(ids);
            } else {
                with_attributes.push(param);
            }
        }

        let mut clauses = Vec::new();
        for (standard, ids) in pooled {
            clauses.push(Self::concept_predicate(standard, ids.into_iter().collect(), cx));
        }
        for param in with_attributes {
            clauses.push(Self::attribute_predicate(param, family, cx)?);
        }

        Ok(all_events(cx, SqlFragment::join_nested(clauses, " or ")))
    }
}
