//! Demographic criteria over the person table.

use super::{BuildContext, QueryBuilder, comparison};
use crate::error::BuildError;
use crate::namer::QueryParameterValue;
use crate::sql_builder::SqlFragment;
use crate::validation::OperandKind;
use cohortql_core::{
    AttrName, CoreError, CriteriaSubType, SearchGroupItem, SearchParameter, TypeFamily,
};
use indexmap::IndexMap;

const AGE_IN_YEARS: &str = "CAST(FLOOR(DATE_DIFF(CURRENT_DATE, DATE(p.birth_datetime), MONTH)/12) AS INT64)";

/// Builds one subquery per demographic subtype, unioned distinct.
#[derive(Debug, Default)]
pub struct DemographicBuilder;

impl DemographicBuilder {
    fn concept_column(subtype: CriteriaSubType) -> Option<&'static str> {
        match subtype {
            CriteriaSubType::Gen => Some("p.gender_concept_id"),
            CriteriaSubType::Race => Some("p.race_concept_id"),
            CriteriaSubType::Eth => Some("p.ethnicity_concept_id"),
            CriteriaSubType::Sex => Some("p.sex_at_birth_concept_id"),
            _ => None,
        }
    }

    fn person_select(cx: &BuildContext<'_>) -> SqlFragment {
        let mut sql = SqlFragment::text("select p.person_id from ");
        sql.table(&cx.context.person).push(" p where ");
        sql
    }

    fn death_exists(cx: &BuildContext<'_>) -> SqlFragment {
        let mut sql = SqlFragment::text("exists (select 'x' from ");
        sql.table(&cx.context.death)
            .push(" d where d.person_id = p.person_id)");
        sql
    }

    fn concept_query(
        column: &'static str,
        params: &[&SearchParameter],
        cx: &mut BuildContext<'_>,
    ) -> SqlFragment {
        let ids: Vec<i64> = params.iter().filter_map(|p| p.concept_id).collect();
        let mut sql = Self::person_select(cx);
        sql.push(column);
        if let [id] = ids.as_slice() {
            let id = cx.bind(QueryParameterValue::Int64(*id));
            sql.push(" = ").param(&id);
        } else {
            let ids = cx.bind(QueryParameterValue::Int64Array(ids));
            sql.push(" in unnest(").param(&ids).push(")");
        }
        sql
    }

    fn age_query(
        param: &SearchParameter,
        cx: &mut BuildContext<'_>,
    ) -> Result<SqlFragment, BuildError> {
        let attribute = param
            .attributes
            .iter()
            .find(|a| a.attr_name().ok() == Some(AttrName::Age))
            .ok_or_else(|| BuildError::invalid_operand("AGE", param.label()))?;
        let mut sql = Self::person_select(cx);
        sql.push(AGE_IN_YEARS)
            .append(comparison(
                cx,
                "AGE",
                attribute.parsed_operator()?,
                &attribute.operands,
                OperandKind::Integer,
            )?)
            .push(" and not ")
            .append(Self::death_exists(cx));
        Ok(sql)
    }
}

impl QueryBuilder for DemographicBuilder {
    fn name(&self) -> &'static str {
        "demographic"
    }

    fn families(&self) -> &'static [TypeFamily] {
        &[TypeFamily::Demo]
    }

    fn build(
        &self,
        item: &SearchGroupItem,
        family: TypeFamily,
        cx: &mut BuildContext<'_>,
    ) -> Result<SqlFragment, BuildError> {
        self.check_family(family)?;

        let mut by_subtype: IndexMap<CriteriaSubType, Vec<&SearchParameter>> = IndexMap::new();
        for param in &item.search_parameters {
            let subtype = param.subtype.as_deref().unwrap_or_default().parse::<CriteriaSubType>()?;
            by_subtype.entry(subtype).or_default().push(param);
        }

        let mut queries = Vec::new();
        for (subtype, params) in by_subtype {
            if let Some(column) = Self::concept_column(subtype) {
                queries.push(Self::concept_query(column, &params, cx));
                continue;
            }
            match subtype {
                CriteriaSubType::Age => {
                    for param in params {
                        queries.push(Self::age_query(param, cx)?);
                    }
                }
                CriteriaSubType::Dec => {
                    let mut sql = Self::person_select(cx);
                    sql.append(Self::death_exists(cx));
                    queries.push(sql);
                }
                other => {
                    return Err(CoreError::unknown_value("demographic subtype", other.as_str()).into());
                }
            }
        }

        tracing::trace!(subqueries = queries.len(), "Built demographic criteria");
        Ok(SqlFragment::join_nested(queries, " union distinct "))
    }
}
