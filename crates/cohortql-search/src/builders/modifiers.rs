//! Item modifiers applied over an event source.

use super::{BuildContext, comparison};
use crate::error::BuildError;
use crate::sql_builder::SqlFragment;
use crate::validation::modifier_operand_kind;
use cohortql_core::{Modifier, ModifierType};

/// Per-event conditions over alias `criteria`, in item order. Occurrence
/// counts are excluded.
fn event_conditions(
    modifiers: &[Modifier],
    cx: &mut BuildContext<'_>,
) -> Result<Vec<SqlFragment>, BuildError> {
    let mut conditions = Vec::new();
    for modifier in modifiers {
        let name = modifier.modifier_type()?;
        let column = match name {
            ModifierType::AgeAtEvent => "criteria.age_at_event",
            ModifierType::EventDate => "criteria.entry_date",
            ModifierType::Encounters => "criteria.visit_concept_id",
            ModifierType::NumOfOccurrences => continue,
        };
        let mut condition = SqlFragment::text(column);
        condition.append(comparison(
            cx,
            name.as_str(),
            modifier.parsed_operator()?,
            &modifier.operands,
            modifier_operand_kind(name),
        )?);
        conditions.push(condition);
    }
    Ok(conditions)
}

fn occurrences(modifiers: &[Modifier]) -> Option<&Modifier> {
    modifiers
        .iter()
        .find(|m| m.modifier_type().ok() == Some(ModifierType::NumOfOccurrences))
}

/// `group by ... having count(...)` over alias `criteria` or `counted`.
fn occurrence_clause(
    modifier: &Modifier,
    counted: bool,
    cx: &mut BuildContext<'_>,
) -> Result<SqlFragment, BuildError> {
    let mut sql = if counted {
        SqlFragment::text(
            " group by counted.person_id, counted.concept_id having count(counted.person_id)",
        )
    } else {
        SqlFragment::text(
            " group by criteria.person_id, criteria.concept_id having count(criteria.person_id)",
        )
    };
    let name = modifier.modifier_type()?;
    sql.append(comparison(
        cx,
        name.as_str(),
        modifier.parsed_operator()?,
        &modifier.operands,
        modifier_operand_kind(name),
    )?);
    Ok(sql)
}

/// Distinct `person_id`s of `events` after applying `modifiers`.
///
/// The occurrence count is always the trailing `group by ... having`.
pub fn person_query(
    events: SqlFragment,
    modifiers: &[Modifier],
    cx: &mut BuildContext<'_>,
) -> Result<SqlFragment, BuildError> {
    let mut sql = SqlFragment::text("select distinct criteria.person_id from (");
    sql.append(events).push(") criteria");

    let conditions = event_conditions(modifiers, cx)?;
    if !conditions.is_empty() {
        sql.push(" where ").append(SqlFragment::join(conditions, " and "));
    }
    if let Some(modifier) = occurrences(modifiers) {
        sql.append(occurrence_clause(modifier, false, cx)?);
    }
    Ok(sql)
}

/// Rows of `events` that satisfy `modifiers`, keeping the event shape.
///
/// Occurrence counts restrict to persons reaching the count over the
/// filtered rows; the filtered fragment is reused so its parameters are
/// bound once.
pub fn filter_events(
    events: SqlFragment,
    modifiers: &[Modifier],
    cx: &mut BuildContext<'_>,
) -> Result<SqlFragment, BuildError> {
    if modifiers.is_empty() {
        return Ok(events);
    }

    let mut filtered = SqlFragment::text("select criteria.* from (");
    filtered.append(events).push(") criteria");
    let conditions = event_conditions(modifiers, cx)?;
    if !conditions.is_empty() {
        filtered
            .push(" where ")
            .append(SqlFragment::join(conditions, " and "));
    }

    let Some(modifier) = occurrences(modifiers) else {
        return Ok(filtered);
    };
    let mut sql = SqlFragment::text("select filtered.* from (");
    sql.append(filtered.clone())
        .push(") filtered where filtered.person_id in (select counted.person_id from (")
        .append(filtered)
        .push(") counted")
        .append(occurrence_clause(modifier, true, cx)?)
        .push(")");
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::test_support;
    use crate::hierarchy::CriteriaLookup;
    use crate::namer::{QueryParameterValue, QueryParameters};
    use cohortql_core::Operator;

    fn modifier(name: ModifierType, operator: Operator, operands: &[&str]) -> Modifier {
        Modifier::new(name, operator, operands.iter().copied())
    }

    #[test]
    fn test_person_query_without_modifiers() {
        let context = test_support::context();
        let lookup = CriteriaLookup::new();
        let mut params = QueryParameters::new();
        let mut cx = BuildContext::new(&context, &lookup, &mut params);
        let sql = person_query(SqlFragment::text("select 1"), &[], &mut cx).unwrap();
        assert_eq!(
            sql.to_sql(),
            "select distinct criteria.person_id from (select 1) criteria"
        );
    }

    #[test]
    fn test_occurrences_come_last() {
        let context = test_support::context();
        let lookup = CriteriaLookup::new();
        let mut params = QueryParameters::new();
        let mut cx = BuildContext::new(&context, &lookup, &mut params);
        let modifiers = vec![
            modifier(ModifierType::NumOfOccurrences, Operator::GreaterThanOrEqualTo, &["2"]),
            modifier(ModifierType::AgeAtEvent, Operator::Between, &["18", "65"]),
            modifier(ModifierType::Encounters, Operator::In, &["9202"]),
            modifier(ModifierType::EventDate, Operator::GreaterThan, &["2019-01-01"]),
        ];
        let sql = person_query(SqlFragment::text("select 1"), &modifiers, &mut cx)
            .unwrap()
            .to_sql();
        assert_eq!(
            sql,
            "select distinct criteria.person_id from (select 1) criteria \
             where criteria.age_at_event between @p1 and @p2 \
             and criteria.visit_concept_id in unnest(@p3) \
             and criteria.entry_date > @p4 \
             group by criteria.person_id, criteria.concept_id having count(criteria.person_id) >= @p5"
        );
        assert_eq!(params.get("p5"), Some(&QueryParameterValue::Int64(2)));
        assert_eq!(params.get("p4").map(|v| v.type_name()), Some("DATE"));
    }

    #[test]
    fn test_filter_events_reuses_parameters() {
        let context = test_support::context();
        let lookup = CriteriaLookup::new();
        let mut params = QueryParameters::new();
        let mut cx = BuildContext::new(&context, &lookup, &mut params);
        let modifiers = vec![
            modifier(ModifierType::AgeAtEvent, Operator::GreaterThan, &["40"]),
            modifier(ModifierType::NumOfOccurrences, Operator::Equal, &["3"]),
        ];
        let sql = filter_events(SqlFragment::text("select 1"), &modifiers, &mut cx)
            .unwrap()
            .to_sql();
        assert!(sql.starts_with("select filtered.* from (select criteria.* from (select 1) criteria where criteria.age_at_event > @p1) filtered"));
        assert!(sql.contains("having count(counted.person_id) = @p2)"));
        assert_eq!(sql.matches("@p1").count(), 2);
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_filter_events_passthrough() {
        let context = test_support::context();
        let lookup = CriteriaLookup::new();
        let mut params = QueryParameters::new();
        let mut cx = BuildContext::new(&context, &lookup, &mut params);
        let sql = filter_events(SqlFragment::text("select 1"), &[], &mut cx).unwrap();
        assert_eq!(sql.to_sql(), "select 1");
    }
}
