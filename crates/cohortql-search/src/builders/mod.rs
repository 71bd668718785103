//! Per-family query builders.
//!
//! Each builder turns one validated [`SearchGroupItem`] into a SQL fragment
//! selecting matching `person_id`s. Every family except demographics first
//! produces an *event source* with a fixed column shape:
//!
//! | column | meaning |
//! |--------|---------|
//! | `person_id` | entity key |
//! | `entry_date` | event date |
//! | `concept_id` | matched concept |
//! | `visit_occurrence_id` | encounter of the event |
//! | `age_at_event` | age in whole years at the event |
//! | `visit_concept_id` | encounter type |
//!
//! Modifiers and temporal composition work over that shape, so they are
//! shared by all event families.

pub mod code_group;
pub mod coded;
pub mod demographic;
pub mod events;
pub mod modifiers;
pub mod phenotype;
pub mod tree;

pub use code_group::{CodeGroupBuilder, CodeGroupQuery};
pub use coded::CodedHierarchyBuilder;
pub use demographic::DemographicBuilder;
pub use events::DomainEventsBuilder;
pub use phenotype::PhenotypeBuilder;
pub use tree::{CriteriaTreeBuilder, CriteriaTreeQuery};

use crate::config::{CompilerContext, DomainTable};
use crate::error::BuildError;
use crate::hierarchy::CriteriaLookup;
use crate::namer::{ParamRef, QueryParameterValue, QueryParameters};
use crate::sql_builder::SqlFragment;
use crate::validation::{OperandKind, parse_date, parse_integer, parse_number};
use cohortql_core::{Operator, SearchGroupItem, TypeFamily};

/// Everything a builder may read or bind during one compilation.
pub struct BuildContext<'a> {
    pub context: &'a CompilerContext,
    pub lookup: &'a CriteriaLookup,
    pub params: &'a mut QueryParameters,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        context: &'a CompilerContext,
        lookup: &'a CriteriaLookup,
        params: &'a mut QueryParameters,
    ) -> Self {
        Self {
            context,
            lookup,
            params,
        }
    }

    pub fn bind(&mut self, value: QueryParameterValue) -> ParamRef {
        self.params.allocate(value)
    }

    /// Bind a prefix-match code pattern as `@codeN`.
    pub fn bind_code(&mut self, pattern: String) -> ParamRef {
        self.params
            .allocate_with_prefix("code", QueryParameterValue::String(pattern))
    }

    /// Bind the 1/0 flag used by `is_standard` columns of event tables.
    pub fn bind_standard(&mut self, standard: bool) -> ParamRef {
        self.bind(QueryParameterValue::Int64(i64::from(standard)))
    }
}

/// A query builder for one or more type families.
pub trait QueryBuilder: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Families this builder accepts.
    fn families(&self) -> &'static [TypeFamily];

    /// Fragment selecting the `person_id`s matching `item`.
    fn build(
        &self,
        item: &SearchGroupItem,
        family: TypeFamily,
        cx: &mut BuildContext<'_>,
    ) -> Result<SqlFragment, BuildError>;

    /// Event source for `item`, used by temporal composition.
    fn build_events(
        &self,
        _item: &SearchGroupItem,
        family: TypeFamily,
        _cx: &mut BuildContext<'_>,
    ) -> Result<SqlFragment, BuildError> {
        Err(BuildError::TemporalUnsupported(family))
    }

    fn check_family(&self, family: TypeFamily) -> Result<(), BuildError> {
        if self.families().contains(&family) {
            Ok(())
        } else {
            Err(BuildError::FamilyMismatch {
                builder: self.name(),
                family,
            })
        }
    }
}

// ============================================================================
// Shared Helpers
// ============================================================================

/// Right-hand side of a comparison: ` = @p1`, ` between @p1 and @p2` or
/// ` in unnest(@p1)`.
pub fn comparison(
    cx: &mut BuildContext<'_>,
    field: &'static str,
    operator: Operator,
    operands: &[String],
    kind: OperandKind,
) -> Result<SqlFragment, BuildError> {
    let values = operands
        .iter()
        .map(|operand| operand_value(field, operand, kind))
        .collect::<Result<Vec<_>, _>>()?;

    let mut sql = SqlFragment::new();
    match operator {
        Operator::Between => {
            let [low, high] = <[QueryParameterValue; 2]>::try_from(values)
                .map_err(|_| BuildError::invalid_operand(field, operands.join(",")))?;
            let low = cx.bind(low);
            let high = cx.bind(high);
            sql.push(" between ").param(&low).push(" and ").param(&high);
        }
        Operator::In => {
            let array = cx.bind(array_value(field, values)?);
            sql.push(" in unnest(").param(&array).push(")");
        }
        _ => {
            let value = values
                .into_iter()
                .next()
                .ok_or_else(|| BuildError::invalid_operand(field, ""))?;
            let value = cx.bind(value);
            sql.push(" ").push(operator.as_sql()).push(" ").param(&value);
        }
    }
    Ok(sql)
}

fn operand_value(
    field: &'static str,
    operand: &str,
    kind: OperandKind,
) -> Result<QueryParameterValue, BuildError> {
    let value = match kind {
        OperandKind::Integer => parse_integer(operand).map(QueryParameterValue::Int64),
        OperandKind::Number => parse_number(operand).map(QueryParameterValue::Float64),
        OperandKind::Date => parse_date(operand).map(QueryParameterValue::Date),
        OperandKind::Unconstrained => Some(QueryParameterValue::String(operand.to_string())),
    };
    value.ok_or_else(|| BuildError::invalid_operand(field, operand))
}

fn array_value(
    field: &'static str,
    values: Vec<QueryParameterValue>,
) -> Result<QueryParameterValue, BuildError> {
    let mut ints = Vec::new();
    let mut floats = Vec::new();
    let mut strings = Vec::new();
    for value in values {
        match value {
            QueryParameterValue::Int64(v) => ints.push(v),
            QueryParameterValue::Float64(v) => floats.push(v),
            QueryParameterValue::String(v) => strings.push(v),
            other => return Err(BuildError::invalid_operand(field, other.to_string())),
        }
    }
    Ok(match (ints.is_empty(), floats.is_empty()) {
        (false, _) => QueryParameterValue::Int64Array(ints),
        (true, false) => QueryParameterValue::Float64Array(floats),
        (true, true) => QueryParameterValue::StringArray(strings),
    })
}

/// Event source over the denormalized search-all-events table.
pub fn all_events(cx: &BuildContext<'_>, predicate: SqlFragment) -> SqlFragment {
    let mut sql = SqlFragment::text(
        "select person_id, entry_date, concept_id, visit_occurrence_id, age_at_event, visit_concept_id from ",
    );
    sql.table(&cx.context.search_all_events)
        .push(" where ")
        .append(predicate);
    sql
}

/// Event source over one domain's occurrence table, aliased `t`.
pub fn occurrence_events(
    cx: &BuildContext<'_>,
    table: &DomainTable,
    standard: bool,
    predicate: SqlFragment,
) -> SqlFragment {
    let concept = table.concept_column(standard);
    let mut sql = SqlFragment::text("select t.person_id, t.");
    sql.ident(&table.date_column)
        .push(" as entry_date, t.")
        .ident(concept)
        .push(" as concept_id, t.visit_occurrence_id, CAST(FLOOR(DATE_DIFF(t.")
        .ident(&table.date_column)
        .push(", DATE(p.birth_datetime), MONTH)/12) AS INT64) as age_at_event, v.visit_concept_id from ")
        .table(&table.table)
        .push(" t join ")
        .table(&cx.context.person)
        .push(" p on p.person_id = t.person_id left join ")
        .table(&cx.context.visit_occurrence)
        .push(" v on v.visit_occurrence_id = t.visit_occurrence_id where ")
        .append(predicate);
    sql
}

/// True when a code carries a trailing wildcard marker.
pub fn has_wildcard(code: &str) -> bool {
    code.trim_end().ends_with(['%', '*'])
}

/// Normalize a code into an upper-case `LIKE` prefix pattern.
pub fn prefix_pattern(code: &str) -> String {
    format!(
        "{}%",
        code.trim().trim_end_matches(['%', '*']).to_uppercase()
    )
}
