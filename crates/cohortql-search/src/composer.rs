//! Combines per-item fragments into group and cohort queries.
//!
//! - items of a group are intersected (`intersect distinct`)
//! - groups are unioned (`union distinct`)
//! - excludes are subtracted with `not in`
//! - temporal groups relate two event sets with a correlated `exists`

use cohortql_core::{SearchGroup, SearchGroupItem, SearchRequest, TemporalMention, TemporalTime};

use crate::builders::{BuildContext, modifiers};
use crate::dispatch::BuilderRegistry;
use crate::error::{BuildError, CompileError};
use crate::namer::QueryParameterValue;
use crate::sql_builder::SqlFragment;
use crate::validation::TEMPORAL_GROUPS;

/// What the final cohort query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    /// One row per matching `person_id`.
    #[default]
    Participants,
    /// A single `count` row.
    Count,
}

/// Walks a validated request and assembles its SQL.
pub(crate) struct Composer<'r> {
    registry: &'r BuilderRegistry,
}

impl<'r> Composer<'r> {
    pub fn new(registry: &'r BuilderRegistry) -> Self {
        Self { registry }
    }

    pub fn cohort_query(
        &self,
        request: &SearchRequest,
        selection: Selection,
        cx: &mut BuildContext<'_>,
    ) -> Result<SqlFragment, CompileError> {
        let includes = self.groups_query(&request.includes, cx)?;
        let excludes = if request.excludes.is_empty() {
            None
        } else {
            Some(self.groups_query(&request.excludes, cx)?)
        };

        let mut sql = match selection {
            Selection::Participants => SqlFragment::text("select person.person_id from "),
            Selection::Count => SqlFragment::text("select count(*) as count from "),
        };
        sql.table(&cx.context.person)
            .push(" person where person.person_id in (")
            .append(includes)
            .push(")");
        if let Some(excludes) = excludes {
            sql.push(" and person.person_id not in (")
                .append(excludes)
                .push(")");
        }
        Ok(sql)
    }

    fn groups_query(
        &self,
        groups: &[SearchGroup],
        cx: &mut BuildContext<'_>,
    ) -> Result<SqlFragment, CompileError> {
        let queries = groups
            .iter()
            .map(|group| self.group_query(group, cx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SqlFragment::join_nested(queries, " union distinct "))
    }

    fn group_query(
        &self,
        group: &SearchGroup,
        cx: &mut BuildContext<'_>,
    ) -> Result<SqlFragment, CompileError> {
        if group.temporal {
            return self.temporal_query(group, cx);
        }
        let queries = group
            .items
            .iter()
            .map(|item| self.item_query(item, cx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SqlFragment::join_nested(queries, " intersect distinct "))
    }

    fn item_query(
        &self,
        item: &SearchGroupItem,
        cx: &mut BuildContext<'_>,
    ) -> Result<SqlFragment, CompileError> {
        let registration = self.registry.resolve(&item.item_type)?;
        tracing::debug!(
            family = %registration.family,
            builder = registration.builder.name(),
            "Building item"
        );
        Ok(registration.builder.build(item, registration.family, cx)?)
    }

    // ========================================================================
    // Temporal Groups
    // ========================================================================

    /// Persons with an event of group 0 related in time to an event of
    /// group 1.
    ///
    /// The mention narrows group 1, the side the relation constrains; any
    /// event of group 0 may serve as the anchor.
    fn temporal_query(
        &self,
        group: &SearchGroup,
        cx: &mut BuildContext<'_>,
    ) -> Result<SqlFragment, CompileError> {
        let mention = group
            .temporal_mention()
            .map_err(BuildError::from)?
            .unwrap_or(TemporalMention::AnyMention);
        let [anchor_tag, related_tag] = TEMPORAL_GROUPS;
        let first = self.temporal_side(group, anchor_tag, TemporalMention::AnyMention, cx)?;
        let second = self.temporal_side(group, related_tag, mention, cx)?;

        let mut sql = SqlFragment::text("select distinct g0.person_id from (");
        sql.append(first)
            .push(") g0 where exists (select 1 from (")
            .append(second)
            .push(") g1 where g1.person_id = g0.person_id and ")
            .append(Self::relation(group, cx)?)
            .push(")");
        Ok(sql)
    }

    /// Event rows of the items tagged `tag`, narrowed to the mention.
    fn temporal_side(
        &self,
        group: &SearchGroup,
        tag: i32,
        mention: TemporalMention,
        cx: &mut BuildContext<'_>,
    ) -> Result<SqlFragment, CompileError> {
        let mut sources = Vec::new();
        for item in group.temporal_items(tag) {
            let registration = self.registry.resolve(&item.item_type)?;
            tracing::debug!(
                family = %registration.family,
                temporal_group = tag,
                "Building temporal item"
            );
            let events = registration
                .builder
                .build_events(item, registration.family, cx)?;
            sources.push(modifiers::filter_events(events, &item.modifiers, cx)?);
        }
        let events = SqlFragment::join_nested(sources, " union all ");

        let order = match mention {
            TemporalMention::AnyMention => return Ok(events),
            TemporalMention::FirstMention => "e.entry_date, e.visit_occurrence_id",
            TemporalMention::LastMention => "e.entry_date desc, e.visit_occurrence_id desc",
        };
        let mut sql = SqlFragment::text(
            "select ranked.person_id, ranked.entry_date, ranked.visit_occurrence_id from (select e.person_id, e.entry_date, e.visit_occurrence_id, row_number() over (partition by e.person_id order by ",
        );
        sql.push(order)
            .push(") rn from (")
            .append(events)
            .push(") e) ranked where ranked.rn = 1");
        Ok(sql)
    }

    fn relation(group: &SearchGroup, cx: &mut BuildContext<'_>) -> Result<SqlFragment, BuildError> {
        let time = group
            .temporal_time()?
            .unwrap_or(TemporalTime::DuringSameEncounterAs);
        if time == TemporalTime::DuringSameEncounterAs {
            return Ok(SqlFragment::text("g1.visit_occurrence_id = g0.visit_occurrence_id"));
        }

        let days = cx.bind(QueryParameterValue::Int64(group.time_value.unwrap_or_default()));
        let mut sql = SqlFragment::new();
        match time {
            TemporalTime::XDaysBefore => {
                sql.push("g1.entry_date <= DATE_SUB(g0.entry_date, INTERVAL ")
                    .param(&days)
                    .push(" DAY)");
            }
            TemporalTime::XDaysAfter => {
                sql.push("g1.entry_date >= DATE_ADD(g0.entry_date, INTERVAL ")
                    .param(&days)
                    .push(" DAY)");
            }
            _ => {
                sql.push("g1.entry_date between DATE_SUB(g0.entry_date, INTERVAL ")
                    .param(&days)
                    .push(" DAY) and DATE_ADD(g0.entry_date, INTERVAL ")
                    .param(&days)
                    .push(" DAY)");
            }
        }
        Ok(sql)
    }
}
