//! Predicate validators for cohort definitions.
//!
//! Each check is a pure predicate over one AST node paired with a templated
//! message. Checks run in a fixed order and the first failure is returned,
//! so validating the same request twice yields the same verdict and message.
//! A request that passes is guaranteed buildable: builders re-parse operands
//! with the same helpers and never see a value rejected here.

use crate::error::ValidationError;
use cohortql_core::{
    AttrName, Attribute, CriteriaSubType, CriteriaType, Domain, Modifier, ModifierType, Operator,
    SearchGroup, SearchGroupItem, SearchParameter, SearchRequest, TemporalMention, TypeFamily,
};
use cohortql_core::Result as CoreResult;
use std::collections::HashSet;
use time::Date;
use time::macros::format_description;

/// Temporal group tags an item may carry.
pub const TEMPORAL_GROUPS: [i32; 2] = [0, 1];

// ============================================================================
// Family Rules
// ============================================================================

/// How group nodes of a family are expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupExpansion {
    /// Group nodes are not allowed
    None,
    /// Group nodes must request ancestor expansion
    Ancestor,
    /// Ancestor expansion, or a prefix match on the node's code
    AncestorOrPrefix,
}

/// Which key a leaf parameter must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKey {
    ConceptId,
    Value,
    Either,
    /// Checked by the family's own item check
    Deferred,
}

/// Family-specific item checks, run after the generic ones.
pub type ItemCheck = fn(&SearchGroupItem) -> Result<(), ValidationError>;

/// Whitelists and switches validated for every item of one family.
#[derive(Debug, Clone)]
pub struct FamilyRules {
    pub domains: &'static [Domain],
    pub types: &'static [CriteriaType],
    pub subtypes: &'static [CriteriaSubType],
    pub subtype_required: bool,
    pub leaf_key: LeafKey,
    pub group_expansion: GroupExpansion,
    pub allows_attributes: bool,
    pub allows_modifiers: bool,
    pub temporal: bool,
    pub extra: Option<ItemCheck>,
}

// ============================================================================
// Operand Parsing
// ============================================================================

/// Expected type of attribute and modifier operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    Integer,
    Number,
    Date,
    Unconstrained,
}

pub(crate) fn attribute_operand_kind(name: AttrName) -> OperandKind {
    match name {
        AttrName::Num | AttrName::Systolic | AttrName::Diastolic => OperandKind::Number,
        AttrName::Age | AttrName::Cat => OperandKind::Integer,
        AttrName::Any => OperandKind::Unconstrained,
    }
}

pub(crate) fn modifier_operand_kind(name: ModifierType) -> OperandKind {
    match name {
        ModifierType::EventDate => OperandKind::Date,
        ModifierType::AgeAtEvent | ModifierType::NumOfOccurrences | ModifierType::Encounters => {
            OperandKind::Integer
        }
    }
}

pub fn parse_integer(operand: &str) -> Option<i64> {
    operand.trim().parse().ok()
}

pub fn parse_number(operand: &str) -> Option<f64> {
    operand
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_date(operand: &str) -> Option<Date> {
    Date::parse(operand.trim(), format_description!("[year]-[month]-[day]")).ok()
}

// ============================================================================
// Predicates
// ============================================================================

pub fn between_arity_invalid(operator: Operator, operands: &[String]) -> bool {
    operator == Operator::Between && operands.len() != 2
}

pub fn in_arity_invalid(operator: Operator, operands: &[String]) -> bool {
    operator == Operator::In && operands.is_empty()
}

pub fn single_arity_invalid(operator: Operator, operands: &[String]) -> bool {
    !matches!(operator, Operator::Between | Operator::In) && operands.len() != 1
}

pub fn operands_not_integers(operands: &[String]) -> bool {
    operands.iter().any(|o| parse_integer(o).is_none())
}

pub fn operands_not_numeric(operands: &[String]) -> bool {
    operands.iter().any(|o| parse_number(o).is_none())
}

pub fn operands_not_dates(operands: &[String]) -> bool {
    operands.iter().any(|o| parse_date(o).is_none())
}

pub fn blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

pub fn missing_temporal_groups(group: &SearchGroup) -> bool {
    let tags: HashSet<i32> = group.items.iter().filter_map(|i| i.temporal_group).collect();
    TEMPORAL_GROUPS.iter().any(|tag| !tags.contains(tag))
}

pub fn invalid_temporal_tag(item: &SearchGroupItem) -> bool {
    item.temporal_group
        .is_none_or(|tag| !TEMPORAL_GROUPS.contains(&tag))
}

/// Blood pressure parameters are keyed by their attributes' concept ids.
pub fn is_blood_pressure(param: &SearchParameter) -> bool {
    param.subtype.as_deref() == Some(CriteriaSubType::Bp.as_str())
}

fn has_subtype(item: &SearchGroupItem, subtype: CriteriaSubType) -> bool {
    item.search_parameters
        .iter()
        .any(|p| p.subtype.as_deref() == Some(subtype.as_str()))
}

pub fn age_with_deceased(item: &SearchGroupItem) -> bool {
    has_subtype(item, CriteriaSubType::Age) && has_subtype(item, CriteriaSubType::Dec)
}

// ============================================================================
// Node Validators
// ============================================================================

fn ensure(
    failed: bool,
    field: &str,
    message: impl FnOnce() -> String,
) -> Result<(), ValidationError> {
    if failed {
        return Err(ValidationError::new(field, message()));
    }
    Ok(())
}

/// Parsed tag, or a validation error naming `field`.
fn known<T>(
    parsed: CoreResult<T>,
    field: &str,
    what: &str,
    value: &str,
) -> Result<T, ValidationError> {
    parsed.map_err(|_| ValidationError::new(field, format!("{value} is not a valid {what}")))
}

/// Request-level checks.
pub fn validate_request(request: &SearchRequest) -> Result<(), ValidationError> {
    ensure(request.includes.is_empty(), "includes", || {
        "Search Request must contain at least one include group".to_string()
    })
}

/// Group-level checks, including temporal structure.
pub fn validate_group(group: &SearchGroup) -> Result<(), ValidationError> {
    ensure(group.items.is_empty(), "items", || {
        "Search Group must contain at least one item".to_string()
    })?;
    if !group.temporal {
        return Ok(());
    }

    for item in &group.items {
        ensure(invalid_temporal_tag(item), "temporalGroup", || {
            format!(
                "search group item {} must have a temporal group of 0 or 1",
                item.id.as_deref().unwrap_or(&item.item_type)
            )
        })?;
    }
    ensure(missing_temporal_groups(group), "temporalGroup", || {
        "Search Group Items must provided for 2 different temporal groups(0 or 1)".to_string()
    })?;

    let mention = known(
        group.temporal_mention(),
        "mention",
        "temporal mention",
        group.mention.as_deref().unwrap_or_default(),
    )?;
    let Some(mention) = mention else {
        return Err(ValidationError::new(
            "mention",
            "temporal group requires a mention",
        ));
    };
    let time = known(
        group.temporal_time(),
        "time",
        "temporal time",
        group.time.as_deref().unwrap_or_default(),
    )?;
    ensure(
        mention != TemporalMention::AnyMention && time.is_none(),
        "time",
        || format!("temporal group with {mention} requires a time"),
    )?;
    if let Some(time) = time {
        ensure(
            time.requires_time_value() && group.time_value.is_none(),
            "timeValue",
            || format!("temporal group with {time} requires a time value"),
        )?;
    }
    ensure(group.time_value.is_some_and(|v| v < 0), "timeValue", || {
        format!(
            "temporal group time value must not be negative: {}",
            group.time_value.unwrap_or_default()
        )
    })
}

/// Item-level checks for `family` under its registered rules.
pub fn validate_item(
    item: &SearchGroupItem,
    family: TypeFamily,
    rules: &FamilyRules,
    temporal: bool,
) -> Result<(), ValidationError> {
    ensure(item.search_parameters.is_empty(), "searchParameters", || {
        "Search Group Item must contain at least one search parameter".to_string()
    })?;
    ensure(temporal && !rules.temporal, "type", || {
        format!("{family} criteria cannot be used in a temporal group")
    })?;

    for param in &item.search_parameters {
        validate_parameter(param, family, rules)?;
    }

    ensure(!rules.allows_modifiers && !item.modifiers.is_empty(), "modifiers", || {
        format!("modifiers are not supported for {family} criteria")
    })?;
    validate_modifiers(&item.modifiers)?;

    if let Some(check) = rules.extra {
        check(item)?;
    }
    Ok(())
}

/// Parameter-level checks.
pub fn validate_parameter(
    param: &SearchParameter,
    family: TypeFamily,
    rules: &FamilyRules,
) -> Result<(), ValidationError> {
    let label = param.label();

    let domain = Domain::parse(&param.domain);
    ensure(domain.is_none(), "domain", || {
        format!("{} is not a valid domain", param.domain)
    })?;
    ensure(
        domain.is_some_and(|d| !rules.domains.contains(&d)),
        "domain",
        || format!("{} is not a valid domain for {family}", param.domain),
    )?;

    let criteria_type = CriteriaType::parse(&param.criteria_type);
    ensure(
        criteria_type.is_none_or(|t| !rules.types.contains(&t)),
        "type",
        || format!("{} is not a valid type for {family}", param.criteria_type),
    )?;

    match param.subtype.as_deref() {
        None => ensure(rules.subtype_required, "subtype", || {
            format!("search parameter {label} requires a subtype for {family}")
        })?,
        Some(subtype) => ensure(
            CriteriaSubType::parse(subtype).is_none_or(|s| !rules.subtypes.contains(&s)),
            "subtype",
            || format!("{subtype} is not a valid subtype for {family}"),
        )?,
    }

    if param.group {
        match rules.group_expansion {
            GroupExpansion::None => {
                return Err(ValidationError::new(
                    "group",
                    format!("search parameter {label} cannot be a group for {family}"),
                ));
            }
            GroupExpansion::Ancestor => ensure(!param.ancestor_data, "ancestorData", || {
                format!("group search parameter {label} requires ancestor data for {family}")
            })?,
            GroupExpansion::AncestorOrPrefix => ensure(
                !param.ancestor_data && blank(param.value.as_deref()),
                "value",
                || format!("group search parameter {label} requires a code value"),
            )?,
        }
        ensure(
            param.ancestor_data && param.concept_id.is_none(),
            "conceptId",
            || "search parameter with group and ancestor data must have a concept id".to_string(),
        )?;
    } else {
        let missing = match rules.leaf_key {
            LeafKey::ConceptId => param.concept_id.is_none() && !is_blood_pressure(param),
            LeafKey::Value => blank(param.value.as_deref()),
            LeafKey::Either => param.concept_id.is_none() && blank(param.value.as_deref()),
            LeafKey::Deferred => false,
        };
        ensure(missing, "conceptId", || match rules.leaf_key {
            LeafKey::ConceptId => format!("search parameter {label} requires a concept id"),
            LeafKey::Value => format!("search parameter {label} requires a value"),
            _ => format!("search parameter {label} requires a concept id or value"),
        })?;
    }

    ensure(
        !rules.allows_attributes && !param.attributes.is_empty(),
        "attributes",
        || format!("attributes are not supported for {family} criteria"),
    )?;
    for attribute in &param.attributes {
        validate_attribute(attribute)?;
    }
    Ok(())
}

/// Attribute operator, arity and operand type checks.
pub fn validate_attribute(attribute: &Attribute) -> Result<(), ValidationError> {
    let name = known(attribute.attr_name(), "name", "attribute name", &attribute.name)?;
    if name == AttrName::Any {
        return Ok(());
    }
    let operator = known(
        attribute.parsed_operator(),
        "operator",
        "operator",
        &attribute.operator,
    )?;
    ensure(
        name == AttrName::Cat && operator != Operator::In,
        "operator",
        || "attribute CAT must use the IN operator".to_string(),
    )?;
    validate_operands(
        "attribute",
        name.as_str(),
        operator,
        &attribute.operands,
        attribute_operand_kind(name),
    )
}

/// Modifier list checks: each name at most once, then each modifier.
pub fn validate_modifiers(modifiers: &[Modifier]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for modifier in modifiers {
        let name = known(modifier.modifier_type(), "name", "modifier", &modifier.name)?;
        ensure(!seen.insert(name), "modifiers", || {
            format!("modifier {name} can only be specified once")
        })?;
    }
    modifiers.iter().try_for_each(validate_modifier)
}

pub fn validate_modifier(modifier: &Modifier) -> Result<(), ValidationError> {
    let name = known(modifier.modifier_type(), "name", "modifier", &modifier.name)?;
    let operator = known(
        modifier.parsed_operator(),
        "operator",
        "operator",
        &modifier.operator,
    )?;
    ensure(
        name == ModifierType::Encounters && operator != Operator::In,
        "operator",
        || "modifier ENCOUNTERS must use the IN operator".to_string(),
    )?;
    let kind = modifier_operand_kind(name);
    ensure(
        kind == OperandKind::Date && operator == Operator::In,
        "operator",
        || format!("modifier {name} does not support the IN operator"),
    )?;
    validate_operands("modifier", name.as_str(), operator, &modifier.operands, kind)
}

fn validate_operands(
    node: &str,
    name: &str,
    operator: Operator,
    operands: &[String],
    kind: OperandKind,
) -> Result<(), ValidationError> {
    ensure(operator == Operator::Like, "operator", || {
        format!("{node} {name} does not support the LIKE operator")
    })?;
    ensure(between_arity_invalid(operator, operands), "operands", || {
        format!("{node} {name} can only have 2 operands when using the BETWEEN operator")
    })?;
    ensure(in_arity_invalid(operator, operands), "operands", || {
        format!("{node} {name} must have at least one operand when using the IN operator")
    })?;
    ensure(single_arity_invalid(operator, operands), "operands", || {
        format!("{node} {name} must have one operand when using the {operator} operator")
    })?;
    match kind {
        OperandKind::Integer => ensure(operands_not_integers(operands), "operands", || {
            format!("{node} {name} operands must be integers: {}", operands.join(", "))
        }),
        OperandKind::Number => ensure(operands_not_numeric(operands), "operands", || {
            format!("{node} {name} operands must be numeric: {}", operands.join(", "))
        }),
        OperandKind::Date => ensure(operands_not_dates(operands), "operands", || {
            format!("{node} {name} must be a valid date: {}", operands.join(", "))
        }),
        OperandKind::Unconstrained => Ok(()),
    }
}

// ============================================================================
// Family-Specific Checks
// ============================================================================

/// Demographic items: age excludes deceased, age needs one AGE attribute,
/// concept subtypes need a concept id and no attributes.
pub fn validate_demographics(item: &SearchGroupItem) -> Result<(), ValidationError> {
    ensure(age_with_deceased(item), "subtype", || {
        "age and deceased cannot be combined in one demographic item".to_string()
    })?;
    for param in &item.search_parameters {
        let is_age = param.subtype.as_deref() == Some(CriteriaSubType::Age.as_str());
        if is_age {
            let age_attributes = param
                .attributes
                .iter()
                .filter(|a| a.attr_name().ok() == Some(AttrName::Age))
                .count();
            ensure(
                age_attributes != 1 || param.attributes.len() != 1,
                "attributes",
                || "demographic AGE requires exactly one AGE attribute".to_string(),
            )?;
        } else {
            ensure(
                param.subtype.as_deref() != Some(CriteriaSubType::Dec.as_str())
                    && param.concept_id.is_none(),
                "conceptId",
                || format!("search parameter {} requires a concept id", param.label()),
            )?;
            ensure(!param.attributes.is_empty(), "attributes", || {
                format!(
                    "attributes are only supported for demographic AGE, not {}",
                    param.subtype.as_deref().unwrap_or_default()
                )
            })?;
        }
    }
    Ok(())
}

/// Blood pressure parameters pair a systolic with a diastolic attribute (or
/// use ANY), and every attribute names the concept it measures.
pub fn validate_blood_pressure(item: &SearchGroupItem) -> Result<(), ValidationError> {
    for param in item.search_parameters.iter().filter(|p| is_blood_pressure(p)) {
        let names: HashSet<AttrName> = param
            .attributes
            .iter()
            .filter_map(|a| a.attr_name().ok())
            .collect();
        let complete = names.contains(&AttrName::Any)
            || (names.contains(&AttrName::Systolic) && names.contains(&AttrName::Diastolic));
        ensure(!complete, "attributes", || {
            format!(
                "blood pressure parameter {} requires SYSTOLIC and DIASTOLIC attributes",
                param.label()
            )
        })?;
        if let Some(attribute) = param.attributes.iter().find(|a| a.concept_id.is_none()) {
            return Err(ValidationError::new(
                "conceptId",
                format!("blood pressure attribute {} requires a concept id", attribute.name),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohortql_core::TemporalTime;

    fn attribute(name: AttrName, operator: Operator, operands: &[&str]) -> Attribute {
        Attribute::new(name, operator, operands.iter().copied())
    }

    fn modifier(name: ModifierType, operator: Operator, operands: &[&str]) -> Modifier {
        Modifier::new(name, operator, operands.iter().copied())
    }

    fn temporal_item(tag: Option<i32>) -> SearchGroupItem {
        SearchGroupItem {
            item_type: "ICD9".into(),
            temporal_group: tag,
            ..Default::default()
        }
    }

    #[test]
    fn test_between_requires_two_operands() {
        let err = validate_attribute(&attribute(AttrName::Num, Operator::Between, &["5"]))
            .unwrap_err();
        assert!(err.message().contains("BETWEEN"));
        assert!(err.message().contains("2 operands"));
        assert!(validate_attribute(&attribute(AttrName::Num, Operator::Between, &["5", "10"])).is_ok());
    }

    #[test]
    fn test_single_operand_operators() {
        let err = validate_attribute(&attribute(AttrName::Num, Operator::Equal, &["1", "2"]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Bad Request: attribute NUM must have one operand when using the EQUAL operator"
        );
        assert!(validate_attribute(&attribute(AttrName::Num, Operator::LessThan, &[])).is_err());
    }

    #[test]
    fn test_numeric_operands() {
        let err = validate_attribute(&attribute(AttrName::Num, Operator::Equal, &["abc"]))
            .unwrap_err();
        assert!(err.message().contains("must be numeric"));
        assert!(validate_attribute(&attribute(AttrName::Num, Operator::Equal, &["1.5"])).is_ok());
        assert!(validate_attribute(&attribute(AttrName::Num, Operator::Equal, &["NaN"])).is_err());
    }

    #[test]
    fn test_categorical_requires_in() {
        assert!(validate_attribute(&attribute(AttrName::Cat, Operator::Equal, &["1"])).is_err());
        assert!(validate_attribute(&attribute(AttrName::Cat, Operator::In, &[])).is_err());
        assert!(validate_attribute(&attribute(AttrName::Cat, Operator::In, &["1", "2"])).is_ok());
    }

    #[test]
    fn test_modifier_rules() {
        let date = modifier(ModifierType::EventDate, Operator::GreaterThan, &["2020-13-01"]);
        assert!(validate_modifier(&date).unwrap_err().message().contains("must be a valid date"));

        let ok = modifier(ModifierType::EventDate, Operator::Between, &["2020-01-01", "2020-12-31"]);
        assert!(validate_modifier(&ok).is_ok());

        let encounters = modifier(ModifierType::Encounters, Operator::Equal, &["9202"]);
        assert_eq!(
            validate_modifier(&encounters).unwrap_err().message(),
            "modifier ENCOUNTERS must use the IN operator"
        );

        let duplicate = vec![
            modifier(ModifierType::AgeAtEvent, Operator::GreaterThan, &["18"]),
            modifier(ModifierType::AgeAtEvent, Operator::LessThan, &["65"]),
        ];
        assert!(validate_modifiers(&duplicate).unwrap_err().message().contains("only be specified once"));
    }

    #[test]
    fn test_temporal_group_requires_both_tags() {
        let group = SearchGroup {
            temporal: true,
            mention: Some("FIRST_MENTION".into()),
            time: Some(TemporalTime::XDaysAfter.to_string()),
            time_value: Some(5),
            items: vec![temporal_item(Some(0)), temporal_item(Some(0))],
            ..Default::default()
        };
        let err = validate_group(&group).unwrap_err();
        assert_eq!(
            err.message(),
            "Search Group Items must provided for 2 different temporal groups(0 or 1)"
        );
    }

    #[test]
    fn test_temporal_group_tags_and_time() {
        let mut group = SearchGroup {
            temporal: true,
            mention: Some(TemporalMention::FirstMention.to_string()),
            time: Some(TemporalTime::XDaysAfter.to_string()),
            time_value: None,
            items: vec![temporal_item(Some(0)), temporal_item(Some(1))],
            ..Default::default()
        };
        assert_eq!(validate_group(&group).unwrap_err().field(), "timeValue");

        group.time_value = Some(5);
        assert!(validate_group(&group).is_ok());

        group.items.push(temporal_item(Some(2)));
        assert_eq!(validate_group(&group).unwrap_err().field(), "temporalGroup");

        group.items.pop();
        group.time = None;
        assert_eq!(validate_group(&group).unwrap_err().field(), "time");

        group.mention = Some(TemporalMention::AnyMention.to_string());
        assert!(validate_group(&group).is_ok());

        group.mention = Some("SOMETIMES".into());
        let err = validate_group(&group).unwrap_err();
        assert_eq!(err.field(), "mention");
        assert_eq!(err.message(), "SOMETIMES is not a valid temporal mention");

        group.mention = Some(TemporalMention::LastMention.to_string());
        group.time = Some("EVENTUALLY".into());
        assert_eq!(validate_group(&group).unwrap_err().field(), "time");
    }

    #[test]
    fn test_unknown_tags_name_the_field() {
        let mut roughly = attribute(AttrName::Num, Operator::Equal, &["1"]);
        roughly.operator = "ROUGHLY".into();
        let err = validate_attribute(&roughly).unwrap_err();
        assert_eq!(err.field(), "operator");
        assert_eq!(err.to_string(), "Bad Request: ROUGHLY is not a valid operator");

        let mut unknown_name = attribute(AttrName::Num, Operator::Equal, &["1"]);
        unknown_name.name = "PULSE".into();
        assert_eq!(validate_attribute(&unknown_name).unwrap_err().field(), "name");

        let mut unknown_modifier = modifier(ModifierType::AgeAtEvent, Operator::Equal, &["1"]);
        unknown_modifier.name = "WEEKDAY".into();
        let err = validate_modifiers(&[unknown_modifier]).unwrap_err();
        assert_eq!(err.field(), "name");
        assert_eq!(err.message(), "WEEKDAY is not a valid modifier");
    }

    #[test]
    fn test_blood_pressure_keyed_by_attributes() {
        let systolic = attribute(AttrName::Systolic, Operator::LessThanOrEqualTo, &["90"]);
        let diastolic = attribute(AttrName::Diastolic, Operator::LessThanOrEqualTo, &["60"]);
        let mut item = SearchGroupItem {
            item_type: "PHYSICAL_MEASUREMENT".into(),
            search_parameters: vec![SearchParameter {
                domain: "PHYSICAL_MEASUREMENT".into(),
                criteria_type: "PM".into(),
                subtype: Some("BP".into()),
                attributes: vec![
                    systolic.clone().with_concept_id(903118),
                    diastolic.clone().with_concept_id(903115),
                ],
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(is_blood_pressure(&item.search_parameters[0]));
        assert!(validate_blood_pressure(&item).is_ok());

        item.search_parameters[0].attributes[1] = diastolic;
        let err = validate_blood_pressure(&item).unwrap_err();
        assert_eq!(err.field(), "conceptId");
        assert_eq!(err.message(), "blood pressure attribute DIASTOLIC requires a concept id");

        item.search_parameters[0].attributes = vec![systolic.with_concept_id(903118)];
        assert_eq!(validate_blood_pressure(&item).unwrap_err().field(), "attributes");
    }

    #[test]
    fn test_validation_is_idempotent() {
        let group = SearchGroup {
            temporal: true,
            items: vec![temporal_item(Some(1))],
            ..Default::default()
        };
        let first = validate_group(&group).unwrap_err();
        let second = validate_group(&group).unwrap_err();
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_integer(" 42 "), Some(42));
        assert_eq!(parse_integer("4.2"), None);
        assert_eq!(parse_number("4.2"), Some(4.2));
        assert!(parse_date("2021-02-28").is_some());
        assert!(parse_date("2021-02-30").is_none());
        assert!(parse_date("02/28/2021").is_none());
    }

    #[test]
    fn test_age_with_deceased() {
        let param = |subtype: &str| SearchParameter {
            domain: "PERSON".into(),
            criteria_type: "DEMO".into(),
            subtype: Some(subtype.into()),
            ..Default::default()
        };
        let item = SearchGroupItem {
            item_type: "DEMO".into(),
            search_parameters: vec![param("AGE"), param("DEC")],
            ..Default::default()
        };
        assert!(age_with_deceased(&item));
        assert!(validate_demographics(&item).is_err());
    }
}
