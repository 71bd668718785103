//! Enumerations used throughout a cohort definition.
//!
//! Every enum serializes to the upper-case tag used on the wire and can be
//! parsed back with `parse` (returns `Option`) or `FromStr` (returns a
//! [`CoreError`]).

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! criteria_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $tag:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $tag)] $variant ),+
        }

        impl $name {
            /// All variants in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $tag),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($tag => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s).ok_or_else(|| CoreError::unknown_value(stringify!($name), s))
            }
        }
    };
}

criteria_enum! {
    /// Clinical domain a search parameter belongs to.
    Domain {
        Condition => "CONDITION",
        Procedure => "PROCEDURE",
        Measurement => "MEASUREMENT",
        Observation => "OBSERVATION",
        Drug => "DRUG",
        Person => "PERSON",
        Survey => "SURVEY",
        Visit => "VISIT",
        PhysicalMeasurement => "PHYSICAL_MEASUREMENT",
    }
}

criteria_enum! {
    /// Vocabulary or criteria tree a search parameter is drawn from.
    CriteriaType {
        Icd9Cm => "ICD9CM",
        Icd9Proc => "ICD9Proc",
        Icd10Cm => "ICD10CM",
        Icd10Pcs => "ICD10PCS",
        Cpt4 => "CPT4",
        Snomed => "SNOMED",
        Loinc => "LOINC",
        Atc => "ATC",
        RxNorm => "RXNORM",
        Ppi => "PPI",
        Pm => "PM",
        Visit => "VISIT",
        Demo => "DEMO",
        Phecode => "PHECODE",
    }
}

impl CriteriaType {
    /// Vocabulary id as stored in the concept table.
    pub fn vocabulary_id(&self) -> &'static str {
        match self {
            CriteriaType::Icd9Cm => "ICD9CM",
            CriteriaType::Icd9Proc => "ICD9Proc",
            CriteriaType::Icd10Cm => "ICD10CM",
            CriteriaType::Icd10Pcs => "ICD10PCS",
            CriteriaType::Cpt4 => "CPT4",
            CriteriaType::Snomed => "SNOMED",
            CriteriaType::Loinc => "LOINC",
            CriteriaType::Atc => "ATC",
            CriteriaType::RxNorm => "RxNorm",
            CriteriaType::Ppi => "PPI",
            CriteriaType::Pm => "PPI",
            CriteriaType::Visit => "Visit",
            CriteriaType::Demo => "Demographic",
            CriteriaType::Phecode => "Phecode",
        }
    }
}

criteria_enum! {
    /// Finer classification within a criteria type.
    CriteriaSubType {
        Gen => "GEN",
        Age => "AGE",
        Race => "RACE",
        Eth => "ETH",
        Sex => "SEX",
        Dec => "DEC",
        Bp => "BP",
        Question => "QUESTION",
        Answer => "ANSWER",
    }
}

criteria_enum! {
    /// Comparison operator for attributes and modifiers.
    Operator {
        Equal => "EQUAL",
        NotEqual => "NOT_EQUAL",
        LessThan => "LESS_THAN",
        GreaterThan => "GREATER_THAN",
        LessThanOrEqualTo => "LESS_THAN_OR_EQUAL_TO",
        GreaterThanOrEqualTo => "GREATER_THAN_OR_EQUAL_TO",
        Like => "LIKE",
        In => "IN",
        Between => "BETWEEN",
    }
}

impl Operator {
    /// SQL token for this operator.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
            Operator::LessThan => "<",
            Operator::GreaterThan => ">",
            Operator::LessThanOrEqualTo => "<=",
            Operator::GreaterThanOrEqualTo => ">=",
            Operator::Like => "like",
            Operator::In => "in",
            Operator::Between => "between",
        }
    }
}

criteria_enum! {
    /// Attribute kinds attached to a search parameter.
    AttrName {
        Any => "ANY",
        Num => "NUM",
        Cat => "CAT",
        Age => "AGE",
        Systolic => "SYSTOLIC",
        Diastolic => "DIASTOLIC",
    }
}

criteria_enum! {
    /// Item-level constraints applied over matched events.
    ModifierType {
        AgeAtEvent => "AGE_AT_EVENT",
        EventDate => "EVENT_DATE",
        NumOfOccurrences => "NUM_OF_OCCURRENCES",
        Encounters => "ENCOUNTERS",
    }
}

criteria_enum! {
    /// Which occurrence per person a temporal group compares.
    TemporalMention {
        AnyMention => "ANY_MENTION",
        FirstMention => "FIRST_MENTION",
        LastMention => "LAST_MENTION",
    }
}

criteria_enum! {
    /// Ordering relation between the two sides of a temporal group.
    TemporalTime {
        DuringSameEncounterAs => "DURING_SAME_ENCOUNTER_AS",
        XDaysBefore => "X_DAYS_BEFORE",
        XDaysAfter => "X_DAYS_AFTER",
        WithinXDaysOf => "WITHIN_X_DAYS_OF",
    }
}

impl TemporalTime {
    /// Whether the relation needs a day count.
    pub fn requires_time_value(&self) -> bool {
        !matches!(self, TemporalTime::DuringSameEncounterAs)
    }
}

criteria_enum! {
    /// Tag on a search group item selecting the query builder.
    TypeFamily {
        Demo => "DEMO",
        Icd9 => "ICD9",
        Icd10 => "ICD10",
        Cpt => "CPT",
        Codes => "CODES",
        Phenotype => "PHENOTYPE",
        Tree => "TREE",
        Condition => "CONDITION",
        Procedure => "PROCEDURE",
        Drug => "DRUG",
        Measurement => "MEASUREMENT",
        Observation => "OBSERVATION",
        Survey => "SURVEY",
        Visit => "VISIT",
        PhysicalMeasurement => "PHYSICAL_MEASUREMENT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip_tags() {
        for domain in Domain::ALL {
            assert_eq!(Domain::parse(domain.as_str()), Some(*domain));
        }
        assert_eq!(CriteriaType::parse("ICD9Proc"), Some(CriteriaType::Icd9Proc));
        assert_eq!(TypeFamily::parse("PHYSICAL_MEASUREMENT"), Some(TypeFamily::PhysicalMeasurement));
    }

    #[test]
    fn test_from_str_unknown() {
        let err = "BOGUS".parse::<Domain>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown Domain value: BOGUS");
    }

    #[test]
    fn test_operator_sql() {
        assert_eq!(Operator::GreaterThanOrEqualTo.as_sql(), ">=");
        assert_eq!(Operator::NotEqual.as_sql(), "!=");
        assert_eq!(Operator::Between.to_string(), "BETWEEN");
    }

    #[test]
    fn test_serde_tags() {
        let json = serde_json::to_string(&TemporalTime::XDaysAfter).unwrap();
        assert_eq!(json, "\"X_DAYS_AFTER\"");
        let mention: TemporalMention = serde_json::from_str("\"FIRST_MENTION\"").unwrap();
        assert_eq!(mention, TemporalMention::FirstMention);
    }

    #[test]
    fn test_time_value_requirement() {
        assert!(!TemporalTime::DuringSameEncounterAs.requires_time_value());
        assert!(TemporalTime::WithinXDaysOf.requires_time_value());
    }
}
