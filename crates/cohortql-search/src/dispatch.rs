//! Type family registry.
//!
//! This module maps every `SearchGroupItem.type` tag to:
//! - the [`QueryBuilder`] that generates its SQL
//! - the [`FamilyRules`] its parameters are validated against
//!
//! The registry is built once and read-only afterwards, so it can be shared
//! across concurrent compilations behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use cohortql_core::{CriteriaSubType, CriteriaType, Domain, TypeFamily};

use crate::builders::{
    CodeGroupBuilder, CodedHierarchyBuilder, CriteriaTreeBuilder, DemographicBuilder,
    DomainEventsBuilder, PhenotypeBuilder, QueryBuilder,
};
use crate::error::CompileError;
use crate::validation::{
    FamilyRules, GroupExpansion, LeafKey, validate_blood_pressure, validate_demographics,
};

/// A builder together with the rules for one family.
#[derive(Clone)]
pub struct FamilyRegistration {
    pub family: TypeFamily,
    pub builder: Arc<dyn QueryBuilder>,
    pub rules: FamilyRules,
}

impl std::fmt::Debug for FamilyRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FamilyRegistration")
            .field("family", &self.family)
            .field("builder", &self.builder.name())
            .field("rules", &self.rules)
            .finish()
    }
}

/// Registry of builders keyed by type family.
#[derive(Debug, Default)]
pub struct BuilderRegistry {
    entries: HashMap<TypeFamily, FamilyRegistration>,
}

impl BuilderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in family.
    pub fn standard() -> Self {
        let mut registry = Self::new();

        registry.register(TypeFamily::Demo, Arc::new(DemographicBuilder), demographic_rules());

        let coded: Arc<dyn QueryBuilder> = Arc::new(CodedHierarchyBuilder);
        registry.register(TypeFamily::Icd9, coded.clone(), coded_rules(ICD9_TYPES));
        registry.register(TypeFamily::Icd10, coded.clone(), coded_rules(ICD10_TYPES));
        registry.register(TypeFamily::Cpt, coded, coded_rules(CPT_TYPES));

        registry.register(TypeFamily::Codes, Arc::new(CodeGroupBuilder), code_group_rules());
        registry.register(TypeFamily::Phenotype, Arc::new(PhenotypeBuilder), phenotype_rules());
        registry.register(TypeFamily::Tree, Arc::new(CriteriaTreeBuilder), tree_rules());

        let events: Arc<dyn QueryBuilder> = Arc::new(DomainEventsBuilder);
        for family in events.families() {
            registry.register(*family, events.clone(), event_rules(*family));
        }

        registry
    }

    /// Register (or replace) the builder and rules for `family`.
    pub fn register(
        &mut self,
        family: TypeFamily,
        builder: Arc<dyn QueryBuilder>,
        rules: FamilyRules,
    ) {
        tracing::trace!(%family, builder = builder.name(), "Registering type family");
        self.entries.insert(
            family,
            FamilyRegistration {
                family,
                builder,
                rules,
            },
        );
    }

    /// Get the registration for a family.
    pub fn get(&self, family: TypeFamily) -> Option<&FamilyRegistration> {
        self.entries.get(&family)
    }

    /// Resolve an item's type tag.
    ///
    /// Tags that are not a known family, or are known but not registered,
    /// both fail with [`CompileError::UnknownTypeFamily`].
    pub fn resolve(&self, tag: &str) -> Result<&FamilyRegistration, CompileError> {
        TypeFamily::parse(tag)
            .and_then(|family| self.get(family))
            .ok_or_else(|| CompileError::UnknownTypeFamily(tag.to_string()))
    }

    /// Registered families.
    pub fn families(&self) -> impl Iterator<Item = TypeFamily> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Built-in Rules
// ============================================================================

const OCCURRENCE_DOMAINS: &[Domain] = &[
    Domain::Condition,
    Domain::Procedure,
    Domain::Measurement,
    Domain::Observation,
    Domain::Drug,
];

const ICD9_TYPES: &[CriteriaType] = &[CriteriaType::Icd9Cm, CriteriaType::Icd9Proc];
const ICD10_TYPES: &[CriteriaType] = &[CriteriaType::Icd10Cm, CriteriaType::Icd10Pcs];
const CPT_TYPES: &[CriteriaType] = &[CriteriaType::Cpt4];

const CODE_TYPES: &[CriteriaType] = &[
    CriteriaType::Icd9Cm,
    CriteriaType::Icd9Proc,
    CriteriaType::Icd10Cm,
    CriteriaType::Icd10Pcs,
    CriteriaType::Cpt4,
    CriteriaType::Snomed,
    CriteriaType::Loinc,
];

fn demographic_rules() -> FamilyRules {
    FamilyRules {
        domains: &[Domain::Person],
        types: &[CriteriaType::Demo],
        subtypes: &[
            CriteriaSubType::Gen,
            CriteriaSubType::Age,
            CriteriaSubType::Race,
            CriteriaSubType::Eth,
            CriteriaSubType::Sex,
            CriteriaSubType::Dec,
        ],
        subtype_required: true,
        leaf_key: LeafKey::Deferred,
        group_expansion: GroupExpansion::None,
        allows_attributes: true,
        allows_modifiers: false,
        temporal: false,
        extra: Some(validate_demographics),
    }
}

fn coded_rules(types: &'static [CriteriaType]) -> FamilyRules {
    FamilyRules {
        domains: OCCURRENCE_DOMAINS,
        types,
        subtypes: &[],
        subtype_required: false,
        leaf_key: LeafKey::Either,
        group_expansion: GroupExpansion::AncestorOrPrefix,
        allows_attributes: false,
        allows_modifiers: true,
        temporal: true,
        extra: None,
    }
}

fn code_group_rules() -> FamilyRules {
    FamilyRules {
        domains: OCCURRENCE_DOMAINS,
        types: CODE_TYPES,
        subtypes: &[],
        subtype_required: false,
        leaf_key: LeafKey::Value,
        group_expansion: GroupExpansion::None,
        allows_attributes: false,
        allows_modifiers: true,
        temporal: true,
        extra: None,
    }
}

fn phenotype_rules() -> FamilyRules {
    FamilyRules {
        domains: OCCURRENCE_DOMAINS,
        types: &[CriteriaType::Phecode],
        subtypes: &[],
        subtype_required: false,
        leaf_key: LeafKey::Value,
        group_expansion: GroupExpansion::None,
        allows_attributes: false,
        allows_modifiers: true,
        temporal: true,
        extra: None,
    }
}

fn tree_rules() -> FamilyRules {
    FamilyRules {
        domains: OCCURRENCE_DOMAINS,
        types: CODE_TYPES,
        subtypes: &[],
        subtype_required: false,
        leaf_key: LeafKey::ConceptId,
        group_expansion: GroupExpansion::None,
        allows_attributes: false,
        allows_modifiers: true,
        temporal: true,
        extra: None,
    }
}

fn event_rules(family: TypeFamily) -> FamilyRules {
    let (domains, types, subtypes): (&'static [Domain], &'static [CriteriaType], &'static [CriteriaSubType]) =
        match family {
            TypeFamily::Condition => (&[Domain::Condition], &[CriteriaType::Snomed], &[]),
            TypeFamily::Procedure => (&[Domain::Procedure], &[CriteriaType::Snomed], &[]),
            TypeFamily::Drug => (&[Domain::Drug], &[CriteriaType::Atc, CriteriaType::RxNorm], &[]),
            TypeFamily::Measurement => (&[Domain::Measurement], &[CriteriaType::Loinc, CriteriaType::Snomed], &[]),
            TypeFamily::Observation => (&[Domain::Observation], &[CriteriaType::Snomed], &[]),
            TypeFamily::Survey => (
                &[Domain::Survey],
                &[CriteriaType::Ppi],
                &[CriteriaSubType::Question, CriteriaSubType::Answer],
            ),
            TypeFamily::Visit => (&[Domain::Visit], &[CriteriaType::Visit], &[]),
            _ => (
                &[Domain::PhysicalMeasurement],
                &[CriteriaType::Pm],
                &[CriteriaSubType::Bp],
            ),
        };

    let extra = match family {
        TypeFamily::Measurement | TypeFamily::PhysicalMeasurement => {
            Some(validate_blood_pressure as _)
        }
        _ => None,
    };

    FamilyRules {
        domains,
        types,
        subtypes,
        subtype_required: false,
        leaf_key: LeafKey::ConceptId,
        group_expansion: GroupExpansion::Ancestor,
        allows_attributes: true,
        allows_modifiers: true,
        temporal: true,
        extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registers_every_family() {
        let registry = BuilderRegistry::standard();
        assert_eq!(registry.len(), TypeFamily::ALL.len());
        for family in TypeFamily::ALL {
            let registration = registry.resolve(family.as_str()).unwrap();
            assert_eq!(registration.family, *family);
            assert!(registration.builder.families().contains(family));
        }
    }

    #[test]
    fn test_unknown_tag() {
        let registry = BuilderRegistry::standard();
        let err = registry.resolve("GENOMICS").unwrap_err();
        assert!(matches!(err, CompileError::UnknownTypeFamily(ref tag) if tag == "GENOMICS"));
        assert!(err.is_server_error());
    }

    #[test]
    fn test_known_but_unregistered_tag() {
        let mut registry = BuilderRegistry::new();
        registry.register(TypeFamily::Demo, Arc::new(DemographicBuilder), demographic_rules());
        assert!(registry.resolve("DEMO").is_ok());
        assert!(matches!(
            registry.resolve("ICD9"),
            Err(CompileError::UnknownTypeFamily(_))
        ));
    }

    #[test]
    fn test_rules_per_family() {
        let registry = BuilderRegistry::standard();
        let demo = &registry.resolve("DEMO").unwrap().rules;
        assert!(!demo.temporal);
        assert!(!demo.allows_modifiers);

        let drug = &registry.resolve("DRUG").unwrap().rules;
        assert!(drug.types.contains(&CriteriaType::Atc));
        assert_eq!(drug.group_expansion, GroupExpansion::Ancestor);

        let icd10 = &registry.resolve("ICD10").unwrap().rules;
        assert!(icd10.types.contains(&CriteriaType::Icd10Pcs));
        assert!(!icd10.types.contains(&CriteriaType::Icd9Cm));
    }
}
