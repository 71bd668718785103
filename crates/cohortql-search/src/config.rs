//! Compiler configuration.
//!
//! [`CompilerConfig`] is the serde/TOML view supplied by the operator;
//! [`CompilerContext`] is the validated, immutable form handed to every
//! compilation. Building the context checks every identifier once so the
//! builders can splice table and column names without further checks.

use crate::error::BuildError;
use crate::sql_builder::{Identifier, TableRef};
use cohortql_core::Domain;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading compiler configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown domain in config: {0}")]
    UnknownDomain(String),

    #[error("Invalid identifier for {field}: {value}")]
    InvalidIdentifier { field: String, value: String },
}

/// Operator-supplied configuration for the cohort compiler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Project holding the CDR dataset
    pub project: String,

    /// CDR dataset name
    pub dataset: String,

    /// Shared tables
    #[serde(default)]
    pub tables: TablesConfig,

    /// Per-domain occurrence tables, keyed by domain tag
    #[serde(default = "default_domains")]
    pub domains: BTreeMap<String, DomainTableConfig>,
}

impl CompilerConfig {
    pub fn new(project: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            tables: TablesConfig::default(),
            domains: default_domains(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablesConfig {
    #[serde(default = "default_person")]
    pub person: String,

    #[serde(default = "default_death")]
    pub death: String,

    #[serde(default = "default_concept")]
    pub concept: String,

    #[serde(default = "default_visit_occurrence")]
    pub visit_occurrence: String,

    /// Denormalized event table with one row per clinical event
    #[serde(default = "default_search_all_events")]
    pub search_all_events: String,

    /// Materialized criteria tree
    #[serde(default = "default_criteria")]
    pub criteria: String,

    /// Phenotype to vocabulary code mapping
    #[serde(default = "default_phenotype_code")]
    pub phenotype_code: String,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            person: default_person(),
            death: default_death(),
            concept: default_concept(),
            visit_occurrence: default_visit_occurrence(),
            search_all_events: default_search_all_events(),
            criteria: default_criteria(),
            phenotype_code: default_phenotype_code(),
        }
    }
}

fn default_person() -> String {
    "person".to_string()
}

fn default_death() -> String {
    "death".to_string()
}

fn default_concept() -> String {
    "concept".to_string()
}

fn default_visit_occurrence() -> String {
    "visit_occurrence".to_string()
}

fn default_search_all_events() -> String {
    "cb_search_all_events".to_string()
}

fn default_criteria() -> String {
    "cb_criteria".to_string()
}

fn default_phenotype_code() -> String {
    "cb_phenotype_code".to_string()
}

/// Table metadata for one clinical domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainTableConfig {
    pub table: String,
    pub concept_id_column: String,
    pub source_concept_id_column: String,
    pub date_column: String,
}

impl DomainTableConfig {
    fn new(table: &str, prefix: &str, date_column: &str) -> Self {
        Self {
            table: table.to_string(),
            concept_id_column: format!("{prefix}_concept_id"),
            source_concept_id_column: format!("{prefix}_source_concept_id"),
            date_column: date_column.to_string(),
        }
    }
}

fn default_domains() -> BTreeMap<String, DomainTableConfig> {
    [
        (
            Domain::Condition,
            DomainTableConfig::new("condition_occurrence", "condition", "condition_start_date"),
        ),
        (
            Domain::Procedure,
            DomainTableConfig::new("procedure_occurrence", "procedure", "procedure_date"),
        ),
        (
            Domain::Measurement,
            DomainTableConfig::new("measurement", "measurement", "measurement_date"),
        ),
        (
            Domain::Observation,
            DomainTableConfig::new("observation", "observation", "observation_date"),
        ),
        (
            Domain::Drug,
            DomainTableConfig::new("drug_exposure", "drug", "drug_exposure_start_date"),
        ),
    ]
    .into_iter()
    .map(|(domain, table)| (domain.as_str().to_string(), table))
    .collect()
}

// ============================================================================
// Validated Context
// ============================================================================

/// Validated table and column names for one domain.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainTable {
    pub table: TableRef,
    pub concept_id_column: Identifier,
    pub source_concept_id_column: Identifier,
    pub date_column: Identifier,
}

impl DomainTable {
    /// Column matched for standard or source concepts.
    pub fn concept_column(&self, standard: bool) -> &Identifier {
        if standard {
            &self.concept_id_column
        } else {
            &self.source_concept_id_column
        }
    }
}

/// Immutable compilation context shared by all compilations.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerContext {
    pub person: TableRef,
    pub death: TableRef,
    pub concept: TableRef,
    pub visit_occurrence: TableRef,
    pub search_all_events: TableRef,
    pub criteria: TableRef,
    pub phenotype_code: TableRef,
    domains: BTreeMap<Domain, DomainTable>,
}

impl CompilerContext {
    pub fn from_config(config: &CompilerConfig) -> Result<Self, ConfigError> {
        let project = Identifier::project(&config.project)
            .map_err(|_| invalid_identifier("project", &config.project))?;
        let dataset = identifier("dataset", &config.dataset)?;
        let table = |field: &str, name: &str| -> Result<TableRef, ConfigError> {
            Ok(TableRef::new(
                project.clone(),
                dataset.clone(),
                identifier(field, name)?,
            ))
        };

        let tables = &config.tables;
        let mut domains = BTreeMap::new();
        for (tag, entry) in &config.domains {
            let domain =
                Domain::parse(tag).ok_or_else(|| ConfigError::UnknownDomain(tag.clone()))?;
            domains.insert(
                domain,
                DomainTable {
                    table: table(&format!("domains.{tag}.table"), &entry.table)?,
                    concept_id_column: identifier(
                        &format!("domains.{tag}.concept_id_column"),
                        &entry.concept_id_column,
                    )?,
                    source_concept_id_column: identifier(
                        &format!("domains.{tag}.source_concept_id_column"),
                        &entry.source_concept_id_column,
                    )?,
                    date_column: identifier(
                        &format!("domains.{tag}.date_column"),
                        &entry.date_column,
                    )?,
                },
            );
        }

        Ok(Self {
            person: table("tables.person", &tables.person)?,
            death: table("tables.death", &tables.death)?,
            concept: table("tables.concept", &tables.concept)?,
            visit_occurrence: table("tables.visit_occurrence", &tables.visit_occurrence)?,
            search_all_events: table("tables.search_all_events", &tables.search_all_events)?,
            criteria: table("tables.criteria", &tables.criteria)?,
            phenotype_code: table("tables.phenotype_code", &tables.phenotype_code)?,
            domains,
        })
    }

    /// Occurrence table metadata for `domain`.
    pub fn domain_table(&self, domain: Domain) -> Result<&DomainTable, BuildError> {
        self.domains
            .get(&domain)
            .ok_or(BuildError::MissingDomainTable(domain))
    }

    pub fn domains(&self) -> impl Iterator<Item = Domain> + '_ {
        self.domains.keys().copied()
    }
}

fn identifier(field: &str, value: &str) -> Result<Identifier, ConfigError> {
    Identifier::new(value).map_err(|_| invalid_identifier(field, value))
}

fn invalid_identifier(field: &str, value: &str) -> ConfigError {
    ConfigError::InvalidIdentifier {
        field: field.to_string(),
        value: value.to_string(),
    }
}
