//! Cohort definition AST.
//!
//! These types mirror the JSON payload produced by the cohort builder UI and
//! are consumed read-only by the compiler. Every enumerated tag (domain, type,
//! subtype, family, operator, attribute and modifier names, temporal mention
//! and time) stays a string here so that unknown values surface as
//! validation errors with the offending field named rather than as parse
//! failures. The typed accessors parse on demand.

use crate::criteria::{AttrName, ModifierType, Operator, TemporalMention, TemporalTime};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// A cohort definition.
///
/// Include groups are ORed together; exclude groups are ORed and subtracted
/// from the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub includes: Vec<SearchGroup>,
    #[serde(default)]
    pub excludes: Vec<SearchGroup>,
}

impl SearchRequest {
    /// Parse a request from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Iterate over include groups followed by exclude groups.
    pub fn groups(&self) -> impl Iterator<Item = &SearchGroup> {
        self.includes.iter().chain(self.excludes.iter())
    }

    /// Iterate over every search parameter in walk order.
    pub fn parameters(&self) -> impl Iterator<Item = &SearchParameter> {
        self.groups()
            .flat_map(|group| group.items.iter())
            .flat_map(|item| item.search_parameters.iter())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub items: Vec<SearchGroupItem>,
    #[serde(default)]
    pub temporal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_value: Option<i64>,
}

impl SearchGroup {
    /// Items carrying the given temporal group tag.
    pub fn temporal_items(&self, tag: i32) -> impl Iterator<Item = &SearchGroupItem> {
        self.items
            .iter()
            .filter(move |item| item.temporal_group == Some(tag))
    }

    pub fn temporal_mention(&self) -> Result<Option<TemporalMention>> {
        self.mention.as_deref().map(str::parse::<TemporalMention>).transpose()
    }

    pub fn temporal_time(&self) -> Result<Option<TemporalTime>> {
        self.time.as_deref().map(str::parse::<TemporalTime>).transpose()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchGroupItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Type family tag, e.g. `DEMO`, `ICD9`, `DRUG`.
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub search_parameters: Vec<SearchParameter>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_group: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParameter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub domain: String,
    #[serde(rename = "type")]
    pub criteria_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub group: bool,
    #[serde(default)]
    pub standard: bool,
    #[serde(default)]
    pub ancestor_data: bool,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl SearchParameter {
    /// True when the node's descendants come from the ancestor relation.
    pub fn needs_expansion(&self) -> bool {
        self.group && self.ancestor_data
    }

    /// Identifier used in error messages.
    pub fn label(&self) -> String {
        if let Some(id) = &self.parameter_id {
            return id.clone();
        }
        match (&self.value, self.concept_id) {
            (Some(value), _) if !value.trim().is_empty() => value.clone(),
            (_, Some(concept_id)) => concept_id.to_string(),
            _ => self.criteria_type.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub name: String,
    pub operator: String,
    #[serde(default)]
    pub operands: Vec<String>,
    /// Measured concept, set on blood pressure components.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_id: Option<i64>,
}

impl Attribute {
    pub fn new<S: Into<String>>(
        name: AttrName,
        operator: Operator,
        operands: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            name: name.as_str().to_string(),
            operator: operator.as_str().to_string(),
            operands: operands.into_iter().map(Into::into).collect(),
            concept_id: None,
        }
    }

    pub fn with_concept_id(mut self, concept_id: i64) -> Self {
        self.concept_id = Some(concept_id);
        self
    }

    pub fn attr_name(&self) -> Result<AttrName> {
        self.name.parse()
    }

    pub fn parsed_operator(&self) -> Result<Operator> {
        self.operator.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Modifier {
    pub name: String,
    pub operator: String,
    #[serde(default)]
    pub operands: Vec<String>,
}

impl Modifier {
    pub fn new<S: Into<String>>(
        name: ModifierType,
        operator: Operator,
        operands: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            name: name.as_str().to_string(),
            operator: operator.as_str().to_string(),
            operands: operands.into_iter().map(Into::into).collect(),
        }
    }

    pub fn modifier_type(&self) -> Result<ModifierType> {
        self.name.parse()
    }

    pub fn parsed_operator(&self) -> Result<Operator> {
        self.operator.parse()
    }
}
