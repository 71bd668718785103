//! Named query parameters.
//!
//! Every literal in generated SQL is bound through [`QueryParameters`], which
//! hands out collision-free names and keeps the name to value table for one
//! compilation. Names are assigned in allocation order, so a fixed walk over
//! the same request always produces the same names.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use time::Date;

/// Default name prefix for allocated parameters.
pub const DEFAULT_PREFIX: &str = "p";

/// A typed literal bound to a named parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryParameterValue {
    String(String),
    Int64(i64),
    Float64(f64),
    Bool(bool),
    Date(#[serde(serialize_with = "serialize_date")] Date),
    StringArray(Vec<String>),
    Int64Array(Vec<i64>),
    Float64Array(Vec<f64>),
}

fn serialize_date<S>(date: &Date, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(date)
}

impl QueryParameterValue {
    /// Type tag as used by the execution service.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "STRING",
            Self::Int64(_) => "INT64",
            Self::Float64(_) => "FLOAT64",
            Self::Bool(_) => "BOOL",
            Self::Date(_) => "DATE",
            Self::StringArray(_) => "STRING_ARRAY",
            Self::Int64Array(_) => "INT64_ARRAY",
            Self::Float64Array(_) => "FLOAT64_ARRAY",
        }
    }

    /// Scalar value rendered as text; `None` for arrays.
    pub fn value(&self) -> Option<String> {
        match self {
            Self::String(v) => Some(v.clone()),
            Self::Int64(v) => Some(v.to_string()),
            Self::Float64(v) => Some(v.to_string()),
            Self::Bool(v) => Some(v.to_string()),
            Self::Date(v) => Some(v.to_string()),
            _ => None,
        }
    }

    /// Array elements rendered as text; `None` for scalars.
    pub fn array_values(&self) -> Option<Vec<String>> {
        match self {
            Self::StringArray(v) => Some(v.clone()),
            Self::Int64Array(v) => Some(v.iter().map(i64::to_string).collect()),
            Self::Float64Array(v) => Some(v.iter().map(f64::to_string).collect()),
            _ => None,
        }
    }
}

impl fmt::Display for QueryParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.value(), self.array_values()) {
            (Some(value), _) => f.write_str(&value),
            (None, Some(values)) => write!(f, "[{}]", values.join(", ")),
            (None, None) => Ok(()),
        }
    }
}

/// Reference to an allocated parameter.
///
/// Only [`QueryParameters`] can create one, which is what lets the SQL
/// fragment builder accept values exclusively as bound references.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamRef(String);

impl ParamRef {
    pub fn name(&self) -> &str {
        &self.0
    }

    /// The SQL token referencing this parameter, `@name`.
    pub fn decorate(&self) -> String {
        decorate(&self.0)
    }
}

/// Render the SQL reference token for a parameter name.
pub fn decorate(name: &str) -> String {
    format!("@{name}")
}

/// The shared parameter table of one compilation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct QueryParameters {
    values: IndexMap<String, QueryParameterValue>,
    #[serde(skip)]
    counters: HashMap<&'static str, usize>,
}

impl QueryParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` under a fresh `p<N>` name.
    pub fn allocate(&mut self, value: QueryParameterValue) -> ParamRef {
        self.allocate_with_prefix(DEFAULT_PREFIX, value)
    }

    /// Bind `value` under a fresh `<prefix><N>` name.
    ///
    /// The suffix counter is scanned against the table, so names inserted
    /// through [`QueryParameters::insert`] are never reused.
    pub fn allocate_with_prefix(
        &mut self,
        prefix: &'static str,
        value: QueryParameterValue,
    ) -> ParamRef {
        let counter = self.counters.entry(prefix).or_insert(0);
        let name = loop {
            *counter += 1;
            let candidate = format!("{prefix}{counter}");
            if !self.values.contains_key(&candidate) {
                break candidate;
            }
        };
        self.values.insert(name.clone(), value);
        ParamRef(name)
    }

    /// Bind a caller-chosen name. Returns `None` if the name is taken.
    pub fn insert(&mut self, name: impl Into<String>, value: QueryParameterValue) -> Option<ParamRef> {
        let name = name.into();
        if self.values.contains_key(&name) {
            return None;
        }
        self.values.insert(name.clone(), value);
        Some(ParamRef(name))
    }

    pub fn get(&self, name: &str) -> Option<&QueryParameterValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parameters in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryParameterValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_allocate_sequential_names() {
        let mut params = QueryParameters::new();
        let a = params.allocate(QueryParameterValue::Int64(1));
        let b = params.allocate(QueryParameterValue::Int64(2));
        assert_eq!(a.name(), "p1");
        assert_eq!(b.name(), "p2");
        assert_eq!(b.decorate(), "@p2");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_prefixes_count_independently() {
        let mut params = QueryParameters::new();
        let p = params.allocate(QueryParameterValue::Bool(true));
        let c1 = params.allocate_with_prefix("code", QueryParameterValue::String("11.1%".into()));
        let c2 = params.allocate_with_prefix("code", QueryParameterValue::String("11.2%".into()));
        assert_eq!(p.name(), "p1");
        assert_eq!(c1.name(), "code1");
        assert_eq!(c2.name(), "code2");
    }

    #[test]
    fn test_allocation_skips_existing_names() {
        let mut params = QueryParameters::new();
        params.insert("p1", QueryParameterValue::Int64(10)).unwrap();
        params.insert("p2", QueryParameterValue::Int64(20)).unwrap();
        let next = params.allocate(QueryParameterValue::Int64(30));
        assert_eq!(next.name(), "p3");
        assert!(params.insert("p3", QueryParameterValue::Int64(0)).is_none());
        assert_eq!(params.get("p1"), Some(&QueryParameterValue::Int64(10)));
    }

    #[test]
    fn test_value_rendering() {
        assert_eq!(QueryParameterValue::Int64(8507).value().as_deref(), Some("8507"));
        assert_eq!(
            QueryParameterValue::Date(date!(2020 - 01 - 31)).value().as_deref(),
            Some("2020-01-31")
        );
        let array = QueryParameterValue::Int64Array(vec![1, 2]);
        assert!(array.value().is_none());
        assert_eq!(array.to_string(), "[1, 2]");
        assert_eq!(array.type_name(), "INT64_ARRAY");
    }

    #[test]
    fn test_serialize_table() {
        let mut params = QueryParameters::new();
        params.allocate(QueryParameterValue::Int64(8507));
        params.allocate(QueryParameterValue::Date(date!(2021 - 06 - 01)));
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["p1"]["type"], "INT64");
        assert_eq!(json["p1"]["value"], 8507);
        assert_eq!(json["p2"]["type"], "DATE");
        assert_eq!(json["p2"]["value"], "2021-06-01");
    }
}
