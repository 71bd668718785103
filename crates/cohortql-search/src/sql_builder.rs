//! SQL fragment builder for generated cohort queries.
//!
//! A [`SqlFragment`] is assembled from three kinds of pieces only:
//!
//! - **Static text**: `&'static str` keywords and punctuation written in code
//! - **Identifiers**: validated table and column names from configuration
//! - **Parameters**: [`ParamRef`]s handed out by the parameter table
//!
//! There is no way to append a runtime string, so a user-supplied value can
//! only reach the SQL text as an `@name` token.

use crate::error::BuildError;
use crate::namer::{ParamRef, QueryParameters};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid identifier regex"));

static PROJECT_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_\-]*$").expect("Invalid project regex"));

// ============================================================================
// Identifiers
// ============================================================================

/// A validated table, column or dataset name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Only ASCII letters, digits and underscores, not starting with a digit.
    pub fn new(name: &str) -> Result<Self, BuildError> {
        if !IDENTIFIER.is_match(name) {
            return Err(BuildError::InvalidIdentifier(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    /// Project ids may also contain hyphens.
    pub fn project(name: &str) -> Result<Self, BuildError> {
        if !PROJECT_IDENTIFIER.is_match(name) {
            return Err(BuildError::InvalidIdentifier(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fully qualified table, rendered as `` `project.dataset.table` ``.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    project: Identifier,
    dataset: Identifier,
    table: Identifier,
}

impl TableRef {
    pub fn new(project: Identifier, dataset: Identifier, table: Identifier) -> Self {
        Self {
            project,
            dataset,
            table,
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}.{}.{}`", self.project, self.dataset, self.table)
    }
}

// ============================================================================
// Fragments
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Text(&'static str),
    Ident(Identifier),
    Table(TableRef),
    Param(ParamRef),
    Fragment(SqlFragment),
}

/// A piece of SQL whose values are all bound parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    pieces: Vec<Piece>,
}

impl SqlFragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fragment with static text.
    pub fn text(text: &'static str) -> Self {
        let mut fragment = Self::new();
        fragment.push(text);
        fragment
    }

    pub fn push(&mut self, text: &'static str) -> &mut Self {
        self.pieces.push(Piece::Text(text));
        self
    }

    pub fn ident(&mut self, ident: &Identifier) -> &mut Self {
        self.pieces.push(Piece::Ident(ident.clone()));
        self
    }

    pub fn table(&mut self, table: &TableRef) -> &mut Self {
        self.pieces.push(Piece::Table(table.clone()));
        self
    }

    pub fn param(&mut self, param: &ParamRef) -> &mut Self {
        self.pieces.push(Piece::Param(param.clone()));
        self
    }

    pub fn append(&mut self, fragment: SqlFragment) -> &mut Self {
        if !fragment.is_empty() {
            self.pieces.push(Piece::Fragment(fragment));
        }
        self
    }

    /// Append `fragment` wrapped in parentheses.
    pub fn append_nested(&mut self, fragment: SqlFragment) -> &mut Self {
        self.push("(").append(fragment).push(")")
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Join fragments with a static separator.
    pub fn join(fragments: impl IntoIterator<Item = SqlFragment>, separator: &'static str) -> Self {
        let mut joined = Self::new();
        for (index, fragment) in fragments.into_iter().enumerate() {
            if index > 0 {
                joined.push(separator);
            }
            joined.append(fragment);
        }
        joined
    }

    /// Join fragments with a separator, parenthesizing each one.
    pub fn join_nested(
        fragments: impl IntoIterator<Item = SqlFragment>,
        separator: &'static str,
    ) -> Self {
        let mut fragments: Vec<SqlFragment> = fragments.into_iter().collect();
        if fragments.len() == 1 {
            return fragments.remove(0);
        }
        let mut joined = Self::new();
        for (index, fragment) in fragments.into_iter().enumerate() {
            if index > 0 {
                joined.push(separator);
            }
            joined.append_nested(fragment);
        }
        joined
    }

    /// Names of every parameter referenced by this fragment, in order.
    pub fn referenced_params(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_params(&mut names);
        names
    }

    fn collect_params<'a>(&'a self, names: &mut Vec<&'a str>) {
        for piece in &self.pieces {
            match piece {
                Piece::Param(param) => names.push(param.name()),
                Piece::Fragment(fragment) => fragment.collect_params(names),
                _ => {}
            }
        }
    }

    pub fn to_sql(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SqlFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => f.write_str(text)?,
                Piece::Ident(ident) => write!(f, "{ident}")?,
                Piece::Table(table) => write!(f, "{table}")?,
                Piece::Param(param) => f.write_str(&param.decorate())?,
                Piece::Fragment(fragment) => write!(f, "{fragment}")?,
            }
        }
        Ok(())
    }
}

// ============================================================================
// Compiled Query
// ============================================================================

/// A finished query: SQL text plus its named parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub parameters: QueryParameters,
}

impl CompiledQuery {
    pub fn new(fragment: &SqlFragment, parameters: QueryParameters) -> Self {
        Self {
            sql: fragment.to_sql(),
            parameters,
        }
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.parameters.is_empty() {
            let params: Vec<String> = self
                .parameters
                .iter()
                .map(|(name, value)| format!("@{name}={value}"))
                .collect();
            write!(f, " -- params: [{}]", params.join(", "))?;
        }
        Ok(())
    }
}
