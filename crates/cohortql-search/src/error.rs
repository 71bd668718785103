use cohortql_core::{CoreError, Domain, TypeFamily};
use thiserror::Error;

/// Boxed error returned by external lookup collaborators.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// The cohort definition violates a structural or semantic rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Bad Request: {message}")]
pub struct ValidationError {
    field: String,
    message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Name of the offending field, e.g. `attribute` or `temporalGroup`.
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An internal invariant was violated while generating SQL.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{builder} builder cannot build items of family {family}")]
    FamilyMismatch {
        builder: &'static str,
        family: TypeFamily,
    },

    #[error("No table configured for domain {0}")]
    MissingDomainTable(Domain),

    #[error("Ancestor {ancestor_id} was not resolved before building")]
    UnresolvedAncestor { ancestor_id: i64 },

    #[error("Invalid {field} operand: {value}")]
    InvalidOperand { field: &'static str, value: String },

    #[error("Family {0} cannot take part in a temporal group")]
    TemporalUnsupported(TypeFamily),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl BuildError {
    pub fn invalid_operand(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidOperand {
            field,
            value: value.into(),
        }
    }
}

/// A hierarchy lookup against the ancestor store failed.
#[derive(Debug, Error)]
#[error("Failed to resolve descendants of ancestor {ancestor_id}: {source}")]
pub struct ResolutionError {
    pub ancestor_id: i64,
    #[source]
    pub source: StoreError,
}

impl ResolutionError {
    pub fn new(ancestor_id: i64, source: impl Into<StoreError>) -> Self {
        Self {
            ancestor_id,
            source: source.into(),
        }
    }
}

/// Any failure of a single compilation. Compilation is all-or-nothing.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Query build failed: {0}")]
    Build(#[from] BuildError),

    #[error("Unknown criteria type family: {0}")]
    UnknownTypeFamily(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

impl CompileError {
    /// The caller's input is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// The compiler or its configuration is at fault.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Build(_) | Self::UnknownTypeFamily(_) | Self::Resolution(_)
        )
    }
}
