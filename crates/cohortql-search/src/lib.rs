//! Cohort definition compiler.
//!
//! Turns a [`SearchRequest`](cohortql_core::SearchRequest) into a single
//! parameterized SQL statement selecting (or counting) the matching
//! participants, plus the table of named parameters it references. No
//! value from the request is ever written into the SQL text.
//!
//! ```ignore
//! let context = Arc::new(CompilerContext::from_config(&CompilerConfig::load("cohort.toml")?)?);
//! let compiler = CohortCompiler::new(context);
//! let resolver = HierarchyResolver::new(Arc::new(store));
//! let query = compiler
//!     .compile_with_resolver(&request, &resolver, Selection::Participants)
//!     .await?;
//! ```

pub mod builders;
pub mod compiler;
pub mod composer;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod hierarchy;
pub mod namer;
pub mod sql_builder;
pub mod validation;

pub use builders::{CodeGroupQuery, CriteriaTreeQuery, QueryBuilder};
pub use compiler::CohortCompiler;
pub use composer::Selection;
pub use config::{CompilerConfig, CompilerContext, ConfigError};
pub use dispatch::{BuilderRegistry, FamilyRegistration};
pub use error::{BuildError, CompileError, ResolutionError, StoreError, ValidationError};
pub use hierarchy::{
    AncestorKey, CriteriaAncestorStore, CriteriaLookup, HierarchyResolver, InMemoryAncestorStore,
};
pub use namer::{QueryParameterValue, QueryParameters};
pub use sql_builder::{CompiledQuery, SqlFragment};
