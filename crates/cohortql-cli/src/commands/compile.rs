use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use cohortql_core::SearchRequest;
use cohortql_search::{CohortCompiler, HierarchyResolver, InMemoryAncestorStore, Selection};

use crate::cli::{CompileArgs, OutputFormat, RequestArgs};
use crate::output::{print_query, print_success};

pub async fn compile(
    compiler: &CohortCompiler,
    args: &CompileArgs,
    format: OutputFormat,
) -> Result<()> {
    let request = read_request(&args.request)?;
    let store = match &args.ancestors {
        Some(path) => load_ancestors(path)?,
        None => InMemoryAncestorStore::new(),
    };
    let resolver = HierarchyResolver::new(Arc::new(store));
    let selection = if args.count {
        Selection::Count
    } else {
        Selection::Participants
    };

    let query = compiler
        .compile_with_resolver(&request, &resolver, selection)
        .await?;
    tracing::debug!(parameters = query.parameters.len(), "Compiled request");
    print_query(&query, format)
}

pub fn validate(compiler: &CohortCompiler, args: &RequestArgs) -> Result<()> {
    let request = read_request(args)?;
    compiler.validate(&request)?;
    print_success("Request is valid");
    Ok(())
}

fn read_request(args: &RequestArgs) -> Result<SearchRequest> {
    let json = match &args.request {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read request from stdin")?;
            buf
        }
    };
    SearchRequest::from_json(&json).context("Invalid request JSON")
}

fn load_ancestors(path: &Path) -> Result<InMemoryAncestorStore> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read ancestors {}", path.display()))?;
    tracing::debug!(path = %path.display(), "Loading ancestor fixture");
    InMemoryAncestorStore::from_json(&json).context("Invalid ancestor fixture")
}
