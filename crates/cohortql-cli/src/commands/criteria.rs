use anyhow::Result;
use cohortql_core::{CriteriaType, Domain};
use cohortql_search::{CodeGroupQuery, CompilerContext, CriteriaTreeQuery};

use crate::cli::{CodesArgs, OutputFormat, TreeArgs};
use crate::output::print_query;

pub fn codes(context: &CompilerContext, args: &CodesArgs, format: OutputFormat) -> Result<()> {
    let query = CodeGroupQuery::new(
        args.domain.parse::<Domain>()?,
        args.criteria_type.parse::<CriteriaType>()?,
        args.standard,
        args.codes.iter().cloned(),
    );
    print_query(&query.compile(context)?, format)
}

pub fn tree(context: &CompilerContext, args: &TreeArgs, format: OutputFormat) -> Result<()> {
    let query = CriteriaTreeQuery::new(
        args.domain.parse::<Domain>()?,
        args.criteria_type.parse::<CriteriaType>()?,
        args.standard,
        args.parent_id,
    );
    print_query(&query.compile(context), format)
}
