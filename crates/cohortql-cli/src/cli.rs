use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "cohortql")]
#[command(about = "Compile cohort definitions into parameterized SQL")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Compiler config file (project, dataset, table names)
    #[arg(short, long, global = true, env = "COHORTQL_CONFIG", default_value = "cohortql.toml")]
    pub config: PathBuf,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Log compiler decisions to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// SQL followed by a parameter table
    #[default]
    Text,
    /// `{"sql": ..., "parameters": ...}`
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a cohort definition
    Compile(CompileArgs),
    /// Validate a cohort definition without compiling it
    Validate(RequestArgs),
    /// Criteria table lookups
    Criteria(CriteriaArgs),
}

#[derive(clap::Args)]
pub struct RequestArgs {
    /// Path to the request JSON file (reads from stdin if omitted)
    #[arg(long)]
    pub request: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct CompileArgs {
    #[command(flatten)]
    pub request: RequestArgs,
    /// Ancestor fixture: `{"<ancestor id>": [descendant ids]}`
    #[arg(long)]
    pub ancestors: Option<PathBuf>,
    /// Emit the participant count query instead of participant ids
    #[arg(long)]
    pub count: bool,
}

#[derive(clap::Args)]
pub struct CriteriaArgs {
    #[command(subcommand)]
    pub command: CriteriaCommands,
}

#[derive(Subcommand)]
pub enum CriteriaCommands {
    /// Selectable criteria whose code starts with any of the given codes
    Codes(CodesArgs),
    /// Direct children of a criteria tree node
    Tree(TreeArgs),
}

#[derive(clap::Args)]
pub struct CodesArgs {
    /// Domain (e.g. CONDITION)
    #[arg(long)]
    pub domain: String,
    /// Criteria type (e.g. ICD9CM)
    #[arg(long = "type")]
    pub criteria_type: String,
    /// Match standard concepts
    #[arg(long)]
    pub standard: bool,
    /// Code prefixes (e.g. 250 401.1)
    #[arg(required = true)]
    pub codes: Vec<String>,
}

#[derive(clap::Args)]
pub struct TreeArgs {
    /// Domain (e.g. DRUG)
    #[arg(long)]
    pub domain: String,
    /// Criteria type (e.g. ATC)
    #[arg(long = "type")]
    pub criteria_type: String,
    /// Match standard concepts
    #[arg(long)]
    pub standard: bool,
    /// Parent node id
    #[arg(long)]
    pub parent_id: i64,
}
