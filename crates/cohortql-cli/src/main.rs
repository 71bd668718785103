mod cli;
mod commands;
mod logging;
mod output;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands, CriteriaCommands};
use cohortql_search::{CohortCompiler, CompilerConfig, CompilerContext};
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);
    let format = cli.format.unwrap_or_default();

    let config = CompilerConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    let context = Arc::new(CompilerContext::from_config(&config).context("Invalid compiler config")?);

    match &cli.command {
        Commands::Compile(args) => {
            let compiler = CohortCompiler::new(context);
            commands::compile::compile(&compiler, args, format).await?;
        }
        Commands::Validate(args) => {
            let compiler = CohortCompiler::new(context);
            commands::compile::validate(&compiler, args)?;
        }
        Commands::Criteria(args) => match &args.command {
            CriteriaCommands::Codes(codes) => {
                commands::criteria::codes(&context, codes, format)?;
            }
            CriteriaCommands::Tree(tree) => {
                commands::criteria::tree(&context, tree, format)?;
            }
        },
    }

    Ok(())
}
