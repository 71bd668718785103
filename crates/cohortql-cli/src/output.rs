use anyhow::Result;
use cohortql_search::CompiledQuery;
use colored::Colorize;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

pub fn print_query(query: &CompiledQuery, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(query)?);
        }
        OutputFormat::Text => {
            println!("{}", query.sql);
            print_parameters(query);
        }
    }
    Ok(())
}

fn print_parameters(query: &CompiledQuery) {
    if query.parameters.is_empty() {
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(["Name", "Type", "Value"]);
    for (name, value) in query.parameters.iter() {
        builder.push_record([format!("@{name}"), value.type_name().to_string(), value.to_string()]);
    }
    let table = builder.build().with(Style::rounded()).to_string();
    println!();
    println!("{table}");
    println!("{}: {}", "Parameters".cyan(), query.parameters.len());
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}
