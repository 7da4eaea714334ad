//! stageplan CLI - runs rule-compiled stage plans over JSON documents.

mod json;
mod plan_file;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value as Json;
use stageplan_decision::Decider;
use stageplan_execution::{OperationRegistry, Stage};
use stageplan_order::Key;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::plan_file::PlanFile;

#[derive(Parser)]
#[command(name = "stageplan")]
#[command(about = "Rule-compiled stage planner for JSON documents", long_about = None)]
struct Cli {
    /// Log debug details
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the plan over a document
    Run {
        /// Plan file
        #[arg(long)]
        plan: PathBuf,
        /// Input document (stdin when omitted)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Print the output on one line
        #[arg(long)]
        compact: bool,
    },
    /// Show the decision tree and the stages chosen for a document
    Explain {
        /// Plan file
        #[arg(long)]
        plan: PathBuf,
        /// Input document (stdin when omitted)
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            plan,
            input,
            compact,
        } => {
            let plan = PlanFile::load(&plan)?;
            let document = read_document(input.as_deref())?;

            let executor = plan.executor.build(json::merge, Handle::current());
            let mut registry: OperationRegistry<Json, Stage<Json>> =
                OperationRegistry::new(executor).with_decider_config(plan.decider_config());
            plan.install(&mut registry)?;

            let operation = registry.resolve(&plan.name)?;
            let output = operation.execute(document).await?;
            info!(operation = %plan.name, mode = ?plan.executor.mode, "Plan finished");

            let rendered = if compact {
                serde_json::to_string(&output)?
            } else {
                serde_json::to_string_pretty(&output)?
            };
            println!("{}", rendered);
        }
        Commands::Explain { plan, input } => {
            let plan = PlanFile::load(&plan)?;
            let document = read_document(input.as_deref())?;

            let matcher = plan.rule_matcher()?;
            println!("Decision tree:");
            print!("{}", matcher);

            let rules = matcher.decide(&document)?;
            println!();
            println!("Matching rules: {}", rules.join(", "));

            let case = plan.operation_plan()?.decide(&document)?;
            println!("Stages:");
            for (index, (key, stages)) in case.linear_entries()?.into_iter().enumerate() {
                let names: Vec<&str> = stages.iter().map(|s| s.name()).collect();
                match key {
                    Key::Unique(_) => println!("  {}. {}", index + 1, names.join(", ")),
                    _ if names.is_empty() => println!("  {}. {} (no stages)", index + 1, key),
                    _ => println!("  {}. {}: {}", index + 1, key, names.join(", ")),
                }
            }
        }
    }

    Ok(())
}

fn read_document(path: Option<&Path>) -> Result<Json> {
    let text = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input {}", path.display()))?,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read input from stdin")?;
            text
        }
    };

    serde_json::from_str(&text).context("Input is not a JSON document")
}
