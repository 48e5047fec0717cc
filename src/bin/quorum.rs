//! Quorum CLI — extract and reduce crowd-sourced classification data.
//!
//! Usage:
//!   quorum extract <classifications_csv> -c config.yaml [-o base] [--human]
//!   quorum reduce <extracted_csv> [-F first|last|all] [-k JSON] [-O] [-o base] [-s]

use clap::{Parser, Subcommand};
use quorum::dispatch::DispatchConfig;
use quorum::extract::{extract_csv, ExtractOptions, ExtractorRegistry};
use quorum::reduce::{reduce_csv, FilterPolicy, Keywords, ReduceOptions, ReducerRegistry};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "quorum",
    version,
    about = "Consensus engine for crowd-sourced classifications"
)]
struct Cli {
    /// Log per-subject progress
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract annotations from a classification export
    Extract {
        /// Classification export csv (annotations as a JSON column)
        classifications_csv: PathBuf,
        /// Task-to-extractor routing config, YAML or JSON
        #[arg(short, long)]
        config: PathBuf,
        /// Base name for the per-extractor output csv files
        #[arg(short, long, default_value = "extractions")]
        output: PathBuf,
        /// Keep task and tool labels in the routed annotations
        #[arg(long)]
        human: bool,
    },
    /// Reduce extracted data into per-subject consensus
    Reduce {
        /// Extracted csv file (output of the extract subcommand)
        extracted_csv: PathBuf,
        /// How to filter an annotator classifying one subject several times
        #[arg(short = 'F', long, default_value = "first")]
        filter: FilterPolicy,
        /// Keywords passed to the reducer as a JSON object, e.g. '{"eps": 5.5}'
        #[arg(short, long, default_value = "{}")]
        keywords: String,
        /// Arrange the data columns in alphabetical order before saving
        #[arg(short = 'O', long)]
        order: bool,
        /// Base name for the output csv file
        #[arg(short, long, default_value = "reductions")]
        output: PathBuf,
        /// Stream output to csv after each subject (slower, but resumable)
        #[arg(short, long)]
        stream: bool,
    },
}

fn cmd_extract(
    classifications_csv: &PathBuf,
    config: &PathBuf,
    output: PathBuf,
    human: bool,
) -> i32 {
    let config = match DispatchConfig::from_yaml_file(config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let registry = ExtractorRegistry::builtin();
    let opts = ExtractOptions { config, output, human };
    match extract_csv(classifications_csv, &registry, &opts) {
        Ok(paths) => {
            for path in paths {
                println!("{}", path.display());
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_reduce(
    extracted_csv: &PathBuf,
    filter: FilterPolicy,
    keywords: &str,
    order: bool,
    output: PathBuf,
    stream: bool,
) -> i32 {
    let keywords: Keywords = match serde_json::from_str(keywords) {
        Ok(keywords) => keywords,
        Err(e) => {
            eprintln!("Error: --keywords is not a JSON object: {}", e);
            return 1;
        }
    };
    let registry = ReducerRegistry::builtin();
    let opts = ReduceOptions { filter, keywords, output, order, stream };
    match reduce_csv(extracted_csv, &registry, &opts) {
        Ok(path) => {
            println!("{}", path.display());
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();

    let code = match cli.command {
        Commands::Extract { classifications_csv, config, output, human } => {
            cmd_extract(&classifications_csv, &config, output, human)
        }
        Commands::Reduce { extracted_csv, filter, keywords, order, output, stream } => {
            cmd_reduce(&extracted_csv, filter, &keywords, order, output, stream)
        }
    };
    std::process::exit(code);
}
