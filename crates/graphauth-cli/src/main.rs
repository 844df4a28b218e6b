// CLI for checking and inspecting @auth rules of a schema

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;

use config::{CliConfig, OutputFormat};

#[derive(Parser)]
#[command(name = "graphauth")]
#[command(about = "Compile schema @auth rules into query filters", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format, overriding the config file
    #[arg(long, global = true, value_enum)]
    format: Option<OutputFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every rule of a schema and report rule counts
    Check {
        /// Schema document
        #[arg(short, long)]
        schema: PathBuf,
    },

    /// Print the compiled filter and auxiliary queries of selected rules
    Compile {
        /// Schema document
        #[arg(short, long)]
        schema: PathBuf,

        /// Only rules of this type
        #[arg(short = 't', long = "type")]
        type_name: Option<String>,

        /// Only rules of this field
        #[arg(short, long)]
        field: Option<String>,

        /// Only this operation (query, add, update, delete)
        #[arg(short, long)]
        operation: Option<String>,
    },

    /// Show how a single rule string is tokenized and classified
    Explain {
        /// Schema document
        #[arg(short, long)]
        schema: PathBuf,

        /// Type the rule is evaluated against
        #[arg(short = 't', long = "type")]
        type_name: String,

        /// Rule string, e.g. "filter(eq(author, $USER))"
        rule: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => CliConfig::load_from_file(path)?,
        None => CliConfig::default(),
    };
    config.merge_with_env()?;
    if cli.verbose {
        config.log_level = "debug".to_string();
    }
    if let Some(format) = cli.format {
        config.format = format;
    }
    config.validate()?;

    // Logs go to stderr so JSON output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(config.log_level.as_str())
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Check { schema } => commands::check::run(&config, &schema),
        Commands::Compile {
            schema,
            type_name,
            field,
            operation,
        } => {
            let selection = commands::compile::Selection::new(type_name, field, operation)?;
            commands::compile::run(&config, &schema, &selection)
        }
        Commands::Explain {
            schema,
            type_name,
            rule,
        } => commands::explain::run(&config, &schema, &type_name, &rule),
    }
}
