pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dealwise_core::config::{EngineConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "dealwise",
    about = "Dealwise margin engine CLI",
    long_about = "Drive the margin recommendation and BOM allocation engine from JSON files: \
                  score deals, train customer models, sweep margins, and allocate bills of materials.",
    after_help = "Examples:\n  dealwise recommend --deal deal.json --history history.json\n  dealwise train --history history.json --customer acme --output model.json\n  dealwise bom --lines lines.json"
)]
pub struct Cli {
    /// Path to dealwise.toml (defaults to the working directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Score one deal against optional historical context")]
    Recommend {
        #[arg(long, help = "Deal input JSON file")]
        deal: PathBuf,
        #[arg(long, help = "Historical deals JSON file")]
        history: Option<PathBuf>,
    },
    #[command(about = "Train a customer model from closed deals and write the package")]
    Train {
        #[arg(long, help = "Historical deals JSON file")]
        history: PathBuf,
        #[arg(long, help = "Customer identifier recorded in the package checksum")]
        customer: String,
        #[arg(long, help = "Where to write the trained model package JSON")]
        output: Option<PathBuf>,
    },
    #[command(about = "Sweep candidate margins through a trained model package")]
    Sweep {
        #[arg(long, help = "Deal input JSON file")]
        deal: PathBuf,
        #[arg(long, help = "Trained model package JSON file")]
        model: PathBuf,
    },
    #[command(about = "Allocate a blended margin target across a bill of materials")]
    Bom {
        #[arg(long, help = "BOM lines JSON file")]
        lines: PathBuf,
        #[arg(long, help = "BOM context JSON file")]
        context: Option<PathBuf>,
    },
    #[command(about = "Inspect effective engine configuration with secrets redacted")]
    Config,
}

fn init_logging(config: &EngineConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    // A second init (e.g. in tests) is fine to ignore.
    let result = match config.logging.format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .compact()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .pretty()
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .json()
            .try_init(),
    };
    let _ = result;
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let config = match EngineConfig::load(LoadOptions {
        config_path: cli.config.clone(),
        require_file: cli.config.is_some(),
    }) {
        Ok(config) => config,
        Err(error) => {
            let result = commands::CommandResult::failure(
                "config",
                "configuration",
                error.to_string(),
                2,
            );
            println!("{}", result.output);
            return ExitCode::from(result.exit_code);
        }
    };
    init_logging(&config);

    let result = match cli.command {
        Command::Recommend { deal, history } => {
            commands::recommend::run(&config, &deal, history.as_deref())
        }
        Command::Train { history, customer, output } => {
            commands::train::run(&history, &customer, output.as_deref())
        }
        Command::Sweep { deal, model } => commands::sweep::run(&deal, &model),
        Command::Bom { lines, context } => commands::bom::run(&lines, context.as_deref()),
        Command::Config => commands::config::run(&config),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
