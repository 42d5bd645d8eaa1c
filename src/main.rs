use anyhow::Result;
use chrono::NaiveDateTime;
use clap::{CommandFactory, Parser, Subcommand};
use fintx::core::log::init_logging;
use fintx::core::statement::parse_datetime;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for fintx::AppCommand {
    fn from(cmd: Commands) -> fintx::AppCommand {
        match cmd {
            Commands::Enrich {
                input,
                json_output,
                xlsx_output,
            } => fintx::AppCommand::Enrich {
                input,
                json_output,
                xlsx_output,
            },
            Commands::Overview { input, at } => fintx::AppCommand::Overview { input, at },
            Commands::Search { input, query } => fintx::AppCommand::Search { input, query },
            Commands::Spending {
                input,
                category,
                at,
            } => fintx::AppCommand::Spending {
                input,
                category,
                at,
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Convert every transaction to the target currency and write JSON and xlsx outputs
    Enrich {
        /// Statement workbook (.xlsx, .xls, .ods)
        input: PathBuf,
        /// JSON output path [default: <reports_dir>/transactions.json]
        #[arg(long)]
        json_output: Option<PathBuf>,
        /// Workbook output path [default: <reports_dir>/transactions.xlsx]
        #[arg(long)]
        xlsx_output: Option<PathBuf>,
    },
    /// Print the month-to-date overview page as JSON
    Overview {
        input: PathBuf,
        /// Reference time, e.g. "2024-01-05 20:00:00" [default: latest transaction]
        #[arg(long, value_parser = parse_at)]
        at: Option<NaiveDateTime>,
    },
    /// Find transactions whose description contains a query
    Search { input: PathBuf, query: String },
    /// Expenses of a category over the three months before a date
    Spending {
        input: PathBuf,
        category: String,
        /// End of the window [default: latest transaction]
        #[arg(long, value_parser = parse_at)]
        at: Option<NaiveDateTime>,
    },
}

fn parse_at(value: &str) -> Result<NaiveDateTime, String> {
    parse_datetime(value).ok_or_else(|| format!("invalid date '{value}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => fintx::cli::setup::setup(),
        Some(cmd) => fintx::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
