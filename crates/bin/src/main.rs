//! factorhub CLI binary.
//!
//! Manages factor definitions, models and mapping configs, runs factor
//! calculations over imported observations, and tracks user portfolios.

mod commands;
mod csv_io;
mod store_manager;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use factorhub_data::{FactorSortField, PositionSortField, SortOrder};
use factorhub_factors::{DataSource, parse_trade_date};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "factorhub")]
#[command(about = "factorhub: factor configuration, calculation and portfolio tracking", long_about = None)]
#[command(version)]
struct Cli {
    /// SQLite database path
    #[arg(long, global = true, env = "FACTORHUB_DB")]
    db: Option<PathBuf>,

    /// Name recorded as creator/updater of written records
    #[arg(long, global = true, env = "FACTORHUB_OPERATOR")]
    operator: Option<String>,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// A factor given by id or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FactorRef {
    Id(i64),
    Name(String),
}

impl std::str::FromStr for FactorRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("factor must not be empty".to_string());
        }
        Ok(s.parse().map_or_else(|_| Self::Name(s.to_string()), Self::Id))
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    parse_trade_date(raw).ok_or_else(|| format!("invalid date '{raw}', expected YYYY-MM-DD or YYYYMMDD"))
}

#[derive(Subcommand)]
enum Commands {
    /// Create the turnover-rate factor, its models and an example config
    Init {
        /// Recreate the factor if it exists
        #[arg(long)]
        force: bool,
    },

    /// Manage factor definitions
    #[command(subcommand)]
    Factor(FactorCommand),

    /// Manage factor computation models
    #[command(subcommand)]
    Model(ModelCommand),

    /// Manage per-factor code-to-model mappings
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Show which model applies to a stock code
    Resolve {
        /// Factor id or name
        factor: FactorRef,

        /// Stock code (e.g. 000001.SZ)
        code: String,
    },

    /// Load observations from a CSV file
    Import {
        /// CSV file with ts_code, trade_date and field columns
        file: PathBuf,

        /// Observation source the rows belong to
        #[arg(long, default_value = "daily_basic")]
        source: DataSource,
    },

    /// Calculate a factor over a date range
    Calculate {
        /// Factor id or name
        factor: FactorRef,

        /// Start date
        #[arg(long, value_parser = parse_date)]
        start: NaiveDate,

        /// End date
        #[arg(long, value_parser = parse_date)]
        end: NaiveDate,

        /// Comma-separated codes (default: every code with observations)
        #[arg(long, value_delimiter = ',')]
        codes: Option<Vec<String>>,
    },

    /// Show calculated factor values for a stock
    Results {
        /// Stock code
        code: String,

        /// Only this factor
        #[arg(long)]
        factor: Option<String>,

        /// Start date
        #[arg(long, value_parser = parse_date)]
        start: Option<NaiveDate>,

        /// End date
        #[arg(long, value_parser = parse_date)]
        end: Option<NaiveDate>,

        /// Write CSV to this file ("-" for stdout)
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Manage a user's positions
    #[command(subcommand)]
    Position(PositionCommand),

    /// Manage a user's favorite stocks
    #[command(subcommand)]
    Favorite(FavoriteCommand),

    /// Show database location and record counts
    Status,
}

#[derive(Subcommand)]
pub(crate) enum FactorCommand {
    /// List factors
    List {
        /// Only enabled factors
        #[arg(long)]
        enabled: bool,

        /// Sort column (id, factor_name, created_at)
        #[arg(long, default_value = "id")]
        order_by: FactorSortField,

        /// Sort direction (asc, desc)
        #[arg(long, default_value = "asc")]
        order: SortOrder,
    },
    /// Show a factor with its models and config
    Show {
        /// Factor id or name
        factor: FactorRef,
    },
    /// Create a factor
    Create {
        /// Unique factor name
        #[arg(long)]
        name: String,

        /// Chinese display name
        #[arg(long)]
        cn_name: String,

        /// English display name
        #[arg(long)]
        en_name: Option<String>,

        /// Result column name (defaults to the factor name)
        #[arg(long)]
        column: Option<String>,

        /// Description
        #[arg(long)]
        description: Option<String>,

        /// Create disabled
        #[arg(long)]
        disabled: bool,
    },
    /// Delete a factor with its models and config
    Delete {
        /// Factor id or name
        factor: FactorRef,
    },
    /// Enable a factor
    Enable {
        /// Factor id or name
        factor: FactorRef,
    },
    /// Disable a factor
    Disable {
        /// Factor id or name
        factor: FactorRef,
    },
}

#[derive(Subcommand)]
pub(crate) enum ModelCommand {
    /// List models
    List {
        /// Only models of this factor
        #[arg(long)]
        factor: Option<FactorRef>,
    },
    /// Show a model
    Show {
        /// Model id
        id: i64,
    },
    /// Create a model
    Create {
        /// Factor id or name
        #[arg(long)]
        factor: FactorRef,

        /// Display name
        #[arg(long)]
        name: String,

        /// Model code
        #[arg(long)]
        code: String,

        /// Calculator parameters as a JSON object
        #[arg(long, default_value = "{}")]
        config: String,

        /// Make this the factor's default model
        #[arg(long)]
        default: bool,
    },
    /// Delete a model
    Delete {
        /// Model id
        id: i64,
    },
    /// Make a model its factor's default
    SetDefault {
        /// Model id
        id: i64,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigCommand {
    /// Show a factor's mapping config
    Show {
        /// Factor id or name
        factor: FactorRef,
    },
    /// Create or replace a factor's mapping config
    Set {
        /// Factor id or name
        factor: FactorRef,

        /// Mappings JSON: an array of {"model_id", "codes"} or a full config
        mappings: String,

        /// Store the config disabled
        #[arg(long)]
        disabled: bool,
    },
    /// Delete a factor's mapping config
    Delete {
        /// Factor id or name
        factor: FactorRef,
    },
}

#[derive(Subcommand)]
pub(crate) enum PositionCommand {
    /// List positions
    List {
        /// User id
        #[arg(long, default_value_t = 1)]
        user: i64,

        /// Only this code
        #[arg(long)]
        code: Option<String>,

        /// Bought on or after
        #[arg(long, value_parser = parse_date)]
        start: Option<NaiveDate>,

        /// Bought on or before
        #[arg(long, value_parser = parse_date)]
        end: Option<NaiveDate>,

        /// Sort column (id, code, buy_date, created_at)
        #[arg(long, default_value = "created_at")]
        order_by: PositionSortField,
    },
    /// Add a position
    Add {
        /// User id
        #[arg(long, default_value_t = 1)]
        user: i64,

        /// Stock code
        #[arg(long)]
        code: String,

        /// Shares held
        #[arg(long)]
        quantity: f64,

        /// Average cost per share
        #[arg(long)]
        avg_cost: f64,

        /// Buy date
        #[arg(long, value_parser = parse_date)]
        buy_date: Option<NaiveDate>,

        /// Latest price
        #[arg(long)]
        price: Option<f64>,

        /// Comment
        #[arg(long)]
        comment: Option<String>,
    },
    /// Remove a position
    Remove {
        /// User id
        #[arg(long, default_value_t = 1)]
        user: i64,

        /// Position id
        id: i64,
    },
}

#[derive(Subcommand)]
pub(crate) enum FavoriteCommand {
    /// List favorites
    List {
        /// User id
        #[arg(long, default_value_t = 1)]
        user: i64,
    },
    /// Add a favorite
    Add {
        /// User id
        #[arg(long, default_value_t = 1)]
        user: i64,

        /// Stock code
        #[arg(long)]
        code: String,

        /// Comment
        #[arg(long)]
        comment: Option<String>,
    },
    /// Remove a favorite
    Remove {
        /// User id
        #[arg(long, default_value_t = 1)]
        user: i64,

        /// Favorite id
        id: i64,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let db_path = cli.db.unwrap_or_else(store_manager::default_db_path);
    let store = store_manager::open_store(&db_path)?;
    let ctx = commands::Context::new(&store, cli.operator);

    match cli.command {
        Commands::Init { force } => ctx.init(force)?,
        Commands::Factor(cmd) => ctx.factor(cmd)?,
        Commands::Model(cmd) => ctx.model(cmd)?,
        Commands::Config(cmd) => ctx.config(cmd)?,
        Commands::Resolve { factor, code } => ctx.resolve(&factor, &code)?,
        Commands::Import { file, source } => ctx.import(&file, source)?,
        Commands::Calculate {
            factor,
            start,
            end,
            codes,
        } => ctx.calculate(&factor, start, end, codes)?,
        Commands::Results {
            code,
            factor,
            start,
            end,
            csv,
        } => ctx.results(&code, factor.as_deref(), start, end, csv.as_deref())?,
        Commands::Position(cmd) => ctx.position(cmd)?,
        Commands::Favorite(cmd) => ctx.favorite(cmd)?,
        Commands::Status => ctx.status(&db_path)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_factor_ref_parsing() {
        assert_eq!("7".parse::<FactorRef>().unwrap(), FactorRef::Id(7));
        assert_eq!(
            "turnover_rate".parse::<FactorRef>().unwrap(),
            FactorRef::Name("turnover_rate".to_string())
        );
        assert!("  ".parse::<FactorRef>().is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        assert_eq!(parse_date("2025-01-07").unwrap(), expected);
        assert_eq!(parse_date("20250107").unwrap(), expected);
        assert!(parse_date("07/01/2025").is_err());
    }

    #[test]
    fn test_calculate_args() {
        let cli = Cli::try_parse_from([
            "factorhub",
            "calculate",
            "turnover_rate",
            "--start",
            "20250101",
            "--end",
            "2025-01-31",
            "--codes",
            "000001.SZ,600000.SH",
        ])
        .unwrap();
        let Commands::Calculate { factor, codes, .. } = cli.command else {
            panic!("expected calculate");
        };
        assert_eq!(factor, FactorRef::Name("turnover_rate".to_string()));
        assert_eq!(codes.unwrap().len(), 2);
    }
}
