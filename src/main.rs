use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use portval::core::log::init_logging;
use portval::core::price::AssetType;

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

impl From<Commands> for portval::AppCommand {
    fn from(cmd: Commands) -> portval::AppCommand {
        match cmd {
            Commands::Summary => portval::AppCommand::Summary,
            Commands::Quote {
                symbol,
                asset_type,
                exchange,
            } => portval::AppCommand::Quote {
                symbol,
                asset_type,
                exchange,
            },
            Commands::Rates => portval::AppCommand::Rates,
            Commands::Refresh => portval::AppCommand::Refresh,
            Commands::Stats => portval::AppCommand::Stats,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Value the configured positions in the base currency
    Summary,
    /// Resolve the current price of one instrument
    Quote {
        symbol: String,
        /// stock, crypto, fund, gold, bond or cash
        #[arg(short = 't', long = "type", default_value = "stock")]
        asset_type: AssetType,
        /// Exchange hint such as BIST or LSE
        #[arg(short, long)]
        exchange: Option<String>,
    },
    /// Show exchange rates relative to the base currency
    Rates,
    /// Refresh stored prices for every tracked symbol
    Refresh,
    /// Show today's provider usage
    Stats,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => portval::cli::setup::setup(),
        Some(cmd) => portval::run_command(cmd.into(), cli.config_path.as_deref()).await,
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
