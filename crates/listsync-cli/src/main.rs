use clap::{ArgAction, Parser, Subcommand};
use commands::{config, sync};
use media_sync_config::PathManager;

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "listsync")]
#[command(about = "ListSync - Mirror your IMDb lists, watchlist and ratings to Trakt")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    /// Write logs to a daily-rotated file instead of stderr. Without a
    /// path, logs go to the default log directory.
    #[arg(long, global = true, value_name = "PATH", num_args = 0..=1)]
    log_file: Option<Option<std::path::PathBuf>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync from IMDb to Trakt
    #[command(long_about = "Export every configured IMDb list, the watchlist and ratings, then make Trakt match them. The mode comes from the configuration unless a flag overrides it.")]
    Sync {
        /// Plan and log every change without touching Trakt
        #[arg(long, action = ArgAction::SetTrue, conflicts_with = "add_only")]
        dry_run: bool,

        /// Only add items and create lists; never remove or delete
        #[arg(long, action = ArgAction::SetTrue)]
        add_only: bool,

        /// Read configuration from this file instead of the default location
        #[arg(long, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration (masks sensitive data)
    #[command(long_about = "Display the effective configuration after environment overrides. Passwords, cookies and secrets are masked unless --full is given.")]
    Show {
        /// Show secrets unmasked
        #[arg(long, action = ArgAction::SetTrue)]
        full: bool,

        /// Read configuration from this file instead of the default location
        #[arg(long, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let log_file = cli.log_file.map(|path| {
        path.unwrap_or_else(|| {
            let paths = PathManager::default();
            paths.log_dir().join(paths.log_file_name())
        })
    });
    logging::init_logging_with_file(cli.verbose, cli.quiet, log_file)
        .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

    let output = output::Output::new(cli.output, cli.quiet);

    match cli.command {
        Commands::Sync {
            dry_run,
            add_only,
            config,
        } => sync::run_sync(dry_run, add_only, config, &output).await,
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Show { full, config } => config::show_config(full, config, &output),
        },
    }
}
