use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tally_backup::backup::BackupOrchestrator;
use tally_backup::cli::{
    handle_backup, handle_destination_command, handle_detect, handle_fingerprint, handle_list,
    handle_policy_command, handle_restore, handle_settings_command, handle_watch,
    DestinationCommands, PolicyCommands, SettingsCommands,
};
use tally_backup::config::{JsonSettingsStore, TallyPaths, CONFIG_DIR_ENV};

#[derive(Parser)]
#[command(
    name = "tally-backup",
    author = "Kaylee Beyene",
    version,
    about = "Multi-destination backups for bookkeeping databases",
    long_about = "tally-backup copies a bookkeeping database to every destination in its \
                  backup policy (cloud sync folders, removable drives, local directories), \
                  keeps a bounded number of versions in each, and restores them on demand."
)]
struct Cli {
    /// Configuration directory (holds settings.json)
    #[arg(long, global = true, env = CONFIG_DIR_ENV)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up a database to all of its destinations now
    Backup {
        /// Database file
        db: PathBuf,
    },

    /// List backups of a database, newest first
    #[command(alias = "ls")]
    List {
        /// Database file
        db: PathBuf,
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Restore a backup into a directory without overwriting anything
    Restore {
        /// Backup file
        backup: PathBuf,
        /// Directory to restore into
        target_dir: PathBuf,
    },

    /// Manage a database's backup destinations
    #[command(subcommand, alias = "dest")]
    Destination(DestinationCommands),

    /// Show or change a database's backup policy
    #[command(subcommand)]
    Policy(PolicyCommands),

    /// Find cloud sync folders and removable drives
    Detect {
        /// Add every detected location to this database's policy
        #[arg(long)]
        add_to: Option<PathBuf>,
    },

    /// Show or change global backup settings
    #[command(subcommand)]
    Settings(SettingsCommands),

    /// Show the fingerprint embedded in a database's backup names
    Fingerprint {
        /// Database file
        db: PathBuf,
    },

    /// Run scheduled backups for a database until interrupted
    Watch {
        /// Database file
        db: PathBuf,
    },

    /// Show current configuration and paths
    Config,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    // Initialize paths and the settings store
    let paths = match cli.config_dir {
        Some(dir) => TallyPaths::with_base_dir(dir),
        None => TallyPaths::new()?,
    };
    paths.ensure_directories()?;
    let store = JsonSettingsStore::open(paths.settings_file())
        .with_context(|| format!("loading {}", paths.settings_file().display()))?;
    let orchestrator = BackupOrchestrator::new(store);

    match cli.command {
        Some(Commands::Backup { db }) => handle_backup(&orchestrator, &db)?,
        Some(Commands::List { db, verbose }) => handle_list(&orchestrator, &db, verbose)?,
        Some(Commands::Restore { backup, target_dir }) => {
            handle_restore(&orchestrator, &backup, &target_dir)?
        }
        Some(Commands::Destination(cmd)) => handle_destination_command(&orchestrator, cmd)?,
        Some(Commands::Policy(cmd)) => handle_policy_command(&orchestrator, cmd)?,
        Some(Commands::Detect { add_to }) => handle_detect(&orchestrator, add_to.as_deref())?,
        Some(Commands::Settings(cmd)) => handle_settings_command(&orchestrator, cmd)?,
        Some(Commands::Fingerprint { db }) => handle_fingerprint(&db)?,
        Some(Commands::Watch { db }) => handle_watch(&orchestrator, &db)?,
        Some(Commands::Config) => {
            println!("tally-backup Configuration");
            println!("==========================");
            println!("Config directory: {}", paths.base_dir().display());
            println!("Settings file:    {}", paths.settings_file().display());
            println!();
            println!("Policies: {}", orchestrator.database_ids().len());
            println!("Status:   {}", orchestrator.status());
        }
        None => {
            println!("tally-backup - multi-destination database backups");
            println!();
            println!("Run 'tally-backup --help' for usage information.");
        }
    }

    Ok(())
}
