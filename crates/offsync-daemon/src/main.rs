//! `offsyncd` - config validation and inspection for the offline-sync
//! replication engine.
//!
//! Actually running the engine requires a CMS-provided content
//! repository, so there is no `run` subcommand here: embed
//! [`offsync_daemon::run`] in the host process instead.

use anyhow::Result;
use clap::{Parser, Subcommand};
use offsync_config::ConfigLoader;

#[derive(Parser)]
#[command(name = "offsyncd")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load configuration from every source and report whether it's valid.
    Validate {
        /// Project directory to load `offsync.toml` / `offsync.local.toml` from.
        #[arg(long, default_value = ".")]
        project_dir: String,
    },

    /// Show build version information.
    Version,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { project_dir } => {
            let config = ConfigLoader::new().with_project_dir(&project_dir).load()?;
            config.validate()?;
            println!("config is valid (mode: {})", config.mode);
            Ok(())
        }
        Commands::Version => {
            println!("offsyncd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
