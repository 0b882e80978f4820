mod adapters_cmd;
mod config;
mod transfer_cmd;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use ferry_core::{DEFAULT_NAMESPACE, Direction};

use transfer_cmd::TransferArgs;

#[derive(Parser)]
#[command(name = "ferry", about = "Move large objects through custom transfer agents")]
struct Cli {
    /// Config file (defaults to ~/.config/ferry/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Config section holding the `customtransfer` entries
    #[arg(long, global = true, default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured custom transfer adapters
    Adapters,
    /// Run a manifest of objects through a custom transfer adapter
    Transfer {
        /// Adapter name, as configured under `customtransfer.<name>`
        name: String,
        /// Which way the bytes flow
        #[arg(long, value_enum)]
        direction: DirectionArg,
        /// JSON array of objects with their resolved actions
        #[arg(long)]
        manifest: PathBuf,
        /// Maximum number of concurrent agent processes
        #[arg(long, default_value_t = 4)]
        workers: usize,
        /// Local object store root used to resolve upload paths
        #[arg(long, default_value = ".git/lfs/objects")]
        objects_dir: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Upload,
    Download,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Upload => Direction::Upload,
            DirectionArg::Download => Direction::Download,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref())?;
    let (registry, report) = config::build_registry(&config, &cli.namespace);

    match cli.command {
        Commands::Adapters => {
            adapters_cmd::run_adapters(&registry, &report)?;
        }
        Commands::Transfer {
            name,
            direction,
            manifest,
            workers,
            objects_dir,
        } => {
            transfer_cmd::run_transfer(
                &registry,
                TransferArgs {
                    adapter: name,
                    direction: direction.into(),
                    manifest,
                    workers,
                    objects_dir,
                },
            )
            .await?;
        }
    }

    Ok(())
}
