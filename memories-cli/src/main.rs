mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use memories_core::StoreConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "memories")]
#[command(about = "Share wedding photos to an S3 bucket and list the latest ones", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// S3 bucket name
    #[arg(short, long, env = "MEMORIES_BUCKET")]
    bucket: String,

    /// Prefix photos are stored under
    #[arg(long, env = "MEMORIES_NAMESPACE", default_value = memories_core::config::DEFAULT_NAMESPACE)]
    namespace: String,

    /// Public base URL; download links are presigned when unset
    #[arg(long, env = "MEMORIES_PUBLIC_URL")]
    public_url: Option<String>,
}

impl StoreArgs {
    fn into_config(self) -> StoreConfig {
        let config = StoreConfig::new(self.bucket).with_namespace(self.namespace);
        match self.public_url {
            Some(url) => config.with_public_base_url(url),
            None => config,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Upload photos, one after another
    Upload {
        /// Files or directories to upload
        #[arg(required = true)]
        paths: Vec<String>,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Show the most recent photos
    Gallery {
        #[command(flatten)]
        store: StoreArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memories_cli=info,memories_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Upload { paths, store } => {
            commands::upload::execute(paths, store.into_config()).await?;
        }
        Commands::Gallery { store } => {
            commands::gallery::execute(store.into_config()).await?;
        }
    }

    Ok(())
}
