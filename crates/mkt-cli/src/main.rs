use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "mkt")]
#[command(about = "Marketplace workflow operator CLI", long_about = None)]
struct Cli {
    /// Layered config paths in merge order (repeatable)
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local ...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Order inspection
    Order {
        #[command(subcommand)]
        cmd: OrderCmd,
    },

    /// Dispute administration
    Dispute {
        #[command(subcommand)]
        cmd: DisputeCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    /// Connectivity + schema presence
    Status,
    /// Apply embedded SQL migrations
    Migrate,
}

#[derive(Subcommand)]
enum OrderCmd {
    /// Print an order, its status history and whether the history replays
    Show {
        #[arg(long)]
        order_id: String,
    },
}

#[derive(Subcommand)]
enum DisputeCmd {
    /// Resolve an open dispute and unlock its order (status unchanged)
    Resolve {
        #[arg(long)]
        dispute_id: String,

        /// Outcome recorded on the dispute
        #[arg(long)]
        resolution: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev convenience; silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = commands::connect(&cli.config_paths).await?;
            match cmd {
                DbCmd::Status => commands::db::status(&pool).await?,
                DbCmd::Migrate => commands::db::migrate(&pool).await?,
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = mkt_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            for key in mkt_config::unknown_keys(&loaded.config_json) {
                eprintln!("WARN: CONFIG_UNUSED_KEY {key}");
            }
            println!("{}", loaded.canonical_json);
        }

        Commands::Order { cmd } => match cmd {
            OrderCmd::Show { order_id } => {
                let ctx = commands::Workflow::open(&cli.config_paths).await?;
                commands::workflow::order_show(&ctx, &order_id).await?;
            }
        },

        Commands::Dispute { cmd } => match cmd {
            DisputeCmd::Resolve {
                dispute_id,
                resolution,
            } => {
                let ctx = commands::Workflow::open(&cli.config_paths).await?;
                commands::workflow::dispute_resolve(&ctx, &dispute_id, &resolution).await?;
            }
        },
    }

    Ok(())
}
