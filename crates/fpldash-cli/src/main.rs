use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use fpldash_storage::PgStore;
use fpldash_upstream::{HttpFplApi, UpstreamConfig};
use fpldash_web::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "fpldash")]
#[command(about = "FPL mirror dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the dashboard and the refresh endpoints.
    Serve,
    /// Create the mirror tables if they do not exist yet.
    InitDb,
    /// Run one headless refresh cycle against the configured store.
    Refresh {
        #[arg(value_enum)]
        dataset: Dataset,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Dataset {
    EventsTeams,
    Fixtures,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => fpldash_web::serve(config).await?,
        Commands::InitDb => {
            let store = PgStore::connect(&config.database_url).await?;
            store.init_schema().await?;
            println!("schema ready");
        }
        Commands::Refresh { dataset } => {
            let store = PgStore::connect(&config.database_url).await?;
            let api = HttpFplApi::new(UpstreamConfig {
                base_url: config.fpl_api_base.clone(),
                timeout: Duration::from_secs(config.http_timeout_secs),
                user_agent: config.user_agent.clone(),
            })?;
            match dataset {
                Dataset::EventsTeams => {
                    let summary =
                        fpldash_sync::refresh_events_teams(&api, &store, Utc::now()).await?;
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
                Dataset::Fixtures => {
                    let summary = fpldash_sync::refresh_fixtures(&api, &store, Utc::now()).await?;
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
            }
        }
    }

    Ok(())
}
