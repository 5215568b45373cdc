use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mission_control::{api, Config, Database};

#[derive(Parser)]
#[command(name = "mission-control")]
#[command(about = "Mission control dashboard: projects, research pipeline, watchlists")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the mission-control server
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Check server status
    Status {
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "mission_control=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Status { port }) => {
            let url = format!("http://127.0.0.1:{}/api/health", port);
            match reqwest::get(&url).await {
                Ok(response) if response.status().is_success() => {
                    println!("Server is up on port {}", port);
                }
                Ok(response) => {
                    println!("Server responded with {}", response.status());
                }
                Err(_) => {
                    println!("Server is not running on port {}", port);
                }
            }
        }
        command => {
            let port = match command {
                Some(Commands::Serve { port }) => port,
                _ => 3000,
            };
            tracing::info!("Starting mission-control server on port {}", port);

            let config = Config::from_env();
            let db = match &config.db_path {
                Some(path) => Database::open(path)?,
                None => Database::open_default()?,
            };
            db.migrate()?;

            let app = api::create_router(api::AppState::new(db, config));

            let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
            tracing::info!(
                "mission-control server listening on http://127.0.0.1:{}",
                port
            );

            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
