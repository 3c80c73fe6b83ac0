use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use streamwatch_core::platforms::discord::DiscordPlatform;
use streamwatch_core::platforms::twitch::TwitchHelixClient;
use streamwatch_core::repositories::{
    PostgresActivityRepository, PostgresBotSettingsRepository, PostgresStreamerRepository,
};
use streamwatch_core::services::{QualifyFilter, ReconciliationEngine, StatsService};
use streamwatch_core::tasks::stream_monitor::spawn_stream_monitor_task;
use streamwatch_core::{Database, Error};

mod routes;
use routes::AppState;

#[derive(Parser, Debug, Clone)]
#[command(name = "streamwatch")]
#[command(author, version, about = "Discord bot that announces qualifying Twitch streams")]
struct Args {
    /// Address for the dashboard HTTP API
    #[arg(long, default_value = "0.0.0.0:5000")]
    server_addr: String,

    /// Postgres connection URL
    #[arg(long, default_value = "postgres://streamwatch@localhost:5432/streamwatch")]
    db_path: String,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("streamwatch=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)
        .expect("Failed to set global subscriber");
}

fn required_env(key: &str) -> Result<String, Error> {
    std::env::var(key).map_err(|_| Error::Config(format!("{key} not set in environment")))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();

    let discord_token = required_env("DISCORD_BOT_TOKEN")?;
    let guild_id: u64 = required_env("DISCORD_GUILD_ID")?
        .parse()
        .map_err(|_| Error::Config("DISCORD_GUILD_ID is not a valid snowflake".into()))?;
    let twitch_client_id = required_env("TWITCH_CLIENT_ID")?;
    let twitch_client_secret = required_env("TWITCH_CLIENT_SECRET")?;

    // Deployment-fixed qualification filter; defaults match the original
    // community deployment.
    let game_name = std::env::var("STREAM_GAME_NAME")
        .unwrap_or_else(|_| "Grand Theft Auto V".to_string());
    let title_keyword =
        std::env::var("STREAM_TITLE_KEYWORD").unwrap_or_else(|_| "rsrp".to_string());

    let db = Database::new(&args.db_path).await?;
    db.migrate().await?;

    let streamers = Arc::new(PostgresStreamerRepository::new(db.pool().clone()));
    let settings = Arc::new(PostgresBotSettingsRepository::new(db.pool().clone()));
    let activity = Arc::new(PostgresActivityRepository::new(db.pool().clone()));

    // Both platform startups are fatal on failure; the bot must not run
    // half-initialized.
    let mut discord = DiscordPlatform::new(discord_token, guild_id);
    discord.connect().await?;
    let gateway = Arc::new(discord);

    let provider =
        Arc::new(TwitchHelixClient::authenticate(&twitch_client_id, &twitch_client_secret).await?);

    let engine = Arc::new(ReconciliationEngine::new(
        streamers.clone(),
        settings.clone(),
        activity.clone(),
        gateway,
        provider,
        QualifyFilter::new(&game_name, &title_keyword),
    ));

    let monitor_handle = spawn_stream_monitor_task(engine.clone(), settings.clone());

    let stats = StatsService::new(streamers.clone(), settings.clone(), activity.clone());
    let state = Arc::new(AppState {
        engine,
        streamers,
        settings,
        activity,
        stats,
    });

    let addr: SocketAddr = args.server_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Dashboard API listening on {addr}");

    let app = routes::router(state);
    if let Err(e) = axum::serve(listener, app).await {
        error!("HTTP server error: {e}");
    }

    monitor_handle.abort();
    Ok(())
}
