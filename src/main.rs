use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use collage_nexus::api::LastfmClient;
use collage_nexus::config::CONFIG;
use collage_nexus::router::{CollageState, collage_router};
use collage_nexus::service::canvas_actor::{self, CanvasActorArgs};
use collage_nexus::service::image_store::PersistentImages;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &*CONFIG;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.database_url,
        proxy = %cfg.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        loglevel = %cfg.loglevel,
        lastfm_endpoint = %cfg.lastfm_endpoint,
        auth = !cfg.collage_key.is_empty()
    );
    if cfg.collage_key.is_empty() {
        warn!("COLLAGE_COLLAGE_KEY is empty; API key check disabled");
    }

    let store = PersistentImages::open(&cfg.database_url).await?;
    let handle = canvas_actor::spawn(CanvasActorArgs {
        store,
        size: cfg.canvas_size(),
        album_cooldown: cfg.album_cooldown(),
    })
    .await?;
    let client = LastfmClient::new(cfg)?;

    let state = CollageState::new(handle, client, cfg);
    let app = collage_router(state);

    let listener = TcpListener::bind(cfg.listen_addr.as_str()).await?;
    info!("HTTP server listening on {}", cfg.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
