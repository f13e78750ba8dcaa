use parkstore::{
    app::{router, AppState},
    auth::AuthService,
    config::Config,
    db,
    sessions::SessionStore,
    store::ParkingStore,
};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parkstore=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Starting parkstore on {}", config.bind_addr);

    // Initialize the registry, from disk if configured
    let store = match &config.database_url {
        Some(url) => ParkingStore::with_database(db::open(url)?)
            .map_err(|e| anyhow::anyhow!("failed to load registry: {}", e))?,
        None => {
            info!("No DATABASE_URL set; running in memory only");
            ParkingStore::new()
        }
    };

    if config.seed_demo_data {
        store
            .seed_demo_data()
            .map_err(|e| anyhow::anyhow!("failed to seed demo data: {}", e))?;
    }

    // Sessions and their background expiry
    let sessions = SessionStore::new(config.session_ttl_seconds);
    sessions.clone().start_expiry_task();

    let auth = AuthService::new(store.clone(), sessions);
    let app = router(AppState { store, auth });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
