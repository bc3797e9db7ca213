mod api;
mod auth;
mod cache;
mod config;
mod state;
mod utils;

use std::sync::Arc;
use std::time::Duration;

use api::api_router;
use auth::AuthStore;
use axum::Router;
use cache::{MemoryCache, NoopCache, ResponseCache};
use config::{config_path_from_env, load_or_create_config, resolve_path};
use library::{open_or_create_db, Catalog, CatalogStore};
use metadata::{LlmClient, OpenAiTransport};
use reqwest::Client;
use state::AppState;
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;

    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }
    if config.llm.api_key.is_empty() {
        warn!("No LLM api key configured; generated metadata will use fallbacks.");
    }

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let session_ttl = Duration::from_secs(config.session_ttl_secs);

    let db_path = resolve_path(&config_path, &config.db_path);
    let db = Arc::new(open_or_create_db(&db_path)?);
    let store = CatalogStore::new(Arc::clone(&db));
    store.init_tables()?;
    let auth = AuthStore::new(Arc::clone(&db), session_ttl);
    auth.init_tables()?;

    let http_client = Client::builder()
        .user_agent("phono/0.1")
        .build()?;
    let transport = OpenAiTransport::new(http_client, config.llm.settings());
    let model = LlmClient::new(Arc::new(transport), config.llm.retry_policy());
    let catalog = Catalog::new(store, Arc::new(model));

    let cache_ttl = Duration::from_secs(config.cache_ttl_secs);
    let cache: Arc<dyn ResponseCache> = if cache_ttl.is_zero() {
        Arc::new(NoopCache)
    } else {
        Arc::new(MemoryCache::new())
    };

    let state = AppState {
        auth,
        catalog,
        cache,
        cache_ttl,
    };

    let app = Router::new()
        .nest("/api/v1", api_router(state))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    info!("Shutdown signal received.");
}
