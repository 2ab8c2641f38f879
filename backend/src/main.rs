use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use sessionkeeper_backend::{
    config::Config,
    db::{connection::create_pool, redis::create_redis_pool},
    docs::ApiDoc,
    middleware::SessionTransport,
    repositories::{PgSessionStore, PgUserDirectory},
    routes::build_router,
    services::{spawn_session_reaper, RedisSessionCache, SessionManager},
    state::AppState,
    utils::password::Argon2PasswordService,
};

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

fn cors_layer(config: &Config, transport: &SessionTransport) -> anyhow::Result<CorsLayer> {
    let session_header = transport.header_name().clone();
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION, session_header.clone()])
        .expose_headers([session_header])
        .max_age(std::time::Duration::from_secs(24 * 60 * 60));

    if config.cors_allow_origins.iter().any(|origin| origin == "*") {
        return Ok(layer.allow_origin(Any));
    }
    let origins = config
        .cors_allow_origins
        .iter()
        .map(|origin| HeaderValue::from_str(origin))
        .collect::<Result<Vec<_>, _>>()?;
    // Cookie clients need credentials, which browsers refuse with a wildcard.
    Ok(layer.allow_origin(origins).allow_credentials(true))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sessionkeeper_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        database_url = %mask_secret(&config.database_url),
        redis_url = %config.redis_url.as_deref().map(mask_secret).unwrap_or_else(|| "<unset>".into()),
        session_header = %config.session_header_name,
        session_cookie = %config.session_cookie_name,
        session_ttl_short_seconds = config.session_ttl_short_seconds,
        session_ttl_long_seconds = config.session_ttl_long_seconds,
        "Loaded configuration from environment/.env"
    );

    // Initialize database
    let pool = create_pool(&config).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Session subsystem
    let store = Arc::new(PgSessionStore::new(pool.clone()));
    let mut manager = SessionManager::new(store, config.session_ttl());
    if let Some(redis) = create_redis_pool(&config).await? {
        manager = manager.with_cache(
            Arc::new(RedisSessionCache::new(
                redis,
                config.session_cache_ttl_seconds,
            )),
            config.session_cache_ttl_seconds,
        );
    }
    let sessions = Arc::new(manager);
    let transport = Arc::new(SessionTransport::from_config(&config)?);

    let state = AppState::new(
        sessions.clone(),
        transport.clone(),
        Arc::new(PgUserDirectory::new(pool.clone())),
        Arc::new(Argon2PasswordService),
        config.clone(),
    );

    let reaper = spawn_session_reaper(sessions, config.session_reaper_interval_seconds);

    // Compose app with shared layers (CORS/Trace) and docs
    let app = Router::new()
        .merge(build_router(state))
        .merge(SwaggerUi::new("/api/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config, &transport)?),
        );

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("Server listening on {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(reaper) = reaper {
        reaper.abort();
    }
    tracing::info!("Closing database connections...");
    pool.close().await;

    Ok(())
}
