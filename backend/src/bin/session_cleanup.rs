use std::sync::Arc;

use sessionkeeper_backend::{
    config::Config, db::connection::create_pool, repositories::PgSessionStore,
    services::SessionManager,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sessionkeeper_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let pool = create_pool(&config).await?;

    let store = Arc::new(PgSessionStore::new(pool.clone()));
    let manager = SessionManager::new(store, config.session_ttl());
    let deleted = manager.purge_expired().await?;
    tracing::info!("Deleted {} expired sessions", deleted);

    sqlx::query("VACUUM (ANALYZE) sessions")
        .execute(&pool)
        .await
        .expect("vacuum sessions table");

    pool.close().await;
    Ok(())
}
