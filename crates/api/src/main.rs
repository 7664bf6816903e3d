use std::sync::Arc;

use anyhow::Context;

use equiplend_api::app::{self, services::{AppServices, SharedRepository}};
use equiplend_api::config::ApiConfig;
use equiplend_core::SystemClock;
use equiplend_infra::workers::spawn_overdue_sweep;
use equiplend_infra::InMemoryLendingRepository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    equiplend_observability::init();

    let config = ApiConfig::from_env()?;

    let repo = repository(&config).await?;
    let services = Arc::new(
        AppServices::new(repo, Arc::new(SystemClock)).context("failed to start audit worker")?,
    );

    match config.overdue_sweep_every {
        Some(every) => {
            spawn_overdue_sweep(services.lending().clone(), every);
            tracing::info!(every_secs = every.as_secs(), "overdue sweep scheduled");
        }
        None => tracing::info!("overdue sweep disabled"),
    }

    let app = app::build_app_with(services, config.jwt_secret.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(feature = "postgres")]
async fn repository(config: &ApiConfig) -> anyhow::Result<SharedRepository> {
    use equiplend_infra::repository::PostgresLendingRepository;

    let Some(url) = config.database_url.as_deref() else {
        tracing::info!("DATABASE_URL not set; using in-memory storage");
        return Ok(Arc::new(InMemoryLendingRepository::new()));
    };

    let repo = PostgresLendingRepository::connect(url)
        .await
        .context("failed to connect to postgres")?;
    repo.migrate().await.context("failed to run migrations")?;
    tracing::info!("using postgres storage");
    Ok(Arc::new(repo))
}

#[cfg(not(feature = "postgres"))]
async fn repository(config: &ApiConfig) -> anyhow::Result<SharedRepository> {
    if config.database_url.is_some() {
        tracing::warn!("DATABASE_URL ignored; built without the `postgres` feature");
    }
    Ok(Arc::new(InMemoryLendingRepository::new()))
}
