use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// The schema shared with the pipeline crate.
static MIGRATOR: Migrator = sqlx::migrate!("../pipeline/migrations");

const HEALTH_ADDR: &str = "0.0.0.0:8000";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        tracing::error!("DATABASE_URL not set");
        std::process::exit(1);
    };

    let pool = match PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to database");
            std::process::exit(1);
        }
    };

    let known = MIGRATOR.iter().count();
    tracing::info!(known_migrations = known, "applying split schema");

    if let Err(e) = MIGRATOR.run(&pool).await {
        tracing::error!(error = %e, "migration failed");
        std::process::exit(1);
    }
    pool.close().await;
    tracing::info!("split schema is up to date");

    // The deployment keeps this job alive and health-checks it until the services roll out.
    let listener = match TcpListener::bind(HEALTH_ADDR).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr = HEALTH_ADDR, "failed to bind health endpoint");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = HEALTH_ADDR, "health endpoint listening");

    loop {
        match listener.accept().await {
            Ok((mut stream, _)) => {
                let _ = stream
                    .write_all(b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 2\r\n\r\nOK")
                    .await;
            }
            Err(e) => tracing::warn!(error = %e, "health endpoint accept failed"),
        }
    }
}
