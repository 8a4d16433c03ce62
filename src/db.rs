use crate::error::AppError;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use std::time::Duration;
use tokio_postgres::{Config as PgConfig, NoTls};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the PostgreSQL pool and verify one connection.
pub async fn init_pool(database_url: &str, max_connections: usize) -> Result<Pool, AppError> {
    let pg_config: PgConfig = database_url
        .parse()
        .map_err(|e: tokio_postgres::Error| AppError::Config(format!("invalid DATABASE_URL: {e}")))?;

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
    let pool = Pool::builder(mgr)
        .max_size(max_connections.max(1))
        .build()
        .map_err(|e| AppError::Database(e.to_string()))?;

    let verify = async {
        let client = pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok::<(), AppError>(())
    };
    match tokio::time::timeout(CONNECT_TIMEOUT, verify).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(AppError::Database(format!(
                "no connection within {}s",
                CONNECT_TIMEOUT.as_secs()
            )))
        }
    }

    tracing::info!(max_connections, "database pool created and verified");
    Ok(pool)
}
