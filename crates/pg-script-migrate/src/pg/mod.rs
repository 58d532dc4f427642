//! PostgreSQL connection helpers shared by the catalog reader and the replay target.

mod tls;

pub use tls::{SslMode, TlsBuilder};

use crate::config::DatabaseConfig;
use crate::error::{MigrateError, Result};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use std::time::Instant;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info};

/// Build a connection pool and verify it with `SELECT 1`.
pub async fn connect_pool(config: &DatabaseConfig, max_conns: usize) -> Result<Pool> {
    let pg_config = config.pg_config()?;
    let ssl_mode = SslMode::parse(&config.effective_ssl_mode())?;
    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };

    let mgr = match TlsBuilder::new(ssl_mode).build()? {
        Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
        None => Manager::from_config(pg_config, NoTls, mgr_config),
    };
    let pool = Pool::builder(mgr)
        .max_size(max_conns)
        .build()
        .map_err(|e| MigrateError::pool(e, "creating PostgreSQL pool"))?;

    let client = pool
        .get()
        .await
        .map_err(|e| MigrateError::connection(e, config.display_name()))?;
    client
        .simple_query("SELECT 1")
        .await
        .map_err(|e| MigrateError::connection(e, config.display_name()))?;

    info!("Connected to PostgreSQL: {}", config.display_name());
    Ok(pool)
}

/// Open one dedicated connection. The connection task is driven in the background.
pub async fn connect_client(config: &DatabaseConfig) -> Result<Client> {
    let pg_config = config.pg_config()?;
    let ssl_mode = SslMode::parse(&config.effective_ssl_mode())?;
    let name = config.display_name();

    let client = match TlsBuilder::new(ssl_mode).build()? {
        Some(tls) => {
            let (client, connection) = pg_config
                .connect(tls)
                .await
                .map_err(|e| MigrateError::connection(e, name.clone()))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("PostgreSQL connection error: {}", e);
                }
            });
            client
        }
        None => {
            let (client, connection) = pg_config
                .connect(NoTls)
                .await
                .map_err(|e| MigrateError::connection(e, name.clone()))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("PostgreSQL connection error: {}", e);
                }
            });
            client
        }
    };

    info!("Connected to PostgreSQL: {}", name);
    Ok(client)
}

/// Result of probing one database.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConnectionCheck {
    pub name: String,
    pub connected: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// Connect, run `SELECT 1`, and report latency instead of failing.
pub async fn check_connection(config: &DatabaseConfig) -> ConnectionCheck {
    let start = Instant::now();
    let name = config.display_name();
    let outcome = async {
        let client = connect_client(config).await?;
        client.simple_query("SELECT 1").await?;
        Ok::<_, MigrateError>(())
    }
    .await;

    let latency_ms = start.elapsed().as_millis() as u64;
    debug!("Health check for {} took {}ms", name, latency_ms);
    match outcome {
        Ok(()) => ConnectionCheck {
            name,
            connected: true,
            latency_ms,
            error: None,
        },
        Err(e) => ConnectionCheck {
            name,
            connected: false,
            latency_ms,
            error: Some(e.to_string()),
        },
    }
}

/// Quote a PostgreSQL identifier unconditionally.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
