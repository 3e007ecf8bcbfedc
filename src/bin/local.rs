use log::error;
use std::process;
use std::sync::Arc;

use usage360::{
    catalog::{local_store::LocalCatalogStore, CatalogStore},
    config::{CatalogJSONConfig, Config, PolicyConfig, PostgresConfig},
    warehouse::postgres::PostgresWarehouse,
    DashboardProcessor, DashboardServer,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = Config::new().map_err(|e| {
        error!("Failed to initialize config: {}", e);
        e
    })?;

    let postgres_config = PostgresConfig::new().map_err(|e| {
        error!("Failed to initialize Postgres config: {}", e);
        e
    })?;

    let catalog_config = CatalogJSONConfig::new().map_err(|e| {
        error!("Failed to initialize catalog config: {}", e);
        e
    })?;

    let policy_config = PolicyConfig::new().map_err(|e| {
        error!("Failed to initialize policy config: {}", e);
        e
    })?;

    let warehouse = PostgresWarehouse::new(&postgres_config).await.map_err(|e| {
        error!("Failed to create PostgresWarehouse: {}", e);
        e
    })?;

    let catalog = LocalCatalogStore::new(&catalog_config)
        .load()
        .await
        .map_err(|e| {
            error!("Failed to load catalog: {}", e);
            e
        })?;

    let processor = DashboardProcessor::new(
        Arc::new(warehouse),
        catalog,
        policy_config.cost_policy(),
        config.cache_ttl(),
    );

    let server = DashboardServer::new(config, processor);

    if let Err(e) = server.run().await {
        error!("Server encountered an error: {}", e);
        process::exit(1);
    }

    Ok(())
}
