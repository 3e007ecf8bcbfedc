use log::error;
use std::process;
use std::sync::Arc;

use usage360::{
    catalog::{s3_store::S3CatalogStore, CatalogStore},
    config::{Config, PolicyConfig, S3Config, SnowflakeConfig},
    warehouse::snowflake::SnowflakeWarehouse,
    DashboardProcessor, DashboardServer,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = Config::new().map_err(|e| {
        error!("Failed to initialize config: {}", e);
        e
    })?;

    let snowflake_config = SnowflakeConfig::new().map_err(|e| {
        error!("Failed to initialize Snowflake config: {}", e);
        e
    })?;

    let s3_config = S3Config::new().map_err(|e| {
        error!("Failed to initialize S3 config: {}", e);
        e
    })?;

    let policy_config = PolicyConfig::new().map_err(|e| {
        error!("Failed to initialize policy config: {}", e);
        e
    })?;

    let warehouse = SnowflakeWarehouse::new(&snowflake_config).map_err(|e| {
        error!("Failed to create SnowflakeWarehouse: {}", e);
        e
    })?;

    let catalog = S3CatalogStore::new(&s3_config)
        .await
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
