use std::time::Duration;

use envconfig::Envconfig;
use log::debug;

use crate::sql_template::CostPolicy;

#[derive(Envconfig)]
pub struct Config {
    #[envconfig(from = "SERVER_HOST", default = "127.0.0.1")]
    pub server_host: String,

    #[envconfig(from = "SERVER_PORT", default = "8080")]
    pub server_port: u16,

    #[envconfig(from = "CACHE_TTL_SECS", default = "3600")]
    pub cache_ttl_secs: u64,
}

impl Config {
    pub fn new() -> Result<Self, envconfig::Error> {
        let config = Self::init_from_env()?;
        debug!(
            "Config loaded: server_host={}, server_port={}, cache_ttl_secs={}",
            config.server_host, config.server_port, config.cache_ttl_secs
        );
        Ok(config)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Envconfig, Clone)]
pub struct PostgresConfig {
    #[envconfig(from = "POSTGRES_USER", default = "postgres")]
    pub user: String,
    #[envconfig(from = "POSTGRES_PASSWORD", default = "postgres")]
    pub password: String,
    #[envconfig(from = "POSTGRES_HOST", default = "localhost:5432")]
    pub host: String,
    #[envconfig(from = "POSTGRES_DB", default = "snowflake")]
    pub dbname: String,
}

impl PostgresConfig {
    pub fn new() -> Result<Self, envconfig::Error> {
        let config = Self::init_from_env()?;
        debug!(
            "PostgresConfig loaded: user={}, host={}, dbname={}",
            config.user, config.host, config.dbname
        );
        Ok(config)
    }
}

#[derive(Envconfig, Clone)]
pub struct SnowflakeConfig {
    #[envconfig(from = "SNOWFLAKE_ACCOUNT")]
    pub account: String,

    #[envconfig(from = "SNOWFLAKE_USER")]
    pub user: String,

    #[envconfig(from = "SNOWFLAKE_PASSWORD")]
    pub password: String,

    #[envconfig(from = "SNOWFLAKE_WAREHOUSE")]
    pub warehouse: Option<String>,

    #[envconfig(from = "SNOWFLAKE_DATABASE")]
    pub database: Option<String>,

    #[envconfig(from = "SNOWFLAKE_SCHEMA")]
    pub schema: Option<String>,

    #[envconfig(from = "SNOWFLAKE_ROLE")]
    pub role: Option<String>,
}

impl SnowflakeConfig {
    pub fn new() -> Result<Self, envconfig::Error> {
        let config = Self::init_from_env()?;
        debug!("SnowflakeConfig loaded: account={}, user={}, warehouse={:?}, database={:?}, schema={:?}, role={:?}",
               config.account, config.user, config.warehouse, config.database, config.schema, config.role);
        Ok(config)
    }
}

#[derive(Envconfig, Clone)]
pub struct S3Config {
    #[envconfig(from = "TENANT")]
    pub tenant: String,

    #[envconfig(from = "S3_BUCKET_NAME")]
    pub bucket_name: String,

    #[envconfig(from = "CATALOG_KEY", default = "dashboards.json")]
    pub catalog_key: String,
}

impl S3Config {
    pub fn new() -> Result<Self, envconfig::Error> {
        let config = Self::init_from_env()?;
        debug!(
            "S3Config loaded: tenant={}, bucket_name={}, catalog_key={}",
            config.tenant, config.bucket_name, config.catalog_key
        );
        Ok(config)
    }

    /// Object key of the catalog document, scoped by tenant
    pub fn object_key(&self) -> String {
        format!("{}/{}", self.tenant, self.catalog_key)
    }
}

#[derive(Envconfig, Clone)]
pub struct CatalogJSONConfig {
    #[envconfig(from = "CATALOG_PATH", default = "catalog/dashboards.json")]
    pub json_path: String,
}

impl CatalogJSONConfig {
    pub fn new() -> Result<Self, envconfig::Error> {
        let config = Self::init_from_env()?;
        debug!("CatalogJSONConfig loaded: json_path={}", config.json_path);
        Ok(config)
    }
}

#[derive(Envconfig, Clone)]
pub struct PolicyConfig {
    #[envconfig(from = "CRITICAL_COST_MULTIPLIER", default = "2.0")]
    pub critical_cost_multiplier: f64,

    #[envconfig(from = "HIGH_COST_MULTIPLIER", default = "1.5")]
    pub high_cost_multiplier: f64,
}

impl PolicyConfig {
    pub fn new() -> Result<Self, envconfig::Error> {
        let config = Self::init_from_env()?;
        debug!(
            "PolicyConfig loaded: critical_cost_multiplier={}, high_cost_multiplier={}",
            config.critical_cost_multiplier, config.high_cost_multiplier
        );
        Ok(config)
    }

    pub fn cost_policy(&self) -> CostPolicy {
        CostPolicy {
            critical_multiplier: self.critical_cost_multiplier,
            high_multiplier: self.high_cost_multiplier,
        }
    }
}
