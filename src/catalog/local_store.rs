use async_trait::async_trait;
use log::{error, info};

use crate::catalog::{Catalog, CatalogError, CatalogStore};
use crate::config::CatalogJSONConfig;

/// Catalog read from a JSON file on disk
#[derive(Clone)]
pub struct LocalCatalogStore {
    json_path: String,
}

impl LocalCatalogStore {
    pub fn new(config: &CatalogJSONConfig) -> Self {
        Self {
            json_path: config.json_path.clone(),
        }
    }
}

#[async_trait]
impl CatalogStore for LocalCatalogStore {
    async fn load(&self) -> Result<Catalog, CatalogError> {
        let json = tokio::fs::read_to_string(&self.json_path)
            .await
            .map_err(|e| {
                error!("Failed to read catalog file {}: {}", self.json_path, e);
                CatalogError::FileNotFound(self.json_path.clone())
            })?;
        let catalog = Catalog::from_json(&json)?;
        info!(
            "Loaded {} queries and {} pages from {}",
            catalog.queries.len(),
            catalog.pages.len(),
            self.json_path
        );
        Ok(catalog)
    }
}
