use async_trait::async_trait;
use aws_sdk_s3::{config::BehaviorVersion, Client};
use log::{error, info};

use crate::catalog::{Catalog, CatalogError, CatalogStore};
use crate::config::S3Config;

/// Catalog stored as a single JSON object under the tenant prefix
pub struct S3CatalogStore {
    s3_client: Client,
    bucket_name: String,
    object_key: String,
}

impl S3CatalogStore {
    pub async fn new(config: &S3Config) -> Self {
        let shared_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let s3_client = Client::new(&shared_config);
        S3CatalogStore {
            s3_client,
            bucket_name: config.bucket_name.clone(),
            object_key: config.object_key(),
        }
    }

    async fn get_object_content(&self) -> Result<String, CatalogError> {
        let result = self
            .s3_client
            .get_object()
            .bucket(self.bucket_name.clone())
            .key(self.object_key.clone())
            .send()
            .await
            .map_err(|e| {
                error!(
                    "Failed to fetch s3://{}/{}: {}",
                    self.bucket_name, self.object_key, e
                );
                CatalogError::S3(e.to_string())
            })?;

        let body = result
            .body
            .collect()
            .await
            .map_err(|e| CatalogError::S3(e.to_string()))?;

        String::from_utf8(body.to_vec()).map_err(|e| CatalogError::InvalidJsonFormat(e.to_string()))
    }
}

#[async_trait]
impl CatalogStore for S3CatalogStore {
    async fn load(&self) -> Result<Catalog, CatalogError> {
        let json = self.get_object_content().await?;
        let catalog = Catalog::from_json(&json)?;
        info!(
            "Loaded {} queries and {} pages from s3://{}/{}",
            catalog.queries.len(),
            catalog.pages.len(),
            self.bucket_name,
            self.object_key
        );
        Ok(catalog)
    }
}
