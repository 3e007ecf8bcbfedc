pub mod local_store;
pub mod s3_store;

use std::collections::HashMap;

use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chart::{ChartBindings, ChartDeclaration};
use crate::metric::format::MetricFormat;

const DEFAULT_METRICS_PER_ROW: usize = 4;
const DEFAULT_CHARTS_PER_ROW: usize = 2;

fn default_true() -> bool {
    true
}

fn default_metrics_per_row() -> usize {
    DEFAULT_METRICS_PER_ROW
}

fn default_charts_per_row() -> usize {
    DEFAULT_CHARTS_PER_ROW
}

/// A named SQL template and how to present its result
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct QueryDefinition {
    pub query: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub format: MetricFormat,
    #[serde(default = "default_true")]
    pub apply_object_filter: bool,
    #[serde(default)]
    pub chart: Option<ChartDeclaration>,
}

/// A metric slot on a page
///
/// Written either as a bare query key or as an object with overrides.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(from = "MetricEntryRepr")]
pub struct MetricEntry {
    pub query_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_query_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<MetricFormat>,
}

impl MetricEntry {
    pub fn new(query_key: impl Into<String>) -> Self {
        Self {
            query_key: query_key.into(),
            delta_query_key: None,
            label: None,
            description: None,
            format: None,
        }
    }

    pub fn with_delta(mut self, delta_query_key: impl Into<String>) -> Self {
        self.delta_query_key = Some(delta_query_key.into());
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MetricEntryRepr {
    Key(String),
    Detailed {
        query_key: String,
        #[serde(default)]
        delta_query_key: Option<String>,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default, alias = "format_type")]
        format: Option<MetricFormat>,
    },
}

impl From<MetricEntryRepr> for MetricEntry {
    fn from(repr: MetricEntryRepr) -> Self {
        match repr {
            MetricEntryRepr::Key(query_key) => MetricEntry::new(query_key),
            MetricEntryRepr::Detailed {
                query_key,
                delta_query_key,
                label,
                description,
                format,
            } => MetricEntry {
                query_key,
                delta_query_key,
                label,
                description,
                format,
            },
        }
    }
}

/// A chart slot on a page
///
/// Written either as a bare query key or as an object with a slot key,
/// a label, a table toggle flag and binding overrides.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(from = "ChartEntryRepr")]
pub struct ChartEntry {
    pub query_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub show_table: bool,
    #[serde(flatten)]
    pub overrides: ChartBindings,
}

impl ChartEntry {
    pub fn new(query_key: impl Into<String>) -> Self {
        Self {
            query_key: query_key.into(),
            slot: None,
            label: None,
            show_table: false,
            overrides: ChartBindings::default(),
        }
    }

    /// Key under which the toggle state of this chart is kept
    pub fn slot(&self) -> &str {
        self.slot.as_deref().unwrap_or(&self.query_key)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChartEntryRepr {
    Key(String),
    Detailed {
        query_key: String,
        #[serde(default)]
        slot: Option<String>,
        #[serde(default)]
        label: Option<String>,
        #[serde(default, alias = "show_table_toggle")]
        show_table: bool,
        #[serde(flatten)]
        overrides: ChartBindings,
    },
}

impl From<ChartEntryRepr> for ChartEntry {
    fn from(repr: ChartEntryRepr) -> Self {
        match repr {
            ChartEntryRepr::Key(query_key) => ChartEntry::new(query_key),
            ChartEntryRepr::Detailed {
                query_key,
                slot,
                label,
                show_table,
                overrides,
            } => ChartEntry {
                query_key,
                slot,
                label,
                show_table,
                overrides,
            },
        }
    }
}

/// A dashboard page: a metric grid above a chart grid
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PageDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default_object_type: Option<String>,
    #[serde(default)]
    pub metrics: Vec<MetricEntry>,
    #[serde(default)]
    pub charts: Vec<ChartEntry>,
    #[serde(default = "default_metrics_per_row")]
    pub metrics_per_row: usize,
    #[serde(default = "default_charts_per_row")]
    pub charts_per_row: usize,
}

/// Read-only collection of query definitions and pages
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Catalog {
    pub queries: HashMap<String, QueryDefinition>,
    #[serde(default)]
    pub pages: Vec<PageDefinition>,
}

impl Catalog {
    /// Parse a catalog document, warning about pages that reference
    /// unknown queries
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_json::from_str(json)
            .map_err(|e| CatalogError::InvalidJsonFormat(e.to_string()))?;
        for (page, key) in catalog.dangling_references() {
            warn!("Page '{}' references unknown query '{}'", page, key);
        }
        Ok(catalog)
    }

    pub fn get_query(&self, key: &str) -> Result<&QueryDefinition, CatalogError> {
        self.queries
            .get(key)
            .ok_or_else(|| CatalogError::QueryNotFound(key.to_string()))
    }

    pub fn get_page(&self, id: &str) -> Result<&PageDefinition, CatalogError> {
        self.pages
            .iter()
            .find(|page| page.id == id)
            .ok_or_else(|| CatalogError::PageNotFound(id.to_string()))
    }

    pub fn pages(&self) -> &[PageDefinition] {
        &self.pages
    }

    fn dangling_references(&self) -> Vec<(&str, &str)> {
        let mut dangling = Vec::new();
        for page in &self.pages {
            let keys = page
                .metrics
                .iter()
                .flat_map(|m| std::iter::once(&m.query_key).chain(m.delta_query_key.as_ref()))
                .chain(page.charts.iter().map(|c| &c.query_key));
            for key in keys {
                if !self.queries.contains_key(key) {
                    dangling.push((page.id.as_str(), key.as_str()));
                }
            }
        }
        dangling
    }
}

/// Source the catalog is loaded from at startup
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn load(&self) -> Result<Catalog, CatalogError>;
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Metric/Chart query key '{0}' not found in the query catalog")]
    QueryNotFound(String),

    #[error("Page '{0}' not found")]
    PageNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid JSON format: {0}")]
    InvalidJsonFormat(String),

    #[error("S3 error: {0}")]
    S3(String),
}
