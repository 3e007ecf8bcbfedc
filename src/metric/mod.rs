pub mod delta;
pub mod format;

pub use delta::{compute_delta, Delta};
pub use format::{extract_metric_value, MetricFormat, NOT_AVAILABLE};

use log::{error, info, warn};
use serde::Serialize;

use crate::catalog::{Catalog, MetricEntry};
use crate::context::RenderContext;
use crate::executor::QueryExecutor;
use crate::warehouse::Warehouse;

/// Metric ready for display, or the reason it could not be computed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RenderedMetric {
    Value {
        label: String,
        value: String,
        delta: Option<Delta>,
        description: String,
        /// Set when the query succeeded but returned no rows
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    Error {
        label: String,
        error: String,
    },
}

impl RenderedMetric {
    pub fn is_error(&self) -> bool {
        matches!(self, RenderedMetric::Error { .. })
    }

    pub fn label(&self) -> &str {
        match self {
            RenderedMetric::Value { label, .. } | RenderedMetric::Error { label, .. } => label,
        }
    }
}

/// Renders metric entries of a page against one render context
pub struct MetricRenderer<'a, W> {
    executor: &'a QueryExecutor<W>,
    catalog: &'a Catalog,
}

impl<'a, W: Warehouse> MetricRenderer<'a, W> {
    pub fn new(executor: &'a QueryExecutor<W>, catalog: &'a Catalog) -> Self {
        Self { executor, catalog }
    }

    pub async fn render(&self, entry: &MetricEntry, ctx: &RenderContext) -> RenderedMetric {
        let query = match self.catalog.get_query(&entry.query_key) {
            Ok(query) => query,
            Err(e) => {
                error!("{}", e);
                return RenderedMetric::Error {
                    label: entry.label.clone().unwrap_or_else(|| entry.query_key.clone()),
                    error: e.to_string(),
                };
            }
        };
        let label = entry.label.clone().unwrap_or_else(|| query.label.clone());
        let format = entry.format.unwrap_or(query.format);

        let outcome = self
            .executor
            .execute(&label, &query.query, &ctx.params_for(query.apply_object_filter))
            .await;
        if let Some(e) = outcome.error {
            return RenderedMetric::Error {
                label,
                error: e.to_string(),
            };
        }
        let note = outcome.table.is_empty().then(|| {
            warn!("No data returned for metric '{}'", label);
            format!("No data found for '{}' with selected filters.", label)
        });
        let value = extract_metric_value(&outcome.table, format);

        let delta = match &entry.delta_query_key {
            Some(delta_key) => self.previous_period_delta(delta_key, &value, format, ctx).await,
            None => None,
        };

        RenderedMetric::Value {
            label,
            value,
            delta,
            description: entry
                .description
                .clone()
                .unwrap_or_else(|| query.description.clone()),
            note,
        }
    }

    /// Change of `current` against the delta query run over the previous
    /// period
    async fn previous_period_delta(
        &self,
        delta_key: &str,
        current: &str,
        format: MetricFormat,
        ctx: &RenderContext,
    ) -> Option<Delta> {
        let delta_query = match self.catalog.get_query(delta_key) {
            Ok(query) => query,
            Err(e) => {
                warn!("Skipping delta: {}", e);
                return None;
            }
        };

        let previous = ctx.previous_period();
        let outcome = self
            .executor
            .execute(
                &delta_query.label,
                &delta_query.query,
                &previous.params_for(delta_query.apply_object_filter),
            )
            .await;
        if !outcome.is_ok() || outcome.table.is_empty() {
            info!(
                "No data returned for delta metric '{}'. Delta will not be calculated.",
                delta_key
            );
            return None;
        }

        let prior = extract_metric_value(&outcome.table, format);
        compute_delta(current, &prior, format)
    }

    pub async fn render_multiple(
        &self,
        entries: &[MetricEntry],
        ctx: &RenderContext,
    ) -> Vec<RenderedMetric> {
        let mut metrics = Vec::with_capacity(entries.len());
        for entry in entries {
            metrics.push(self.render(entry, ctx).await);
        }
        metrics
    }
}
