use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Serialize;

use crate::catalog::{Catalog, CatalogError, PageDefinition};
use crate::chart::{ChartRenderer, RenderedChart, ToggleState};
use crate::context::RenderContext;
use crate::executor::QueryExecutor;
use crate::filters::{FilterState, ObjectCategory, ResolvedRange};
use crate::metric::{MetricRenderer, RenderedMetric};
use crate::sql_template::CostPolicy;
use crate::warehouse::Warehouse;

const METRICS_PER_ROW: [usize; 3] = [2, 3, 4];
const CHARTS_PER_ROW: [usize; 3] = [1, 2, 3];
const DEFAULT_METRICS_PER_ROW: usize = 4;
const DEFAULT_CHARTS_PER_ROW: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSummary {
    pub id: String,
    pub title: String,
}

/// A fully rendered dashboard page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedPage {
    pub id: String,
    pub title: String,
    pub description: String,
    pub filters: FilterState,
    pub date_range: ResolvedRange,
    pub metrics_per_row: usize,
    pub charts_per_row: usize,
    pub metrics: Vec<RenderedMetric>,
    pub charts: Vec<RenderedChart>,
    pub warnings: Vec<String>,
    pub toggles: ToggleState,
}

/// Renders catalog pages against a warehouse
///
/// Holds no per-request state: filters and toggle selections come in with
/// each call and the updated toggle state goes back out with the page.
pub struct DashboardProcessor<W> {
    executor: QueryExecutor<W>,
    catalog: Catalog,
    policy: CostPolicy,
}

impl<W: Warehouse> DashboardProcessor<W> {
    pub fn new(warehouse: Arc<W>, catalog: Catalog, policy: CostPolicy, cache_ttl: Duration) -> Self {
        Self {
            executor: QueryExecutor::new(warehouse, cache_ttl),
            catalog,
            policy,
        }
    }

    pub fn warehouse(&self) -> &Arc<W> {
        self.executor.warehouse()
    }

    pub fn pages(&self) -> Vec<PageSummary> {
        self.catalog
            .pages()
            .iter()
            .map(|page| PageSummary {
                id: page.id.clone(),
                title: page.title.clone(),
            })
            .collect()
    }

    pub async fn render_page(
        &self,
        page_id: &str,
        params: &HashMap<String, String>,
        toggles: &ToggleState,
        today: NaiveDate,
    ) -> Result<RenderedPage, CatalogError> {
        let page = self.catalog.get_page(page_id)?;
        let filters = FilterState::from_mapping(params, page.default_object_type.as_deref());
        debug!("Rendering page '{}' with filters {:?}", page.id, filters);

        let ctx = RenderContext::new(filters, today, self.policy);
        let date_range = ctx.date_range();

        let mut warnings = Vec::new();
        if let Some(warning) = &date_range.warning {
            warnings.push(warning.clone());
        }
        let (metrics_per_row, charts_per_row) = validate_layout(page, &mut warnings);

        let metrics = MetricRenderer::new(&self.executor, &self.catalog)
            .render_multiple(&page.metrics, &ctx)
            .await;
        let charts = ChartRenderer::new(&self.executor, &self.catalog)
            .render_multiple(&page.charts, &ctx, toggles)
            .await;

        let toggles = charts.iter().fold(toggles.clone(), |state, chart| {
            match chart.selected_toggle() {
                Some(key) => state.select(chart.slot(), key).0,
                None => state,
            }
        });

        info!(
            "Rendered page '{}': {} metrics, {} charts, {} warnings",
            page.id,
            metrics.len(),
            charts.len(),
            warnings.len()
        );

        Ok(RenderedPage {
            id: page.id.clone(),
            title: page.title.clone(),
            description: page.description.clone(),
            filters: ctx.filters,
            date_range,
            metrics_per_row,
            charts_per_row,
            metrics,
            charts,
            warnings,
            toggles,
        })
    }

    pub async fn object_values(&self, object_type: &str, search: &str) -> Vec<String> {
        self.executor
            .object_values(&ObjectCategory::parse(object_type), search)
            .await
    }
}

/// Grid widths of a page, corrected to supported values
fn validate_layout(page: &PageDefinition, warnings: &mut Vec<String>) -> (usize, usize) {
    let metrics_per_row = checked_width(
        "metrics_per_row",
        page.metrics_per_row,
        &METRICS_PER_ROW,
        DEFAULT_METRICS_PER_ROW,
        warnings,
    );
    let charts_per_row = checked_width(
        "charts_per_row",
        page.charts_per_row,
        &CHARTS_PER_ROW,
        DEFAULT_CHARTS_PER_ROW,
        warnings,
    );
    (metrics_per_row, charts_per_row)
}

fn checked_width(
    name: &str,
    value: usize,
    allowed: &[usize],
    default: usize,
    warnings: &mut Vec<String>,
) -> usize {
    if allowed.contains(&value) {
        return value;
    }
    let message = format!("Invalid {} value: {}. Defaulting to {}.", name, value, default);
    warn!("{}", message);
    warnings.push(message);
    default
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_catalog;
    use crate::executor::DEFAULT_CACHE_TTL;
    use crate::filters::{DateFilter, ALL_VALUES};
    use crate::warehouse::memory::MemoryWarehouse;
    use crate::warehouse::{Column, ColumnType, ResultTable, Value};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn roles_table() -> ResultTable {
        ResultTable::new(
            vec![
                Column::new("ROLE_NAME", ColumnType::Text),
                Column::new("QUERY_COUNT", ColumnType::Integer),
                Column::new("TOTAL_EXECUTION_TIME_S", ColumnType::Float),
            ],
            vec![vec![
                Value::Text("SYSADMIN".to_string()),
                Value::Int(12),
                Value::Float(3.5),
            ]],
        )
    }

    fn processor(warehouse: MemoryWarehouse) -> DashboardProcessor<MemoryWarehouse> {
        DashboardProcessor::new(
            Arc::new(warehouse),
            sample_catalog(),
            CostPolicy::default(),
            DEFAULT_CACHE_TTL,
        )
    }

    fn roles_processor() -> DashboardProcessor<MemoryWarehouse> {
        processor(MemoryWarehouse::new().with_table("SELECT ROLE_NAME", roles_table()))
    }

    #[test_log::test(tokio::test)]
    async fn renders_every_entry_of_a_page() {
        let page = roles_processor()
            .render_page("roles_360", &HashMap::new(), &ToggleState::new(), today())
            .await
            .unwrap();

        let definition = sample_catalog().get_page("roles_360").unwrap().clone();
        assert_eq!(page.metrics.len(), definition.metrics.len());
        assert_eq!(page.charts.len(), definition.charts.len());
        assert_eq!(page.filters.object_type, ObjectCategory::Role);
        assert_eq!(page.filters.object_value, ALL_VALUES);
        assert!(page.warnings.is_empty());
        assert!(!page.charts[0].is_error());
        assert_eq!(page.toggles.selected("queries_by_role"), Some("query_count"));
    }

    #[test_log::test(tokio::test)]
    async fn returns_updated_toggle_state() {
        let (toggles, _) = ToggleState::new().select("queries_by_role", "execution_time");
        let page = roles_processor()
            .render_page("roles_360", &HashMap::new(), &toggles, today())
            .await
            .unwrap();

        assert_eq!(page.toggles.selected("queries_by_role"), Some("execution_time"));
        assert_eq!(page.charts[0].selected_toggle(), Some("execution_time"));
    }

    #[test_log::test(tokio::test)]
    async fn bad_custom_range_is_corrected_with_a_warning() {
        let page = roles_processor()
            .render_page(
                "roles_360",
                &params(&[
                    ("date_filter", "custom"),
                    ("custom_start", "2024-03-10"),
                    ("custom_end", "2024-03-01"),
                ]),
                &ToggleState::new(),
                today(),
            )
            .await
            .unwrap();

        assert_eq!(page.filters.date_filter, DateFilter::Custom);
        assert_eq!(page.date_range.start, NaiveDate::from_ymd_opt(2024, 3, 8).unwrap());
        assert_eq!(page.date_range.end, today());
        assert_eq!(page.warnings.len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn invalid_layout_values_fall_back() {
        let mut catalog = sample_catalog();
        for page in catalog.pages.iter_mut() {
            page.metrics_per_row = 7;
            page.charts_per_row = 0;
        }
        let processor = DashboardProcessor::new(
            Arc::new(MemoryWarehouse::new()),
            catalog,
            CostPolicy::default(),
            DEFAULT_CACHE_TTL,
        );
        let page = processor
            .render_page("user_360", &HashMap::new(), &ToggleState::new(), today())
            .await
            .unwrap();

        assert_eq!(page.metrics_per_row, 4);
        assert_eq!(page.charts_per_row, 2);
        assert_eq!(
            page.warnings,
            vec![
                "Invalid metrics_per_row value: 7. Defaulting to 4.".to_string(),
                "Invalid charts_per_row value: 0. Defaulting to 2.".to_string(),
            ]
        );
    }

    #[test_log::test(tokio::test)]
    async fn object_filter_reaches_filtered_queries_only() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let processor = DashboardProcessor::new(
            warehouse.clone(),
            sample_catalog(),
            CostPolicy::default(),
            DEFAULT_CACHE_TTL,
        );
        processor
            .render_page(
                "roles_360",
                &params(&[("object_value", "O'Brien")]),
                &ToggleState::new(),
                today(),
            )
            .await
            .unwrap();

        let executed = warehouse.executed();
        let filtered: Vec<_> = executed
            .iter()
            .filter(|s| s.sql.contains("AND ROLE_NAME = 'O''Brien'"))
            .collect();
        assert!(!filtered.is_empty());
        assert!(executed
            .iter()
            .filter(|s| s.sql.contains("SNOWFLAKE.ACCOUNT_USAGE.ROLES"))
            .all(|s| !s.sql.contains("O''Brien")));
    }

    #[test_log::test(tokio::test)]
    async fn unknown_page_is_an_error() {
        let processor = processor(MemoryWarehouse::new());
        let result = processor
            .render_page("nope", &HashMap::new(), &ToggleState::new(), today())
            .await;
        assert_eq!(result.unwrap_err(), CatalogError::PageNotFound("nope".to_string()));
    }

    #[test_log::test(tokio::test)]
    async fn lists_pages_and_object_values() {
        let processor = processor(MemoryWarehouse::new());
        let pages = processor.pages();
        assert_eq!(pages[0].id, "user_360");
        assert_eq!(pages[1].title, "Roles 360 Dashboard");
        assert_eq!(processor.object_values("role", "").await, vec![ALL_VALUES.to_string()]);
    }
}
