use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::filters::{ObjectCategory, ALL_VALUES};
use crate::sql_template::{self, quote_literal, QueryParameters, TemplateError};
use crate::warehouse::{BindStyle, ResultTable, SqlStatement, Warehouse, WarehouseError};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);
const OBJECT_VALUES_LIMIT: usize = 100;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Query Template Error: {0}")]
    Template(#[from] TemplateError),

    #[error("Query Execution Error: {0}")]
    Warehouse(#[from] WarehouseError),
}

/// Result of a query execution
///
/// A failed execution still carries an (empty) table so callers can treat
/// both cases uniformly, while `error` tells "no rows" apart from "failed".
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub table: ResultTable,
    pub error: Option<ExecutionError>,
}

impl QueryOutcome {
    fn success(table: ResultTable) -> Self {
        Self { table, error: None }
    }

    fn failure(error: ExecutionError) -> Self {
        Self {
            table: ResultTable::empty(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

struct CachedTable {
    stored_at: Instant,
    table: ResultTable,
}

/// Renders query templates, runs them on the warehouse and memoizes results
///
/// Successful tables are kept for `ttl`, keyed by the rendered statement.
/// Expired entries are dropped whenever a new table is stored. Failures are
/// never cached.
pub struct QueryExecutor<W> {
    warehouse: Arc<W>,
    cache: Mutex<HashMap<SqlStatement, CachedTable>>,
    ttl: Duration,
}

impl<W: Warehouse> QueryExecutor<W> {
    pub fn new(warehouse: Arc<W>, ttl: Duration) -> Self {
        Self {
            warehouse,
            cache: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn warehouse(&self) -> &Arc<W> {
        &self.warehouse
    }

    /// Render `template` with `params` and execute it
    pub async fn execute(
        &self,
        label: &str,
        template: &str,
        params: &QueryParameters,
    ) -> QueryOutcome {
        match self.prepare(template, params) {
            Ok(statement) => self.run(label, &statement).await,
            Err(e) => {
                error!("Error preparing query '{}': {}", label, e);
                QueryOutcome::failure(e.into())
            }
        }
    }

    fn prepare(
        &self,
        template: &str,
        params: &QueryParameters,
    ) -> Result<SqlStatement, TemplateError> {
        let statement = sql_template::render(template, params, self.warehouse.bind_style())?;
        sql_template::ensure_read_only(self.warehouse.get_dialect(), &statement.sql)?;
        Ok(statement)
    }

    async fn run(&self, label: &str, statement: &SqlStatement) -> QueryOutcome {
        if let Some(table) = self.cached(statement).await {
            debug!("Cache hit for query '{}'", label);
            return QueryOutcome::success(table);
        }

        info!("Executing query: {}", label);
        debug!("Full SQL for {}:\n{}", label, statement.sql);
        match self.warehouse.execute(statement).await {
            Ok(table) => {
                info!(
                    "Query '{}' executed successfully. Rows: {}",
                    label,
                    table.rows().len()
                );
                let mut cache = self.cache.lock().await;
                cache.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
                cache.insert(
                    statement.clone(),
                    CachedTable {
                        stored_at: Instant::now(),
                        table: table.clone(),
                    },
                );
                QueryOutcome::success(table)
            }
            Err(e) => {
                error!("Error executing query '{}': {}", label, e);
                QueryOutcome::failure(e.into())
            }
        }
    }

    async fn cached(&self, statement: &SqlStatement) -> Option<ResultTable> {
        let mut cache = self.cache.lock().await;
        match cache.get(statement) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.table.clone()),
            Some(_) => {
                cache.remove(statement);
                None
            }
            None => None,
        }
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    /// Distinct objects of a category for the filter drop-down
    ///
    /// The list always starts with `All`, holds at most 100 objects and is
    /// narrowed by a case-insensitive substring `search` when it is not
    /// blank. Failures degrade to `["All"]`.
    pub async fn object_values(&self, category: &ObjectCategory, search: &str) -> Vec<String> {
        let mut values = vec![ALL_VALUES.to_string()];
        let Some(source) = ObjectSource::for_category(category) else {
            warn!(
                "Unsupported object type for fetching values: {}",
                category
            );
            return values;
        };

        let statement = source.statement(search.trim(), self.warehouse.bind_style());
        let label = format!("{} values", category);
        let outcome = self.run(&label, &statement).await;
        if outcome.table.is_empty() {
            info!("No {} values found for search term '{}'", category, search);
            return values;
        }

        values.extend(
            outcome
                .table
                .rows()
                .iter()
                .filter_map(|row| row.first())
                .filter(|value| !value.is_null())
                .map(|value| value.to_string())
                .filter(|value| value != ALL_VALUES),
        );
        values
    }
}

struct ObjectSource {
    select: &'static str,
    search_column: &'static str,
}

impl ObjectSource {
    fn for_category(category: &ObjectCategory) -> Option<Self> {
        let source = match category {
            ObjectCategory::User => ObjectSource {
                select: "SELECT DISTINCT USER_NAME FROM SNOWFLAKE.ACCOUNT_USAGE.QUERY_HISTORY WHERE USER_NAME IS NOT NULL",
                search_column: "USER_NAME",
            },
            ObjectCategory::Warehouse => ObjectSource {
                select: "SELECT DISTINCT WAREHOUSE_NAME FROM SNOWFLAKE.ACCOUNT_USAGE.QUERY_HISTORY WHERE WAREHOUSE_NAME IS NOT NULL",
                search_column: "WAREHOUSE_NAME",
            },
            ObjectCategory::Role => ObjectSource {
                select: "SELECT DISTINCT NAME AS ROLE_NAME FROM SNOWFLAKE.ACCOUNT_USAGE.ROLES WHERE DELETED_ON IS NULL",
                search_column: "NAME",
            },
            ObjectCategory::Database => ObjectSource {
                select: "SELECT DISTINCT DATABASE_NAME FROM SNOWFLAKE.ACCOUNT_USAGE.DATABASES WHERE DELETED IS NULL",
                search_column: "DATABASE_NAME",
            },
            ObjectCategory::All | ObjectCategory::Other(_) => return None,
        };
        Some(source)
    }

    fn statement(&self, search: &str, bind_style: BindStyle) -> SqlStatement {
        let mut sql = self.select.to_string();
        let mut binds = Vec::new();
        if !search.is_empty() {
            let pattern = format!("%{}%", search);
            match bind_style {
                BindStyle::Inline => sql.push_str(&format!(
                    " AND UPPER({}) LIKE UPPER({})",
                    self.search_column,
                    quote_literal(&pattern)
                )),
                BindStyle::Numbered => {
                    sql.push_str(&format!(" AND UPPER({}) LIKE UPPER($1)", self.search_column));
                    binds.push(pattern);
                }
            }
        }
        sql.push_str(&format!(" ORDER BY 1 LIMIT {}", OBJECT_VALUES_LIMIT));
        SqlStatement { sql, binds }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterState;
    use crate::sql_template::CostPolicy;
    use crate::warehouse::memory::MemoryWarehouse;
    use crate::warehouse::{Column, ColumnType, Value};
    use chrono::NaiveDate;

    const TEMPLATE: &str = "SELECT COUNT(*) AS TOTAL_QUERIES FROM SNOWFLAKE.ACCOUNT_USAGE.QUERY_HISTORY WHERE START_TIME >= '{start_date}' {object_filter}";

    fn total_queries() -> ResultTable {
        ResultTable::new(
            vec![Column::new("TOTAL_QUERIES", ColumnType::Integer)],
            vec![vec![Value::Int(42)]],
        )
    }

    fn names(values: &[&str]) -> ResultTable {
        ResultTable::new(
            vec![Column::new("USER_NAME", ColumnType::Text)],
            values
                .iter()
                .map(|v| vec![Value::Text(v.to_string())])
                .collect(),
        )
    }

    fn params() -> QueryParameters {
        let filters = FilterState::default();
        let range = filters.resolve_range(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        QueryParameters::build(&range, &filters, true, CostPolicy::default())
    }

    fn executor(warehouse: MemoryWarehouse, ttl: Duration) -> QueryExecutor<MemoryWarehouse> {
        QueryExecutor::new(Arc::new(warehouse), ttl)
    }

    #[test_log::test(tokio::test)]
    async fn caches_successful_results() {
        let executor = executor(
            MemoryWarehouse::new().with_table("TOTAL_QUERIES", total_queries()),
            DEFAULT_CACHE_TTL,
        );
        let first = executor.execute("total", TEMPLATE, &params()).await;
        let second = executor.execute("total", TEMPLATE, &params()).await;

        assert!(first.is_ok());
        assert_eq!(first, second);
        assert_eq!(executor.warehouse().execution_count(), 1);

        executor.clear_cache().await;
        executor.execute("total", TEMPLATE, &params()).await;
        assert_eq!(executor.warehouse().execution_count(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn expired_entries_are_refetched() {
        let executor = executor(
            MemoryWarehouse::new().with_table("TOTAL_QUERIES", total_queries()),
            Duration::ZERO,
        );
        executor.execute("total", TEMPLATE, &params()).await;
        executor.execute("total", TEMPLATE, &params()).await;
        assert_eq!(executor.warehouse().execution_count(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn storing_a_result_evicts_expired_entries() {
        let executor = executor(MemoryWarehouse::new(), Duration::ZERO);
        for i in 0..50 {
            executor
                .object_values(&ObjectCategory::User, &format!("user{}", i))
                .await;
        }
        assert_eq!(executor.warehouse().execution_count(), 50);
        assert_eq!(executor.cache.lock().await.len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn live_entries_survive_eviction() {
        let executor = executor(MemoryWarehouse::new(), DEFAULT_CACHE_TTL);
        for search in ["ali", "bob", "eve"] {
            executor.object_values(&ObjectCategory::User, search).await;
        }
        assert_eq!(executor.cache.lock().await.len(), 3);
    }

    #[test_log::test(tokio::test)]
    async fn different_parameters_are_cached_separately() {
        let executor = executor(
            MemoryWarehouse::new().with_table("TOTAL_QUERIES", total_queries()),
            DEFAULT_CACHE_TTL,
        );
        let mut other = params();
        other.start_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        executor.execute("total", TEMPLATE, &params()).await;
        executor.execute("total", TEMPLATE, &other).await;
        assert_eq!(executor.warehouse().execution_count(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn failures_degrade_to_empty_table_and_are_not_cached() {
        let executor = executor(
            MemoryWarehouse::new().with_error(
                "TOTAL_QUERIES",
                WarehouseError::QueryError("warehouse suspended".to_string()),
            ),
            DEFAULT_CACHE_TTL,
        );
        let outcome = executor.execute("total", TEMPLATE, &params()).await;
        assert!(outcome.table.is_empty());
        assert_eq!(
            outcome.error.map(|e| e.to_string()),
            Some("Query Execution Error: Query error: warehouse suspended".to_string())
        );

        executor.execute("total", TEMPLATE, &params()).await;
        assert_eq!(executor.warehouse().execution_count(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn empty_result_is_not_an_error() {
        let executor = executor(MemoryWarehouse::new(), DEFAULT_CACHE_TTL);
        let outcome = executor.execute("total", TEMPLATE, &params()).await;
        assert!(outcome.is_ok());
        assert!(outcome.table.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn template_and_guard_errors_never_reach_the_warehouse() {
        let executor = executor(MemoryWarehouse::new(), DEFAULT_CACHE_TTL);

        let outcome = executor.execute("bad", "SELECT {nope}", &params()).await;
        assert!(matches!(
            outcome.error,
            Some(ExecutionError::Template(TemplateError::UnknownPlaceholder(_)))
        ));

        let outcome = executor
            .execute("write", "DELETE FROM QUERY_HISTORY WHERE START_TIME < '{start_date}'", &params())
            .await;
        assert!(matches!(
            outcome.error,
            Some(ExecutionError::Template(TemplateError::PermissionDenied(_)))
        ));
        assert_eq!(executor.warehouse().execution_count(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn object_values_start_with_all() {
        let executor = executor(
            MemoryWarehouse::new().with_table("USER_NAME", names(&["ALICE", "BOB"])),
            DEFAULT_CACHE_TTL,
        );
        let values = executor.object_values(&ObjectCategory::User, "").await;
        assert_eq!(values, vec!["All", "ALICE", "BOB"]);

        let executed = executor.warehouse().executed();
        assert!(executed[0].sql.ends_with("ORDER BY 1 LIMIT 100"));
    }

    #[test_log::test(tokio::test)]
    async fn object_value_search_is_escaped() {
        let executor = executor(MemoryWarehouse::new(), DEFAULT_CACHE_TTL);
        let values = executor.object_values(&ObjectCategory::Role, " o'b ").await;
        assert_eq!(values, vec!["All"]);

        let executed = executor.warehouse().executed();
        assert!(executed[0]
            .sql
            .contains("AND UPPER(NAME) LIKE UPPER('%o''b%') ORDER BY 1 LIMIT 100"));
    }

    #[test_log::test(tokio::test)]
    async fn object_value_search_is_bound_when_supported() {
        let executor = executor(
            MemoryWarehouse::new().with_bind_style(BindStyle::Numbered),
            DEFAULT_CACHE_TTL,
        );
        executor.object_values(&ObjectCategory::Warehouse, "wh").await;

        let executed = executor.warehouse().executed();
        assert!(executed[0].sql.contains("LIKE UPPER($1)"));
        assert_eq!(executed[0].binds, vec!["%wh%".to_string()]);
    }

    #[test_log::test(tokio::test)]
    async fn unsupported_category_yields_only_all() {
        let executor = executor(MemoryWarehouse::new(), DEFAULT_CACHE_TTL);
        let values = executor.object_values(&ObjectCategory::All, "").await;
        assert_eq!(values, vec!["All"]);
        assert_eq!(executor.warehouse().execution_count(), 0);
    }
}
