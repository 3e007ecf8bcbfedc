use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Local;
use log::{error, info};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::catalog::CatalogError;
use crate::chart::ToggleState;
use crate::config::Config;
use crate::dashboard::DashboardProcessor;
use crate::warehouse::Warehouse;

/// Query string prefix carrying a chart toggle selection, `toggle.<slot>=<key>`
const TOGGLE_PREFIX: &str = "toggle.";

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let status = match self {
            CatalogError::PageNotFound(_) | CatalogError::QueryNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Deserialize)]
struct ObjectSearch {
    #[serde(default)]
    search: String,
}

pub fn router<W: Warehouse + 'static>(processor: Arc<DashboardProcessor<W>>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/pages", get(list_pages::<W>))
        .route("/api/pages/{page}", get(render_page::<W>))
        .route("/api/objects/{object_type}", get(object_values::<W>))
        .with_state(processor)
}

async fn health() -> &'static str {
    "ok"
}

async fn list_pages<W: Warehouse>(
    State(processor): State<Arc<DashboardProcessor<W>>>,
) -> impl IntoResponse {
    Json(processor.pages())
}

async fn render_page<W: Warehouse>(
    State(processor): State<Arc<DashboardProcessor<W>>>,
    Path(page): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, CatalogError> {
    let (filters, toggles) = split_toggles(params);
    let today = Local::now().date_naive();
    let rendered = processor
        .render_page(&page, &filters, &toggles, today)
        .await
        .map_err(|e| {
            error!("Failed to render page '{}': {}", page, e);
            e
        })?;
    Ok(Json(rendered).into_response())
}

async fn object_values<W: Warehouse>(
    State(processor): State<Arc<DashboardProcessor<W>>>,
    Path(object_type): Path<String>,
    Query(query): Query<ObjectSearch>,
) -> impl IntoResponse {
    Json(processor.object_values(&object_type, &query.search).await)
}

/// Separate `toggle.<slot>` entries from the filter parameters
fn split_toggles(params: HashMap<String, String>) -> (HashMap<String, String>, ToggleState) {
    let mut filters = HashMap::new();
    let mut toggles = ToggleState::new();
    for (key, value) in params {
        match key.strip_prefix(TOGGLE_PREFIX) {
            Some(slot) if !slot.is_empty() => toggles = toggles.select(slot, &value).0,
            _ => {
                filters.insert(key, value);
            }
        }
    }
    (filters, toggles)
}

pub struct DashboardServer<W> {
    config: Config,
    processor: Arc<DashboardProcessor<W>>,
}

impl<W> DashboardServer<W>
where
    W: Warehouse + 'static,
{
    pub fn new(config: Config, processor: DashboardProcessor<W>) -> Self {
        Self {
            config,
            processor: Arc::new(processor),
        }
    }

    /// Serve the API until Ctrl-C, then close the warehouse connection
    pub async fn run(&self) -> Result<(), std::io::Error> {
        let server_address = format!("{}:{}", self.config.server_host, self.config.server_port);
        info!("Starting server at {}", server_address);

        let listener = TcpListener::bind(&server_address).await.map_err(|e| {
            error!("Failed to bind server address: {}", e);
            e
        })?;
        info!("Listening for connections on {}", server_address);

        let result = axum::serve(listener, router(self.processor.clone()))
            .with_graceful_shutdown(shutdown_signal())
            .await;

        info!("Closing warehouse connection");
        self.processor.warehouse().close().await;
        result
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_catalog;
    use crate::executor::DEFAULT_CACHE_TTL;
    use crate::sql_template::CostPolicy;
    use crate::warehouse::memory::MemoryWarehouse;
    use crate::warehouse::{Column, ColumnType, ResultTable, Value};
    use axum::body::to_bytes;

    fn state(warehouse: MemoryWarehouse) -> State<Arc<DashboardProcessor<MemoryWarehouse>>> {
        State(Arc::new(DashboardProcessor::new(
            Arc::new(warehouse),
            sample_catalog(),
            CostPolicy::default(),
            DEFAULT_CACHE_TTL,
        )))
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn toggles_are_split_from_filters() {
        let params: HashMap<String, String> = [
            ("date_filter", "1_month"),
            ("toggle.queries_by_role", "execution_time"),
            ("toggle.", "ignored"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let (filters, toggles) = split_toggles(params);
        assert_eq!(filters.len(), 2);
        assert_eq!(filters.get("date_filter").map(String::as_str), Some("1_month"));
        assert_eq!(toggles.selected("queries_by_role"), Some("execution_time"));
    }

    #[test_log::test(tokio::test)]
    async fn unknown_page_is_not_found() {
        let result = render_page(
            state(MemoryWarehouse::new()),
            Path("nope".to_string()),
            Query(HashMap::new()),
        )
        .await;
        let response = match result {
            Ok(_) => panic!("expected an error"),
            Err(e) => e.into_response(),
        };
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Page 'nope' not found");
    }

    #[test_log::test(tokio::test)]
    async fn renders_page_with_toggles() {
        let table = ResultTable::new(
            vec![
                Column::new("ROLE_NAME", ColumnType::Text),
                Column::new("QUERY_COUNT", ColumnType::Integer),
                Column::new("TOTAL_EXECUTION_TIME_S", ColumnType::Float),
            ],
            vec![vec![Value::Text("PUBLIC".to_string()), Value::Int(3), Value::Float(1.5)]],
        );
        let params: HashMap<String, String> =
            [("toggle.queries_by_role".to_string(), "execution_time".to_string())]
                .into_iter()
                .collect();

        let response = render_page(
            state(MemoryWarehouse::new().with_table("SELECT ROLE_NAME", table)),
            Path("roles_360".to_string()),
            Query(params),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["toggles"]["queries_by_role"], "execution_time");
        assert_eq!(body["charts"][0]["figure"]["encodings"]["y"], "TOTAL_EXECUTION_TIME_S");
        assert_eq!(body["filters"]["object_type"], "role");
    }

    #[test_log::test(tokio::test)]
    async fn object_values_lead_with_all() {
        let names = ResultTable::new(
            vec![Column::new("USER_NAME", ColumnType::Text)],
            vec![vec![Value::Text("ALICE".to_string())]],
        );
        let response = object_values(
            state(MemoryWarehouse::new().with_table("USER_NAME", names)),
            Path("user".to_string()),
            Query(ObjectSearch {
                search: "ali".to_string(),
            }),
        )
        .await
        .into_response();
        let body = json_body(response).await;
        assert_eq!(body, serde_json::json!(["All", "ALICE"]));
    }
}
