use super::{
    BindStyle, Column, ColumnType, ResultTable, SqlStatement, Value, Warehouse, WarehouseError,
    WarehouseMapping,
};
use crate::config::SnowflakeConfig;
use async_trait::async_trait;
use log::{debug, info};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use snowflake_connector_rs::{
    SnowflakeAuthMethod, SnowflakeClient, SnowflakeClientConfig, SnowflakeDecode, SnowflakeRow,
    SnowflakeSession,
};
use sqlparser::dialect::SnowflakeDialect;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Warehouse backed by a Snowflake session
///
/// The session is opened on first use and reused until [`Warehouse::close`].
/// Columns keep the order and declared types of the result set.
pub struct SnowflakeWarehouse {
    client: SnowflakeClient,
    session: Mutex<Option<Arc<SnowflakeSession>>>,
    closed: Mutex<bool>,
}

impl SnowflakeWarehouse {
    pub fn new(config: &SnowflakeConfig) -> Result<Self, WarehouseError> {
        let client = SnowflakeClient::new(
            &config.user,
            SnowflakeAuthMethod::Password(config.password.clone()),
            SnowflakeClientConfig {
                account: config.account.clone(),
                warehouse: config.warehouse.clone(),
                database: config.database.clone(),
                schema: config.schema.clone(),
                role: config.role.clone(),
                ..Default::default()
            },
        )
        .map_err(|e| WarehouseError::ConnectionError(e.to_string()))?;

        Ok(SnowflakeWarehouse {
            client,
            session: Mutex::new(None),
            closed: Mutex::new(false),
        })
    }

    async fn session(&self) -> Result<Arc<SnowflakeSession>, WarehouseError> {
        if *self.closed.lock().await {
            return Err(WarehouseError::Closed);
        }
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }

        let session = self.client.create_session().await.map_err(|e| {
            WarehouseError::ConnectionError(format!("Failed to connect to Snowflake, {}", e))
        })?;
        info!("Opened Snowflake session");
        let session = Arc::new(session);
        *slot = Some(session.clone());
        Ok(session)
    }
}

impl WarehouseMapping for SnowflakeWarehouse {
    fn get_dialect(&self) -> &dyn sqlparser::dialect::Dialect {
        &SnowflakeDialect {}
    }

    fn bind_style(&self) -> BindStyle {
        BindStyle::Inline
    }
}

#[async_trait]
impl Warehouse for SnowflakeWarehouse {
    async fn execute(&self, statement: &SqlStatement) -> Result<ResultTable, WarehouseError> {
        if !statement.binds.is_empty() {
            return Err(WarehouseError::UnsupportedBinds(format!(
                "Snowflake statements take inline values, got {} bind(s)",
                statement.binds.len()
            )));
        }
        let session = self.session().await?;

        let rows = session
            .query(statement.sql.as_str())
            .await
            .map_err(|e| WarehouseError::QueryError(e.to_string()))?;
        debug!("Snowflake returned {} row(s)", rows.len());

        let Some(first) = rows.first() else {
            return Ok(ResultTable::empty());
        };
        let columns: Vec<Column> = first
            .column_types()
            .iter()
            .map(|column| {
                Column::new(
                    column.name(),
                    column_type(column.column_type().snowflake_type()),
                )
            })
            .collect();

        let table_rows = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|column| decode_value(row, column))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ResultTable::new(columns, table_rows))
    }

    async fn close(&self) {
        *self.closed.lock().await = true;
        if self.session.lock().await.take().is_some() {
            info!("Snowflake session released");
        }
    }
}

/// Map a Snowflake result type name to a column type
fn column_type(snowflake_type: &str) -> ColumnType {
    match snowflake_type.to_ascii_lowercase().as_str() {
        "fixed" => ColumnType::Decimal,
        "real" => ColumnType::Float,
        "boolean" => ColumnType::Boolean,
        "date" => ColumnType::Date,
        "timestamp_ntz" | "timestamp_ltz" | "timestamp_tz" => ColumnType::Timestamp,
        "text" | "time" | "variant" | "object" | "array" | "binary" => ColumnType::Text,
        _ => ColumnType::Unknown,
    }
}

fn decode_value(row: &SnowflakeRow, column: &Column) -> Result<Value, WarehouseError> {
    let raw = row
        .get::<Option<String>>(&column.name)
        .map_err(|e| WarehouseError::QueryError(e.to_string()))?;
    decode_cell(raw, column.column_type).map_err(|e| {
        WarehouseError::QueryError(format!("Failed to decode column {}: {}", column.name, e))
    })
}

/// Decode one wire cell
///
/// Dates arrive as days since the epoch and timestamps as epoch seconds.
/// `TIMESTAMP_TZ` cells carry a trailing offset, which is dropped.
fn decode_cell(raw: Option<String>, column_type: ColumnType) -> Result<Value, String> {
    let Some(raw) = raw else {
        return Ok(Value::Null);
    };
    let value = match column_type {
        ColumnType::Decimal => Decimal::from_str(&raw)
            .or_else(|_| Decimal::from_scientific(&raw))
            .map(Value::Decimal)
            .map_err(|e| e.to_string())?,
        ColumnType::Integer => i64::try_decode(&Some(raw))
            .map(Value::Int)
            .map_err(|e| e.to_string())?,
        ColumnType::Float => f64::try_decode(&Some(raw))
            .map(Value::Float)
            .map_err(|e| e.to_string())?,
        ColumnType::Boolean => bool::try_decode(&Some(raw))
            .map(Value::Boolean)
            .map_err(|e| e.to_string())?,
        ColumnType::Date => NaiveDate::try_decode(&Some(raw))
            .map(Value::Date)
            .map_err(|e| e.to_string())?,
        ColumnType::Timestamp => {
            let epoch = raw.split_whitespace().next().unwrap_or_default().to_string();
            NaiveDateTime::try_decode(&Some(epoch))
                .map(Value::Timestamp)
                .map_err(|e| e.to_string())?
        }
        ColumnType::Text => Value::Text(raw),
        ColumnType::Unknown => {
            debug!("Keeping cell of unknown Snowflake type as text");
            Value::Text(raw)
        }
    };
    Ok(value)
}
