use super::{
    BindStyle, Column, ColumnType, ResultTable, SqlStatement, Value, Warehouse, WarehouseError,
    WarehouseMapping,
};
use crate::config::PostgresConfig;
use async_trait::async_trait;
use log::{error, info};
use sqlparser::dialect::PostgreSqlDialect;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls, Row};

/// Warehouse backed by a Postgres mirror of the usage views
///
/// Used for local development. Object filter values are sent as bind
/// parameters.
pub struct PostgresWarehouse {
    client: RwLock<Option<Client>>,
    connection: Mutex<Option<JoinHandle<()>>>,
}

impl PostgresWarehouse {
    pub async fn new(config: &PostgresConfig) -> Result<Self, WarehouseError> {
        let connection_string = format!(
            "postgres://{}:{}@{}/{}",
            config.user, config.password, config.host, config.dbname
        );

        let (client, connection) = tokio_postgres::connect(&connection_string, NoTls)
            .await
            .map_err(|e| WarehouseError::ConnectionError(e.to_string()))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Postgres connection error: {}", e);
            }
        });
        info!("Connected to Postgres at {}/{}", config.host, config.dbname);

        Ok(PostgresWarehouse {
            client: RwLock::new(Some(client)),
            connection: Mutex::new(Some(handle)),
        })
    }
}

impl WarehouseMapping for PostgresWarehouse {
    fn get_dialect(&self) -> &dyn sqlparser::dialect::Dialect {
        &PostgreSqlDialect {}
    }

    fn bind_style(&self) -> BindStyle {
        BindStyle::Numbered
    }
}

#[async_trait]
impl Warehouse for PostgresWarehouse {
    async fn execute(&self, statement: &SqlStatement) -> Result<ResultTable, WarehouseError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(WarehouseError::Closed)?;

        let prepared = client
            .prepare(&statement.sql)
            .await
            .map_err(|e| WarehouseError::QueryError(e.to_string()))?;

        let params: Vec<&(dyn ToSql + Sync)> = statement
            .binds
            .iter()
            .map(|b| b as &(dyn ToSql + Sync))
            .collect();
        let rows = client
            .query(&prepared, &params)
            .await
            .map_err(|e| WarehouseError::QueryError(e.to_string()))?;

        let columns: Vec<Column> = prepared
            .columns()
            .iter()
            .map(|col| Column::new(col.name(), column_type(col.type_())))
            .collect();

        let rows = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| decode_value(row, idx, col.column_type))
                    .collect::<Result<Vec<Value>, WarehouseError>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ResultTable::new(columns, rows))
    }

    async fn close(&self) {
        // dropping the client ends the connection task
        self.client.write().await.take();
        if let Some(handle) = self.connection.lock().await.take() {
            if let Err(e) = handle.await {
                error!("Postgres connection task failed: {}", e);
            }
        }
        info!("Postgres warehouse closed");
    }
}

fn column_type(pg_type: &Type) -> ColumnType {
    if *pg_type == Type::INT2 || *pg_type == Type::INT4 || *pg_type == Type::INT8 {
        ColumnType::Integer
    } else if *pg_type == Type::FLOAT4 || *pg_type == Type::FLOAT8 {
        ColumnType::Float
    } else if *pg_type == Type::NUMERIC {
        ColumnType::Decimal
    } else if *pg_type == Type::BOOL {
        ColumnType::Boolean
    } else if *pg_type == Type::DATE {
        ColumnType::Date
    } else if *pg_type == Type::TIMESTAMP || *pg_type == Type::TIMESTAMPTZ {
        ColumnType::Timestamp
    } else if *pg_type == Type::TEXT
        || *pg_type == Type::VARCHAR
        || *pg_type == Type::BPCHAR
        || *pg_type == Type::NAME
    {
        ColumnType::Text
    } else {
        ColumnType::Unknown
    }
}

fn decode_value(row: &Row, idx: usize, column_type: ColumnType) -> Result<Value, WarehouseError> {
    let pg_type = row.columns()[idx].type_().clone();
    let value = match column_type {
        ColumnType::Integer if pg_type == Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .map(|v| v.map(|v| Value::Int(v.into()))),
        ColumnType::Integer if pg_type == Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .map(|v| v.map(|v| Value::Int(v.into()))),
        ColumnType::Integer => row.try_get::<_, Option<i64>>(idx).map(|v| v.map(Value::Int)),
        ColumnType::Float if pg_type == Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .map(|v| v.map(|v| Value::Float(v.into()))),
        ColumnType::Float => row.try_get::<_, Option<f64>>(idx).map(|v| v.map(Value::Float)),
        ColumnType::Decimal => row
            .try_get::<_, Option<rust_decimal::Decimal>>(idx)
            .map(|v| v.map(Value::Decimal)),
        ColumnType::Boolean => row.try_get::<_, Option<bool>>(idx).map(|v| v.map(Value::Boolean)),
        ColumnType::Date => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)
            .map(|v| v.map(Value::Date)),
        ColumnType::Timestamp if pg_type == Type::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .map(|v| v.map(|v| Value::Timestamp(v.naive_utc()))),
        ColumnType::Timestamp => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .map(|v| v.map(Value::Timestamp)),
        ColumnType::Text => row.try_get::<_, Option<String>>(idx).map(|v| v.map(Value::Text)),
        ColumnType::Unknown => {
            error!("Unexpected Postgres type {} in column {}", pg_type, idx);
            Ok(None)
        }
    };
    value
        .map(|v| v.unwrap_or(Value::Null))
        .map_err(|e| WarehouseError::QueryError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::int8(Type::INT8, ColumnType::Integer)]
    #[case::float8(Type::FLOAT8, ColumnType::Float)]
    #[case::numeric(Type::NUMERIC, ColumnType::Decimal)]
    #[case::varchar(Type::VARCHAR, ColumnType::Text)]
    #[case::timestamptz(Type::TIMESTAMPTZ, ColumnType::Timestamp)]
    #[case::json(Type::JSON, ColumnType::Unknown)]
    fn maps_postgres_types(#[case] pg_type: Type, #[case] expected: ColumnType) {
        assert_eq!(column_type(&pg_type), expected);
    }
}
