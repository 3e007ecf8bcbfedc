pub mod memory;
pub mod postgres;
pub mod snowflake;
mod table;

pub use table::{Column, ColumnType, ResultTable, Value};

use async_trait::async_trait;
use thiserror::Error;

/// How a [`Warehouse`] receives values coming from the object filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindStyle {
    /// Values are spliced into the SQL text as escaped string literals.
    Inline,
    /// Values are sent alongside the SQL and referenced as `$1`, `$2`, ...
    Numbered,
}

/// A fully rendered statement, ready to be sent to a [`Warehouse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SqlStatement {
    pub sql: String,
    pub binds: Vec<String>,
}

impl SqlStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
        }
    }
}

/// Static properties of a warehouse that the templating layer needs.
pub trait WarehouseMapping {
    /// Dialect used to check rendered statements before execution
    fn get_dialect(&self) -> &dyn sqlparser::dialect::Dialect;
    /// Whether object filter values are inlined or bound
    fn bind_style(&self) -> BindStyle;
}

/// Warehouse executes a rendered SQL statement and materializes the result
///
/// A warehouse is created once at startup, shared by reference with every
/// consumer and closed explicitly on shutdown.
#[async_trait]
pub trait Warehouse: WarehouseMapping + Send + Sync {
    /// Execute the statement and return the whole result set
    async fn execute(&self, statement: &SqlStatement) -> Result<ResultTable, WarehouseError>;
    /// Release the underlying session or connection
    ///
    /// Executing after close returns [`WarehouseError::Closed`].
    async fn close(&self);
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WarehouseError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Unsupported bind parameters: {0}")]
    UnsupportedBinds(String),

    #[error("Warehouse connection is closed")]
    Closed,
}
