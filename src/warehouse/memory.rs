use super::{
    BindStyle, ResultTable, SqlStatement, Warehouse, WarehouseError, WarehouseMapping,
};
use async_trait::async_trait;
use sqlparser::dialect::GenericDialect;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

enum Canned {
    Table(ResultTable),
    Error(WarehouseError),
}

/// In-process warehouse answering from canned results
///
/// A statement receives the response of the first registered needle that is
/// a substring of its SQL. Statements matching nothing yield an empty table.
pub struct MemoryWarehouse {
    responses: Vec<(String, Canned)>,
    bind_style: BindStyle,
    executed: Mutex<Vec<SqlStatement>>,
    closed: AtomicBool,
}

impl Default for MemoryWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self {
            responses: Vec::new(),
            bind_style: BindStyle::Inline,
            executed: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_table(mut self, needle: impl Into<String>, table: ResultTable) -> Self {
        self.responses.push((needle.into(), Canned::Table(table)));
        self
    }

    pub fn with_error(mut self, needle: impl Into<String>, error: WarehouseError) -> Self {
        self.responses.push((needle.into(), Canned::Error(error)));
        self
    }

    pub fn with_bind_style(mut self, bind_style: BindStyle) -> Self {
        self.bind_style = bind_style;
        self
    }

    /// Statements executed so far, oldest first
    pub fn executed(&self) -> Vec<SqlStatement> {
        self.executed
            .lock()
            .map(|executed| executed.clone())
            .unwrap_or_default()
    }

    pub fn execution_count(&self) -> usize {
        self.executed.lock().map(|e| e.len()).unwrap_or(0)
    }
}

impl WarehouseMapping for MemoryWarehouse {
    fn get_dialect(&self) -> &dyn sqlparser::dialect::Dialect {
        &GenericDialect {}
    }

    fn bind_style(&self) -> BindStyle {
        self.bind_style
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn execute(&self, statement: &SqlStatement) -> Result<ResultTable, WarehouseError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(WarehouseError::Closed);
        }
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(statement.clone());
        }

        match self
            .responses
            .iter()
            .find(|(needle, _)| statement.sql.contains(needle.as_str()))
        {
            Some((_, Canned::Table(table))) => Ok(table.clone()),
            Some((_, Canned::Error(error))) => Err(error.clone()),
            None => Ok(ResultTable::empty()),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
