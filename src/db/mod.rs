use async_trait::async_trait;
use log::{debug, error};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::{
    errors::DbError,
    models::{result::QueryResult, schema::TableSchema},
};

pub mod mysql;

/// A value bound to one positional `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
}

impl From<Option<String>> for SqlValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(SqlValue::Null, SqlValue::Text)
    }
}

/// SQL text with positional placeholders and the values bound to them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: SqlValue) -> Self {
        self.params.push(value);
        self
    }

    pub fn with_params(mut self, params: Vec<SqlValue>) -> Self {
        self.params = params;
        self
    }
}

/// Backtick-quotes a MySQL identifier, doubling embedded backticks.
pub fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

#[async_trait]
pub trait DbClient: Send + Sync {
    async fn ping(&self) -> Result<(), DbError>;
    async fn query(&self, statement: &Statement) -> Result<QueryResult, DbError>;
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, DbError>;
    async fn list_tables(&self) -> Result<Vec<String>, DbError>;
    async fn describe_table(&self, table_name: &str) -> Result<TableSchema, DbError>;
    /// Primary-key column names in key order; empty when the table has none.
    async fn primary_key_columns(&self, table_name: &str) -> Result<Vec<String>, DbError>;
    async fn close(&self);
}

#[async_trait]
pub trait Transaction: Send {
    async fn execute_transaction(&mut self, statement: &Statement) -> Result<u64, DbError>;
    /// Calls a stored procedure with `args` followed by `out_params` output
    /// parameters and returns the output values in order.
    async fn call_procedure(
        &mut self,
        name: &str,
        args: &[SqlValue],
        out_params: usize,
    ) -> Result<Vec<Value>, DbError>;
    async fn commit_transaction(self: Box<Self>) -> Result<(), DbError>;
    async fn rollback_transaction(self: Box<Self>) -> Result<(), DbError>;
}

/// Runs one write in its own transaction: commit on success, roll back on
/// any error before handing the error back.
pub async fn execute_write(client: &dyn DbClient, statement: &Statement) -> Result<u64, DbError> {
    debug!("write: {} {:?}", statement.sql, statement.params);
    let mut tx = client.begin_transaction().await?;

    match tx.execute_transaction(statement).await {
        Ok(affected) => {
            tx.commit_transaction().await?;
            Ok(affected)
        }
        Err(err) => {
            error!("write failed, rolling back: {}", err);
            if let Err(rollback_err) = tx.rollback_transaction().await {
                error!("rollback failed: {}", rollback_err);
            }
            Err(err)
        }
    }
}
