use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use log::{debug, info};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{
    mysql::{MySqlArguments, MySqlConnectOptions, MySqlPoolOptions, MySqlRow},
    query::Query,
    Column, Decode, Executor, MySql, MySqlPool, Row, Type, TypeInfo,
};

use crate::{
    errors::DbError,
    models::{
        result::QueryResult,
        schema::{ColumnDescriptor, TableSchema},
    },
};

use super::{quote_identifier, DbClient, SqlValue, Statement, Transaction};

pub struct MySqlClient {
    pub pool: MySqlPool,
}

impl MySqlClient {
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        let pool = Self::pool_options()
            .connect(database_url)
            .await
            .map_err(DbError::from_connect)?;

        Ok(Self { pool })
    }

    pub async fn connect_with(options: MySqlConnectOptions) -> Result<Self, DbError> {
        let pool = Self::pool_options()
            .connect_with(options)
            .await
            .map_err(DbError::from_connect)?;

        Ok(Self { pool })
    }

    // One session, one connection, used sequentially.
    fn pool_options() -> MySqlPoolOptions {
        MySqlPoolOptions::new().max_connections(1).min_connections(1)
    }
}

fn bind_params<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &'q [SqlValue],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::UInt(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Decimal(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
        };
    }
    query
}

fn try_cell<'r, T>(row: &'r MySqlRow, index: usize) -> Option<Option<T>>
where
    T: Decode<'r, MySql> + Type<MySql>,
{
    row.try_get::<Option<T>, _>(index).ok()
}

fn text_cell(row: &MySqlRow, index: usize) -> Option<Value> {
    if let Some(text) = try_cell::<String>(row, index) {
        return Some(text.map_or(Value::Null, Value::String));
    }
    try_cell::<Vec<u8>>(row, index).map(|bytes| {
        bytes.map_or(Value::Null, |b| {
            Value::String(String::from_utf8_lossy(&b).into_owned())
        })
    })
}

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Decodes one cell by its column type, falling back to text. `None` when
/// the driver cannot read the value at all.
fn decode_cell(row: &MySqlRow, index: usize) -> Option<Value> {
    let type_name = row.columns()[index].type_info().name().to_ascii_uppercase();
    let unsigned = type_name.ends_with("UNSIGNED");
    let base = type_name.split_whitespace().next().unwrap_or_default();

    let unsigned_number = |n: Option<u64>| n.map_or(Value::Null, |n| Value::Number(n.into()));
    let signed_number = |n: Option<i64>| n.map_or(Value::Null, |n| Value::Number(n.into()));

    let typed = match base {
        "NULL" => Some(Value::Null),
        "BOOLEAN" => try_cell::<bool>(row, index).map(|v| v.map_or(Value::Null, Value::Bool)),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" if unsigned => {
            try_cell::<u64>(row, index).map(unsigned_number)
        }
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            try_cell::<i64>(row, index).map(signed_number)
        }
        "YEAR" => try_cell::<u16>(row, index)
            .map(|v| unsigned_number(v.map(u64::from)))
            .or_else(|| try_cell::<i64>(row, index).map(signed_number)),
        "BIT" => try_cell::<u64>(row, index).map(unsigned_number),
        "FLOAT" => try_cell::<f32>(row, index).map(|v| {
            v.and_then(|n| serde_json::Number::from_f64(n as f64))
                .map_or(Value::Null, Value::Number)
        }),
        "DOUBLE" => try_cell::<f64>(row, index).map(|v| {
            v.and_then(serde_json::Number::from_f64)
                .map_or(Value::Null, Value::Number)
        }),
        // Exact text keeps the declared precision.
        "DECIMAL" => try_cell::<Decimal>(row, index)
            .map(|v| v.map_or(Value::Null, |d| Value::String(d.to_string()))),
        "DATE" => try_cell::<NaiveDate>(row, index)
            .map(|v| v.map_or(Value::Null, |d| Value::String(d.to_string()))),
        "DATETIME" => try_cell::<NaiveDateTime>(row, index).map(|v| {
            v.map_or(Value::Null, |d| Value::String(d.format(DATETIME_FORMAT).to_string()))
        }),
        "TIMESTAMP" => try_cell::<DateTime<Utc>>(row, index).map(|v| {
            v.map_or(Value::Null, |d| Value::String(d.format(DATETIME_FORMAT).to_string()))
        }),
        "TIME" => try_cell::<NaiveTime>(row, index)
            .map(|v| v.map_or(Value::Null, |t| Value::String(t.to_string()))),
        "JSON" => try_cell::<Value>(row, index).map(|v| v.unwrap_or(Value::Null)),
        _ => None,
    };

    let decoded = typed.or_else(|| text_cell(row, index));
    if decoded.is_none() {
        debug!("cannot decode column `{}` of type {}", row.columns()[index].name(), type_name);
    }
    decoded
}

fn to_query_result(rows: &[MySqlRow]) -> QueryResult {
    let columns = rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|column| column.name().to_string())
                .collect()
        })
        .unwrap_or_default();

    let mut undecoded = Vec::new();
    let rows = rows
        .iter()
        .enumerate()
        .map(|(r, row)| {
            (0..row.columns().len())
                .map(|c| {
                    decode_cell(row, c).unwrap_or_else(|| {
                        undecoded.push((r, c));
                        Value::Null
                    })
                })
                .collect()
        })
        .collect();

    QueryResult {
        columns,
        rows,
        undecoded,
        ..Default::default()
    }
}

/// Reads a text column from a `DESCRIBE`/`SHOW KEYS` row. Some servers
/// report these columns as binary strings.
fn metadata_text(row: &MySqlRow, column: &str) -> Result<Option<String>, DbError> {
    if let Ok(text) = row.try_get::<Option<String>, _>(column) {
        return Ok(text);
    }
    row.try_get::<Option<Vec<u8>>, _>(column)
        .map(|bytes| bytes.map(|b| String::from_utf8_lossy(&b).into_owned()))
        .map_err(|e| DbError::Schema(format!("cannot read `{}`: {}", column, e)))
}

fn required_text(row: &MySqlRow, column: &str) -> Result<String, DbError> {
    Ok(metadata_text(row, column)?.unwrap_or_default())
}

#[async_trait]
impl DbClient for MySqlClient {
    async fn ping(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::from_connect)?;
        Ok(())
    }

    async fn query(&self, statement: &Statement) -> Result<QueryResult, DbError> {
        debug!("query: {} {:?}", statement.sql, statement.params);
        let rows = bind_params(sqlx::query(&statement.sql), &statement.params)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Sqlx)?;

        let mut result = to_query_result(&rows);

        if rows.is_empty() {
            // No rows to read the header from; describe the prepared statement instead.
            let described = (&self.pool)
                .describe(&statement.sql)
                .await
                .map_err(DbError::Sqlx)?;
            result.columns = described
                .columns()
                .iter()
                .map(|column| column.name().to_string())
                .collect();
        }

        Ok(result)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, DbError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        Ok(Box::new(MySqlTransaction { tx }))
    }

    async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        let rows = sqlx::query("SHOW TABLES")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Sqlx)?;

        let tables = rows
            .iter()
            .map(|row| {
                row.try_get::<String, _>(0)
                    .or_else(|_| {
                        row.try_get::<Vec<u8>, _>(0)
                            .map(|b| String::from_utf8_lossy(&b).into_owned())
                    })
                    .map_err(DbError::Sqlx)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tables)
    }

    async fn describe_table(&self, table_name: &str) -> Result<TableSchema, DbError> {
        let query = format!("DESCRIBE {}", quote_identifier(table_name));
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DbError::Schema(format!("cannot describe `{}`: {}", table_name, e)))?;

        if rows.is_empty() {
            return Err(DbError::Schema(format!("table `{}` not found", table_name)));
        }

        let columns = rows
            .iter()
            .map(|row| {
                Ok(ColumnDescriptor::from_describe(
                    &required_text(row, "Field")?,
                    &required_text(row, "Type")?,
                    &required_text(row, "Null")?,
                    &required_text(row, "Key")?,
                    metadata_text(row, "Default")?,
                    &required_text(row, "Extra")?,
                ))
            })
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(TableSchema {
            table_name: table_name.to_string(),
            columns,
        })
    }

    async fn primary_key_columns(&self, table_name: &str) -> Result<Vec<String>, DbError> {
        let query = format!(
            "SHOW KEYS FROM {} WHERE Key_name = 'PRIMARY'",
            quote_identifier(table_name)
        );
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DbError::Schema(format!("cannot read keys of `{}`: {}", table_name, e)))?;

        let mut keyed = rows
            .iter()
            .map(|row| {
                let seq = row
                    .try_get::<u64, _>("Seq_in_index")
                    .or_else(|_| row.try_get::<i64, _>("Seq_in_index").map(|n| n as u64))
                    .map_err(|e| DbError::Schema(format!("cannot read `Seq_in_index`: {}", e)))?;
                Ok((seq, required_text(row, "Column_name")?))
            })
            .collect::<Result<Vec<_>, DbError>>()?;
        keyed.sort_by_key(|(seq, _)| *seq);

        Ok(keyed.into_iter().map(|(_, name)| name).collect())
    }

    async fn close(&self) {
        info!("closing database connection");
        self.pool.close().await;
    }
}

pub struct MySqlTransaction {
    tx: sqlx::Transaction<'static, MySql>,
}

#[async_trait]
impl Transaction for MySqlTransaction {
    async fn execute_transaction(&mut self, statement: &Statement) -> Result<u64, DbError> {
        let done = bind_params(sqlx::query(&statement.sql), &statement.params)
            .execute(&mut *self.tx)
            .await
            .map_err(DbError::Sqlx)?;
        Ok(done.rows_affected())
    }

    async fn call_procedure(
        &mut self,
        name: &str,
        args: &[SqlValue],
        out_params: usize,
    ) -> Result<Vec<Value>, DbError> {
        // OUT parameters travel through session variables read back on the same connection.
        let out_vars: Vec<String> = (0..out_params).map(|i| format!("@srs_out_{}", i)).collect();
        let placeholders: Vec<String> = args
            .iter()
            .map(|_| "?".to_string())
            .chain(out_vars.iter().cloned())
            .collect();
        let call = format!("CALL {}({})", quote_identifier(name), placeholders.join(", "));
        debug!("call: {} {:?}", call, args);

        bind_params(sqlx::query(&call), args)
            .execute(&mut *self.tx)
            .await
            .map_err(DbError::Sqlx)?;

        if out_vars.is_empty() {
            return Ok(Vec::new());
        }

        let select = format!("SELECT {}", out_vars.join(", "));
        let row = sqlx::query(&select)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(DbError::Sqlx)?;

        Ok((0..out_vars.len())
            .map(|i| decode_cell(&row, i).unwrap_or(Value::Null))
            .collect())
    }

    async fn commit_transaction(self: Box<Self>) -> Result<(), DbError> {
        self.tx
            .commit()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))
    }

    async fn rollback_transaction(self: Box<Self>) -> Result<(), DbError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))
    }
}
