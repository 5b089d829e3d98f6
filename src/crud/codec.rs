use std::str::FromStr;

use rust_decimal::Decimal;

use crate::{
    db::SqlValue,
    errors::DbError,
    models::schema::{ColumnDescriptor, TableSchema, ValueKind},
};

#[derive(Debug, Clone, PartialEq)]
pub struct EditableField {
    pub column: ColumnDescriptor,
    /// `None` stands for NULL (shown as an empty entry).
    pub current_value: Option<String>,
    pub read_only: bool,
}

impl EditableField {
    pub fn display(&self) -> &str {
        self.current_value.as_deref().unwrap_or_default()
    }
}

/// Empty or whitespace-only input means NULL; anything else passes through untouched.
pub fn to_storage_value(display_value: &str) -> Option<String> {
    if display_value.trim().is_empty() {
        None
    } else {
        Some(display_value.to_string())
    }
}

/// Zips a displayed row with the schema by position. Key and generated
/// columns come back read-only.
pub fn to_editable_fields(
    schema: &TableSchema,
    row: &[String],
) -> Result<Vec<EditableField>, DbError> {
    if row.len() != schema.len() {
        return Err(DbError::Alignment(format!(
            "row has {} values but `{}` has {} columns",
            row.len(),
            schema.table_name,
            schema.len()
        )));
    }

    Ok(schema
        .columns
        .iter()
        .zip(row)
        .map(|(column, value)| EditableField {
            read_only: column.is_primary_key() || column.is_auto_generated,
            current_value: to_storage_value(value),
            column: column.clone(),
        })
        .collect())
}

/// Empty fields for an insert; only server-generated columns are locked.
pub fn blank_fields(schema: &TableSchema) -> Vec<EditableField> {
    schema
        .columns
        .iter()
        .map(|column| EditableField {
            column: column.clone(),
            current_value: None,
            read_only: column.is_auto_generated,
        })
        .collect()
}

/// Result columns must be the table's live columns, same names, same order.
pub fn check_alignment(schema: &TableSchema, columns: &[String]) -> Result<(), DbError> {
    let live = schema.column_names();
    if live.len() != columns.len() || live.iter().zip(columns).any(|(a, b)| *a != b.as_str()) {
        return Err(DbError::Alignment(format!(
            "displayed columns [{}] do not match `{}` columns [{}]; reload the table",
            columns.join(", "),
            schema.table_name,
            live.join(", ")
        )));
    }
    Ok(())
}

/// Checks a stored value against the column's declared type and turns it
/// into a bound parameter.
pub fn coerce(column: &ColumnDescriptor, value: Option<&str>) -> Result<SqlValue, DbError> {
    let Some(raw) = value else {
        if column.is_required() {
            return Err(DbError::Validation(format!("`{}` is required", column.name)));
        }
        return Ok(SqlValue::Null);
    };

    let text = raw.trim();
    let invalid = |expected: &str| {
        DbError::Validation(format!(
            "`{}` expects {} ({}), got `{}`",
            column.name, expected, column.declared_type, raw
        ))
    };

    match column.value_kind() {
        ValueKind::Integer { unsigned: true } => text
            .parse::<u64>()
            .map(SqlValue::UInt)
            .map_err(|_| invalid("a non-negative integer")),
        ValueKind::Integer { unsigned: false } => text
            .parse::<i64>()
            .map(SqlValue::Int)
            .map_err(|_| invalid("an integer")),
        ValueKind::Decimal => Decimal::from_str(text)
            .map(SqlValue::Decimal)
            .map_err(|_| invalid("a decimal number")),
        ValueKind::Float => text
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(SqlValue::Float)
            .ok_or_else(|| invalid("a number")),
        ValueKind::Text => Ok(SqlValue::Text(raw.to_string())),
    }
}
