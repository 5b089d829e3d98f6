use log::{info, warn};

use crate::{
    db::{execute_write, DbClient, SqlValue, Statement},
    errors::DbError,
    models::{result::QueryResult, schema::TableSchema},
};

use super::{
    codec::{self, EditableField},
    statement::{build_delete, build_insert, build_update, update_columns},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Insert,
    Update,
}

/// Loading is the `open_*` call itself: it either yields a `Ready` form or an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormState {
    Ready,
    Submitting,
    Success { affected: u64 },
    Failed(String),
}

/// A schema-driven insert or update form over one table.
#[derive(Debug)]
pub struct CrudForm {
    table: String,
    mode: FormMode,
    schema: TableSchema,
    primary_key: Vec<String>,
    fields: Vec<EditableField>,
    state: FormState,
}

impl CrudForm {
    pub async fn open_insert(client: &dyn DbClient, table: &str) -> Result<Self, DbError> {
        let schema = client.describe_table(table).await?;
        build_insert(table, &schema)?;

        Ok(Self {
            table: table.to_string(),
            mode: FormMode::Insert,
            fields: codec::blank_fields(&schema),
            schema,
            primary_key: Vec::new(),
            state: FormState::Ready,
        })
    }

    /// Opens an update form for row `row_index` of a table browse result.
    pub async fn open_update(
        client: &dyn DbClient,
        result: &QueryResult,
        row_index: usize,
    ) -> Result<Self, DbError> {
        let target = RowTarget::resolve(client, result, row_index).await?;
        if !target.undecoded.is_empty() {
            // Saving would write NULL over values that were never shown.
            return Err(DbError::Schema(format!(
                "cannot edit `{}`: unreadable values in {}",
                target.table,
                target.undecoded.join(", ")
            )));
        }
        let fields = codec::to_editable_fields(&target.schema, &target.row)?;

        Ok(Self {
            table: target.table,
            mode: FormMode::Update,
            schema: target.schema,
            primary_key: target.primary_key,
            fields,
            state: FormState::Ready,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn mode(&self) -> FormMode {
        self.mode
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn fields(&self) -> &[EditableField] {
        &self.fields
    }

    pub fn set_value(&mut self, column: &str, value: &str) -> Result<(), DbError> {
        let field = self
            .fields
            .iter_mut()
            .find(|f| f.column.name == column)
            .ok_or_else(|| DbError::Validation(format!("`{}` has no column `{}`", self.table, column)))?;

        if field.read_only {
            return Err(DbError::Validation(format!("`{}` is read-only", column)));
        }

        field.current_value = codec::to_storage_value(value);
        Ok(())
    }

    /// Validates every field and builds the parameterized statement.
    pub fn build_statement(&self) -> Result<Statement, DbError> {
        match self.mode {
            FormMode::Insert => {
                let insert = build_insert(&self.table, &self.schema)?;
                let params = insert
                    .columns
                    .iter()
                    .map(|name| self.bound_value(name))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Statement::new(insert.sql).with_params(params))
            }
            FormMode::Update => {
                let (set_columns, where_columns) = update_columns(&self.schema, &self.primary_key);
                let sql = build_update(&self.table, &set_columns, &where_columns)?;
                let params = set_columns
                    .iter()
                    .chain(where_columns.iter())
                    .map(|name| self.bound_value(name))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Statement::new(sql).with_params(params))
            }
        }
    }

    /// Ready (or Failed, to retry) → Submitting → Success | Failed.
    /// Validation errors put the form back to Ready without touching the database.
    pub async fn submit(&mut self, client: &dyn DbClient) -> Result<u64, DbError> {
        match self.state {
            FormState::Ready | FormState::Failed(_) => {}
            FormState::Submitting | FormState::Success { .. } => {
                return Err(DbError::Validation("form has already been submitted".to_string()));
            }
        }
        self.state = FormState::Submitting;

        let statement = match self.build_statement() {
            Ok(statement) => statement,
            Err(err) => {
                warn!("{} on `{}` rejected: {}", self.mode_name(), self.table, err);
                self.state = FormState::Ready;
                return Err(err);
            }
        };

        match execute_write(client, &statement).await {
            Ok(affected) => {
                info!("{} on `{}` committed ({} rows)", self.mode_name(), self.table, affected);
                self.state = FormState::Success { affected };
                Ok(affected)
            }
            Err(err) => {
                self.state = FormState::Failed(err.to_string());
                Err(err)
            }
        }
    }

    fn bound_value(&self, name: &str) -> Result<SqlValue, DbError> {
        let field = self
            .fields
            .iter()
            .find(|f| f.column.name == name)
            .ok_or_else(|| DbError::Alignment(format!("no field for column `{}`", name)))?;
        codec::coerce(&field.column, field.current_value.as_deref())
    }

    fn mode_name(&self) -> &'static str {
        match self.mode {
            FormMode::Insert => "insert",
            FormMode::Update => "update",
        }
    }
}

/// Deletes row `row_index` of a table browse result by its primary key.
/// Nothing is executed when the table has no primary key.
pub async fn delete_row(
    client: &dyn DbClient,
    result: &QueryResult,
    row_index: usize,
) -> Result<u64, DbError> {
    let target = RowTarget::resolve(client, result, row_index).await?;
    let where_columns: Vec<&str> = target.primary_key.iter().map(String::as_str).collect();
    let sql = build_delete(&target.table, &where_columns)?;

    let params = where_columns
        .iter()
        .map(|name| target.key_value(name))
        .collect::<Result<Vec<_>, _>>()?;

    let affected = execute_write(client, &Statement::new(sql).with_params(params)).await?;
    info!("delete on `{}` committed ({} rows)", target.table, affected);
    Ok(affected)
}

/// A displayed row checked against the live schema of its table.
struct RowTarget {
    table: String,
    schema: TableSchema,
    primary_key: Vec<String>,
    row: Vec<String>,
    /// Columns of the row the driver could not decode.
    undecoded: Vec<String>,
}

impl RowTarget {
    async fn resolve(
        client: &dyn DbClient,
        result: &QueryResult,
        row_index: usize,
    ) -> Result<Self, DbError> {
        let table = result.source.table().ok_or_else(|| {
            DbError::Alignment("rows can only be edited from a table browse result".to_string())
        })?;

        let schema = client.describe_table(table).await?;
        codec::check_alignment(&schema, &result.columns)?;

        let primary_key = client.primary_key_columns(table).await?;
        if primary_key.is_empty() {
            return Err(DbError::NoPrimaryKey(table.to_string()));
        }

        let row = result.display_row(row_index).ok_or_else(|| {
            DbError::Alignment(format!("row {} is not in the displayed result", row_index))
        })?;

        let undecoded: Vec<String> = result
            .undecoded_columns(row_index)
            .into_iter()
            .map(str::to_string)
            .collect();
        if let Some(key) = undecoded.iter().find(|c| primary_key.contains(c)) {
            return Err(DbError::Schema(format!(
                "key column `{}` of `{}` could not be read",
                key, table
            )));
        }

        Ok(Self {
            table: table.to_string(),
            schema,
            primary_key,
            row,
            undecoded,
        })
    }

    fn key_value(&self, name: &str) -> Result<SqlValue, DbError> {
        let position = self.schema.position(name).ok_or_else(|| {
            DbError::Schema(format!("primary key column `{}` not found in `{}`", name, self.table))
        })?;
        codec::coerce(
            &self.schema.columns[position],
            codec::to_storage_value(&self.row[position]).as_deref(),
        )
    }
}
