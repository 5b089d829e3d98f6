use crate::{
    db::quote_identifier,
    errors::DbError,
    models::schema::TableSchema,
};

/// An INSERT over every column the server does not fill in itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    pub sql: String,
    pub columns: Vec<String>,
}

pub fn build_insert(table: &str, schema: &TableSchema) -> Result<InsertStatement, DbError> {
    let columns: Vec<String> = schema
        .columns
        .iter()
        .filter(|column| !column.is_auto_generated)
        .map(|column| column.name.clone())
        .collect();

    if columns.is_empty() {
        return Err(DbError::NoInsertableColumns(table.to_string()));
    }

    let column_sql = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");

    Ok(InsertStatement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(table),
            column_sql,
            placeholders
        ),
        columns,
    })
}

/// Splits a schema into SET columns and WHERE columns for an UPDATE.
/// SET never holds a key column or a server-generated one.
pub fn update_columns<'a>(
    schema: &'a TableSchema,
    primary_key: &'a [String],
) -> (Vec<&'a str>, Vec<&'a str>) {
    let set_columns = schema
        .columns
        .iter()
        .filter(|column| !column.is_auto_generated && !primary_key.contains(&column.name))
        .map(|column| column.name.as_str())
        .collect();

    (set_columns, unique(primary_key.iter().map(String::as_str)))
}

pub fn build_update(
    table: &str,
    set_columns: &[&str],
    where_columns: &[&str],
) -> Result<String, DbError> {
    if where_columns.is_empty() {
        return Err(DbError::NoPrimaryKey(table.to_string()));
    }
    if set_columns.is_empty() {
        return Err(DbError::NoUpdatableColumns(table.to_string()));
    }

    let set_sql = set_columns
        .iter()
        .map(|c| format!("{} = ?", quote_identifier(c)))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        "UPDATE {} SET {} WHERE {}",
        quote_identifier(table),
        set_sql,
        where_clause(where_columns)
    ))
}

pub fn build_delete(table: &str, where_columns: &[&str]) -> Result<String, DbError> {
    if where_columns.is_empty() {
        return Err(DbError::NoPrimaryKey(table.to_string()));
    }

    Ok(format!(
        "DELETE FROM {} WHERE {}",
        quote_identifier(table),
        where_clause(where_columns)
    ))
}

fn where_clause(where_columns: &[&str]) -> String {
    unique(where_columns.iter().copied())
        .iter()
        .map(|c| format!("{} = ?", quote_identifier(c)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn unique<'a>(names: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = Vec::new();
    for name in names {
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock::{assignments_schema, supplies_schema};
    use crate::models::schema::ColumnDescriptor;

    #[test]
    fn test_insert_skips_auto_generated_key() {
        let insert = build_insert("Supplies", &supplies_schema()).unwrap();
        assert_eq!(insert.columns, vec!["Name", "Quantity"]);
        assert_eq!(
            insert.sql,
            "INSERT INTO `Supplies` (`Name`, `Quantity`) VALUES (?, ?)"
        );
    }

    #[test]
    fn test_insert_keeps_non_generated_keys() {
        let insert = build_insert("Astronaut_Missions", &assignments_schema()).unwrap();
        assert_eq!(insert.columns, vec!["AstronautID", "MissionID", "Role"]);
        assert_eq!(insert.sql.matches('?').count(), 3);
    }

    #[test]
    fn test_insert_without_insertable_columns() {
        let schema = TableSchema {
            table_name: "Counters".to_string(),
            columns: vec![ColumnDescriptor::from_describe(
                "ID", "int", "NO", "PRI", None, "auto_increment",
            )],
        };
        assert!(matches!(
            build_insert("Counters", &schema),
            Err(DbError::NoInsertableColumns(_))
        ));
    }

    #[test]
    fn test_update_supplies() {
        let schema = supplies_schema();
        let primary_key = vec!["SupplyID".to_string()];
        let (set, keys) = update_columns(&schema, &primary_key);
        assert_eq!(set, vec!["Name", "Quantity"]);
        assert_eq!(keys, vec!["SupplyID"]);

        let sql = build_update("Supplies", &["Quantity"], &keys).unwrap();
        assert_eq!(sql, "UPDATE `Supplies` SET `Quantity` = ? WHERE `SupplyID` = ?");
    }

    #[test]
    fn test_composite_key_referenced_once_each() {
        let schema = assignments_schema();
        let primary_key = vec![
            "AstronautID".to_string(),
            "MissionID".to_string(),
            "AstronautID".to_string(),
        ];
        let (set, keys) = update_columns(&schema, &primary_key);
        assert_eq!(set, vec!["Role"]);
        assert_eq!(keys, vec!["AstronautID", "MissionID"]);

        let sql = build_update("Astronaut_Missions", &set, &keys).unwrap();
        assert_eq!(
            sql,
            "UPDATE `Astronaut_Missions` SET `Role` = ? WHERE `AstronautID` = ? AND `MissionID` = ?"
        );
        assert_eq!(sql.matches("`AstronautID`").count(), 1);

        let sql = build_delete("Astronaut_Missions", &primary_key.iter().map(String::as_str).collect::<Vec<_>>()).unwrap();
        assert_eq!(
            sql,
            "DELETE FROM `Astronaut_Missions` WHERE `AstronautID` = ? AND `MissionID` = ?"
        );
    }

    #[test]
    fn test_keyless_update_and_delete_refused() {
        assert!(matches!(
            build_update("SensorLog", &["Note"], &[]),
            Err(DbError::NoPrimaryKey(_))
        ));
        assert!(matches!(
            build_delete("SensorLog", &[]),
            Err(DbError::NoPrimaryKey(_))
        ));
    }

    #[test]
    fn test_update_with_only_key_columns() {
        assert!(matches!(
            build_update("Mission_Modules", &[], &["MissionID", "ModuleID"]),
            Err(DbError::NoUpdatableColumns(_))
        ));
    }

    #[test]
    fn test_reserved_word_identifiers_are_quoted() {
        let sql = build_delete("order", &["key"]).unwrap();
        assert_eq!(sql, "DELETE FROM `order` WHERE `key` = ?");
    }
}
