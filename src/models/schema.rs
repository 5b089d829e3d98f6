use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    None,
    Primary,
}

/// How a column's text input is checked and bound before it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer { unsigned: bool },
    Decimal,
    Float,
    Text,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: String,
    pub nullable: bool,
    pub key_role: KeyRole,
    pub default_value: Option<String>,
    pub is_auto_generated: bool,
}

impl ColumnDescriptor {
    /// Builds a descriptor from one `DESCRIBE` row
    /// (`Field`, `Type`, `Null`, `Key`, `Default`, `Extra`).
    pub fn from_describe(
        field: &str,
        declared_type: &str,
        null: &str,
        key: &str,
        default_value: Option<String>,
        extra: &str,
    ) -> Self {
        let extra = extra.to_ascii_lowercase();
        Self {
            name: field.to_string(),
            declared_type: declared_type.to_string(),
            nullable: null.eq_ignore_ascii_case("YES"),
            key_role: if key.eq_ignore_ascii_case("PRI") {
                KeyRole::Primary
            } else {
                KeyRole::None
            },
            default_value,
            is_auto_generated: extra.contains("auto_increment")
                || extra.contains("virtual generated")
                || extra.contains("stored generated"),
        }
    }

    pub fn is_primary_key(&self) -> bool {
        self.key_role == KeyRole::Primary
    }

    /// A value must be supplied: NOT NULL, no default, not filled in by the server.
    pub fn is_required(&self) -> bool {
        !self.nullable && self.default_value.is_none() && !self.is_auto_generated
    }

    pub fn value_kind(&self) -> ValueKind {
        let declared = self.declared_type.to_ascii_lowercase();
        let base = declared
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or_default();

        match base {
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" => {
                ValueKind::Integer {
                    unsigned: declared.contains("unsigned"),
                }
            }
            "decimal" | "numeric" | "dec" | "fixed" => ValueKind::Decimal,
            "float" | "double" | "real" => ValueKind::Float,
            _ => ValueKind::Text,
        }
    }
}

/// Columns of one table in the server's native order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
