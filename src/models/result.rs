use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a tabular result came from. Only `Table` results line up with a live schema.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub enum ResultSource {
    Table(String),
    Canned(String),
    #[default]
    AdHoc,
}

impl ResultSource {
    pub fn table(&self) -> Option<&str> {
        match self {
            ResultSource::Table(name) => Some(name),
            _ => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ResultSource::Table(name) => name,
            ResultSource::Canned(name) => name,
            ResultSource::AdHoc => "query",
        }
    }
}

/// Ordered column names and ordered rows of possibly-null values.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub source: ResultSource,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// `(row, column)` cells the driver could not decode; they hold `Value::Null`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub undecoded: Vec<(usize, usize)>,
}

impl QueryResult {
    pub fn with_source(mut self, source: ResultSource) -> Self {
        self.source = source;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// The first cell of the first row, `None` when absent or NULL.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows
            .first()
            .and_then(|row| row.first())
            .filter(|value| !value.is_null())
    }

    /// Columns of row `index` whose values could not be decoded.
    pub fn undecoded_columns(&self, index: usize) -> Vec<&str> {
        self.undecoded
            .iter()
            .filter(|(row, _)| *row == index)
            .filter_map(|(_, column)| self.columns.get(*column).map(String::as_str))
            .collect()
    }

    /// Display strings for one row; NULL shows as the empty string.
    pub fn display_row(&self, index: usize) -> Option<Vec<String>> {
        self.rows
            .get(index)
            .map(|row| row.iter().map(display_value).collect())
    }

    /// Indices of rows whose displayed values contain `needle`, ignoring case.
    pub fn matching_rows(&self, needle: &str) -> Vec<usize> {
        let needle = needle.trim().to_lowercase();
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                needle.is_empty()
                    || row
                        .iter()
                        .map(display_value)
                        .collect::<Vec<_>>()
                        .join(" ")
                        .to_lowercase()
                        .contains(&needle)
            })
            .map(|(i, _)| i)
            .collect()
    }
}

pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn crew() -> QueryResult {
        QueryResult {
            source: ResultSource::Table("Astronauts".to_string()),
            columns: vec!["AstronautID".into(), "FirstName".into(), "Rank".into()],
            rows: vec![
                vec![json!(1), json!("Yuri"), Value::Null],
                vec![json!(2), json!("Valentina"), json!("Commander")],
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_display_row_maps_null_to_empty() {
        let result = crew();
        assert_eq!(
            result.display_row(0).unwrap(),
            vec!["1".to_string(), "Yuri".to_string(), String::new()]
        );
        assert!(result.display_row(5).is_none());
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!(true)), "1");
        assert_eq!(display_value(&json!(2.5)), "2.5");
        assert_eq!(display_value(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn test_matching_rows() {
        let result = crew();
        assert_eq!(result.matching_rows("COMMAND"), vec![1]);
        assert_eq!(result.matching_rows("  "), vec![0, 1]);
        assert!(result.matching_rows("apollo").is_empty());
    }

    #[test]
    fn test_scalar() {
        let result = QueryResult {
            columns: vec!["fn_mission_duration(42)".into()],
            rows: vec![vec![Value::Null]],
            ..Default::default()
        };
        assert!(result.scalar().is_none());
        assert_eq!(crew().scalar(), Some(&json!(1)));
        assert_eq!(crew().source.table(), Some("Astronauts"));
    }

    #[test]
    fn test_undecoded_columns() {
        let mut result = crew();
        result.undecoded = vec![(1, 2), (0, 1)];
        assert_eq!(result.undecoded_columns(1), vec!["Rank"]);
        assert_eq!(result.undecoded_columns(0), vec!["FirstName"]);
        assert!(crew().undecoded_columns(0).is_empty());
    }
}
