use std::{
    fs::File,
    path::{Path, PathBuf},
};

use chrono::{Local, NaiveDateTime};
use csv::Writer;
use log::info;

use crate::{
    errors::DbError,
    models::result::{display_value, QueryResult},
};

/// `<source>_<YYYYmmdd_HHMMSS>.csv`, with anything outside `[A-Za-z0-9_-]` replaced.
pub fn default_file_name(result: &QueryResult, at: NaiveDateTime) -> String {
    let label: String = result
        .source
        .label()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}_{}.csv", label, at.format("%Y%m%d_%H%M%S"))
}

/// Writes the displayed result (header row, then rows) to `dir`.
pub fn export_to_dir(result: &QueryResult, dir: impl AsRef<Path>) -> Result<PathBuf, DbError> {
    let path = dir
        .as_ref()
        .join(default_file_name(result, Local::now().naive_local()));
    export_to_csv(result, &path)?;
    Ok(path)
}

/// Data export from a displayed result to CSV. NULL cells are written empty.
pub fn export_to_csv(result: &QueryResult, file_path: impl AsRef<Path>) -> Result<(), DbError> {
    if result.columns.is_empty() {
        return Err(DbError::Export("nothing to export".to_string()));
    }

    let file_path = file_path.as_ref();
    let file = File::create(file_path).map_err(|e| DbError::Export(e.to_string()))?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record(&result.columns)
        .map_err(|e| DbError::Export(e.to_string()))?;

    for row in &result.rows {
        let csv_row: Vec<String> = row.iter().map(display_value).collect();
        wtr.write_record(&csv_row)
            .map_err(|e| DbError::Export(e.to_string()))?;
    }

    wtr.flush().map_err(|e| DbError::Export(e.to_string()))?;

    info!("exported {} rows to {}", result.row_count(), file_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    use super::*;
    use crate::models::result::ResultSource;

    fn supplies() -> QueryResult {
        QueryResult {
            source: ResultSource::Table("Supplies".to_string()),
            columns: vec!["SupplyID".into(), "Name".into(), "Quantity".into()],
            rows: vec![
                vec![json!(1), json!("Water, potable"), json!(10)],
                vec![json!(2), json!("Nitrogen"), Value::Null],
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_default_file_name() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 7)
            .unwrap();
        assert_eq!(default_file_name(&supplies(), at), "Supplies_20240309_140507.csv");

        let canned = QueryResult::default().with_source(ResultSource::Canned("Module oxygen".into()));
        assert_eq!(default_file_name(&canned, at), "Module_oxygen_20240309_140507.csv");
    }

    #[test]
    fn test_export_to_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("supplies.csv");

        export_to_csv(&supplies(), &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "SupplyID,Name,Quantity\n1,\"Water, potable\",10\n2,Nitrogen,\n"
        );
    }

    #[test]
    fn test_export_to_dir_names_file_after_source() {
        let dir = tempdir().unwrap();
        let path = export_to_dir(&supplies(), dir.path()).unwrap();

        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("Supplies_") && name.ends_with(".csv"));
    }

    #[test]
    fn test_export_without_columns_fails() {
        let dir = tempdir().unwrap();
        let err = export_to_csv(&QueryResult::default(), dir.path().join("x.csv")).unwrap_err();
        assert!(matches!(err, DbError::Export(_)));
    }
}
