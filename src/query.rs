use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    db::{quote_identifier, DbClient, Statement},
    errors::DbError,
    models::result::{display_value, QueryResult, ResultSource},
};

pub const TABLE_ROW_LIMIT: u32 = 2000;
pub const AUDIT_LIMIT: u32 = 200;

/// Station tables in the order the console lists them.
pub const KNOWN_TABLES: [&str; 18] = [
    "Astronauts",
    "AstronautSkills",
    "Missions",
    "StationModules",
    "Resources",
    "Supplies",
    "LifeSupportSystems",
    "Spacecrafts",
    "Experiments",
    "Schedules",
    "MedicalRecords",
    "ResourceAllocations",
    "Communications",
    "Anomalies",
    "Astronaut_Missions",
    "Mission_Spacecraft",
    "Mission_Modules",
    "Experiment_Astronauts",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CannedQuery {
    AstronautAssignments,
    ModuleOxygen,
    AboveAverageExperiments,
}

impl CannedQuery {
    pub const ALL: [CannedQuery; 3] = [
        CannedQuery::AstronautAssignments,
        CannedQuery::ModuleOxygen,
        CannedQuery::AboveAverageExperiments,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            CannedQuery::AstronautAssignments => "Join: astronaut assignments",
            CannedQuery::ModuleOxygen => "Aggregate: average oxygen per module",
            CannedQuery::AboveAverageExperiments => "Nested: above-average experiment counts",
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            CannedQuery::AstronautAssignments => {
                r#"
                SELECT A.AstronautID, CONCAT(A.FirstName, ' ', A.LastName) AS Name,
                       M.MissionName, AM.Role
                FROM Astronauts A
                JOIN Astronaut_Missions AM ON A.AstronautID = AM.AstronautID
                JOIN Missions M ON M.MissionID = AM.MissionID
                LIMIT 500
                "#
            }
            CannedQuery::ModuleOxygen => {
                r#"
                SELECT SM.ModuleName, AVG(LSS.OxygenLevel) AS AvgOxygen
                FROM LifeSupportSystems LSS
                JOIN StationModules SM ON SM.ModuleID = LSS.ModuleID
                GROUP BY SM.ModuleName
                "#
            }
            CannedQuery::AboveAverageExperiments => {
                r#"
                SELECT m.MissionID, m.MissionName, COUNT(e.ExperimentID) AS expCount
                FROM Missions m
                LEFT JOIN Experiments e ON m.MissionID = e.MissionID
                GROUP BY m.MissionID, m.MissionName
                HAVING COUNT(e.ExperimentID) > (
                    SELECT AVG(t.cnt) FROM (
                        SELECT COUNT(*) AS cnt FROM Experiments GROUP BY MissionID
                    ) AS t
                )
                LIMIT 500
                "#
            }
        }
    }
}

/// One entry of the trigger-maintained audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub table_name: String,
    pub operation: String,
    pub key_data: String,
    pub new_row: String,
    pub changed_at: String,
}

/// `SHOW TABLES`, known station tables first in console order, extras after.
pub async fn list_tables(client: &dyn DbClient) -> Vec<String> {
    match client.list_tables().await {
        Ok(live) => order_tables(live),
        Err(err) => {
            warn!("cannot list tables, falling back to the known list: {}", err);
            KNOWN_TABLES.iter().map(|t| t.to_string()).collect()
        }
    }
}

pub fn order_tables(live: Vec<String>) -> Vec<String> {
    let mut ordered: Vec<String> = KNOWN_TABLES
        .iter()
        .filter(|known| live.iter().any(|t| t == *known))
        .map(|known| known.to_string())
        .collect();
    let extras: Vec<String> = live
        .into_iter()
        .filter(|t| !KNOWN_TABLES.contains(&t.as_str()))
        .collect();
    ordered.extend(extras);
    ordered
}

/// `SELECT *` over a table; the only kind of result rows can be edited from.
pub async fn load_table(client: &dyn DbClient, table: &str) -> Result<QueryResult, DbError> {
    let sql = format!(
        "SELECT * FROM {} LIMIT {}",
        quote_identifier(table),
        TABLE_ROW_LIMIT
    );
    let result = client.query(&Statement::new(sql)).await?;
    Ok(result.with_source(ResultSource::Table(table.to_string())))
}

pub async fn run_canned(client: &dyn DbClient, query: CannedQuery) -> Result<QueryResult, DbError> {
    let result = client.query(&Statement::new(query.sql())).await?;
    Ok(result.with_source(ResultSource::Canned(query.title().to_string())))
}

pub async fn run_ad_hoc(client: &dyn DbClient, sql: &str) -> Result<QueryResult, DbError> {
    let sql = ensure_read_only(sql)?;
    debug!("ad-hoc query: {}", sql);
    let result = client.query(&Statement::new(sql)).await?;
    Ok(result.with_source(ResultSource::AdHoc))
}

/// Accepts a single statement starting with SELECT (trimmed, any case).
/// A trailing `;` is dropped.
pub fn ensure_read_only(sql: &str) -> Result<&str, DbError> {
    let trimmed = sql.trim();
    let starts_with_select = trimmed
        .get(..6)
        .map_or(false, |head| head.eq_ignore_ascii_case("SELECT"));

    if !starts_with_select {
        warn!("rejected ad-hoc statement: {}", trimmed);
        return Err(DbError::ForbiddenStatement(
            "only read-only SELECT queries are allowed".to_string(),
        ));
    }

    match statement_end(trimmed) {
        Some(end) if !trimmed[end + 1..].trim().is_empty() => {
            warn!("rejected stacked statements: {}", trimmed);
            Err(DbError::ForbiddenStatement(
                "only a single statement is allowed".to_string(),
            ))
        }
        Some(end) => Ok(trimmed[..end].trim_end()),
        None => Ok(trimmed),
    }
}

/// Byte offset of the first `;` outside quotes and comments. Comment rules
/// follow MySQL: `--` needs a following space or control character, and the
/// bodies of `/*! */` and `/*+ */` are code.
fn statement_end(sql: &str) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'\\' && quote != b'`' {
                        i += 2;
                        continue;
                    }
                    if bytes[i] == quote {
                        // A doubled quote is an escaped quote.
                        if bytes.get(i + 1) == Some(&quote) {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
            }
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-')
                && bytes
                    .get(i + 2)
                    .map_or(true, |b| b.is_ascii_whitespace() || b.is_ascii_control()) =>
            {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*')
                && matches!(bytes.get(i + 2), Some(b'!') | Some(b'+')) =>
            {
                i += 2;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 1;
            }
            b';' => return Some(i),
            _ => {}
        }
        i += 1;
    }

    None
}

/// The 200 most recent audit entries, newest first.
pub async fn audit_feed(client: &dyn DbClient) -> Result<Vec<AuditEntry>, DbError> {
    let sql = format!(
        "SELECT AuditID, TableName, Operation, KeyData, NewRow, ChangedAt \
         FROM AuditLog ORDER BY ChangedAt DESC LIMIT {}",
        AUDIT_LIMIT
    );
    let result = client.query(&Statement::new(sql)).await?;

    result
        .rows
        .iter()
        .map(|row| {
            if row.len() < 6 {
                return Err(DbError::Alignment(format!(
                    "audit row has {} columns, expected 6",
                    row.len()
                )));
            }
            Ok(AuditEntry {
                id: display_value(&row[0]),
                table_name: display_value(&row[1]),
                operation: display_value(&row[2]),
                key_data: display_value(&row[3]),
                new_row: display_value(&row[4]),
                changed_at: display_value(&row[5]),
            })
        })
        .collect()
}

impl AuditEntry {
    pub const COLUMNS: [&'static str; 6] = [
        "AuditID",
        "TableName",
        "Operation",
        "KeyData",
        "NewRow",
        "ChangedAt",
    ];

    pub fn cells(&self) -> [&str; 6] {
        [
            &self.id,
            &self.table_name,
            &self.operation,
            &self.key_data,
            &self.new_row,
            &self.changed_at,
        ]
    }
}
