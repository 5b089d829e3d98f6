use std::str::FromStr;

use log::{error, info};
use rust_decimal::Decimal;

use crate::{
    db::{DbClient, SqlValue, Statement},
    errors::DbError,
    models::result::display_value,
};

pub const ALLOCATE_SUPPLY: &str = "sp_allocate_supply";
pub const CREATE_EXPERIMENT: &str = "sp_create_experiment";
pub const MISSION_DURATION: &str = "fn_mission_duration";
pub const REMAINING_SUPPLY: &str = "fn_remaining_supply";

/// Arguments of `sp_create_experiment`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExperiment {
    pub mission_id: i64,
    pub title: String,
    pub objective: Option<String>,
    pub category: Option<String>,
    pub module_id: Option<i64>,
    pub lead_astronaut_id: Option<i64>,
}

/// Stored routines the console exposes, with the labels of their inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routine {
    AllocateSupply,
    CreateExperiment,
    MissionDuration,
    RemainingSupply,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutineOutcome {
    Done,
    Created(Option<i64>),
    Value(Option<String>),
}

impl Routine {
    pub const ALL: [Routine; 4] = [
        Routine::AllocateSupply,
        Routine::CreateExperiment,
        Routine::MissionDuration,
        Routine::RemainingSupply,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Routine::AllocateSupply => ALLOCATE_SUPPLY,
            Routine::CreateExperiment => CREATE_EXPERIMENT,
            Routine::MissionDuration => MISSION_DURATION,
            Routine::RemainingSupply => REMAINING_SUPPLY,
        }
    }

    pub fn labels(&self) -> &'static [&'static str] {
        match self {
            Routine::AllocateSupply => &["MissionID", "SupplyID", "Qty"],
            Routine::CreateExperiment => &[
                "MissionID",
                "Title",
                "Objective",
                "Category",
                "ModuleID",
                "LeadAstronautID",
            ],
            Routine::MissionDuration => &["MissionID"],
            Routine::RemainingSupply => &["SupplyID"],
        }
    }

    /// Procedures write; functions only read.
    pub fn is_procedure(&self) -> bool {
        matches!(self, Routine::AllocateSupply | Routine::CreateExperiment)
    }

    /// Parses `inputs` (one per label) and invokes the routine.
    pub async fn invoke(
        &self,
        client: &dyn DbClient,
        inputs: &[String],
    ) -> Result<RoutineOutcome, DbError> {
        if inputs.len() != self.labels().len() {
            return Err(DbError::Validation(format!(
                "{} takes {} inputs, got {}",
                self.name(),
                self.labels().len(),
                inputs.len()
            )));
        }

        match self {
            Routine::AllocateSupply => {
                let mission_id = parse_id("MissionID", &inputs[0])?;
                let supply_id = parse_id("SupplyID", &inputs[1])?;
                let quantity = parse_decimal("Qty", &inputs[2])?;
                allocate_supply(client, mission_id, supply_id, quantity).await?;
                Ok(RoutineOutcome::Done)
            }
            Routine::CreateExperiment => {
                let experiment = NewExperiment {
                    mission_id: parse_id("MissionID", &inputs[0])?,
                    title: inputs[1].trim().to_string(),
                    objective: optional_text(&inputs[2]),
                    category: optional_text(&inputs[3]),
                    module_id: parse_optional_id("ModuleID", &inputs[4])?,
                    lead_astronaut_id: parse_optional_id("LeadAstronautID", &inputs[5])?,
                };
                Ok(RoutineOutcome::Created(create_experiment(client, &experiment).await?))
            }
            Routine::MissionDuration => {
                let mission_id = parse_id("MissionID", &inputs[0])?;
                Ok(RoutineOutcome::Value(mission_duration(client, mission_id).await?))
            }
            Routine::RemainingSupply => {
                let supply_id = parse_id("SupplyID", &inputs[0])?;
                Ok(RoutineOutcome::Value(remaining_supply(client, supply_id).await?))
            }
        }
    }
}

pub async fn allocate_supply(
    client: &dyn DbClient,
    mission_id: i64,
    supply_id: i64,
    quantity: Decimal,
) -> Result<(), DbError> {
    let args = [
        SqlValue::Int(mission_id),
        SqlValue::Int(supply_id),
        SqlValue::Decimal(quantity),
    ];
    call_in_transaction(client, ALLOCATE_SUPPLY, &args, 0).await?;
    Ok(())
}

/// Returns the new ExperimentID reported through the procedure's OUT parameter.
pub async fn create_experiment(
    client: &dyn DbClient,
    experiment: &NewExperiment,
) -> Result<Option<i64>, DbError> {
    let args = [
        SqlValue::Int(experiment.mission_id),
        SqlValue::Text(experiment.title.clone()),
        SqlValue::from(experiment.objective.clone()),
        SqlValue::from(experiment.category.clone()),
        experiment.module_id.map_or(SqlValue::Null, SqlValue::Int),
        experiment.lead_astronaut_id.map_or(SqlValue::Null, SqlValue::Int),
    ];
    let out = call_in_transaction(client, CREATE_EXPERIMENT, &args, 1).await?;

    Ok(out.first().and_then(|value| match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

/// NULL from the function (e.g. no such mission) comes back as `None`.
pub async fn mission_duration(client: &dyn DbClient, mission_id: i64) -> Result<Option<String>, DbError> {
    scalar_function(client, MISSION_DURATION, mission_id).await
}

pub async fn remaining_supply(client: &dyn DbClient, supply_id: i64) -> Result<Option<String>, DbError> {
    scalar_function(client, REMAINING_SUPPLY, supply_id).await
}

async fn scalar_function(client: &dyn DbClient, name: &str, id: i64) -> Result<Option<String>, DbError> {
    let statement = Statement::new(format!("SELECT {}(?)", name)).bind(SqlValue::Int(id));
    let result = client.query(&statement).await?;
    Ok(result.scalar().map(display_value))
}

async fn call_in_transaction(
    client: &dyn DbClient,
    name: &str,
    args: &[SqlValue],
    out_params: usize,
) -> Result<Vec<serde_json::Value>, DbError> {
    let mut tx = client.begin_transaction().await?;

    match tx.call_procedure(name, args, out_params).await {
        Ok(out) => {
            tx.commit_transaction().await?;
            info!("{} committed", name);
            Ok(out)
        }
        Err(err) => {
            error!("{} failed, rolling back: {}", name, err);
            if let Err(rollback_err) = tx.rollback_transaction().await {
                error!("rollback failed: {}", rollback_err);
            }
            Err(err)
        }
    }
}

fn parse_id(label: &str, input: &str) -> Result<i64, DbError> {
    input
        .trim()
        .parse()
        .map_err(|_| DbError::Validation(format!("{} must be an integer", label)))
}

fn parse_optional_id(label: &str, input: &str) -> Result<Option<i64>, DbError> {
    if input.trim().is_empty() {
        Ok(None)
    } else {
        parse_id(label, input).map(Some)
    }
}

fn parse_decimal(label: &str, input: &str) -> Result<Decimal, DbError> {
    Decimal::from_str(input.trim())
        .map_err(|_| DbError::Validation(format!("{} must be a number", label)))
}

fn optional_text(input: &str) -> Option<String> {
    let trimmed = input.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::db::mock::{MockDbClientMock, MockTransaction};
    use crate::models::result::QueryResult;

    fn inputs(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_allocate_supply_commits() {
        let mut tx = MockTransaction::new();
        tx.expect_call_procedure()
            .withf(|name, args, out_params| {
                name == ALLOCATE_SUPPLY
                    && args
                        == [
                            SqlValue::Int(1),
                            SqlValue::Int(2),
                            SqlValue::Decimal(Decimal::from_str("3.5").unwrap()),
                        ]
                    && *out_params == 0
            })
            .times(1)
            .returning(|_, _, _| Ok(Vec::new()));
        tx.expect_commit_transaction().times(1).returning(|| Ok(()));

        let mut mock_db = MockDbClientMock::new();
        mock_db
            .expect_begin_transaction()
            .return_once(move || Ok(Box::new(tx)));

        let outcome = Routine::AllocateSupply
            .invoke(&mock_db, &inputs(&["1", "2", "3.5"]))
            .await
            .unwrap();
        assert_eq!(outcome, RoutineOutcome::Done);
    }

    #[tokio::test]
    async fn test_allocate_supply_rejects_bad_input_before_calling() {
        let mut mock_db = MockDbClientMock::new();
        mock_db.expect_begin_transaction().never();

        let err = Routine::AllocateSupply
            .invoke(&mock_db, &inputs(&["one", "2", "3"]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation error: MissionID must be an integer");
    }

    #[tokio::test]
    async fn test_procedure_error_rolls_back() {
        let mut tx = MockTransaction::new();
        tx.expect_call_procedure()
            .returning(|_, _, _| Err(DbError::Transaction("Insufficient stock".into())));
        tx.expect_rollback_transaction().times(1).returning(|| Ok(()));
        tx.expect_commit_transaction().never();

        let mut mock_db = MockDbClientMock::new();
        mock_db
            .expect_begin_transaction()
            .return_once(move || Ok(Box::new(tx)));

        let err = allocate_supply(&mock_db, 1, 2, Decimal::from(500)).await.unwrap_err();
        assert!(err.to_string().contains("Insufficient stock"));
    }

    #[tokio::test]
    async fn test_create_experiment_returns_new_id() {
        let mut tx = MockTransaction::new();
        tx.expect_call_procedure()
            .withf(|name, args, out_params| {
                name == CREATE_EXPERIMENT
                    && args.len() == 6
                    && args[2] == SqlValue::Null
                    && args[4] == SqlValue::Int(3)
                    && args[5] == SqlValue::Null
                    && *out_params == 1
            })
            .returning(|_, _, _| Ok(vec![json!(17)]));
        tx.expect_commit_transaction().returning(|| Ok(()));

        let mut mock_db = MockDbClientMock::new();
        mock_db
            .expect_begin_transaction()
            .return_once(move || Ok(Box::new(tx)));

        let outcome = Routine::CreateExperiment
            .invoke(&mock_db, &inputs(&["4", "Crystal growth", "", "Materials", "3", ""]))
            .await
            .unwrap();
        assert_eq!(outcome, RoutineOutcome::Created(Some(17)));
    }

    #[tokio::test]
    async fn test_mission_duration_null_is_none() {
        let mut mock_db = MockDbClientMock::new();
        mock_db
            .expect_query()
            .withf(|statement: &Statement| {
                statement.sql == "SELECT fn_mission_duration(?)"
                    && statement.params == vec![SqlValue::Int(42)]
            })
            .returning(|_| {
                Ok(QueryResult {
                    columns: vec!["fn_mission_duration(?)".into()],
                    rows: vec![vec![Value::Null]],
                    ..Default::default()
                })
            });

        assert_eq!(mission_duration(&mock_db, 42).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remaining_supply_value() {
        let mut mock_db = MockDbClientMock::new();
        mock_db.expect_query().returning(|_| {
            Ok(QueryResult {
                columns: vec!["fn_remaining_supply(?)".into()],
                rows: vec![vec![json!("120.00")]],
                ..Default::default()
            })
        });

        let outcome = Routine::RemainingSupply
            .invoke(&mock_db, &inputs(&[" 9 "]))
            .await
            .unwrap();
        assert_eq!(outcome, RoutineOutcome::Value(Some("120.00".to_string())));
    }

    #[test]
    fn test_routine_catalog() {
        assert!(Routine::AllocateSupply.is_procedure());
        assert!(!Routine::MissionDuration.is_procedure());
        assert_eq!(Routine::CreateExperiment.labels().len(), 6);
        assert_eq!(optional_text("  "), None);
        assert_eq!(parse_optional_id("ModuleID", "").unwrap(), None);
        assert!(parse_decimal("Qty", "a lot").is_err());
    }
}
