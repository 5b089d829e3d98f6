use std::env;

use serde_json::json;
use sqlx::Executor;
use srs::crud::{delete_row, CrudForm, FormState};
use srs::db::mysql::MySqlClient;
use srs::db::{DbClient, SqlValue, Statement};
use srs::errors::DbError;
use srs::models::result::ResultSource;
use srs::query;

/// These tests need a scratch MySQL database; they are skipped without one.
fn test_database_url() -> Option<String> {
    dotenv::dotenv().ok();
    match env::var("SRS_TEST_DATABASE_URL") {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!("SRS_TEST_DATABASE_URL not set, skipping");
            None
        }
    }
}

async fn setup_supplies(client: &MySqlClient, table: &str) {
    client
        .pool
        .execute(format!("DROP TABLE IF EXISTS `{}`", table).as_str())
        .await
        .unwrap();
    client
        .pool
        .execute(
            format!(
                r#"
                CREATE TABLE `{}` (
                    SupplyID INT AUTO_INCREMENT PRIMARY KEY,
                    Name VARCHAR(100) NOT NULL,
                    Quantity INT NULL,
                    UnitCost DECIMAL(10,2) NULL
                )
                "#,
                table
            )
            .as_str(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_select_one() {
    let Some(url) = test_database_url() else {
        return;
    };
    let client = MySqlClient::connect(&url).await.unwrap();

    client.ping().await.unwrap();
    let result = client.query(&Statement::new("SELECT 1 AS one")).await.unwrap();
    assert_eq!(result.columns, vec!["one".to_string()]);
    assert_eq!(result.scalar(), Some(&json!(1)));

    client.close().await;
}

#[tokio::test]
async fn test_empty_result_keeps_columns() {
    let Some(url) = test_database_url() else {
        return;
    };
    let client = MySqlClient::connect(&url).await.unwrap();
    setup_supplies(&client, "it_supplies_empty").await;

    let result = query::load_table(&client, "it_supplies_empty").await.unwrap();
    assert!(result.is_empty());
    assert_eq!(result.columns, vec!["SupplyID", "Name", "Quantity", "UnitCost"]);
}

#[tokio::test]
async fn test_describe_and_primary_key() {
    let Some(url) = test_database_url() else {
        return;
    };
    let client = MySqlClient::connect(&url).await.unwrap();
    setup_supplies(&client, "it_supplies_describe").await;

    let schema = client.describe_table("it_supplies_describe").await.unwrap();
    assert_eq!(schema.column_names(), vec!["SupplyID", "Name", "Quantity", "UnitCost"]);
    assert!(schema.columns[0].is_auto_generated);
    assert!(schema.columns[1].is_required());

    let key = client.primary_key_columns("it_supplies_describe").await.unwrap();
    assert_eq!(key, vec!["SupplyID".to_string()]);

    let tables = client.list_tables().await.unwrap();
    assert!(tables.contains(&"it_supplies_describe".to_string()));

    let err = client.describe_table("it_no_such_table").await.unwrap_err();
    assert!(matches!(err, DbError::Schema(_)));
}

#[tokio::test]
async fn test_insert_update_delete_round() {
    let Some(url) = test_database_url() else {
        return;
    };
    let client = MySqlClient::connect(&url).await.unwrap();
    setup_supplies(&client, "it_supplies_crud").await;

    let mut form = CrudForm::open_insert(&client, "it_supplies_crud").await.unwrap();
    form.set_value("Name", "Water").unwrap();
    form.set_value("Quantity", "10").unwrap();
    form.set_value("UnitCost", "2.50").unwrap();
    assert_eq!(form.submit(&client).await.unwrap(), 1);

    let result = query::load_table(&client, "it_supplies_crud").await.unwrap();
    assert_eq!(result.source, ResultSource::Table("it_supplies_crud".to_string()));
    assert_eq!(
        result.display_row(0).unwrap(),
        vec!["1".to_string(), "Water".into(), "10".into(), "2.50".into()]
    );

    let mut form = CrudForm::open_update(&client, &result, 0).await.unwrap();
    form.set_value("Quantity", "7").unwrap();
    form.submit(&client).await.unwrap();
    assert_eq!(form.state(), &FormState::Success { affected: 1 });

    let result = query::load_table(&client, "it_supplies_crud").await.unwrap();
    assert_eq!(result.rows[0][2], json!(7));

    assert_eq!(delete_row(&client, &result, 0).await.unwrap(), 1);
    let result = query::load_table(&client, "it_supplies_crud").await.unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn test_failed_write_rolls_back() {
    let Some(url) = test_database_url() else {
        return;
    };
    let client = MySqlClient::connect(&url).await.unwrap();
    setup_supplies(&client, "it_supplies_rollback").await;

    let insert = Statement::new("INSERT INTO `it_supplies_rollback` (`SupplyID`, `Name`) VALUES (?, ?)")
        .with_params(vec![SqlValue::Int(1), SqlValue::Text("Water".into())]);
    srs::db::execute_write(&client, &insert).await.unwrap();

    let err = srs::db::execute_write(&client, &insert).await.unwrap_err();
    assert!(err.to_string().contains("Duplicate entry"));

    let result = query::load_table(&client, "it_supplies_rollback").await.unwrap();
    assert_eq!(result.row_count(), 1);
}

#[tokio::test]
async fn test_unedited_update_keeps_year_and_fractional_datetime() {
    let Some(url) = test_database_url() else {
        return;
    };
    let client = MySqlClient::connect(&url).await.unwrap();
    client
        .pool
        .execute("DROP TABLE IF EXISTS `it_launches`")
        .await
        .unwrap();
    client
        .pool
        .execute(
            r#"
            CREATE TABLE `it_launches` (
                LaunchID INT AUTO_INCREMENT,
                LaunchedAt DATETIME(6) NOT NULL,
                Yr YEAR NOT NULL,
                Note VARCHAR(50) NULL,
                PRIMARY KEY (LaunchID, LaunchedAt)
            )
            "#,
        )
        .await
        .unwrap();
    client
        .pool
        .execute("INSERT INTO `it_launches` (LaunchedAt, Yr) VALUES ('2024-03-09 14:05:07.123456', 2024)")
        .await
        .unwrap();

    let before = query::load_table(&client, "it_launches").await.unwrap();
    assert!(before.undecoded.is_empty());
    assert_eq!(
        before.display_row(0).unwrap(),
        vec!["1".to_string(), "2024-03-09 14:05:07.123456".into(), "2024".into(), "".into()]
    );

    let mut form = CrudForm::open_update(&client, &before, 0).await.unwrap();
    form.submit(&client).await.unwrap();
    assert!(matches!(form.state(), FormState::Success { .. }));

    let after = query::load_table(&client, "it_launches").await.unwrap();
    assert_eq!(after.rows, before.rows);

    // The full-precision key still matches the stored row.
    let mut form = CrudForm::open_update(&client, &after, 0).await.unwrap();
    form.set_value("Note", "nominal").unwrap();
    assert_eq!(form.submit(&client).await.unwrap(), 1);

    let edited = query::load_table(&client, "it_launches").await.unwrap();
    assert_eq!(edited.rows[0][1], json!("2024-03-09 14:05:07.123456"));
    assert_eq!(edited.rows[0][2], json!(2024));
    assert_eq!(edited.rows[0][3], json!("nominal"));
}
