use log::{info, warn};

use crate::{
    crud::{self, CrudForm},
    db::{mysql::MySqlClient, DbClient},
    errors::DbError,
    models::{
        connections::AppConfig,
        result::QueryResult,
        role::{Operation, Permissions, Role},
    },
    routines::{Routine, RoutineOutcome},
};

/// One authenticated connection and the role it was opened under.
/// Every write goes through a role check before it reaches the database.
pub struct Session {
    role: Role,
    client: Box<dyn DbClient>,
}

impl Session {
    /// Opens a connection with the role's credentials and checks it with a ping.
    pub async fn connect(config: &AppConfig, role: Role) -> Result<Self, DbError> {
        let client = MySqlClient::connect_with(config.connect_options(role)).await?;
        if let Err(err) = client.ping().await {
            client.close().await;
            return Err(err);
        }

        info!("logged in as {} on {}:{}/{}", role, config.host, config.port, config.database);
        Ok(Self::with_client(role, Box::new(client)))
    }

    pub fn with_client(role: Role, client: Box<dyn DbClient>) -> Self {
        Self { role, client }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn permissions(&self) -> Permissions {
        self.role.permissions()
    }

    pub fn client(&self) -> &dyn DbClient {
        self.client.as_ref()
    }

    pub fn require(&self, operation: Operation) -> Result<(), DbError> {
        if self.permissions().allows(operation) {
            Ok(())
        } else {
            warn!("{} denied: cannot {}", self.role, operation);
            Err(DbError::Auth(format!("role {} cannot {}", self.role, operation)))
        }
    }

    pub async fn open_insert_form(&self, table: &str) -> Result<CrudForm, DbError> {
        self.require(Operation::Insert)?;
        CrudForm::open_insert(self.client(), table).await
    }

    pub async fn open_update_form(&self, result: &QueryResult, row_index: usize) -> Result<CrudForm, DbError> {
        self.require(Operation::Update)?;
        CrudForm::open_update(self.client(), result, row_index).await
    }

    /// The role is checked again at submit time.
    pub async fn submit(&self, form: &mut CrudForm) -> Result<u64, DbError> {
        self.require(match form.mode() {
            crud::FormMode::Insert => Operation::Insert,
            crud::FormMode::Update => Operation::Update,
        })?;
        form.submit(self.client()).await
    }

    pub async fn delete_row(&self, result: &QueryResult, row_index: usize) -> Result<u64, DbError> {
        self.require(Operation::Delete)?;
        crud::delete_row(self.client(), result, row_index).await
    }

    /// Procedures need the procedure permission; functions are open to every role.
    pub async fn call(&self, routine: Routine, inputs: &[String]) -> Result<RoutineOutcome, DbError> {
        if routine.is_procedure() {
            self.require(Operation::CallProcedure)?;
        }
        routine.invoke(self.client(), inputs).await
    }

    pub async fn close(self) {
        self.client.close().await;
        info!("{} session closed", self.role);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db::mock::{supplies_schema, MockDbClientMock};
    use crate::models::result::ResultSource;

    fn supplies_result() -> QueryResult {
        QueryResult {
            source: ResultSource::Table("Supplies".to_string()),
            columns: vec!["SupplyID".into(), "Name".into(), "Quantity".into()],
            rows: vec![vec![json!(5), json!("Water"), json!(10)]],
            ..Default::default()
        }
    }

    fn untouched_client() -> MockDbClientMock {
        let mut mock_db = MockDbClientMock::new();
        mock_db.expect_describe_table().never();
        mock_db.expect_begin_transaction().never();
        mock_db.expect_query().never();
        mock_db
    }

    #[tokio::test]
    async fn test_viewer_cannot_write() {
        let session = Session::with_client(Role::Viewer, Box::new(untouched_client()));

        assert!(matches!(session.open_insert_form("Supplies").await, Err(DbError::Auth(_))));
        assert!(matches!(
            session.open_update_form(&supplies_result(), 0).await,
            Err(DbError::Auth(_))
        ));
        assert!(matches!(session.delete_row(&supplies_result(), 0).await, Err(DbError::Auth(_))));
        assert!(matches!(
            session
                .call(Routine::AllocateSupply, &["1".into(), "2".into(), "3".into()])
                .await,
            Err(DbError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_operator_cannot_delete() {
        let session = Session::with_client(Role::Operator, Box::new(untouched_client()));
        let err = session.delete_row(&supplies_result(), 0).await.unwrap_err();
        assert_eq!(err.to_string(), "Authentication error: role operator cannot delete rows");
    }

    #[tokio::test]
    async fn test_viewer_can_call_functions() {
        let mut mock_db = MockDbClientMock::new();
        mock_db.expect_query().times(1).returning(|_| {
            Ok(QueryResult {
                columns: vec!["fn_mission_duration(?)".into()],
                rows: vec![vec![json!(180)]],
                ..Default::default()
            })
        });

        let session = Session::with_client(Role::Viewer, Box::new(mock_db));
        let outcome = session.call(Routine::MissionDuration, &["3".into()]).await.unwrap();
        assert_eq!(outcome, RoutineOutcome::Value(Some("180".to_string())));
    }

    #[tokio::test]
    async fn test_operator_opens_insert_form() {
        let mut mock_db = MockDbClientMock::new();
        mock_db
            .expect_describe_table()
            .returning(|_| Ok(supplies_schema()));

        let session = Session::with_client(Role::Operator, Box::new(mock_db));
        let form = session.open_insert_form("Supplies").await.unwrap();
        assert_eq!(form.table(), "Supplies");
    }

    #[tokio::test]
    async fn test_close_closes_client() {
        let mut mock_db = MockDbClientMock::new();
        mock_db.expect_close().times(1).returning(|| ());

        Session::with_client(Role::Admin, Box::new(mock_db)).close().await;
    }
}
