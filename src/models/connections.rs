use std::{env, fs, path::Path};

use serde::{Deserialize, Serialize};
use sqlx::mysql::MySqlConnectOptions;

use crate::{errors::DbError, models::role::Role};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Credentials {
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RoleCredentials {
    pub admin: Credentials,
    pub operator: Credentials,
    pub viewer: Credentials,
}

impl RoleCredentials {
    pub fn for_role(&self, role: Role) -> &Credentials {
        match role {
            Role::Admin => &self.admin,
            Role::Operator => &self.operator,
            Role::Viewer => &self.viewer,
        }
    }
}

/// Process-wide connection settings, loaded once at startup.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: String,
    pub roles: RoleCredentials,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_database() -> String {
    "srsdb".to_string()
}

impl AppConfig {
    /// Reads `SRS_CONFIG` (a JSON file) when set, the `SRS_*` environment otherwise.
    pub fn load() -> Result<Self, DbError> {
        match env::var("SRS_CONFIG") {
            Ok(path) => Self::from_json_file(path),
            Err(_) => Self::from_lookup(|key| env::var(key).ok()),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| DbError::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw).map_err(|e| DbError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, DbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("SRS_DB_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| DbError::Config(format!("SRS_DB_PORT is not a port: `{}`", raw)))?,
            None => default_port(),
        };

        let credentials = |role: Role| {
            let prefix = format!("SRS_{}", role.as_str().to_ascii_uppercase());
            Credentials {
                user: lookup(&format!("{}_USER", prefix))
                    .unwrap_or_else(|| format!("{}_srs", role.as_str())),
                password: lookup(&format!("{}_PASSWORD", prefix)),
            }
        };

        Ok(Self {
            host: lookup("SRS_DB_HOST").unwrap_or_else(default_host),
            port,
            database: lookup("SRS_DB_NAME").unwrap_or_else(default_database),
            roles: RoleCredentials {
                admin: credentials(Role::Admin),
                operator: credentials(Role::Operator),
                viewer: credentials(Role::Viewer),
            },
        })
    }

    pub fn connect_options(&self, role: Role) -> MySqlConnectOptions {
        let credentials = self.roles.for_role(role);
        let options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&credentials.user);

        match &credentials.password {
            Some(password) => options.password(password),
            None => options,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, io::Write};

    use super::*;

    #[test]
    fn test_defaults_from_empty_environment() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 3306);
        assert_eq!(config.database, "srsdb");
        assert_eq!(config.roles.for_role(Role::Operator).user, "operator_srs");
        assert_eq!(config.roles.viewer.password, None);
    }

    #[test]
    fn test_environment_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SRS_DB_HOST", "db.station"),
            ("SRS_DB_PORT", "3307"),
            ("SRS_ADMIN_USER", "chief"),
            ("SRS_ADMIN_PASSWORD", "Admin@123"),
        ]
        .into_iter()
        .collect();

        let config = AppConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.host, "db.station");
        assert_eq!(config.port, 3307);
        assert_eq!(config.roles.admin.user, "chief");
        assert_eq!(config.roles.admin.password.as_deref(), Some("Admin@123"));
    }

    #[test]
    fn test_bad_port_is_config_error() {
        let result = AppConfig::from_lookup(|key| (key == "SRS_DB_PORT").then(|| "space".to_string()));
        assert!(matches!(result, Err(DbError::Config(_))));
    }

    #[test]
    fn test_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "database": "srs_test",
                "roles": {{
                    "admin": {{ "user": "a", "password": "pa" }},
                    "operator": {{ "user": "o" }},
                    "viewer": {{ "user": "v" }}
                }}
            }}"#
        )
        .unwrap();

        let config = AppConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.database, "srs_test");
        assert_eq!(config.roles.admin.password.as_deref(), Some("pa"));
        assert_eq!(config.roles.operator.password, None);
    }

    #[test]
    fn test_missing_json_file() {
        let result = AppConfig::from_json_file("/nonexistent/srs.json");
        assert!(matches!(result, Err(DbError::Config(_))));
    }
}
