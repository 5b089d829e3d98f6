use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::DbError;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Operator,
    Viewer,
}

/// Actions gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
    CallProcedure,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Insert => "insert rows",
            Operation::Update => "update rows",
            Operation::Delete => "delete rows",
            Operation::CallProcedure => "call procedures",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub can_insert: bool,
    pub can_update: bool,
    pub can_delete: bool,
    pub can_call_procedures: bool,
}

impl Permissions {
    pub fn allows(&self, operation: Operation) -> bool {
        match operation {
            Operation::Insert => self.can_insert,
            Operation::Update => self.can_update,
            Operation::Delete => self.can_delete,
            Operation::CallProcedure => self.can_call_procedures,
        }
    }
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Operator, Role::Viewer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Operator => "operator",
            Role::Viewer => "viewer",
        }
    }

    /// viewer reads only, operator inserts and updates, admin has full CRUD.
    pub fn permissions(&self) -> Permissions {
        match self {
            Role::Admin => Permissions {
                can_insert: true,
                can_update: true,
                can_delete: true,
                can_call_procedures: true,
            },
            Role::Operator => Permissions {
                can_insert: true,
                can_update: true,
                can_delete: false,
                can_call_procedures: true,
            },
            Role::Viewer => Permissions {
                can_insert: false,
                can_update: false,
                can_delete: false,
                can_call_procedures: false,
            },
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "operator" => Ok(Role::Operator),
            "viewer" => Ok(Role::Viewer),
            other => Err(DbError::Auth(format!("unknown role `{}`", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_matrix() {
        let viewer = Role::Viewer.permissions();
        assert!(!viewer.can_insert && !viewer.can_update && !viewer.can_delete);

        let operator = Role::Operator.permissions();
        assert!(operator.can_insert && operator.can_update);
        assert!(!operator.can_delete);

        let admin = Role::Admin.permissions();
        assert!(admin.allows(Operation::Insert));
        assert!(admin.allows(Operation::Update));
        assert!(admin.allows(Operation::Delete));
    }

    #[test]
    fn test_procedures_need_write_role() {
        assert!(Role::Operator.permissions().allows(Operation::CallProcedure));
        assert!(!Role::Viewer.permissions().allows(Operation::CallProcedure));
    }

    #[test]
    fn test_parse_role() {
        assert_eq!(" Admin ".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("viewer".parse::<Role>().unwrap(), Role::Viewer);
        assert!(matches!("root".parse::<Role>(), Err(DbError::Auth(_))));
    }
}
