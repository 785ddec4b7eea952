//! Password handling, sessions and the authorization policy.
//!
//! Every mutating repository call takes a [`Session`] and goes through
//! [`require`], so the role rules live in exactly one place: [`authorize`].

use rusqlite::Connection;
use sha2::{Digest, Sha256};

use crate::activity::{log_activity, ActivityKind};
use crate::error::{ResiduosError, Result};
use crate::models::Role;
use crate::users::get_user;

/// Hex SHA-256; matches hashes already stored by earlier versions.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify_password(stored_hash: &str, candidate: &str) -> bool {
    stored_hash.eq_ignore_ascii_case(&hash_password(candidate))
}

/// Who is acting. Built by [`login`] and passed explicitly to every call.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub username: String,
    pub role: Role,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub fn login(conn: &Connection, username: &str, password: &str) -> Result<Session> {
    let invalid = || ResiduosError::Auth("invalid username or password".to_string());
    let user = get_user(conn, username.trim())?.ok_or_else(invalid)?;
    if !verify_password(&user.password_hash, password) {
        tracing::warn!(user = username, "failed login");
        return Err(invalid());
    }
    Ok(Session {
        username: user.username,
        role: user.role,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    AddRecord,
    EditRecord(i64),
    DeleteRecord(i64),
    DeleteRecords(usize),
    DeleteAllRecords,
    StandardizeRecords,
    ImportSpreadsheet,
    ManageOptions,
    ManageUsers,
    ResetPassword(String),
    ViewActivityLog,
}

impl Action {
    pub fn describe(&self) -> String {
        match self {
            Self::AddRecord => "add record".to_string(),
            Self::EditRecord(id) => format!("edit record {id}"),
            Self::DeleteRecord(id) => format!("delete record {id}"),
            Self::DeleteRecords(n) => format!("delete {n} records"),
            Self::DeleteAllRecords => "delete all records".to_string(),
            Self::StandardizeRecords => "standardize records".to_string(),
            Self::ImportSpreadsheet => "import spreadsheet".to_string(),
            Self::ManageOptions => "manage option lists".to_string(),
            Self::ManageUsers => "manage users".to_string(),
            Self::ResetPassword(target) => format!("reset password of '{target}'"),
            Self::ViewActivityLog => "view activity log".to_string(),
        }
    }

    fn denied_entry(&self, username: &str) -> (ActivityKind, String) {
        match self {
            Self::EditRecord(id) => (
                ActivityKind::EditDenied,
                format!("Usuário sem permissão tentou editar o registro ID {id}."),
            ),
            Self::DeleteRecord(id) => (
                ActivityKind::DeleteDenied,
                format!("Usuário sem permissão tentou excluir o registro ID {id}."),
            ),
            Self::DeleteRecords(_) => (
                ActivityKind::BulkDeleteDenied,
                "Usuário sem permissão tentou excluir múltiplos registros.".to_string(),
            ),
            other => (
                ActivityKind::ActionDenied,
                format!("{username} sem permissão para: {}", other.describe()),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allow,
    Deny(String),
}

pub fn authorize(session: &Session, action: &Action) -> Decision {
    match action {
        Action::AddRecord => Decision::Allow,
        // Unrestricted; the CLI asks for --confirm instead.
        Action::DeleteAllRecords => Decision::Allow,
        Action::ResetPassword(target) if *target == session.username => Decision::Allow,
        _ if session.is_admin() => Decision::Allow,
        _ => Decision::Deny(format!("'{}' does not have the Admin role", session.username)),
    }
}

/// Consult the policy; a denial is written to the audit log before it is returned.
pub fn require(conn: &Connection, session: &Session, action: Action) -> Result<()> {
    match authorize(session, &action) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            let (kind, details) = action.denied_entry(&session.username);
            log_activity(conn, &session.username, kind, &details)?;
            tracing::warn!(user = %session.username, action = %action.describe(), "permission denied");
            Err(ResiduosError::PermissionDenied {
                action: action.describe(),
                reason,
            })
        }
    }
}

#[cfg(test)]
pub(crate) fn admin() -> Session {
    Session {
        username: "Administrador".to_string(),
        role: Role::Admin,
    }
}

#[cfg(test)]
pub(crate) fn operator() -> Session {
    Session {
        username: "operador".to_string(),
        role: Role::User,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::list_activity;
    use crate::db::test_db;
    use crate::users::bootstrap_admin;

    #[test]
    fn test_hash_is_hex_sha256() {
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(verify_password(&hash_password("segredo"), "segredo"));
        assert!(!verify_password(&hash_password("segredo"), "Segredo"));
    }

    #[test]
    fn test_login() {
        let (_dir, conn) = test_db();
        bootstrap_admin(&conn, "Administrador", "admin123").unwrap();
        let session = login(&conn, "Administrador", "admin123").unwrap();
        assert_eq!(session.role, Role::Admin);
        assert!(matches!(login(&conn, "Administrador", "errada"), Err(ResiduosError::Auth(_))));
        assert!(matches!(login(&conn, "ninguem", "admin123"), Err(ResiduosError::Auth(_))));
    }

    #[test]
    fn test_policy() {
        let user = operator();
        let adm = admin();
        assert_eq!(authorize(&user, &Action::AddRecord), Decision::Allow);
        assert!(matches!(authorize(&user, &Action::EditRecord(1)), Decision::Deny(_)));
        assert!(matches!(authorize(&user, &Action::ManageUsers), Decision::Deny(_)));
        assert_eq!(authorize(&user, &Action::DeleteAllRecords), Decision::Allow);
        assert_eq!(
            authorize(&user, &Action::ResetPassword("operador".to_string())),
            Decision::Allow
        );
        assert!(matches!(
            authorize(&user, &Action::ResetPassword("outro".to_string())),
            Decision::Deny(_)
        ));
        assert_eq!(authorize(&adm, &Action::EditRecord(1)), Decision::Allow);
        assert_eq!(authorize(&adm, &Action::ImportSpreadsheet), Decision::Allow);
    }

    #[test]
    fn test_require_logs_denial() {
        let (_dir, conn) = test_db();
        let err = require(&conn, &operator(), Action::DeleteRecord(7)).unwrap_err();
        assert!(matches!(err, ResiduosError::PermissionDenied { .. }));
        let log = list_activity(&conn, None, None).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, "Tentativa de Exclusão Negada");
        assert!(log[0].details.contains("ID 7"));
        assert!(require(&conn, &admin(), Action::DeleteRecord(7)).is_ok());
        assert_eq!(list_activity(&conn, None, None).unwrap().len(), 1);
    }
}
