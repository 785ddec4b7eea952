use rusqlite::{Connection, OptionalExtension};

use crate::activity::{log_activity, ActivityKind};
use crate::auth::{hash_password, require, Action, Session};
use crate::error::{ResiduosError, Result};
use crate::models::{Role, User};

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        role: row.get(3)?,
    })
}

pub fn get_user(conn: &Connection, username: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, username, password_hash, role FROM users WHERE username = ?1",
            [username],
            map_user,
        )
        .optional()?;
    Ok(user)
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare("SELECT id, username, password_hash, role FROM users ORDER BY username ASC")?;
    let users = stmt
        .query_map([], map_user)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(users)
}

pub fn user_count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT count(*) FROM users", [], |r| r.get(0))?)
}

fn validate_credentials(username: &str, password: &str) -> Result<()> {
    if username.trim().is_empty() || password.is_empty() {
        return Err(ResiduosError::Validation(
            "username and password cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn insert_user(conn: &Connection, username: &str, password: &str, role: Role) -> Result<i64> {
    conn.execute(
        "INSERT INTO users (username, password_hash, role) VALUES (?1, ?2, ?3)",
        rusqlite::params![username, hash_password(password), role.as_str()],
    )
    .map_err(|e| ResiduosError::from_insert(e, &format!("user '{username}'")))?;
    Ok(conn.last_insert_rowid())
}

/// Create the first Admin. Returns false when users already exist.
pub fn bootstrap_admin(conn: &Connection, username: &str, password: &str) -> Result<bool> {
    validate_credentials(username, password)?;
    if user_count(conn)? > 0 {
        return Ok(false);
    }
    let username = username.trim();
    let tx = conn.unchecked_transaction()?;
    insert_user(&tx, username, password, Role::Admin)?;
    log_activity(&tx, username, ActivityKind::UserCreated, &format!("Usuário '{username}' criado como Admin."))?;
    tx.commit()?;
    tracing::info!(user = username, "bootstrap admin created");
    Ok(true)
}

pub fn add_user(conn: &Connection, session: &Session, username: &str, password: &str, role: Role) -> Result<i64> {
    require(conn, session, Action::ManageUsers)?;
    validate_credentials(username, password)?;
    let username = username.trim();
    let tx = conn.unchecked_transaction()?;
    let id = insert_user(&tx, username, password, role)?;
    log_activity(
        &tx,
        &session.username,
        ActivityKind::UserCreated,
        &format!("Usuário '{username}' criado com a função '{role}'."),
    )?;
    tx.commit()?;
    Ok(id)
}

fn ensure_exists(conn: &Connection, target: &str) -> Result<()> {
    if get_user(conn, target)?.is_none() {
        return Err(ResiduosError::NotFound(format!("user '{target}'")));
    }
    Ok(())
}

pub fn reset_password(conn: &Connection, session: &Session, target: &str, new_password: &str) -> Result<()> {
    require(conn, session, Action::ResetPassword(target.to_string()))?;
    if new_password.is_empty() {
        return Err(ResiduosError::Validation("new password cannot be empty".to_string()));
    }
    ensure_exists(conn, target)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE users SET password_hash = ?1 WHERE username = ?2",
        rusqlite::params![hash_password(new_password), target],
    )?;
    log_activity(
        &tx,
        &session.username,
        ActivityKind::PasswordReset,
        &format!("Senha do usuário '{target}' foi resetada."),
    )?;
    tx.commit()?;
    Ok(())
}

pub fn set_role(conn: &Connection, session: &Session, target: &str, role: Role) -> Result<()> {
    require(conn, session, Action::ManageUsers)?;
    if target == session.username && role != Role::Admin {
        return Err(ResiduosError::Validation("you cannot remove your own Admin role".to_string()));
    }
    ensure_exists(conn, target)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE users SET role = ?1 WHERE username = ?2",
        rusqlite::params![role.as_str(), target],
    )?;
    log_activity(
        &tx,
        &session.username,
        ActivityKind::RoleChanged,
        &format!("Função do usuário '{target}' alterada para '{role}'."),
    )?;
    tx.commit()?;
    Ok(())
}

pub fn delete_user(conn: &Connection, session: &Session, target: &str) -> Result<()> {
    require(conn, session, Action::ManageUsers)?;
    if target == session.username {
        return Err(ResiduosError::Validation("you cannot delete your own account".to_string()));
    }
    ensure_exists(conn, target)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM users WHERE username = ?1", [target])?;
    log_activity(
        &tx,
        &session.username,
        ActivityKind::UserDeleted,
        &format!("Usuário '{target}' foi excluído."),
    )?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{admin, login, operator};
    use crate::db::test_db;

    fn seeded() -> (tempfile::TempDir, Connection) {
        let (dir, conn) = test_db();
        bootstrap_admin(&conn, "Administrador", "admin123").unwrap();
        (dir, conn)
    }

    #[test]
    fn test_failed_audit_rolls_back_user_changes() {
        let (_dir, conn) = seeded();
        add_user(&conn, &admin(), "operador", "op123", Role::User).unwrap();
        conn.execute_batch("DROP TABLE activity_log").unwrap();

        assert!(add_user(&conn, &admin(), "novo", "x", Role::User).is_err());
        assert!(get_user(&conn, "novo").unwrap().is_none());
        assert!(set_role(&conn, &admin(), "operador", Role::Admin).is_err());
        assert_eq!(get_user(&conn, "operador").unwrap().unwrap().role, Role::User);
        assert!(delete_user(&conn, &admin(), "operador").is_err());
        assert!(get_user(&conn, "operador").unwrap().is_some());
    }

    #[test]
    fn test_bootstrap_only_once() {
        let (_dir, conn) = seeded();
        assert!(!bootstrap_admin(&conn, "outro", "x").unwrap());
        assert_eq!(user_count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_add_user_and_duplicate() {
        let (_dir, conn) = seeded();
        add_user(&conn, &admin(), "operador", "op123", Role::User).unwrap();
        let err = add_user(&conn, &admin(), "operador", "op456", Role::User).unwrap_err();
        assert!(matches!(err, ResiduosError::Duplicate(_)));
        let names: Vec<String> = list_users(&conn).unwrap().into_iter().map(|u| u.username).collect();
        assert_eq!(names, vec!["Administrador", "operador"]);
    }

    #[test]
    fn test_add_user_requires_admin() {
        let (_dir, conn) = seeded();
        let err = add_user(&conn, &operator(), "novo", "x", Role::User).unwrap_err();
        assert!(matches!(err, ResiduosError::PermissionDenied { .. }));
        assert!(get_user(&conn, "novo").unwrap().is_none());
    }

    #[test]
    fn test_add_user_rejects_blank() {
        let (_dir, conn) = seeded();
        let err = add_user(&conn, &admin(), "  ", "x", Role::User).unwrap_err();
        assert!(matches!(err, ResiduosError::Validation(_)));
    }

    #[test]
    fn test_reset_password_self_and_admin() {
        let (_dir, conn) = seeded();
        add_user(&conn, &admin(), "operador", "op123", Role::User).unwrap();
        reset_password(&conn, &operator(), "operador", "nova").unwrap();
        assert!(login(&conn, "operador", "nova").is_ok());
        let err = reset_password(&conn, &operator(), "Administrador", "x").unwrap_err();
        assert!(matches!(err, ResiduosError::PermissionDenied { .. }));
        reset_password(&conn, &admin(), "operador", "outra").unwrap();
        assert!(login(&conn, "operador", "outra").is_ok());
        let err = reset_password(&conn, &admin(), "fantasma", "x").unwrap_err();
        assert!(matches!(err, ResiduosError::NotFound(_)));
    }

    #[test]
    fn test_set_role_and_delete() {
        let (_dir, conn) = seeded();
        add_user(&conn, &admin(), "operador", "op123", Role::User).unwrap();
        set_role(&conn, &admin(), "operador", Role::Admin).unwrap();
        assert_eq!(get_user(&conn, "operador").unwrap().unwrap().role, Role::Admin);
        assert!(set_role(&conn, &admin(), "Administrador", Role::User).is_err());
        assert!(delete_user(&conn, &admin(), "Administrador").is_err());
        delete_user(&conn, &admin(), "operador").unwrap();
        assert!(get_user(&conn, "operador").unwrap().is_none());
    }
}
