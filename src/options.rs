use rusqlite::Connection;

use crate::activity::{log_activity, ActivityKind};
use crate::auth::{require, Action, Session};
use crate::error::{ResiduosError, Result};
use crate::models::OptionList;
use crate::text::standardize;

pub fn list_options(conn: &Connection, kind: OptionList) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("SELECT name FROM {} ORDER BY name ASC", kind.table()))?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(names)
}

/// Returns the stored (title-cased) name.
pub fn add_option(conn: &Connection, session: &Session, kind: OptionList, name: &str) -> Result<String> {
    require(conn, session, Action::ManageOptions)?;
    let name = standardize(name);
    if name.is_empty() {
        return Err(ResiduosError::Validation("option name cannot be empty".to_string()));
    }
    let tx = conn.unchecked_transaction()?;
    tx.execute(&format!("INSERT INTO {} (name) VALUES (?1)", kind.table()), [&name])
        .map_err(|e| ResiduosError::from_insert(e, &format!("{} '{name}'", kind.label())))?;
    log_activity(
        &tx,
        &session.username,
        ActivityKind::OptionAdded,
        &format!("{}: '{name}'", kind.label()),
    )?;
    tx.commit()?;
    Ok(name)
}

/// Existing records keep their copy of the label.
pub fn remove_option(conn: &Connection, session: &Session, kind: OptionList, name: &str) -> Result<()> {
    require(conn, session, Action::ManageOptions)?;
    let tx = conn.unchecked_transaction()?;
    let removed = tx.execute(&format!("DELETE FROM {} WHERE name = ?1", kind.table()), [name.trim()])?;
    if removed == 0 {
        return Err(ResiduosError::NotFound(format!("{} '{}'", kind.label(), name.trim())));
    }
    log_activity(
        &tx,
        &session.username,
        ActivityKind::OptionRemoved,
        &format!("{}: '{}'", kind.label(), name.trim()),
    )?;
    tx.commit()?;
    Ok(())
}

/// Distinct non-empty values of a dimension column as they occur in records.
pub fn distinct_values(conn: &Connection, column: DistinctField) -> Result<Vec<String>> {
    let col = column.column();
    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT {col} FROM registros WHERE {col} IS NOT NULL AND {col} != '' ORDER BY {col} ASC"
    ))?;
    let values = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(values)
}

/// Columns of `registros` that can be listed with [`distinct_values`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistinctField {
    Dimension(OptionList),
    OperationType,
    CreatedBy,
}

impl DistinctField {
    fn column(&self) -> &'static str {
        match self {
            Self::Dimension(kind) => kind.record_column(),
            Self::OperationType => "tipo_operacao",
            Self::CreatedBy => "usuario_lancamento",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{admin, operator};
    use crate::db::test_db;

    #[test]
    fn test_failed_audit_rolls_back_option() {
        let (_dir, conn) = test_db();
        conn.execute_batch("DROP TABLE activity_log").unwrap();
        assert!(add_option(&conn, &admin(), OptionList::Product, "sucata").is_err());
        assert!(list_options(&conn, OptionList::Product).unwrap().is_empty());
    }

    #[test]
    fn test_add_list_remove() {
        let (_dir, conn) = test_db();
        assert_eq!(add_option(&conn, &admin(), OptionList::Regional, "  norte ").unwrap(), "Norte");
        add_option(&conn, &admin(), OptionList::Regional, "SUL").unwrap();
        assert_eq!(list_options(&conn, OptionList::Regional).unwrap(), vec!["Norte", "Sul"]);
        assert!(list_options(&conn, OptionList::Unit).unwrap().is_empty());

        remove_option(&conn, &admin(), OptionList::Regional, "Norte").unwrap();
        assert_eq!(list_options(&conn, OptionList::Regional).unwrap(), vec!["Sul"]);
        let err = remove_option(&conn, &admin(), OptionList::Regional, "Norte").unwrap_err();
        assert!(matches!(err, ResiduosError::NotFound(_)));
    }

    #[test]
    fn test_duplicate_option_reported() {
        let (_dir, conn) = test_db();
        add_option(&conn, &admin(), OptionList::Unit, "kg").unwrap();
        let err = add_option(&conn, &admin(), OptionList::Unit, "KG").unwrap_err();
        assert!(matches!(err, ResiduosError::Duplicate(_)));
    }

    #[test]
    fn test_blank_option_rejected() {
        let (_dir, conn) = test_db();
        let err = add_option(&conn, &admin(), OptionList::Product, "   ").unwrap_err();
        assert!(matches!(err, ResiduosError::Validation(_)));
    }

    #[test]
    fn test_options_require_admin() {
        let (_dir, conn) = test_db();
        let err = add_option(&conn, &operator(), OptionList::Product, "Sucata").unwrap_err();
        assert!(matches!(err, ResiduosError::PermissionDenied { .. }));
    }

    #[test]
    fn test_removing_option_keeps_records() {
        let (_dir, conn) = test_db();
        add_option(&conn, &admin(), OptionList::Product, "Sucata").unwrap();
        conn.execute(
            "INSERT INTO registros (data, produto, quantidade) VALUES ('2024-01-25', 'Sucata', 1.0)",
            [],
        )
        .unwrap();
        remove_option(&conn, &admin(), OptionList::Product, "Sucata").unwrap();
        let products = distinct_values(&conn, DistinctField::Dimension(OptionList::Product)).unwrap();
        assert_eq!(products, vec!["Sucata"]);
    }
}
