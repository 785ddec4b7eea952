use rusqlite::Connection;

use crate::error::Result;
use crate::models::ActivityEntry;

/// Audit trail action kinds. Labels are what lands in `activity_log.action`
/// and must stay stable: older databases already hold them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    RecordAdded,
    RecordEdited,
    RecordDeleted,
    RecordsDeleted,
    AllRecordsDeleted,
    RecordsStandardized,
    SpreadsheetImported,
    EditDenied,
    DeleteDenied,
    BulkDeleteDenied,
    ActionDenied,
    OptionAdded,
    OptionRemoved,
    UserCreated,
    UserDeleted,
    PasswordReset,
    RoleChanged,
}

impl ActivityKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::RecordAdded => "Adicionar Registro",
            Self::RecordEdited => "Editar Registro",
            Self::RecordDeleted => "Excluir Registro",
            Self::RecordsDeleted => "Excluir Múltiplos Registros",
            Self::AllRecordsDeleted => "Excluir Todos os Registros",
            Self::RecordsStandardized => "Padronizar Registros",
            Self::SpreadsheetImported => "Importação de Planilha",
            Self::EditDenied => "Tentativa de Edição Negada",
            Self::DeleteDenied => "Tentativa de Exclusão Negada",
            Self::BulkDeleteDenied => "Tentativa de Exclusão em Massa Negada",
            Self::ActionDenied => "Ação Negada",
            Self::OptionAdded => "Adicionar Opção",
            Self::OptionRemoved => "Remover Opção",
            Self::UserCreated => "Criar Usuário",
            Self::UserDeleted => "Excluir Usuário",
            Self::PasswordReset => "Reset de Senha",
            Self::RoleChanged => "Atualizar Função",
        }
    }
}

pub fn log_activity(conn: &Connection, user_name: &str, kind: ActivityKind, details: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO activity_log (timestamp, user_name, action, details) VALUES (datetime('now'), ?1, ?2, ?3)",
        rusqlite::params![user_name, kind.label(), details],
    )?;
    tracing::debug!(user = user_name, action = kind.label(), details, "activity logged");
    Ok(())
}

/// Newest first. `limit` of `None` returns everything.
pub fn list_activity(conn: &Connection, limit: Option<u32>, user: Option<&str>) -> Result<Vec<ActivityEntry>> {
    let mut sql = String::from(
        "SELECT id, COALESCE(timestamp, ''), user_name, action, COALESCE(details, '') FROM activity_log",
    );
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    if let Some(u) = user {
        params.push(Box::new(u.to_string()));
        sql.push_str(" WHERE user_name = ?1");
    }
    sql.push_str(" ORDER BY timestamp DESC, id DESC");
    if let Some(n) = limit {
        params.push(Box::new(n as i64));
        sql.push_str(&format!(" LIMIT ?{}", params.len()));
    }
    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(ActivityEntry {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                user_name: row.get(2)?,
                action: row.get(3)?,
                details: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    #[test]
    fn test_log_and_list() {
        let (_dir, conn) = test_db();
        log_activity(&conn, "ana", ActivityKind::RecordAdded, "ID do novo registro: 1").unwrap();
        log_activity(&conn, "bruno", ActivityKind::EditDenied, "registro 1").unwrap();
        log_activity(&conn, "ana", ActivityKind::RecordDeleted, "registro 1").unwrap();

        let all = list_activity(&conn, None, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].action, "Excluir Registro");
        assert_eq!(all[2].action, "Adicionar Registro");

        let ana = list_activity(&conn, None, Some("ana")).unwrap();
        assert_eq!(ana.len(), 2);
        assert!(ana.iter().all(|e| e.user_name == "ana"));

        let limited = list_activity(&conn, Some(1), Some("ana")).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].action, "Excluir Registro");
    }

    #[test]
    fn test_timestamp_is_assigned() {
        let (_dir, conn) = test_db();
        log_activity(&conn, "ana", ActivityKind::OptionAdded, "Norte").unwrap();
        let entry = &list_activity(&conn, None, None).unwrap()[0];
        assert_eq!(entry.timestamp.len(), "2024-01-25 10:00:00".len());
    }
}
