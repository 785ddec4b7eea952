use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

const BASE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS registros (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    data TEXT NOT NULL,
    regional TEXT,
    filial_remetente TEXT,
    destino TEXT,
    produto TEXT,
    quantidade REAL,
    unidade TEXT,
    preco_unitario REAL,
    valor_total REAL,
    nfe TEXT,
    observacoes TEXT,
    tipo_operacao TEXT,
    data_lancamento TEXT DEFAULT (datetime('now')),
    usuario_lancamento TEXT
);

CREATE TABLE IF NOT EXISTS regionais (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS filiais (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS destinos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS produtos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS unidades (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS activity_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT DEFAULT (datetime('now')),
    user_name TEXT NOT NULL,
    action TEXT NOT NULL,
    details TEXT
);
";

// Columns added to `registros` after the first release. ALTER TABLE cannot use a
// non-constant default, so `data_lancamento` is NULL on rows that predate it.
const REGISTROS_LATE_COLUMNS: &[(&str, &str)] = &[
    ("nfe", "TEXT"),
    ("observacoes", "TEXT"),
    ("tipo_operacao", "TEXT"),
    ("data_lancamento", "TEXT"),
    ("usuario_lancamento", "TEXT DEFAULT 'N/A'"),
];

type Migration = fn(&Connection) -> Result<()>;

/// Applied in order; `PRAGMA user_version` holds how many have run.
/// Steps must stay idempotent: databases written by older tools may already
/// carry some of these changes while reporting version 0.
const MIGRATIONS: &[(&str, Migration)] = &[
    ("base tables", migrate_base_tables),
    ("late registros columns", migrate_registros_columns),
    ("user roles", migrate_user_roles),
    ("indexes", migrate_indexes),
];

fn migrate_base_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(BASE_SCHEMA)?;
    Ok(())
}

fn migrate_registros_columns(conn: &Connection) -> Result<()> {
    for (column, decl) in REGISTROS_LATE_COLUMNS {
        add_column_if_missing(conn, "registros", column, decl)?;
    }
    Ok(())
}

fn migrate_user_roles(conn: &Connection) -> Result<()> {
    if add_column_if_missing(conn, "users", "role", "TEXT NOT NULL DEFAULT 'User'")? {
        conn.execute("UPDATE users SET role = 'Admin' WHERE username = 'Administrador'", [])?;
    }
    Ok(())
}

fn migrate_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_registros_data ON registros(data);
         CREATE INDEX IF NOT EXISTS idx_activity_log_timestamp ON activity_log(timestamp);",
    )?;
    Ok(())
}

pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Returns true when the column was added.
fn add_column_if_missing(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<bool> {
    if table_columns(conn, table)?.iter().any(|c| c == column) {
        return Ok(false);
    }
    tracing::info!(table, column, "adding missing column");
    conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"))?;
    Ok(true)
}

pub fn schema_version(conn: &Connection) -> Result<usize> {
    let v: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(v.max(0) as usize)
}

pub fn latest_version() -> usize {
    MIGRATIONS.len()
}

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    let current = schema_version(conn)?;
    for (idx, (name, step)) in MIGRATIONS.iter().enumerate().skip(current) {
        tracing::debug!(version = idx + 1, name, "applying migration");
        let tx = conn.unchecked_transaction()?;
        step(&tx)?;
        tx.pragma_update(None, "user_version", (idx + 1) as i64)?;
        tx.commit()?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_db() -> (tempfile::TempDir, Connection) {
    let dir = tempfile::tempdir().unwrap();
    let conn = get_connection(&dir.path().join("test.db")).unwrap();
    init_db(&conn).unwrap();
    (dir, conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_db_creates_tables() {
        let (_dir, conn) = test_db();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        for expected in &[
            "registros", "regionais", "filiais", "destinos", "produtos", "unidades", "users",
            "activity_log",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table: {expected}");
        }
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let (_dir, conn) = test_db();
        init_db(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn test_users_have_role_column() {
        let (_dir, conn) = test_db();
        let columns = table_columns(&conn, "users").unwrap();
        assert!(columns.contains(&"role".to_string()));
    }

    #[test]
    fn test_upgrades_legacy_database() {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("legacy.db")).unwrap();
        conn.execute_batch(
            "CREATE TABLE registros (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                data TEXT NOT NULL,
                regional TEXT, filial_remetente TEXT, destino TEXT, produto TEXT,
                quantidade REAL, unidade TEXT, preco_unitario REAL, valor_total REAL
             );
             CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL
             );
             INSERT INTO registros (data, regional, quantidade) VALUES ('2023-05-01', 'Norte', 3.0);
             INSERT INTO users (username, password_hash) VALUES ('Administrador', 'x');
             INSERT INTO users (username, password_hash) VALUES ('operador', 'y');",
        )
        .unwrap();

        init_db(&conn).unwrap();

        let columns = table_columns(&conn, "registros").unwrap();
        for (col, _) in REGISTROS_LATE_COLUMNS {
            assert!(columns.contains(&col.to_string()), "missing column: {col}");
        }
        let who: String = conn
            .query_row("SELECT usuario_lancamento FROM registros", [], |r| r.get(0))
            .unwrap();
        assert_eq!(who, "N/A");
        let admin_role: String = conn
            .query_row("SELECT role FROM users WHERE username = 'Administrador'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(admin_role, "Admin");
        let other_role: String = conn
            .query_row("SELECT role FROM users WHERE username = 'operador'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(other_role, "User");
    }
}
