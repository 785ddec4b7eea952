//! Record repository: validated writes and paged reads over `registros`.

use rusqlite::{Connection, OptionalExtension};

use crate::activity::{log_activity, ActivityKind};
use crate::auth::{require, Action, Session};
use crate::error::{ResiduosError, Result};
use crate::models::{Record, RecordInput};
use crate::text::{round2, standardize};

/// Stored `(unit_price, total_value)` for a quantity. A positive caller total
/// wins and the unit price is derived from it; otherwise the total is
/// derived from the unit price.
pub fn derive_amounts(quantity: f64, unit_price: f64, total_value: f64) -> (f64, f64) {
    if total_value > 0.0 && quantity > 0.0 {
        let total = round2(total_value);
        (total / quantity, total)
    } else {
        (unit_price, round2(quantity * unit_price))
    }
}

fn validate(input: &RecordInput) -> Result<()> {
    if !input.quantity.is_finite() || input.quantity <= 0.0 {
        return Err(ResiduosError::Validation("quantity must be greater than zero".to_string()));
    }
    if !input.unit_price.is_finite() || input.unit_price < 0.0 {
        return Err(ResiduosError::Validation("unit price cannot be negative".to_string()));
    }
    if !input.total_value.is_finite() || input.total_value < 0.0 {
        return Err(ResiduosError::Validation("total value cannot be negative".to_string()));
    }
    Ok(())
}

/// Dimension fields a form entry must fill. Import rows have their own,
/// narrower rule and skip this check.
fn require_dimensions(input: &RecordInput) -> Result<()> {
    let missing: Vec<&str> = [
        ("Regional", &input.regional),
        ("Filial Remetente", &input.branch),
        ("Destino", &input.destination),
        ("Produto", &input.product),
        ("Unidade", &input.unit),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(label, _)| label)
    .collect();
    if !missing.is_empty() {
        return Err(ResiduosError::Validation(format!(
            "required fields are blank: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

/// Validated, normalised column values ready to be written.
struct Prepared {
    regional: String,
    branch: String,
    destination: String,
    product: String,
    unit: String,
    invoice: String,
    notes: String,
    unit_price: f64,
    total_value: f64,
}

fn prepare(input: &RecordInput) -> Result<Prepared> {
    validate(input)?;
    let (unit_price, total_value) = derive_amounts(input.quantity, input.unit_price, input.total_value);
    Ok(Prepared {
        regional: standardize(&input.regional),
        branch: standardize(&input.branch),
        destination: standardize(&input.destination),
        product: standardize(&input.product),
        unit: standardize(&input.unit),
        invoice: input.invoice.trim().to_string(),
        notes: input.notes.trim().to_string(),
        unit_price,
        total_value,
    })
}

const INSERT_SQL: &str = "INSERT INTO registros (data, tipo_operacao, regional, filial_remetente, destino, produto, \
     quantidade, unidade, preco_unitario, valor_total, nfe, observacoes, data_lancamento, usuario_lancamento) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, datetime('now'), ?13)";

fn insert(conn: &Connection, input: &RecordInput, created_by: &str) -> Result<i64> {
    let p = prepare(input)?;
    let mut stmt = conn.prepare_cached(INSERT_SQL)?;
    stmt.execute(rusqlite::params![
        input.date,
        input.operation_type,
        p.regional,
        p.branch,
        p.destination,
        p.product,
        input.quantity,
        p.unit,
        p.unit_price,
        p.total_value,
        p.invoice,
        p.notes,
        created_by,
    ])?;
    Ok(conn.last_insert_rowid())
}

pub fn add(conn: &Connection, session: &Session, input: &RecordInput) -> Result<i64> {
    require(conn, session, Action::AddRecord)?;
    require_dimensions(input)?;
    validate(input)?;

    let tx = conn.unchecked_transaction()?;
    let id = insert(&tx, input, &session.username)?;
    log_activity(&tx, &session.username, ActivityKind::RecordAdded, &format!("ID do novo registro: {id}"))?;
    tx.commit()?;
    tracing::info!(id, user = %session.username, "record added");
    Ok(id)
}

/// Inserts every input inside the caller's transaction. Callers own the
/// permission check and the audit entry.
pub(crate) fn insert_many(conn: &Connection, inputs: &[RecordInput], created_by: &str) -> Result<usize> {
    for input in inputs {
        insert(conn, input, created_by)?;
    }
    Ok(inputs.len())
}

/// Overwrites every mutable field of record `id`. Creation timestamp and
/// creating user are never touched. A missing `id` is reported as `NotFound`.
pub fn update(conn: &Connection, session: &Session, id: i64, input: &RecordInput) -> Result<()> {
    require(conn, session, Action::EditRecord(id))?;
    require_dimensions(input)?;
    let p = prepare(input)?;
    if !exists(conn, id)? {
        return Err(ResiduosError::NotFound(format!("record {id}")));
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE registros SET data = ?1, tipo_operacao = ?2, regional = ?3, filial_remetente = ?4, \
         destino = ?5, produto = ?6, quantidade = ?7, unidade = ?8, preco_unitario = ?9, \
         valor_total = ?10, nfe = ?11, observacoes = ?12 WHERE id = ?13",
        rusqlite::params![
            input.date,
            input.operation_type,
            p.regional,
            p.branch,
            p.destination,
            p.product,
            input.quantity,
            p.unit,
            p.unit_price,
            p.total_value,
            p.invoice,
            p.notes,
            id,
        ],
    )?;
    log_activity(&tx, &session.username, ActivityKind::RecordEdited, &format!("Registro ID {id} foi modificado."))?;
    tx.commit()?;
    tracing::info!(id, user = %session.username, "record updated");
    Ok(())
}

/// Returns the number of rows removed (0 when `id` did not exist).
pub fn delete(conn: &Connection, session: &Session, id: i64) -> Result<usize> {
    require(conn, session, Action::DeleteRecord(id))?;
    let tx = conn.unchecked_transaction()?;
    let removed = tx.execute("DELETE FROM registros WHERE id = ?1", [id])?;
    log_activity(&tx, &session.username, ActivityKind::RecordDeleted, &format!("Registro ID {id} foi excluído."))?;
    tx.commit()?;
    Ok(removed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkDelete {
    /// Nothing was selected; the store was not touched.
    NoOp,
    Deleted(usize),
}

pub fn delete_bulk(conn: &Connection, session: &Session, ids: &[i64]) -> Result<BulkDelete> {
    require(conn, session, Action::DeleteRecords(ids.len()))?;
    if ids.is_empty() {
        tracing::warn!("bulk delete called with no ids");
        return Ok(BulkDelete::NoOp);
    }
    let placeholders = (1..=ids.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
    let tx = conn.unchecked_transaction()?;
    let removed = tx.execute(
        &format!("DELETE FROM registros WHERE id IN ({placeholders})"),
        rusqlite::params_from_iter(ids.iter()),
    )?;
    let id_list = ids.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ");
    log_activity(
        &tx,
        &session.username,
        ActivityKind::RecordsDeleted,
        &format!("{removed} registros foram excluídos. IDs: {id_list}"),
    )?;
    tx.commit()?;
    Ok(BulkDelete::Deleted(removed))
}

/// Removes every record and restarts identifiers at 1.
pub fn delete_all(conn: &Connection, session: &Session) -> Result<usize> {
    require(conn, session, Action::DeleteAllRecords)?;
    if !session.is_admin() {
        tracing::warn!(user = %session.username, "delete-all run by a non-admin user");
    }
    let tx = conn.unchecked_transaction()?;
    let removed = tx.execute("DELETE FROM registros", [])?;
    tx.execute("DELETE FROM sqlite_sequence WHERE name = 'registros'", [])?;
    log_activity(
        &tx,
        &session.username,
        ActivityKind::AllRecordsDeleted,
        &format!("Todos os registros foram apagados ({removed})."),
    )?;
    tx.commit()?;
    Ok(removed)
}

pub fn exists(conn: &Connection, id: i64) -> Result<bool> {
    let mut stmt = conn.prepare_cached("SELECT 1 FROM registros WHERE id = ?1")?;
    Ok(stmt.exists([id])?)
}

pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<Record>> {
    let record = conn
        .query_row(
            &format!("SELECT {} FROM registros WHERE id = ?1", Record::SELECT_COLUMNS),
            [id],
            Record::from_row,
        )
        .optional()?;
    Ok(record)
}

const SEARCH_CLAUSE: &str = " WHERE LOWER(COALESCE(regional, '') || ' ' || COALESCE(filial_remetente, '') || ' ' || \
     COALESCE(destino, '') || ' ' || COALESCE(produto, '') || ' ' || COALESCE(unidade, '') || ' ' || \
     COALESCE(nfe, '') || ' ' || COALESCE(tipo_operacao, '') || ' ' || COALESCE(usuario_lancamento, '')) \
     LIKE ?1 ESCAPE '\\'";

fn like_pattern(search: &str) -> Option<String> {
    let term = search.trim();
    if term.is_empty() {
        return None;
    }
    let escaped = term
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Some(format!("%{escaped}%"))
}

pub fn count(conn: &Connection, search: &str) -> Result<i64> {
    let n = match like_pattern(search) {
        Some(pattern) => conn.query_row(
            &format!("SELECT COUNT(*) FROM registros{SEARCH_CLAUSE}"),
            [pattern],
            |r| r.get(0),
        )?,
        None => conn.query_row("SELECT COUNT(*) FROM registros", [], |r| r.get(0))?,
    };
    Ok(n)
}

/// Newest first, offset-based.
pub fn page(conn: &Connection, limit: u32, offset: u64, search: &str) -> Result<Vec<Record>> {
    let base = format!("SELECT {} FROM registros", Record::SELECT_COLUMNS);
    let rows = match like_pattern(search) {
        Some(pattern) => {
            let mut stmt = conn.prepare(&format!("{base}{SEARCH_CLAUSE} ORDER BY id DESC LIMIT ?2 OFFSET ?3"))?;
            let rows = stmt
                .query_map(rusqlite::params![pattern, limit, offset as i64], Record::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!("{base} ORDER BY id DESC LIMIT ?1 OFFSET ?2"))?;
            let rows = stmt
                .query_map(rusqlite::params![limit, offset as i64], Record::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

/// Rewrites dimension fields to their canonical form. Only rows that change
/// are written, so a second run is a no-op. Returns the number of rows updated.
pub fn standardize_all(conn: &Connection, session: &Session) -> Result<usize> {
    require(conn, session, Action::StandardizeRecords)?;
    let mut stmt = conn.prepare(
        "SELECT id, regional, filial_remetente, destino, produto, unidade, tipo_operacao FROM registros",
    )?;
    let rows: Vec<(i64, [Option<String>; 6])> = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                [row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?],
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let changed: Vec<(i64, [Option<String>; 6])> = rows
        .into_iter()
        .filter_map(|(id, fields)| {
            let canonical = fields.clone().map(|f| f.map(|v| standardize(&v)));
            (canonical != fields).then_some((id, canonical))
        })
        .collect();

    if changed.is_empty() {
        tracing::info!("records already standardized");
        return Ok(0);
    }

    let tx = conn.unchecked_transaction()?;
    {
        let mut upd = tx.prepare(
            "UPDATE registros SET regional = ?1, filial_remetente = ?2, destino = ?3, produto = ?4, \
             unidade = ?5, tipo_operacao = ?6 WHERE id = ?7",
        )?;
        for (id, [regional, branch, destination, product, unit, op]) in &changed {
            upd.execute(rusqlite::params![regional, branch, destination, product, unit, op, id])?;
        }
    }
    log_activity(
        &tx,
        &session.username,
        ActivityKind::RecordsStandardized,
        &format!("{} registros foram padronizados.", changed.len()),
    )?;
    tx.commit()?;
    Ok(changed.len())
}
