//! Spreadsheet and delimited-text writers for result sets, import error
//! reports, the import template and the activity log.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::error::{ResiduosError, Result};
use crate::models::{ActivityEntry, Record};

pub const DATA_SHEET: &str = "Dados";

pub const RECORD_HEADERS: [&str; 15] = [
    "ID",
    "Data",
    "Tipo de Operação",
    "Regional",
    "Filial Remetente",
    "Destino",
    "Produto",
    "Quantidade",
    "Unidade",
    "Preço Unitário",
    "Valor Total",
    "NFe",
    "Observações",
    "Data Lançamento",
    "Usuário Lançamento",
];

/// A typed cell. Numbers stay numeric in XLSX output so spreadsheets can sum them.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    fn render(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Generic table writers
// ---------------------------------------------------------------------------

pub fn write_table_xlsx(path: &Path, sheet: &str, headers: &[&str], rows: &[Vec<Cell>]) -> Result<()> {
    ensure_parent(path)?;
    let mut book = umya_spreadsheet::new_file_empty_worksheet();
    let ws = book
        .new_sheet(sheet)
        .map_err(|e| ResiduosError::Spreadsheet(format!("cannot create sheet '{sheet}': {e}")))?;

    for (col, header) in headers.iter().enumerate() {
        ws.get_cell_mut((col as u32 + 1, 1)).set_value(*header);
    }
    for (r, row) in rows.iter().enumerate() {
        let row_idx = r as u32 + 2;
        for (c, cell) in row.iter().enumerate() {
            let target = ws.get_cell_mut((c as u32 + 1, row_idx));
            match cell {
                Cell::Text(s) => {
                    target.set_value(s.as_str());
                }
                Cell::Number(n) => {
                    target.set_value_number(*n);
                }
            }
        }
    }

    umya_spreadsheet::writer::xlsx::write(&book, path)
        .map_err(|e| ResiduosError::Spreadsheet(format!("cannot write {}: {e}", path.display())))?;
    tracing::debug!(path = %path.display(), rows = rows.len(), "xlsx written");
    Ok(())
}

pub fn write_table_csv(path: &Path, headers: &[&str], rows: &[Vec<Cell>]) -> Result<()> {
    ensure_parent(path)?;
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(headers)?;
    for row in rows {
        wtr.write_record(row.iter().map(Cell::render))?;
    }
    wtr.flush()?;
    tracing::debug!(path = %path.display(), rows = rows.len(), "csv written");
    Ok(())
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

fn record_row(r: &Record) -> Vec<Cell> {
    vec![
        Cell::Number(r.id as f64),
        Cell::Text(r.date.format("%Y-%m-%d").to_string()),
        Cell::from(r.operation_label()),
        Cell::Text(r.regional.clone()),
        Cell::Text(r.branch.clone()),
        Cell::Text(r.destination.clone()),
        Cell::Text(r.product.clone()),
        Cell::Number(r.quantity),
        Cell::Text(r.unit.clone()),
        Cell::Number(r.unit_price),
        Cell::Number(r.total_value),
        Cell::Text(r.invoice.clone()),
        Cell::Text(r.notes.clone()),
        Cell::Text(r.created_at.clone().unwrap_or_default()),
        Cell::Text(r.created_by.clone()),
    ]
}

pub fn write_records_xlsx(path: &Path, records: &[Record]) -> Result<()> {
    let rows: Vec<Vec<Cell>> = records.iter().map(record_row).collect();
    write_table_xlsx(path, DATA_SHEET, &RECORD_HEADERS, &rows)
}

pub fn write_records_csv(path: &Path, records: &[Record]) -> Result<()> {
    let rows: Vec<Vec<Cell>> = records.iter().map(record_row).collect();
    write_table_csv(path, &RECORD_HEADERS, &rows)
}

/// `relatorio_residuos_YYYYMMDD_HHMMSS.<ext>` under `dir`.
pub fn default_report_path(dir: &Path, ext: &str, now: NaiveDateTime) -> PathBuf {
    dir.join(format!("relatorio_residuos_{}.{ext}", now.format("%Y%m%d_%H%M%S")))
}

// ---------------------------------------------------------------------------
// Activity log
// ---------------------------------------------------------------------------

pub fn write_activity_csv(path: &Path, entries: &[ActivityEntry]) -> Result<()> {
    let rows: Vec<Vec<Cell>> = entries
        .iter()
        .map(|e| {
            vec![
                Cell::Number(e.id as f64),
                Cell::Text(e.timestamp.clone()),
                Cell::Text(e.user_name.clone()),
                Cell::Text(e.action.clone()),
                Cell::Text(e.details.clone()),
            ]
        })
        .collect();
    write_table_csv(path, &["ID", "Data/Hora", "Usuário", "Ação", "Detalhes"], &rows)
}
