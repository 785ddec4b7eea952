use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rusqlite::Connection;

use crate::activity::{log_activity, ActivityKind};
use crate::auth::{require, Action, Session};
use crate::error::{ResiduosError, Result};
use crate::export::{write_table_csv, write_table_xlsx, Cell, DATA_SHEET};
use crate::models::{OperationType, RecordInput};
use crate::records::insert_many;
use crate::text::{normalize_header, parse_date_dayfirst, parse_decimal, standardize};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn excel_serial_to_date(serial: f64) -> Option<String> {
    // Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug)
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = base.checked_add_signed(chrono::Duration::days(serial.floor() as i64))?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn cell_text(cell: &calamine::Data) -> String {
    use calamine::Data;
    match cell {
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()).unwrap_or_default(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Reading: every cell as text
// ---------------------------------------------------------------------------

/// A sheet read as text. `rows` carry their 1-based line in the source file.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<(usize, Vec<String>)>,
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

fn sniff_delimiter(path: &Path) -> Result<u8> {
    let content = std::fs::read(path)?;
    let first = content.split(|b| *b == b'\n').next().unwrap_or(&[]);
    let semis = first.iter().filter(|b| **b == b';').count();
    let commas = first.iter().filter(|b| **b == b',').count();
    Ok(if semis > commas { b';' } else { b',' })
}

/// UTF-8 when valid, otherwise Latin-1. Excel with a Brazilian locale saves
/// CSV as Windows-1252, whose accented letters share Latin-1 code points.
fn decode_cell(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(s) => s.to_string(),
        Err(_) => raw.iter().map(|b| char::from(*b)).collect(),
    }
}

fn read_csv(path: &Path) -> Result<RawTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(sniff_delimiter(path)?)
        .from_path(path)?;
    let mut table = RawTable::default();
    for result in rdr.byte_records() {
        let record = result?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
        let mut cells: Vec<String> = record.iter().map(decode_cell).collect();
        if let Some(first) = cells.first_mut() {
            if let Some(stripped) = first.strip_prefix('\u{feff}') {
                *first = stripped.to_string();
            }
        }
        if table.headers.is_empty() {
            if !is_blank(&cells) {
                table.headers = cells;
            }
            continue;
        }
        if !is_blank(&cells) {
            table.rows.push((line, cells));
        }
    }
    Ok(table)
}

fn read_workbook(path: &Path) -> Result<RawTable> {
    use calamine::Reader;

    let mut workbook = calamine::open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ResiduosError::Spreadsheet(format!("{} has no worksheets", path.display())))??;
    let first_line = range.start().map(|(row, _)| row as usize + 1).unwrap_or(1);

    let mut table = RawTable::default();
    for (idx, row) in range.rows().enumerate() {
        let cells: Vec<String> = row.iter().map(cell_text).collect();
        if table.headers.is_empty() {
            if !is_blank(&cells) {
                table.headers = cells;
            }
            continue;
        }
        if !is_blank(&cells) {
            table.rows.push((first_line + idx, cells));
        }
    }
    Ok(table)
}

/// `.csv` goes through the CSV reader; anything else is opened as a workbook.
pub fn read_table(path: &Path) -> Result<RawTable> {
    let is_csv = path
        .extension()
        .map_or(false, |e| e.eq_ignore_ascii_case("csv") || e.eq_ignore_ascii_case("txt"));
    let table = if is_csv { read_csv(path)? } else { read_workbook(path)? };
    if table.headers.is_empty() {
        return Err(ResiduosError::Validation(format!("{} is empty", path.display())));
    }
    tracing::debug!(path = %path.display(), rows = table.rows.len(), "sheet read");
    Ok(table)
}

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    OperationType,
    Regional,
    Branch,
    Date,
    Product,
    Destination,
    Quantity,
    Unit,
    UnitPrice,
    // Accepted but ignored: the total is recomputed from quantity and unit price.
    TotalValue,
    Invoice,
    Notes,
}

const REQUIRED: [Field; 9] = [
    Field::OperationType,
    Field::Regional,
    Field::Branch,
    Field::Date,
    Field::Product,
    Field::Destination,
    Field::Quantity,
    Field::Unit,
    Field::UnitPrice,
];

impl Field {
    fn from_header(raw: &str) -> Option<Field> {
        match normalize_header(raw).replace('_', " ").as_str() {
            "tipo de operacao" | "tipo operacao" => Some(Field::OperationType),
            "regional" => Some(Field::Regional),
            "filial remetente" | "filial" => Some(Field::Branch),
            "data" => Some(Field::Date),
            "produto" => Some(Field::Product),
            "destino" => Some(Field::Destination),
            "quantidade" => Some(Field::Quantity),
            "unidade" => Some(Field::Unit),
            "preco unitario" => Some(Field::UnitPrice),
            "valor total" => Some(Field::TotalValue),
            "nfe" => Some(Field::Invoice),
            "observacoes" | "observacao" => Some(Field::Notes),
            _ => None,
        }
    }

    fn display_name(&self) -> &'static str {
        match self {
            Field::OperationType => "Tipo de Operação",
            Field::Regional => "Regional",
            Field::Branch => "Filial Remetente",
            Field::Date => "Data",
            Field::Product => "Produto",
            Field::Destination => "Destino",
            Field::Quantity => "Quantidade",
            Field::Unit => "Unidade",
            Field::UnitPrice => "Preço Unitário",
            Field::TotalValue => "Valor Total",
            Field::Invoice => "NFe",
            Field::Notes => "Observacoes",
        }
    }
}

struct ColumnMap(HashMap<Field, usize>);

impl ColumnMap {
    /// First matching header wins. Fails with every missing required column.
    fn from_headers(headers: &[String]) -> Result<Self> {
        let mut map = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            if let Some(field) = Field::from_header(header) {
                map.entry(field).or_insert(idx);
            }
        }
        let missing: Vec<String> = REQUIRED
            .iter()
            .filter(|f| !map.contains_key(*f))
            .map(|f| f.display_name().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ResiduosError::MissingColumns(missing));
        }
        Ok(ColumnMap(map))
    }

    fn get<'a>(&self, cells: &'a [String], field: Field) -> &'a str {
        self.0
            .get(&field)
            .and_then(|&idx| cells.get(idx))
            .map(|s| s.trim())
            .unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Per-row validation
// ---------------------------------------------------------------------------

const REASON_DATE: &str = "Data inválida ou em branco";
const REASON_QUANTITY: &str = "Quantidade inválida, não numérica ou em branco";
const REASON_PRICE: &str = "Preço unitário inválido, não numérico ou em branco";
const REASON_QUANTITY_POSITIVE: &str = "Quantidade deve ser maior que zero";
const REASON_PRICE_NEGATIVE: &str = "Preço unitário não pode ser negativo";
const REASON_OPERATION_UNKNOWN: &str = "Tipo de Operação desconhecido (use Venda ou Transferência)";

fn required_blank(label: &str) -> String {
    format!("Campo '{label}' obrigatório não preenchido")
}

/// Every failing check contributes its reason, in a fixed order.
fn validate_row(cells: &[String], cols: &ColumnMap) -> std::result::Result<RecordInput, String> {
    let mut reasons: Vec<String> = Vec::new();

    let date = parse_date_dayfirst(cols.get(cells, Field::Date));
    let quantity = parse_decimal(cols.get(cells, Field::Quantity));
    let unit_price = parse_decimal(cols.get(cells, Field::UnitPrice));
    let op_raw = standardize(cols.get(cells, Field::OperationType));
    let regional = standardize(cols.get(cells, Field::Regional));
    let product = standardize(cols.get(cells, Field::Product));
    let unit = standardize(cols.get(cells, Field::Unit));

    if date.is_none() {
        reasons.push(REASON_DATE.to_string());
    }
    if quantity.is_none() {
        reasons.push(REASON_QUANTITY.to_string());
    }
    if unit_price.is_none() {
        reasons.push(REASON_PRICE.to_string());
    }
    if quantity.map_or(false, |q| q <= 0.0) {
        reasons.push(REASON_QUANTITY_POSITIVE.to_string());
    }
    if unit_price.map_or(false, |p| p < 0.0) {
        reasons.push(REASON_PRICE_NEGATIVE.to_string());
    }
    let operation_type = OperationType::parse(&op_raw);
    if op_raw.is_empty() {
        reasons.push(required_blank("Tipo de Operação"));
    } else if operation_type.is_none() {
        reasons.push(REASON_OPERATION_UNKNOWN.to_string());
    }
    for (value, label) in [(&regional, "Regional"), (&product, "Produto"), (&unit, "Unidade")] {
        if value.is_empty() {
            reasons.push(required_blank(label));
        }
    }

    match (date, quantity, unit_price, operation_type) {
        (Some(date), Some(quantity), Some(unit_price), Some(operation_type)) if reasons.is_empty() => {
            Ok(RecordInput {
                date,
                operation_type,
                regional,
                branch: standardize(cols.get(cells, Field::Branch)),
                destination: standardize(cols.get(cells, Field::Destination)),
                product,
                quantity,
                unit,
                unit_price,
                total_value: 0.0,
                invoice: cols.get(cells, Field::Invoice).to_string(),
                notes: cols.get(cells, Field::Notes).to_string(),
            })
        }
        _ => Err(reasons.join("; ")),
    }
}

// ---------------------------------------------------------------------------
// import_file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    /// 1-based line in the source file.
    pub line: usize,
    /// Original cell values, aligned with [`ImportReport::headers`].
    pub values: Vec<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub headers: Vec<String>,
    pub imported: usize,
    pub rejected: Vec<RejectedRow>,
}

impl ImportReport {
    fn error_rows(&self) -> (Vec<&str>, Vec<Vec<Cell>>) {
        let mut headers: Vec<&str> = vec!["Linha"];
        headers.extend(self.headers.iter().map(String::as_str));
        headers.push("Motivo do Erro");
        let width = self.headers.len();
        let rows = self
            .rejected
            .iter()
            .map(|r| {
                let mut row = vec![Cell::Number(r.line as f64)];
                row.extend((0..width).map(|i| Cell::Text(r.values.get(i).cloned().unwrap_or_default())));
                row.push(Cell::Text(r.reason.clone()));
                row
            })
            .collect();
        (headers, rows)
    }

    pub fn write_errors_xlsx(&self, path: &Path) -> Result<()> {
        let (headers, rows) = self.error_rows();
        write_table_xlsx(path, DATA_SHEET, &headers, &rows)
    }

    pub fn write_errors_csv(&self, path: &Path) -> Result<()> {
        let (headers, rows) = self.error_rows();
        write_table_csv(path, &headers, &rows)
    }
}

/// `relatorio_erros_importacao_YYYYMMDD.<ext>` under `dir`.
pub fn default_error_report_path(dir: &Path, ext: &str, today: NaiveDate) -> PathBuf {
    dir.join(format!("relatorio_erros_importacao_{}.{ext}", today.format("%Y%m%d")))
}

/// Reads, validates and commits a spreadsheet. Valid rows land in a single
/// transaction with one audit entry; rejected rows come back in the report.
/// A missing required column aborts before anything is written.
pub fn import_file(conn: &Connection, session: &Session, file_path: &Path) -> Result<ImportReport> {
    require(conn, session, Action::ImportSpreadsheet)?;
    let table = read_table(file_path)?;
    import_table(conn, session, table)
}

fn import_table(conn: &Connection, session: &Session, table: RawTable) -> Result<ImportReport> {
    let cols = ColumnMap::from_headers(&table.headers)?;

    let mut valid = Vec::new();
    let mut rejected = Vec::new();
    for (line, cells) in table.rows {
        match validate_row(&cells, &cols) {
            Ok(input) => valid.push(input),
            Err(reason) => rejected.push(RejectedRow {
                line,
                values: cells,
                reason,
            }),
        }
    }

    let imported = if valid.is_empty() {
        tracing::warn!(rejected = rejected.len(), "no valid rows to import");
        0
    } else {
        let tx = conn.unchecked_transaction()?;
        let n = insert_many(&tx, &valid, &session.username)?;
        log_activity(
            &tx,
            &session.username,
            ActivityKind::SpreadsheetImported,
            &format!("{n} registros adicionados."),
        )?;
        tx.commit()?;
        n
    };
    tracing::info!(imported, rejected = rejected.len(), user = %session.username, "import finished");

    Ok(ImportReport {
        headers: table.headers,
        imported,
        rejected,
    })
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

const TEMPLATE_HEADERS: [&str; 11] = [
    "Tipo de Operação",
    "Regional",
    "Filial Remetente",
    "Data",
    "Produto",
    "Destino",
    "Quantidade",
    "Unidade",
    "Preço Unitário",
    "NFe",
    "Observacoes",
];

fn template_row() -> Vec<Cell> {
    vec![
        Cell::from("Venda"),
        Cell::from("Nome da Regional"),
        Cell::from("Nome da Filial"),
        Cell::from("25/01/2024"),
        Cell::from("Nome do Produto"),
        Cell::from("Nome do Destino"),
        Cell::Number(100.50),
        Cell::from("KG"),
        Cell::Number(1.25),
        Cell::from("123456"),
        Cell::from("Exemplo de observação."),
    ]
}

/// Writes the import template with one example row. `.csv` paths get CSV,
/// anything else XLSX.
pub fn write_template(path: &Path) -> Result<()> {
    let rows = vec![template_row()];
    if path.extension().map_or(false, |e| e.eq_ignore_ascii_case("csv")) {
        write_table_csv(path, &TEMPLATE_HEADERS, &rows)
    } else {
        write_table_xlsx(path, DATA_SHEET, &TEMPLATE_HEADERS, &rows)
    }
}
