use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::{open_db, Credentials, RecordFields};
use crate::error::{ResiduosError, Result};
use crate::fmt::{money, quantity};
use crate::models::{Record, RecordInput};
use crate::records::{self, BulkDelete};

fn required<T>(value: Option<T>, flag: &str) -> Result<T> {
    value.ok_or_else(|| ResiduosError::Validation(format!("--{flag} is required")))
}

fn required_text(value: Option<String>, flag: &str) -> Result<String> {
    required(value.filter(|v| !v.trim().is_empty()), flag)
}

fn input_for_add(fields: RecordFields) -> Result<RecordInput> {
    if fields.unit_price.is_none() && fields.total.is_none() {
        return Err(ResiduosError::Validation("give --unit-price or --total".to_string()));
    }
    Ok(RecordInput {
        date: required(fields.date, "date")?,
        operation_type: required(fields.operation_type, "type")?,
        regional: required_text(fields.regional, "regional")?,
        branch: required_text(fields.branch, "branch")?,
        destination: required_text(fields.destination, "destination")?,
        product: required_text(fields.product, "product")?,
        quantity: required(fields.quantity, "quantity")?,
        unit: required_text(fields.unit, "unit")?,
        unit_price: fields.unit_price.unwrap_or(0.0),
        total_value: fields.total.unwrap_or(0.0),
        invoice: fields.invoice.unwrap_or_default(),
        notes: fields.notes.unwrap_or_default(),
    })
}

/// Overlays the given flags on the stored record. Amounts are re-derived:
/// an explicit `--total` wins, otherwise quantity × unit price.
fn input_for_edit(current: &Record, fields: RecordFields) -> Result<RecordInput> {
    let operation_type = match fields.operation_type.or(current.operation_type) {
        Some(op) => op,
        None => return Err(ResiduosError::Validation(format!("record {} has no valid operation type; give --type", current.id))),
    };
    Ok(RecordInput {
        date: fields.date.unwrap_or(current.date),
        operation_type,
        regional: fields.regional.unwrap_or_else(|| current.regional.clone()),
        branch: fields.branch.unwrap_or_else(|| current.branch.clone()),
        destination: fields.destination.unwrap_or_else(|| current.destination.clone()),
        product: fields.product.unwrap_or_else(|| current.product.clone()),
        quantity: fields.quantity.unwrap_or(current.quantity),
        unit: fields.unit.unwrap_or_else(|| current.unit.clone()),
        unit_price: fields.unit_price.unwrap_or(current.unit_price),
        total_value: fields.total.unwrap_or(0.0),
        invoice: fields.invoice.unwrap_or_else(|| current.invoice.clone()),
        notes: fields.notes.unwrap_or_else(|| current.notes.clone()),
    })
}

pub fn add(creds: &Credentials, fields: RecordFields) -> Result<()> {
    let (_, conn) = open_db()?;
    let session = creds.session(&conn)?;
    let input = input_for_add(fields)?;
    let id = records::add(&conn, &session, &input)?;
    println!("{} Record {id} added.", "✓".green().bold());
    Ok(())
}

pub fn edit(creds: &Credentials, id: i64, fields: RecordFields) -> Result<()> {
    let (_, conn) = open_db()?;
    let session = creds.session(&conn)?;
    let current = records::get_by_id(&conn, id)?.ok_or_else(|| ResiduosError::NotFound(format!("record {id}")))?;
    let input = input_for_edit(&current, fields)?;
    records::update(&conn, &session, id, &input)?;
    println!("{} Record {id} updated.", "✓".green().bold());
    Ok(())
}

pub fn show(creds: &Credentials, id: i64) -> Result<()> {
    let (_, conn) = open_db()?;
    creds.session(&conn)?;
    let r = records::get_by_id(&conn, id)?.ok_or_else(|| ResiduosError::NotFound(format!("record {id}")))?;

    let mut table = Table::new();
    table.set_header(vec!["Campo", "Valor"]);
    let rows = [
        ("ID", r.id.to_string()),
        ("Data", r.date.format("%d/%m/%Y").to_string()),
        ("Tipo de Operação", r.operation_label().to_string()),
        ("Regional", r.regional.clone()),
        ("Filial Remetente", r.branch.clone()),
        ("Destino", r.destination.clone()),
        ("Produto", r.product.clone()),
        ("Quantidade", quantity(r.quantity)),
        ("Unidade", r.unit.clone()),
        ("Preço Unitário", money(r.unit_price)),
        ("Valor Total", money(r.total_value)),
        ("NFe", r.invoice.clone()),
        ("Observações", r.notes.clone()),
        ("Data Lançamento", r.created_at.clone().unwrap_or_default()),
        ("Usuário Lançamento", r.created_by.clone()),
    ];
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    println!("{table}");
    Ok(())
}

pub fn list(creds: &Credentials, search: &str, page: u64, page_size: Option<u32>) -> Result<()> {
    let (settings, conn) = open_db()?;
    creds.session(&conn)?;

    let limit = page_size.unwrap_or(settings.page_size).max(1);
    let total = records::count(&conn, search)?;
    let pages = ((total as u64).div_ceil(limit as u64)).max(1);
    let page = page.clamp(1, pages);
    let rows = records::page(&conn, limit, (page - 1) * limit as u64, search)?;

    if rows.is_empty() {
        println!("No records found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec![
        "ID", "Data", "Tipo", "Regional", "Filial", "Destino", "Produto", "Qtd", "Un", "Preço", "Total", "Usuário",
    ]);
    for r in &rows {
        table.add_row(vec![
            Cell::new(r.id),
            Cell::new(r.date.format("%d/%m/%Y")),
            Cell::new(r.operation_label()),
            Cell::new(&r.regional),
            Cell::new(&r.branch),
            Cell::new(&r.destination),
            Cell::new(&r.product),
            Cell::new(quantity(r.quantity)),
            Cell::new(&r.unit),
            Cell::new(money(r.unit_price)),
            Cell::new(money(r.total_value)),
            Cell::new(&r.created_by),
        ]);
    }
    println!("{table}");
    println!("Page {page} of {pages} ({total} records)");
    Ok(())
}

pub fn delete(creds: &Credentials, ids: &[i64]) -> Result<()> {
    let (_, conn) = open_db()?;
    let session = creds.session(&conn)?;

    if let [id] = ids {
        let n = records::delete(&conn, &session, *id)?;
        if n == 0 {
            return Err(ResiduosError::NotFound(format!("record {id}")));
        }
        println!("{} Record {id} deleted.", "✓".green().bold());
        return Ok(());
    }

    match records::delete_bulk(&conn, &session, ids)? {
        BulkDelete::NoOp => println!("{}", "No IDs given; nothing deleted.".yellow()),
        BulkDelete::Deleted(n) => println!("{} {n} records deleted.", "✓".green().bold()),
    }
    Ok(())
}

pub fn delete_all(creds: &Credentials, confirm: bool) -> Result<()> {
    if !confirm {
        return Err(ResiduosError::Validation(
            "this deletes every record; re-run with --confirm".to_string(),
        ));
    }
    let (_, conn) = open_db()?;
    let session = creds.session(&conn)?;
    let n = records::delete_all(&conn, &session)?;
    println!("{} All records deleted ({n}).", "✓".green().bold());
    Ok(())
}

pub fn standardize(creds: &Credentials) -> Result<()> {
    let (_, conn) = open_db()?;
    let session = creds.session(&conn)?;
    let n = records::standardize_all(&conn, &session)?;
    if n == 0 {
        println!("All records already standardized.");
    } else {
        println!("{} {n} records standardized.", "✓".green().bold());
    }
    Ok(())
}
