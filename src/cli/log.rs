use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::activity::list_activity;
use crate::auth::{require, Action};
use crate::cli::{open_db, Credentials};
use crate::error::Result;
use crate::export::write_activity_csv;

pub fn run(creds: &Credentials, limit: u32, by_user: Option<&str>, csv: Option<&str>) -> Result<()> {
    let (_, conn) = open_db()?;
    let session = creds.session(&conn)?;
    require(&conn, &session, Action::ViewActivityLog)?;

    let by_user = by_user.map(str::trim).filter(|u| !u.is_empty());
    let entries = list_activity(&conn, Some(limit), by_user)?;

    if let Some(path) = csv {
        write_activity_csv(Path::new(path), &entries)?;
        println!("{} {} log entries written to {path}", "✓".green().bold(), entries.len());
        return Ok(());
    }

    if entries.is_empty() {
        println!("No activity recorded.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Data/Hora", "Usuário", "Ação", "Detalhes"]);
    for e in &entries {
        table.add_row(vec![
            Cell::new(&e.timestamp),
            Cell::new(&e.user_name),
            Cell::new(&e.action),
            Cell::new(&e.details),
        ]);
    }
    println!("Log de Atividades\n{table}");
    Ok(())
}
