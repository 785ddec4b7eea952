use std::path::{Path, PathBuf};

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::{open_db, Credentials};
use crate::error::Result;
use crate::importer::{default_error_report_path, import_file, write_template};
use crate::settings::load_settings;

/// Rejected rows shown inline before pointing at the full report.
const PREVIEW_ROWS: usize = 10;

fn is_csv(path: &Path) -> bool {
    path.extension().map_or(false, |e| e.eq_ignore_ascii_case("csv"))
}

pub fn run(creds: &Credentials, file: &str, errors: Option<&str>) -> Result<()> {
    let (settings, conn) = open_db()?;
    let session = creds.session(&conn)?;
    let report = import_file(&conn, &session, Path::new(file))?;

    println!(
        "{} {} imported, {} rejected",
        "✓".green().bold(),
        report.imported,
        report.rejected.len()
    );
    if report.rejected.is_empty() {
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Linha", "Motivo do Erro"]);
    for r in report.rejected.iter().take(PREVIEW_ROWS) {
        table.add_row(vec![Cell::new(r.line), Cell::new(&r.reason)]);
    }
    println!("{table}");
    if report.rejected.len() > PREVIEW_ROWS {
        println!("... and {} more", report.rejected.len() - PREVIEW_ROWS);
    }

    let path = match errors {
        Some(p) => PathBuf::from(p),
        None => default_error_report_path(&settings.exports_dir(), "xlsx", chrono::Local::now().date_naive()),
    };
    if is_csv(&path) {
        report.write_errors_csv(&path)?;
    } else {
        report.write_errors_xlsx(&path)?;
    }
    println!("{} Error report written to {}", "!".yellow().bold(), path.display());
    Ok(())
}

pub fn template(output: Option<&str>) -> Result<()> {
    let path = match output {
        Some(p) => PathBuf::from(p),
        None => load_settings().exports_dir().join("modelo_importacao.xlsx"),
    };
    write_template(&path)?;
    println!("Template written to {}", path.display());
    Ok(())
}
