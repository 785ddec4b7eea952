use std::path::PathBuf;

use colored::Colorize;

use crate::cli::{open_db, Credentials, ExportFormat, FilterArgs};
use crate::error::Result;
use crate::export::{default_report_path, write_records_csv, write_records_xlsx};
use crate::reports::{get_dashboard_rows, DashboardFilter};

pub fn run(creds: &Credentials, filter: FilterArgs, format: ExportFormat, output: Option<&str>) -> Result<()> {
    let (settings, conn) = open_db()?;
    let session = creds.session(&conn)?;

    let filter: DashboardFilter = filter.into();
    let rows = get_dashboard_rows(&conn, &filter)?;

    let path = match output {
        Some(p) => PathBuf::from(p),
        None => default_report_path(
            &settings.exports_dir(),
            format.extension(),
            chrono::Local::now().naive_local(),
        ),
    };
    match format {
        ExportFormat::Xlsx => write_records_xlsx(&path, &rows)?,
        ExportFormat::Csv => write_records_csv(&path, &rows)?,
    }
    tracing::info!(user = %session.username, rows = rows.len(), path = %path.display(), "records exported");

    println!("{} {} records exported to {}", "✓".green().bold(), rows.len(), path.display());
    Ok(())
}
