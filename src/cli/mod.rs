pub mod dashboard;
pub mod export;
pub mod import;
pub mod init;
pub mod log;
pub mod options;
pub mod records;
pub mod status;
pub mod users;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use rusqlite::Connection;
use zeroize::Zeroizing;

use crate::auth::{login, Session};
use crate::db::{get_connection, init_db};
use crate::error::{ResiduosError, Result};
use crate::models::{OperationType, OptionList, Role};
use crate::options::DistinctField;
use crate::reports::{DashboardFilter, Period};
use crate::settings::{load_settings, Settings};
use crate::text::{parse_brl, parse_date_dayfirst};

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Opens the configured database and brings its schema up to date.
pub(crate) fn open_db() -> Result<(Settings, Connection)> {
    let settings = load_settings();
    let db_path = settings.db_path();
    if !db_path.exists() {
        return Err(ResiduosError::Other(format!(
            "database not found at {}. Run `residuos init` first.",
            db_path.display()
        )));
    }
    let conn = get_connection(&db_path)?;
    init_db(&conn)?;
    Ok((settings, conn))
}

/// Reads a secret from the flag/env value, prompting without echo otherwise.
pub(crate) fn read_secret(given: Option<&str>, prompt: &str) -> Result<Zeroizing<String>> {
    match given {
        Some(p) => Ok(Zeroizing::new(p.to_string())),
        None => Ok(Zeroizing::new(rpassword::prompt_password(prompt)?)),
    }
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub(crate) fn session(&self, conn: &Connection) -> Result<Session> {
        let user = self
            .user
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ResiduosError::Auth("no user given (use --user or RESIDUOS_USER)".to_string()))?;
        let password = read_secret(self.password.as_deref(), &format!("Password for {user}: "))?;
        let session = login(conn, user, &password)?;
        tracing::debug!(user = %session.username, role = %session.role, "logged in");
        Ok(session)
    }
}

fn parse_date_arg(raw: &str) -> std::result::Result<NaiveDate, String> {
    parse_date_dayfirst(raw).ok_or_else(|| format!("invalid date '{raw}' (use DD/MM/YYYY or YYYY-MM-DD)"))
}

fn parse_amount_arg(raw: &str) -> std::result::Result<f64, String> {
    parse_brl(raw).ok_or_else(|| format!("invalid number '{raw}'"))
}

fn parse_operation_arg(raw: &str) -> std::result::Result<OperationType, String> {
    raw.parse::<OperationType>().map_err(|e| e.to_string())
}

fn parse_role_arg(raw: &str) -> std::result::Result<Role, String> {
    raw.parse::<Role>().map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Command tree
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "residuos",
    version,
    about = "Record keeping and reporting for waste and byproduct sales and transfers."
)]
pub struct Cli {
    /// User to act as
    #[arg(long, global = true, env = "RESIDUOS_USER")]
    pub user: Option<String>,
    /// Password (prompted when omitted)
    #[arg(long, global = true, env = "RESIDUOS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            user: self.user.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory, create the database and the first Admin user.
    Init {
        /// Path for data (default: ~/Documents/residuos)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Name of the first Admin user
        #[arg(long, default_value = "Administrador")]
        admin: String,
    },
    /// Show current database and summary statistics.
    Status,
    /// Add, edit, list and delete records.
    Records {
        #[command(subcommand)]
        command: RecordsCommands,
    },
    /// Manage the option lists behind the dimension fields.
    Options {
        #[command(subcommand)]
        command: OptionsCommands,
    },
    /// Manage users and passwords.
    Users {
        #[command(subcommand)]
        command: UsersCommands,
    },
    /// Show the activity log (Admin).
    Log {
        /// Number of entries to show
        #[arg(long, default_value = "50")]
        limit: u32,
        /// Only entries by this user
        #[arg(long = "by")]
        by_user: Option<String>,
        /// Write the selected entries to a CSV file instead
        #[arg(long)]
        csv: Option<String>,
    },
    /// Import records from a spreadsheet.
    Import {
        #[command(subcommand)]
        command: ImportCommands,
    },
    /// Totals, breakdowns and trends for a filtered period.
    Dashboard {
        #[command(flatten)]
        filter: FilterArgs,
        /// Bucket size for the evolution series
        #[arg(long, value_enum, default_value = "monthly")]
        period: PeriodArg,
    },
    /// Export filtered records to XLSX or CSV.
    Export {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, value_enum, default_value = "xlsx")]
        format: ExportFormat,
        /// Output path (default: <data_dir>/exports/relatorio_residuos_<timestamp>.<ext>)
        #[arg(long)]
        output: Option<String>,
    },
    /// Print shell completions.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RecordFields {
    /// Operation date: DD/MM/YYYY or YYYY-MM-DD
    #[arg(long, value_parser = parse_date_arg)]
    pub date: Option<NaiveDate>,
    /// Operation type: Venda or Transferência
    #[arg(long = "type", value_parser = parse_operation_arg)]
    pub operation_type: Option<OperationType>,
    #[arg(long)]
    pub regional: Option<String>,
    /// Sender branch
    #[arg(long)]
    pub branch: Option<String>,
    #[arg(long)]
    pub destination: Option<String>,
    #[arg(long)]
    pub product: Option<String>,
    #[arg(long, value_parser = parse_amount_arg)]
    pub quantity: Option<f64>,
    #[arg(long)]
    pub unit: Option<String>,
    #[arg(long = "unit-price", value_parser = parse_amount_arg)]
    pub unit_price: Option<f64>,
    /// Total value; when positive the unit price is derived from it
    #[arg(long, value_parser = parse_amount_arg)]
    pub total: Option<f64>,
    /// Invoice (NFe) reference
    #[arg(long)]
    pub invoice: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Subcommand)]
pub enum RecordsCommands {
    /// Add a record.
    Add {
        #[command(flatten)]
        fields: RecordFields,
    },
    /// Edit a record (Admin). Omitted fields keep their current value.
    Edit {
        id: i64,
        #[command(flatten)]
        fields: RecordFields,
    },
    /// Show one record.
    Show { id: i64 },
    /// List records, newest first.
    List {
        /// Case-insensitive text search
        #[arg(long, default_value = "")]
        search: String,
        /// Page number, starting at 1
        #[arg(long, default_value = "1")]
        page: u64,
        /// Rows per page (default from settings)
        #[arg(long = "page-size")]
        page_size: Option<u32>,
    },
    /// Delete one or more records by ID (Admin).
    Delete { ids: Vec<i64> },
    /// Delete every record and restart IDs at 1.
    DeleteAll {
        /// Required: confirms the deletion
        #[arg(long)]
        confirm: bool,
    },
    /// Rewrite dimension fields to their canonical title-cased form (Admin).
    Standardize,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OptionKind {
    Regional,
    Branch,
    Destination,
    Product,
    Unit,
}

impl From<OptionKind> for OptionList {
    fn from(kind: OptionKind) -> Self {
        match kind {
            OptionKind::Regional => OptionList::Regional,
            OptionKind::Branch => OptionList::Branch,
            OptionKind::Destination => OptionList::Destination,
            OptionKind::Product => OptionList::Product,
            OptionKind::Unit => OptionList::Unit,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ValueField {
    Regional,
    Branch,
    Destination,
    Product,
    Unit,
    Type,
    User,
}

impl From<ValueField> for DistinctField {
    fn from(field: ValueField) -> Self {
        match field {
            ValueField::Regional => DistinctField::Dimension(OptionList::Regional),
            ValueField::Branch => DistinctField::Dimension(OptionList::Branch),
            ValueField::Destination => DistinctField::Dimension(OptionList::Destination),
            ValueField::Product => DistinctField::Dimension(OptionList::Product),
            ValueField::Unit => DistinctField::Dimension(OptionList::Unit),
            ValueField::Type => DistinctField::OperationType,
            ValueField::User => DistinctField::CreatedBy,
        }
    }
}

#[derive(Subcommand)]
pub enum OptionsCommands {
    /// List options (all lists when no kind is given).
    List {
        #[arg(value_enum)]
        kind: Option<OptionKind>,
    },
    /// Add an option (Admin).
    Add {
        #[arg(value_enum)]
        kind: OptionKind,
        name: String,
    },
    /// Remove an option (Admin). Existing records keep their value.
    Remove {
        #[arg(value_enum)]
        kind: OptionKind,
        name: String,
    },
    /// Distinct values present in records for a field.
    Values {
        #[arg(value_enum)]
        field: ValueField,
    },
}

#[derive(Subcommand)]
pub enum UsersCommands {
    /// Create a user (Admin).
    Add {
        username: String,
        #[arg(long, default_value = "User", value_parser = parse_role_arg)]
        role: Role,
        /// Password for the new user (prompted when omitted)
        #[arg(long = "new-password")]
        new_password: Option<String>,
    },
    /// List users.
    List,
    /// Change a password. Admins may change anyone's; users only their own.
    Passwd {
        /// Target user (default: yourself)
        username: Option<String>,
        #[arg(long = "new-password")]
        new_password: Option<String>,
    },
    /// Change a user's role (Admin).
    Role {
        username: String,
        #[arg(value_parser = parse_role_arg)]
        role: Role,
    },
    /// Delete a user (Admin).
    Delete { username: String },
}

#[derive(Subcommand)]
pub enum ImportCommands {
    /// Import a CSV/XLSX file (Admin).
    Run {
        /// Path to the spreadsheet
        file: String,
        /// Where to write the error report when rows are rejected
        /// (default: <data_dir>/exports/relatorio_erros_importacao_<date>.xlsx)
        #[arg(long)]
        errors: Option<String>,
    },
    /// Write the import template.
    Template {
        /// Output path; a .csv extension writes CSV
        #[arg(long)]
        output: Option<String>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Start date (default: earliest record)
    #[arg(long, value_parser = parse_date_arg)]
    pub from: Option<NaiveDate>,
    /// End date (default: latest record)
    #[arg(long, value_parser = parse_date_arg)]
    pub to: Option<NaiveDate>,
    #[arg(long)]
    pub regional: Option<String>,
    #[arg(long)]
    pub branch: Option<String>,
    #[arg(long)]
    pub product: Option<String>,
    #[arg(long)]
    pub destination: Option<String>,
    #[arg(long = "type", value_parser = parse_operation_arg)]
    pub operation_type: Option<OperationType>,
    #[arg(long)]
    pub unit: Option<String>,
    /// Only records created by this user
    #[arg(long = "created-by")]
    pub created_by: Option<String>,
}

impl From<FilterArgs> for DashboardFilter {
    fn from(f: FilterArgs) -> Self {
        let canonical = |v: Option<String>| v.map(|s| crate::text::standardize(&s));
        DashboardFilter {
            from: f.from,
            to: f.to,
            regional: canonical(f.regional),
            branch: canonical(f.branch),
            product: canonical(f.product),
            destination: canonical(f.destination),
            operation_type: f.operation_type.map(|o| o.label().to_string()),
            unit: canonical(f.unit),
            user: f.created_by,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PeriodArg {
    Monthly,
    Quarterly,
    Yearly,
}

impl From<PeriodArg> for Period {
    fn from(p: PeriodArg) -> Self {
        match p {
            PeriodArg::Monthly => Period::Monthly,
            PeriodArg::Quarterly => Period::Quarterly,
            PeriodArg::Yearly => Period::Yearly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Xlsx,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
        }
    }
}
