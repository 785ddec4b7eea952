mod activity;
mod auth;
mod cli;
mod db;
mod error;
mod export;
mod fmt;
mod importer;
mod models;
mod options;
mod records;
mod reports;
mod settings;
mod text;
mod users;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, ImportCommands, OptionsCommands, RecordsCommands, UsersCommands};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let creds = cli.credentials();

    let result = match cli.command {
        Commands::Init { data_dir, admin } => cli::init::run(data_dir, &admin, creds.password.as_deref()),
        Commands::Status => cli::status::run(),
        Commands::Records { command } => match command {
            RecordsCommands::Add { fields } => cli::records::add(&creds, fields),
            RecordsCommands::Edit { id, fields } => cli::records::edit(&creds, id, fields),
            RecordsCommands::Show { id } => cli::records::show(&creds, id),
            RecordsCommands::List {
                search,
                page,
                page_size,
            } => cli::records::list(&creds, &search, page, page_size),
            RecordsCommands::Delete { ids } => cli::records::delete(&creds, &ids),
            RecordsCommands::DeleteAll { confirm } => cli::records::delete_all(&creds, confirm),
            RecordsCommands::Standardize => cli::records::standardize(&creds),
        },
        Commands::Options { command } => match command {
            OptionsCommands::List { kind } => cli::options::list(&creds, kind),
            OptionsCommands::Add { kind, name } => cli::options::add(&creds, kind, &name),
            OptionsCommands::Remove { kind, name } => cli::options::remove(&creds, kind, &name),
            OptionsCommands::Values { field } => cli::options::values(&creds, field),
        },
        Commands::Users { command } => match command {
            UsersCommands::Add {
                username,
                role,
                new_password,
            } => cli::users::add(&creds, &username, role, new_password.as_deref()),
            UsersCommands::List => cli::users::list(&creds),
            UsersCommands::Passwd {
                username,
                new_password,
            } => cli::users::passwd(&creds, username.as_deref(), new_password.as_deref()),
            UsersCommands::Role { username, role } => cli::users::role(&creds, &username, role),
            UsersCommands::Delete { username } => cli::users::delete(&creds, &username),
        },
        Commands::Log { limit, by_user, csv } => cli::log::run(&creds, limit, by_user.as_deref(), csv.as_deref()),
        Commands::Import { command } => match command {
            ImportCommands::Run { file, errors } => cli::import::run(&creds, &file, errors.as_deref()),
            ImportCommands::Template { output } => cli::import::template(output.as_deref()),
        },
        Commands::Dashboard { filter, period } => cli::dashboard::run(&creds, filter, period),
        Commands::Export {
            filter,
            format,
            output,
        } => cli::export::run(&creds, filter, format, output.as_deref()),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "residuos", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
