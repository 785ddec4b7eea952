use std::path::PathBuf;

use colored::Colorize;

use crate::cli::read_secret;
use crate::db::{get_connection, init_db};
use crate::error::{ResiduosError, Result};
use crate::settings::{load_settings, save_settings, shellexpand_path};
use crate::users::{bootstrap_admin, user_count};

pub fn run(data_dir: Option<String>, admin: &str, password: Option<&str>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    save_settings(&settings)?;

    let resolved = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&resolved)?;
    std::fs::create_dir_all(settings.exports_dir())?;

    let conn = get_connection(&settings.db_path())?;
    init_db(&conn)?;
    println!("Initialized residuos at {}", resolved.display());

    if user_count(&conn)? > 0 {
        println!("Users already exist; no Admin created.");
        return Ok(());
    }

    let password = read_secret(password, &format!("Password for Admin '{admin}': "))?;
    if password.is_empty() {
        return Err(ResiduosError::Validation("password cannot be empty".to_string()));
    }
    if bootstrap_admin(&conn, admin, &password)? {
        println!("{} Admin user '{}' created.", "✓".green().bold(), admin.trim());
    }
    Ok(())
}
