use colored::Colorize;
use comfy_table::{Cell, Color, Table};

use crate::auth::{require, Action};
use crate::cli::{open_db, read_secret, Credentials};
use crate::error::Result;
use crate::models::Role;
use crate::users::{add_user, delete_user, list_users, reset_password, set_role};

pub fn add(creds: &Credentials, username: &str, role: Role, new_password: Option<&str>) -> Result<()> {
    let (_, conn) = open_db()?;
    let session = creds.session(&conn)?;
    let password = read_secret(new_password, &format!("Password for '{}': ", username.trim()))?;
    add_user(&conn, &session, username, &password, role)?;
    println!("{} User '{}' created ({role}).", "✓".green().bold(), username.trim());
    Ok(())
}

pub fn list(creds: &Credentials) -> Result<()> {
    let (_, conn) = open_db()?;
    let session = creds.session(&conn)?;
    require(&conn, &session, Action::ManageUsers)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Usuário", "Função"]);
    for user in list_users(&conn)? {
        let role = match user.role {
            Role::Admin => Cell::new(user.role).fg(Color::Yellow),
            Role::User => Cell::new(user.role),
        };
        table.add_row(vec![Cell::new(user.id), Cell::new(&user.username), role]);
    }
    println!("{table}");
    Ok(())
}

pub fn passwd(creds: &Credentials, username: Option<&str>, new_password: Option<&str>) -> Result<()> {
    let (_, conn) = open_db()?;
    let session = creds.session(&conn)?;
    let target = username.map(str::trim).unwrap_or(&session.username).to_string();
    let password = read_secret(new_password, &format!("New password for '{target}': "))?;
    reset_password(&conn, &session, &target, &password)?;
    println!("{} Password changed for '{target}'.", "✓".green().bold());
    Ok(())
}

pub fn role(creds: &Credentials, username: &str, role: Role) -> Result<()> {
    let (_, conn) = open_db()?;
    let session = creds.session(&conn)?;
    set_role(&conn, &session, username.trim(), role)?;
    println!("{} '{}' is now {role}.", "✓".green().bold(), username.trim());
    Ok(())
}

pub fn delete(creds: &Credentials, username: &str) -> Result<()> {
    let (_, conn) = open_db()?;
    let session = creds.session(&conn)?;
    delete_user(&conn, &session, username.trim())?;
    println!("{} User '{}' deleted.", "✓".green().bold(), username.trim());
    Ok(())
}
