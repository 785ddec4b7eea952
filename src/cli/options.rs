use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::{open_db, Credentials, OptionKind, ValueField};
use crate::error::Result;
use crate::models::OptionList;
use crate::options::{add_option, distinct_values, list_options, remove_option};

pub fn list(creds: &Credentials, kind: Option<OptionKind>) -> Result<()> {
    let (_, conn) = open_db()?;
    creds.session(&conn)?;

    let kinds: Vec<OptionList> = match kind {
        Some(k) => vec![k.into()],
        None => OptionList::ALL.to_vec(),
    };

    let mut table = Table::new();
    table.set_header(vec!["Lista", "Nome"]);
    for kind in kinds {
        for name in list_options(&conn, kind)? {
            table.add_row(vec![Cell::new(kind.label()), Cell::new(name)]);
        }
    }
    println!("{table}");
    Ok(())
}

pub fn add(creds: &Credentials, kind: OptionKind, name: &str) -> Result<()> {
    let (_, conn) = open_db()?;
    let session = creds.session(&conn)?;
    let kind: OptionList = kind.into();
    let stored = add_option(&conn, &session, kind, name)?;
    println!("{} Added {} '{stored}'.", "✓".green().bold(), kind.label());
    Ok(())
}

pub fn remove(creds: &Credentials, kind: OptionKind, name: &str) -> Result<()> {
    let (_, conn) = open_db()?;
    let session = creds.session(&conn)?;
    let kind: OptionList = kind.into();
    remove_option(&conn, &session, kind, name)?;
    println!("{} Removed {} '{}'.", "✓".green().bold(), kind.label(), name.trim());
    Ok(())
}

pub fn values(creds: &Credentials, field: ValueField) -> Result<()> {
    let (_, conn) = open_db()?;
    creds.session(&conn)?;
    let values = distinct_values(&conn, field.into())?;
    if values.is_empty() {
        println!("No values recorded.");
    }
    for v in values {
        println!("{v}");
    }
    Ok(())
}
