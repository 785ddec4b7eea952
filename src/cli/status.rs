use crate::db::{get_connection, latest_version, schema_version};
use crate::error::Result;
use crate::reports::date_bounds;
use crate::settings::load_settings;
use crate::users::user_count;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = settings.db_path();

    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());
    println!("Exports:    {}", settings.exports_dir().display());

    if db_path.exists() {
        let conn = get_connection(&db_path)?;
        println!("Schema:     v{} (latest v{})", schema_version(&conn)?, latest_version());

        let records: i64 = conn.query_row("SELECT count(*) FROM registros", [], |r| r.get(0))?;
        let users = user_count(&conn)?;
        let entries: i64 = conn.query_row("SELECT count(*) FROM activity_log", [], |r| r.get(0))?;

        println!();
        println!("Records:       {records}");
        println!("Users:         {users}");
        println!("Log entries:   {entries}");
        if let Some((first, last)) = date_bounds(&conn)? {
            println!("Date range:    {first} to {last}");
        }
    } else {
        println!();
        println!("Database not found. Run `residuos init` to set up.");
    }

    Ok(())
}
