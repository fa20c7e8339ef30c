// sqlx error mapping
// Orphan rules keep `From<sqlx::Error>` out of core, so adapters map by hand

use commandeer_core::port::StoreError;

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            // SQLite result codes: https://www.sqlite.org/rescode.html
            Some(code) if code == "5" => StoreError::Backend(format!(
                "Database locked (SQLITE_BUSY): {}",
                db_err.message()
            )),
            Some(code) if code == "13" => {
                StoreError::Backend(format!("Database full: {}", db_err.message()))
            }
            Some(code) => StoreError::Backend(format!(
                "Database error [{}]: {}",
                code,
                db_err.message()
            )),
            None => StoreError::Backend(format!("Database error: {}", db_err.message())),
        },
        sqlx::Error::ColumnNotFound(col) => {
            StoreError::Backend(format!("Column not found: {}", col))
        }
        _ => StoreError::Backend(err.to_string()),
    }
}
