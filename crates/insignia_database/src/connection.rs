//! Database connection utilities.

use crate::DatabaseResult;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use insignia_error::{
    DatabaseError, DatabaseErrorKind, InsigniaResult, StorageError, StorageErrorKind,
};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Pooled PostgreSQL connections.
pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// Establish a connection to the PostgreSQL database.
///
/// Reads the `DATABASE_URL` environment variable to determine the connection string.
///
/// # Errors
///
/// Returns an error if:
/// - `DATABASE_URL` environment variable is not set
/// - Connection to the database fails
pub fn establish_connection() -> DatabaseResult<PgConnection> {
    let database_url = std::env::var("DATABASE_URL").map_err(|_| {
        DatabaseError::new(DatabaseErrorKind::Connection(
            "DATABASE_URL environment variable not set".to_string(),
        ))
    })?;

    PgConnection::establish(&database_url).map_err(Into::into)
}

/// Build a connection pool of at most `max_size` connections.
pub fn establish_pool(database_url: &str, max_size: u32) -> DatabaseResult<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(max_size)
        .build(manager)
        .map_err(|e| DatabaseError::new(DatabaseErrorKind::Pool(e.to_string())))
}

/// Run pending migrations.
pub fn run_migrations(conn: &mut PgConnection) -> DatabaseResult<()> {
    conn.run_pending_migrations(MIGRATIONS)
        .map(|applied| {
            for version in applied {
                tracing::info!(%version, "Applied migration");
            }
        })
        .map_err(|e| DatabaseError::new(DatabaseErrorKind::Migration(e.to_string())))
}

/// Run blocking Diesel work against a pooled connection on tokio's blocking pool.
pub(crate) async fn with_connection<T, F>(pool: &DbPool, work: F) -> InsigniaResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> DatabaseResult<T> + Send + 'static,
{
    let pool = pool.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| DatabaseError::new(DatabaseErrorKind::Pool(e.to_string())))?;
        work(&mut conn)
    })
    .await
    .map_err(|e| StorageError::new(StorageErrorKind::Task(e.to_string())))?;

    Ok(result?)
}
