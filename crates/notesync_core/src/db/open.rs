//! Connection bootstrap for the object store.
//!
//! # Invariants
//! - Returned connections are fully migrated.
//! - Returned connections wait up to `BUSY_TIMEOUT` on a locked database.
//! - File databases use the WAL journal.

use super::migrations::apply_migrations;
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy)]
enum ConnectionTarget {
    File,
    Memory,
}

impl ConnectionTarget {
    fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Memory => "memory",
        }
    }
}

/// Opens (creating if needed) and migrates a database file.
///
/// # Side effects
/// - Emits one `db_open` event with duration and outcome.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_logged(ConnectionTarget::File, || Ok(Connection::open(path)?))
}

/// Opens and migrates a private in-memory database.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_logged(ConnectionTarget::Memory, || Ok(Connection::open_in_memory()?))
}

fn open_logged(
    target: ConnectionTarget,
    connect: impl FnOnce() -> DbResult<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    let opened = connect().and_then(|mut conn| {
        let applied = prepare(&mut conn, target)?;
        Ok((conn, applied))
    });
    let duration_ms = started_at.elapsed().as_millis();

    match opened {
        Ok((conn, applied)) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={} migrations_applied={}",
                target.as_str(),
                duration_ms,
                applied
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error={}",
                target.as_str(),
                duration_ms,
                err
            );
            Err(err)
        }
    }
}

fn prepare(conn: &mut Connection, target: ConnectionTarget) -> DbResult<usize> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    if matches!(target, ConnectionTarget::File) {
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    }
    apply_migrations(conn)
}
