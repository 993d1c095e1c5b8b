use rusqlite::{params, Connection};
use tracing::{info, warn};

use crate::error::KirokuError;
use crate::models::resolve_release_ms;

const SCHEMA_V1: &str = include_str!("../../../migrations/001_initial.sql");
const SCHEMA_V2: &str = include_str!("../../../migrations/002_lists.sql");
const SCHEMA_V3: &str = include_str!("../../../migrations/003_movies.sql");

/// Current schema version, tracked via `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 4;

/// Bring the database to [`SCHEMA_VERSION`] by applying the minimal
/// forward-only chain of migration steps.
///
/// A database newer than this build (downgrade) or a chain that does not
/// land on the expected version is destroyed and recreated from scratch;
/// running against an inconsistent schema is worse than losing local data.
pub fn migrate(conn: &Connection) -> Result<(), KirokuError> {
    let version = user_version(conn)?;

    if version > SCHEMA_VERSION {
        warn!(
            installed = version,
            supported = SCHEMA_VERSION,
            "database is newer than this build, resetting schema"
        );
        reset(conn)?;
        return Ok(());
    }

    if version < 1 {
        conn.execute_batch(SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", 1)?;
    }
    if version < 2 {
        conn.execute_batch(SCHEMA_V2)?;
        conn.pragma_update(None, "user_version", 2)?;
    }
    if version < 3 {
        conn.execute_batch(SCHEMA_V3)?;
        conn.pragma_update(None, "user_version", 3)?;
    }
    if version < 4 {
        migrate_v4(conn)?;
        conn.pragma_update(None, "user_version", 4)?;
    }

    if user_version(conn)? != SCHEMA_VERSION {
        warn!("migration chain did not reach the expected version, resetting schema");
        reset(conn)?;
    }
    Ok(())
}

/// V4: episode `released_ms` / `rating_user` / `plays` columns, with
/// `released_ms` backfilled from the raw air-date text. The backfill runs
/// inside one all-or-nothing transaction over the episodes table.
fn migrate_v4(conn: &Connection) -> Result<(), KirokuError> {
    // Column adds are idempotent: probe before altering.
    if !column_exists(conn, "episodes", "released_ms")? {
        conn.execute_batch(
            "ALTER TABLE episodes ADD COLUMN released_ms INTEGER NOT NULL DEFAULT -1;",
        )?;
    }
    if !column_exists(conn, "episodes", "rating_user")? {
        conn.execute_batch("ALTER TABLE episodes ADD COLUMN rating_user INTEGER;")?;
    }
    if !column_exists(conn, "episodes", "plays")? {
        conn.execute_batch("ALTER TABLE episodes ADD COLUMN plays INTEGER NOT NULL DEFAULT 0;")?;
    }

    conn.execute_batch("BEGIN IMMEDIATE;")?;
    let result = backfill_released_ms(conn);
    match result {
        Ok(rows) => {
            conn.execute_batch("COMMIT;")?;
            if rows > 0 {
                info!(rows, "backfilled released_ms from air-date text");
            }
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK;");
            Err(e)
        }
    }
}

fn backfill_released_ms(conn: &Connection) -> Result<usize, KirokuError> {
    let mut stmt = conn.prepare(
        "SELECT episode_id, first_released FROM episodes
         WHERE released_ms = -1 AND first_released IS NOT NULL",
    )?;
    let pending: Vec<(i64, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<_, _>>()?;

    let mut updated = 0;
    for (episode_id, raw) in pending {
        let ms = resolve_release_ms(Some(&raw));
        if ms != -1 {
            conn.execute(
                "UPDATE episodes SET released_ms = ?1 WHERE episode_id = ?2",
                params![ms, episode_id],
            )?;
            updated += 1;
        }
    }
    Ok(updated)
}

fn user_version(conn: &Connection) -> Result<i64, KirokuError> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, KirokuError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Data-loss fallback: drop everything and rebuild the full chain.
fn reset(conn: &Connection) -> Result<(), KirokuError> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS episodes_search;
         DROP TABLE IF EXISTS list_items;
         DROP TABLE IF EXISTS lists;
         DROP TABLE IF EXISTS episodes;
         DROP TABLE IF EXISTS seasons;
         DROP TABLE IF EXISTS shows;
         DROP TABLE IF EXISTS movies;
         DROP TABLE IF EXISTS sync_state;",
    )?;
    conn.pragma_update(None, "user_version", 0)?;
    migrate(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        conn
    }

    #[test]
    fn fresh_database_reaches_current_version() {
        let conn = memory_conn();
        migrate(&conn).unwrap();
        assert_eq!(user_version(&conn).unwrap(), SCHEMA_VERSION);
        assert!(column_exists(&conn, "episodes", "released_ms").unwrap());
        assert!(column_exists(&conn, "episodes", "plays").unwrap());
    }

    #[test]
    fn migrate_is_idempotent() {
        let conn = memory_conn();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(user_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn upgrade_backfills_released_ms() {
        let conn = memory_conn();
        // Simulate a v3 install with an episode lacking the v4 columns.
        conn.execute_batch(SCHEMA_V1).unwrap();
        conn.execute_batch(SCHEMA_V2).unwrap();
        conn.execute_batch(SCHEMA_V3).unwrap();
        conn.pragma_update(None, "user_version", 3).unwrap();
        conn.execute("INSERT INTO shows (show_id, title) VALUES (1, 'X')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO seasons (season_id, season_number, show_id) VALUES (10, 1, 1)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO episodes (episode_id, season_id, show_id, first_released)
             VALUES (100, 10, 1, '1970-01-02')",
            [],
        )
        .unwrap();

        migrate(&conn).unwrap();

        let ms: i64 = conn
            .query_row(
                "SELECT released_ms FROM episodes WHERE episode_id = 100",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(ms, 86_400_000);
    }

    #[test]
    fn newer_database_is_reset() {
        let conn = memory_conn();
        migrate(&conn).unwrap();
        conn.execute("INSERT INTO shows (show_id, title) VALUES (1, 'X')", [])
            .unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();

        migrate(&conn).unwrap();

        assert_eq!(user_version(&conn).unwrap(), SCHEMA_VERSION);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM shows", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0, "reset must recreate an empty schema");
    }
}
