use std::cell::{Cell, RefCell};
use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::KirokuError;
use crate::models::{Episode, ItemType, List, ListItem, Movie, Season, Show, WatchedFlag};
use crate::resource::Resource;
use crate::schema;
use crate::select::SelectionBuilder;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A change notification for one logical resource path, emitted after a
/// unit of work commits.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub path: String,
}

pub(crate) struct Notifier {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Notifier {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { tx }
    }

    fn notify(&self, path: &str) {
        // Subscribers are best-effort; a missing or lagging UI never
        // blocks a writer.
        let _ = self.tx.send(ChangeEvent { path: path.into() });
    }
}

/// SQLite-backed store: schema owner, mutation gateway and query surface.
///
/// One `Store` per process with an explicit open/close lifecycle. Reads
/// and writes address logical [`Resource`] paths rather than tables.
pub struct Store {
    pub(crate) conn: Connection,
    notifier: Notifier,
}

/// An explicit all-or-nothing unit of work.
///
/// Mutation calls either join a caller's unit (passed by reference) or
/// open their own; there is no ambient transaction state. Change
/// notifications collected while the unit is open are emitted on commit,
/// deduplicated per resource path. Dropping without commit rolls back.
pub struct UnitOfWork<'c> {
    conn: &'c Connection,
    notifier: &'c Notifier,
    pending: RefCell<Vec<String>>,
    finished: Cell<bool>,
}

impl<'c> UnitOfWork<'c> {
    fn begin(conn: &'c Connection, notifier: &'c Notifier) -> Result<Self, KirokuError> {
        conn.execute_batch("BEGIN IMMEDIATE;")?;
        Ok(Self {
            conn,
            notifier,
            pending: RefCell::new(Vec::new()),
            finished: Cell::new(false),
        })
    }

    pub(crate) fn touch(&self, path: String) {
        let mut pending = self.pending.borrow_mut();
        if !pending.contains(&path) {
            pending.push(path);
        }
    }

    pub fn commit(self) -> Result<(), KirokuError> {
        self.conn.execute_batch("COMMIT;")?;
        self.finished.set(true);
        for path in self.pending.borrow().iter() {
            self.notifier.notify(path);
        }
        Ok(())
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if !self.finished.get() {
            let _ = self.conn.execute_batch("ROLLBACK;");
        }
    }
}

/// One operation inside a heterogeneous batch.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Insert {
        resource: Resource,
        values: Vec<(String, Value)>,
    },
    Update {
        resource: Resource,
        set: Vec<(String, Value)>,
        selection: Option<String>,
        args: Vec<Value>,
    },
    Delete {
        resource: Resource,
        selection: Option<String>,
        args: Vec<Value>,
    },
}

#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub op: BatchOp,
    /// Hint that the gateway may release contention after this operation.
    /// Honoring it must not break atomicity, so with a single SQLite
    /// writer it only defers to commit.
    pub yield_allowed: bool,
}

impl BatchEntry {
    pub fn new(op: BatchOp) -> Self {
        Self {
            op,
            yield_allowed: false,
        }
    }
}

/// Minimal episode identity used by flag jobs: enough to recompute
/// counters and to address remote mirrors by numbers instead of local ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeKey {
    pub episode_id: i64,
    pub season_id: i64,
    pub show_id: i64,
    pub season_number: i64,
    pub episode_number: i64,
}

impl Store {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, KirokuError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn,
            notifier: Notifier::new(),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, KirokuError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn,
            notifier: Notifier::new(),
        })
    }

    /// Close the store, surfacing any final SQLite error.
    pub fn close(self) -> Result<(), KirokuError> {
        self.conn.close().map_err(|(_, e)| e.into())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.notifier.tx.subscribe()
    }

    pub fn unit_of_work(&self) -> Result<UnitOfWork<'_>, KirokuError> {
        UnitOfWork::begin(&self.conn, &self.notifier)
    }

    // ── Gateway: resource-addressed mutations ───────────────────

    /// Insert one row. Returns the row id (`last_insert_rowid`).
    pub fn insert(
        &self,
        resource: &Resource,
        values: &[(&str, Value)],
        uow: Option<&UnitOfWork>,
    ) -> Result<i64, KirokuError> {
        self.in_unit(uow, |unit| {
            let id = self.exec_insert(resource, values)?;
            unit.touch(resource.path());
            Ok(id)
        })
    }

    /// Insert many rows with replace-on-conflict where the resource's
    /// table expects duplicate natural keys (last write wins).
    pub fn bulk_insert(
        &self,
        resource: &Resource,
        rows: &[Vec<(&str, Value)>],
        uow: Option<&UnitOfWork>,
    ) -> Result<usize, KirokuError> {
        self.in_unit(uow, |unit| {
            for row in rows {
                self.exec_insert(resource, row)?;
            }
            if !rows.is_empty() {
                unit.touch(resource.path());
            }
            Ok(rows.len())
        })
    }

    /// Update rows matching the resource's fixed predicate plus the
    /// caller's selection. Returns the number of rows affected.
    pub fn update(
        &self,
        resource: &Resource,
        set: &[(&str, Value)],
        selection: Option<&str>,
        args: &[Value],
        uow: Option<&UnitOfWork>,
    ) -> Result<usize, KirokuError> {
        self.in_unit(uow, |unit| {
            let mut builder = SelectionBuilder::from_mapping(&resource.mapping()?);
            if let Some(clause) = selection {
                builder.and_where(clause, args.to_vec())?;
            }
            let (sql, bind) = builder.build_update(set)?;
            let affected = self.conn.execute(&sql, params_from_iter(bind.iter()))?;
            if affected > 0 {
                unit.touch(resource.path());
            }
            Ok(affected)
        })
    }

    /// Delete rows. Returns the number of rows affected.
    pub fn delete(
        &self,
        resource: &Resource,
        selection: Option<&str>,
        args: &[Value],
        uow: Option<&UnitOfWork>,
    ) -> Result<usize, KirokuError> {
        self.in_unit(uow, |unit| {
            let mut builder = SelectionBuilder::from_mapping(&resource.mapping()?);
            if let Some(clause) = selection {
                builder.and_where(clause, args.to_vec())?;
            }
            let (sql, bind) = builder.build_delete()?;
            let affected = self.conn.execute(&sql, params_from_iter(bind.iter()))?;
            if affected > 0 {
                unit.touch(resource.path());
            }
            Ok(affected)
        })
    }

    /// Execute heterogeneous ordered operations in one unit of work; any
    /// failure rolls back all of them.
    pub fn apply_batch(&self, entries: Vec<BatchEntry>) -> Result<Vec<usize>, KirokuError> {
        let unit = self.unit_of_work()?;
        let mut affected = Vec::with_capacity(entries.len());
        for entry in &entries {
            if entry.yield_allowed {
                debug!("batch yield point deferred until commit");
            }
            let count = match &entry.op {
                BatchOp::Insert { resource, values } => {
                    let owned: Vec<(&str, Value)> = values
                        .iter()
                        .map(|(c, v)| (c.as_str(), v.clone()))
                        .collect();
                    self.insert(resource, &owned, Some(&unit))?;
                    1
                }
                BatchOp::Update {
                    resource,
                    set,
                    selection,
                    args,
                } => {
                    let owned: Vec<(&str, Value)> =
                        set.iter().map(|(c, v)| (c.as_str(), v.clone())).collect();
                    self.update(resource, &owned, selection.as_deref(), args, Some(&unit))?
                }
                BatchOp::Delete {
                    resource,
                    selection,
                    args,
                } => self.delete(resource, selection.as_deref(), args, Some(&unit))?,
            };
            affected.push(count);
        }
        unit.commit()?;
        Ok(affected)
    }

    fn in_unit<T>(
        &self,
        uow: Option<&UnitOfWork>,
        f: impl FnOnce(&UnitOfWork) -> Result<T, KirokuError>,
    ) -> Result<T, KirokuError> {
        match uow {
            Some(unit) => f(unit),
            None => {
                let unit = self.unit_of_work()?;
                let value = f(&unit)?;
                unit.commit()?;
                Ok(value)
            }
        }
    }

    fn exec_insert(
        &self,
        resource: &Resource,
        values: &[(&str, Value)],
    ) -> Result<i64, KirokuError> {
        let mapping = resource.mapping()?;
        let table = mapping.write_table.ok_or_else(|| {
            KirokuError::Validation(format!("resource '{}' is read-only", resource.path()))
        })?;
        if values.is_empty() {
            return Err(KirokuError::Validation("insert with no values".into()));
        }
        let conflict = if mapping.replace_on_conflict {
            "OR REPLACE "
        } else {
            ""
        };
        let columns: Vec<&str> = values.iter().map(|(c, _)| *c).collect();
        let placeholders = vec!["?"; values.len()].join(", ");
        let sql = format!(
            "INSERT {conflict}INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        stmt.execute(params_from_iter(values.iter().map(|(_, v)| v)))?;
        Ok(self.conn.last_insert_rowid())
    }

    // ── Gateway: resource-addressed reads ───────────────────────

    /// Run a read against a logical resource, mapping each result row.
    pub fn query_map<T, F>(
        &self,
        resource: &Resource,
        projection: &[&str],
        selection: Option<&str>,
        args: &[Value],
        order_by: Option<&str>,
        f: F,
    ) -> Result<Vec<T>, KirokuError>
    where
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let mut builder = SelectionBuilder::from_mapping(&resource.mapping()?);
        if let Some(clause) = selection {
            builder.and_where(clause, args.to_vec())?;
        }
        let (sql, bind) = builder.build_select(projection, order_by)?;
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(bind.iter()), f)?
            .collect::<Result<Vec<T>, _>>()?;
        Ok(rows)
    }

    /// Row count for a resource, via the virtual `count` column.
    pub fn query_count(
        &self,
        resource: &Resource,
        selection: Option<&str>,
        args: &[Value],
    ) -> Result<i64, KirokuError> {
        let counts = self.query_map(resource, &["count"], selection, args, None, |row| {
            row.get::<_, i64>(0)
        })?;
        Ok(counts.into_iter().next().unwrap_or(0))
    }

    // ── Typed helpers: shows ────────────────────────────────────

    pub fn insert_show(&self, show: &Show, uow: Option<&UnitOfWork>) -> Result<(), KirokuError> {
        let values = show_values(show);
        self.insert(&Resource::Shows, &values, uow)?;
        Ok(())
    }

    pub fn get_show(&self, show_id: i64) -> Result<Option<Show>, KirokuError> {
        self.conn
            .query_row(
                "SELECT show_id, title, overview, poster, network, release_time, status,
                        favorite, hidden, sync_enabled, next_episode_id,
                        last_watched_episode_id, last_updated_ms, last_edited_ms, language
                 FROM shows WHERE show_id = ?1",
                params![show_id],
                row_to_show,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Remove a show and everything hanging off it: seasons and episodes
    /// cascade via foreign keys, list items referencing the show or its
    /// children are deleted explicitly.
    pub fn remove_show(&self, show_id: i64) -> Result<bool, KirokuError> {
        let unit = self.unit_of_work()?;
        self.delete(
            &Resource::ListItems,
            Some(
                "(item_type = 1 AND item_ref_id = ?)
                 OR (item_type = 2 AND item_ref_id IN
                     (SELECT season_id FROM seasons WHERE show_id = ?))
                 OR (item_type = 3 AND item_ref_id IN
                     (SELECT episode_id FROM episodes WHERE show_id = ?))",
            ),
            &[
                Value::Integer(show_id),
                Value::Integer(show_id),
                Value::Integer(show_id),
            ],
            Some(&unit),
        )?;
        let removed = self.delete(&Resource::Show(show_id), None, &[], Some(&unit))?;
        if removed > 0 {
            unit.touch(Resource::Seasons.path());
            unit.touch(Resource::Episodes.path());
        }
        unit.commit()?;
        Ok(removed > 0)
    }

    // ── Typed helpers: seasons & episodes ───────────────────────

    pub fn bulk_insert_seasons(
        &self,
        seasons: &[Season],
        uow: Option<&UnitOfWork>,
    ) -> Result<usize, KirokuError> {
        let rows: Vec<Vec<(&str, Value)>> = seasons.iter().map(season_values).collect();
        self.bulk_insert(&Resource::Seasons, &rows, uow)
    }

    pub fn bulk_insert_episodes(
        &self,
        episodes: &[Episode],
        uow: Option<&UnitOfWork>,
    ) -> Result<usize, KirokuError> {
        let rows: Vec<Vec<(&str, Value)>> = episodes.iter().map(episode_values).collect();
        self.bulk_insert(&Resource::Episodes, &rows, uow)
    }

    pub fn get_season(&self, season_id: i64) -> Result<Option<Season>, KirokuError> {
        self.conn
            .query_row(
                "SELECT season_id, season_number, show_id, watched_count, unaired_count,
                        noairdate_count, total_count
                 FROM seasons WHERE season_id = ?1",
                params![season_id],
                row_to_season,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn get_episode(&self, episode_id: i64) -> Result<Option<Episode>, KirokuError> {
        self.conn
            .query_row(
                &format!("{EPISODE_SELECT} WHERE episode_id = ?1"),
                params![episode_id],
                row_to_episode,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn episodes_of_season(&self, season_id: i64) -> Result<Vec<Episode>, KirokuError> {
        let mut stmt = self.conn.prepare(&format!(
            "{EPISODE_SELECT} WHERE season_id = ?1 ORDER BY episode_number"
        ))?;
        let rows = stmt
            .query_map(params![season_id], row_to_episode)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Episode identities matching an internal selection, ordered by
    /// season and episode number.
    pub fn episode_keys(
        &self,
        selection: &str,
        args: &[Value],
    ) -> Result<Vec<EpisodeKey>, KirokuError> {
        let sql = format!(
            "SELECT episode_id, season_id, show_id, season_number, episode_number
             FROM episodes WHERE {selection} ORDER BY season_number, episode_number"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok(EpisodeKey {
                    episode_id: row.get(0)?,
                    season_id: row.get(1)?,
                    show_id: row.get(2)?,
                    season_number: row.get(3)?,
                    episode_number: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Increment play counts for episodes matching the selection. Kept as
    /// a typed mutation because the generic gateway cannot express
    /// `plays = plays + 1`.
    pub fn bump_episode_plays(
        &self,
        selection: &str,
        args: &[Value],
        uow: Option<&UnitOfWork>,
    ) -> Result<usize, KirokuError> {
        self.in_unit(uow, |unit| {
            let sql = format!("UPDATE episodes SET plays = plays + 1 WHERE {selection}");
            let affected = self.conn.execute(&sql, params_from_iter(args.iter()))?;
            if affected > 0 {
                unit.touch(Resource::Episodes.path());
            }
            Ok(affected)
        })
    }

    // ── Typed helpers: lists & movies ───────────────────────────

    pub fn insert_list(&self, list: &List, uow: Option<&UnitOfWork>) -> Result<(), KirokuError> {
        self.insert(
            &Resource::Lists,
            &[
                ("list_id", Value::Text(list.list_id.clone())),
                ("name", Value::Text(list.name.clone())),
                ("list_order", Value::Integer(list.list_order)),
            ],
            uow,
        )?;
        Ok(())
    }

    pub fn insert_list_item(
        &self,
        item: &ListItem,
        uow: Option<&UnitOfWork>,
    ) -> Result<(), KirokuError> {
        self.insert(
            &Resource::ListItems,
            &[
                ("list_item_id", Value::Text(item.list_item_id.clone())),
                ("item_ref_id", Value::Integer(item.item_ref_id)),
                ("item_type", Value::Integer(item.item_type.as_db())),
                ("list_id", Value::Text(item.list_id.clone())),
            ],
            uow,
        )?;
        Ok(())
    }

    /// Insert or update a movie keyed by its remote id (created on first
    /// reference, last write wins).
    pub fn upsert_movie(&self, movie: &Movie, uow: Option<&UnitOfWork>) -> Result<(), KirokuError> {
        self.insert(
            &Resource::Movies,
            &[
                ("movie_id", Value::Integer(movie.movie_id)),
                ("title", Value::Text(movie.title.clone())),
                ("in_collection", Value::Integer(movie.in_collection as i64)),
                ("in_watchlist", Value::Integer(movie.in_watchlist as i64)),
                ("watched", Value::Integer(movie.watched as i64)),
                ("plays", Value::Integer(movie.plays)),
                ("rating_tmdb", opt_real(movie.rating_tmdb)),
                ("rating_trakt", opt_real(movie.rating_trakt)),
                ("last_updated_ms", Value::Integer(movie.last_updated_ms)),
            ],
            uow,
        )?;
        Ok(())
    }

    // ── Sync bookkeeping ────────────────────────────────────────

    pub fn set_sync_state(&self, key: &str, value: &str) -> Result<(), KirokuError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_sync_state(&self, key: &str) -> Result<Option<String>, KirokuError> {
        self.conn
            .query_row(
                "SELECT value FROM sync_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Forget the "last synced ratings" checkpoints so the next sync
    /// re-pulls ratings (used after new shows are added).
    pub fn clear_ratings_checkpoints(&self) -> Result<(), KirokuError> {
        self.conn
            .execute("DELETE FROM sync_state WHERE key LIKE 'ratings_synced_%'", [])?;
        Ok(())
    }
}

// ── Row/value mapping helpers ───────────────────────────────────

const EPISODE_SELECT: &str = "SELECT episode_id, season_number, episode_number, absolute_number,
        season_id, show_id, title, overview, first_released, released_ms, watched, collected,
        rating_global, rating_user, plays, last_edited_ms FROM episodes";

fn opt_text(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::Text(s.clone()),
        None => Value::Null,
    }
}

fn opt_int(value: Option<i64>) -> Value {
    match value {
        Some(v) => Value::Integer(v),
        None => Value::Null,
    }
}

fn opt_real(value: Option<f64>) -> Value {
    match value {
        Some(v) => Value::Real(v),
        None => Value::Null,
    }
}

fn show_values(show: &Show) -> Vec<(&'static str, Value)> {
    vec![
        ("show_id", Value::Integer(show.show_id)),
        ("title", Value::Text(show.title.clone())),
        ("overview", opt_text(&show.overview)),
        ("poster", opt_text(&show.poster)),
        ("network", opt_text(&show.network)),
        ("release_time", opt_int(show.release_time)),
        ("status", opt_text(&show.status)),
        ("favorite", Value::Integer(show.favorite as i64)),
        ("hidden", Value::Integer(show.hidden as i64)),
        ("sync_enabled", Value::Integer(show.sync_enabled as i64)),
        ("next_episode_id", opt_int(show.next_episode_id)),
        (
            "last_watched_episode_id",
            opt_int(show.last_watched_episode_id),
        ),
        ("last_updated_ms", Value::Integer(show.last_updated_ms)),
        ("last_edited_ms", Value::Integer(show.last_edited_ms)),
        ("language", Value::Text(show.language.clone())),
    ]
}

fn season_values(season: &Season) -> Vec<(&'static str, Value)> {
    vec![
        ("season_id", Value::Integer(season.season_id)),
        ("season_number", Value::Integer(season.season_number)),
        ("show_id", Value::Integer(season.show_id)),
        ("watched_count", Value::Integer(season.watched_count)),
        ("unaired_count", Value::Integer(season.unaired_count)),
        ("noairdate_count", Value::Integer(season.noairdate_count)),
        ("total_count", Value::Integer(season.total_count)),
    ]
}

fn episode_values(episode: &Episode) -> Vec<(&'static str, Value)> {
    vec![
        ("episode_id", Value::Integer(episode.episode_id)),
        ("season_number", Value::Integer(episode.season_number)),
        ("episode_number", Value::Integer(episode.episode_number)),
        ("absolute_number", opt_int(episode.absolute_number)),
        ("season_id", Value::Integer(episode.season_id)),
        ("show_id", Value::Integer(episode.show_id)),
        ("title", Value::Text(episode.title.clone())),
        ("overview", opt_text(&episode.overview)),
        ("first_released", opt_text(&episode.first_released)),
        ("released_ms", Value::Integer(episode.released_ms)),
        ("watched", Value::Integer(episode.watched.as_db())),
        ("collected", Value::Integer(episode.collected as i64)),
        ("rating_global", opt_real(episode.rating_global)),
        ("rating_user", opt_int(episode.rating_user)),
        ("plays", Value::Integer(episode.plays)),
        ("last_edited_ms", Value::Integer(episode.last_edited_ms)),
    ]
}

fn row_to_show(row: &rusqlite::Row<'_>) -> rusqlite::Result<Show> {
    Ok(Show {
        show_id: row.get(0)?,
        title: row.get(1)?,
        overview: row.get(2)?,
        poster: row.get(3)?,
        network: row.get(4)?,
        release_time: row.get(5)?,
        status: row.get(6)?,
        favorite: row.get::<_, i64>(7)? != 0,
        hidden: row.get::<_, i64>(8)? != 0,
        sync_enabled: row.get::<_, i64>(9)? != 0,
        next_episode_id: row.get(10)?,
        last_watched_episode_id: row.get(11)?,
        last_updated_ms: row.get(12)?,
        last_edited_ms: row.get(13)?,
        language: row.get(14)?,
    })
}

fn row_to_season(row: &rusqlite::Row<'_>) -> rusqlite::Result<Season> {
    Ok(Season {
        season_id: row.get(0)?,
        season_number: row.get(1)?,
        show_id: row.get(2)?,
        watched_count: row.get(3)?,
        unaired_count: row.get(4)?,
        noairdate_count: row.get(5)?,
        total_count: row.get(6)?,
    })
}

fn row_to_episode(row: &rusqlite::Row<'_>) -> rusqlite::Result<Episode> {
    Ok(Episode {
        episode_id: row.get(0)?,
        season_number: row.get(1)?,
        episode_number: row.get(2)?,
        absolute_number: row.get(3)?,
        season_id: row.get(4)?,
        show_id: row.get(5)?,
        title: row.get(6)?,
        overview: row.get(7)?,
        first_released: row.get(8)?,
        released_ms: row.get(9)?,
        watched: WatchedFlag::from_db(row.get(10)?).unwrap_or(WatchedFlag::Unwatched),
        collected: row.get::<_, i64>(11)? != 0,
        rating_global: row.get(12)?,
        rating_user: row.get(13)?,
        plays: row.get(14)?,
        last_edited_ms: row.get(15)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::list_item_key;

    fn test_show(id: i64, title: &str) -> Show {
        Show {
            show_id: id,
            title: title.into(),
            sync_enabled: true,
            language: "en".into(),
            ..Default::default()
        }
    }

    fn seed_show_with_episode(store: &Store) {
        store.insert_show(&test_show(100, "X"), None).unwrap();
        store
            .bulk_insert_seasons(
                &[Season {
                    season_id: 10,
                    season_number: 1,
                    show_id: 100,
                    ..Default::default()
                }],
                None,
            )
            .unwrap();
        store
            .bulk_insert_episodes(
                &[Episode {
                    episode_id: 1000,
                    season_id: 10,
                    show_id: 100,
                    season_number: 1,
                    episode_number: 1,
                    title: "Pilot".into(),
                    ..Default::default()
                }],
                None,
            )
            .unwrap();
    }

    #[test]
    fn router_scenario_single_filter_and_absent() {
        let store = Store::open_memory().unwrap();
        seed_show_with_episode(&store);

        let by_id = Resource::parse("shows/100").unwrap();
        assert_eq!(by_id.content_type(), "vnd.kiroku.item/shows");
        let rows = store
            .query_map(&by_id, &["show_id", "title"], None, &[], None, |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?))
            })
            .unwrap();
        assert_eq!(rows, vec![(100, "X".to_string())]);

        let filtered = Resource::parse("shows/filter/x").unwrap();
        let rows = store
            .query_map(&filtered, &["show_id"], None, &[], None, |r| {
                r.get::<_, i64>(0)
            })
            .unwrap();
        assert_eq!(rows, vec![100]);

        let absent = Resource::parse("shows/9999").unwrap();
        let rows = store
            .query_map(&absent, &["show_id"], None, &[], None, |r| {
                r.get::<_, i64>(0)
            })
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn insert_emits_one_notification_after_commit() {
        let store = Store::open_memory().unwrap();
        let mut rx = store.subscribe();
        store.insert_show(&test_show(1, "A"), None).unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.path, "shows");
        assert!(rx.try_recv().is_err(), "exactly one notification");
    }

    #[test]
    fn zero_row_update_emits_no_notification() {
        let store = Store::open_memory().unwrap();
        let mut rx = store.subscribe();
        let affected = store
            .update(
                &Resource::Show(12345),
                &[("favorite", Value::Integer(1))],
                None,
                &[],
                None,
            )
            .unwrap();
        assert_eq!(affected, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn joined_unit_notifies_once_per_path_on_commit() {
        let store = Store::open_memory().unwrap();
        let mut rx = store.subscribe();

        let unit = store.unit_of_work().unwrap();
        store.insert_show(&test_show(1, "A"), Some(&unit)).unwrap();
        store.insert_show(&test_show(2, "B"), Some(&unit)).unwrap();
        assert!(rx.try_recv().is_err(), "nothing before commit");
        unit.commit().unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.path, "shows");
        assert!(rx.try_recv().is_err(), "deduplicated per path");
    }

    #[test]
    fn dropped_unit_rolls_back() {
        let store = Store::open_memory().unwrap();
        {
            let unit = store.unit_of_work().unwrap();
            store.insert_show(&test_show(1, "A"), Some(&unit)).unwrap();
            // dropped without commit
        }
        assert!(store.get_show(1).unwrap().is_none());
    }

    #[test]
    fn batch_failure_rolls_back_everything() {
        let store = Store::open_memory().unwrap();
        store.insert_show(&test_show(1, "A"), None).unwrap();

        let entries = vec![
            BatchEntry::new(BatchOp::Update {
                resource: Resource::Show(1),
                set: vec![("favorite".into(), Value::Integer(1))],
                selection: None,
                args: vec![],
            }),
            // Fails: shows insert is not replace-on-conflict and the id
            // already exists.
            BatchEntry::new(BatchOp::Insert {
                resource: Resource::Shows,
                values: vec![
                    ("show_id".into(), Value::Integer(1)),
                    ("title".into(), Value::Text("dup".into())),
                ],
            }),
            BatchEntry::new(BatchOp::Insert {
                resource: Resource::Shows,
                values: vec![
                    ("show_id".into(), Value::Integer(3)),
                    ("title".into(), Value::Text("C".into())),
                ],
            }),
        ];
        assert!(store.apply_batch(entries).is_err());

        let show = store.get_show(1).unwrap().unwrap();
        assert!(!show.favorite, "first op rolled back");
        assert!(store.get_show(3).unwrap().is_none(), "third op never ran");
    }

    #[test]
    fn list_item_replace_on_conflict_keeps_one_row() {
        let store = Store::open_memory().unwrap();
        store
            .insert_list(
                &List {
                    list_id: "favs".into(),
                    name: "Favorites".into(),
                    list_order: 0,
                },
                None,
            )
            .unwrap();

        let item = ListItem::new(42, ItemType::Show, "favs");
        store.insert_list_item(&item, None).unwrap();
        store.insert_list_item(&item, None).unwrap();

        let count = store
            .query_count(
                &Resource::ListItems,
                Some("list_item_id = ?"),
                &[Value::Text(list_item_key(42, ItemType::Show, "favs"))],
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn remove_show_cascades_to_children_and_list_items() {
        let store = Store::open_memory().unwrap();
        seed_show_with_episode(&store);
        store
            .insert_list(
                &List {
                    list_id: "favs".into(),
                    name: "Favorites".into(),
                    list_order: 0,
                },
                None,
            )
            .unwrap();
        store
            .insert_list_item(&ListItem::new(100, ItemType::Show, "favs"), None)
            .unwrap();
        store
            .insert_list_item(&ListItem::new(1000, ItemType::Episode, "favs"), None)
            .unwrap();

        assert!(store.remove_show(100).unwrap());
        assert!(store.get_show(100).unwrap().is_none());
        assert!(store.get_season(10).unwrap().is_none());
        assert!(store.get_episode(1000).unwrap().is_none());
        let count = store.query_count(&Resource::ListItems, None, &[]).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn sync_state_round_trip_and_checkpoint_reset() {
        let store = Store::open_memory().unwrap();
        store.set_sync_state("ratings_synced_shows", "12345").unwrap();
        store.set_sync_state("other", "keep").unwrap();
        assert_eq!(
            store.get_sync_state("ratings_synced_shows").unwrap().as_deref(),
            Some("12345")
        );

        store.clear_ratings_checkpoints().unwrap();
        assert!(store.get_sync_state("ratings_synced_shows").unwrap().is_none());
        assert_eq!(store.get_sync_state("other").unwrap().as_deref(), Some("keep"));
    }
}
