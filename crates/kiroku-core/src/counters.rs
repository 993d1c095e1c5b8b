//! Centralized recomputation of denormalized aggregates.
//!
//! Every write path that can change an episode's watched flag or air date
//! goes through these functions instead of patching counters in place: the
//! stored values are cache, and recomputing them from the episode rows must
//! always yield what is stored.

use chrono::Utc;
use rusqlite::params;
use rusqlite::types::Value;
use rusqlite::OptionalExtension;

use crate::error::KirokuError;
use crate::resource::Resource;
use crate::store::{Store, UnitOfWork};

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Recount a season's watched / unaired-unwatched / no-airdate-unwatched /
/// total counters from its episode rows and persist them.
pub fn recompute_season_counters(
    store: &Store,
    season_id: i64,
    now_ms: i64,
    uow: &UnitOfWork,
) -> Result<(), KirokuError> {
    let (total, watched, unaired, noairdate): (i64, i64, i64, i64) = store.conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN watched = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN watched = 0 AND released_ms > ?2 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN watched = 0 AND released_ms = -1 THEN 1 ELSE 0 END), 0)
         FROM episodes WHERE season_id = ?1",
        params![season_id, now_ms],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
    )?;

    store.update(
        &Resource::Season(season_id),
        &[
            ("watched_count", Value::Integer(watched)),
            ("unaired_count", Value::Integer(unaired)),
            ("noairdate_count", Value::Integer(noairdate)),
            ("total_count", Value::Integer(total)),
        ],
        None,
        &[],
        Some(uow),
    )?;
    Ok(())
}

/// Re-derive the show's last-watched-episode reference: the watched
/// episode with the latest air date, number breaking ties.
pub fn update_last_watched_episode(
    store: &Store,
    show_id: i64,
    uow: &UnitOfWork,
) -> Result<(), KirokuError> {
    let last: Option<i64> = store
        .conn
        .query_row(
            "SELECT episode_id FROM episodes
             WHERE show_id = ?1 AND watched = 1
             ORDER BY released_ms DESC, episode_number DESC LIMIT 1",
            params![show_id],
            |row| row.get(0),
        )
        .optional()?;

    store.update(
        &Resource::Show(show_id),
        &[(
            "last_watched_episode_id",
            last.map(Value::Integer).unwrap_or(Value::Null),
        )],
        None,
        &[],
        Some(uow),
    )?;
    Ok(())
}

/// Re-derive the show's next-episode reference: the earliest released
/// episode that is neither watched nor skipped.
pub fn update_next_episode(
    store: &Store,
    show_id: i64,
    uow: &UnitOfWork,
) -> Result<(), KirokuError> {
    let next: Option<i64> = store
        .conn
        .query_row(
            "SELECT episode_id FROM episodes
             WHERE show_id = ?1 AND watched = 0 AND released_ms >= 0
             ORDER BY released_ms ASC, episode_number ASC LIMIT 1",
            params![show_id],
            |row| row.get(0),
        )
        .optional()?;

    store.update(
        &Resource::Show(show_id),
        &[(
            "next_episode_id",
            next.map(Value::Integer).unwrap_or(Value::Null),
        )],
        None,
        &[],
        Some(uow),
    )?;
    Ok(())
}

/// Recompute everything derived for one show: every season's counters plus
/// the next/last episode references.
pub fn recompute_show(
    store: &Store,
    show_id: i64,
    now_ms: i64,
    uow: &UnitOfWork,
) -> Result<(), KirokuError> {
    let season_ids: Vec<i64> = {
        let mut stmt = store
            .conn
            .prepare("SELECT season_id FROM seasons WHERE show_id = ?1")?;
        let ids = stmt
            .query_map(params![show_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };
    for season_id in season_ids {
        recompute_season_counters(store, season_id, now_ms, uow)?;
    }
    update_last_watched_episode(store, show_id, uow)?;
    update_next_episode(store, show_id, uow)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Episode, Season, Show, WatchedFlag};

    const NOW: i64 = 1_000_000;

    fn seed(store: &Store) {
        store
            .insert_show(
                &Show {
                    show_id: 1,
                    title: "X".into(),
                    language: "en".into(),
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        store
            .bulk_insert_seasons(
                &[Season {
                    season_id: 10,
                    season_number: 1,
                    show_id: 1,
                    ..Default::default()
                }],
                None,
            )
            .unwrap();
        let episode = |id, number, released_ms, watched| Episode {
            episode_id: id,
            season_id: 10,
            show_id: 1,
            season_number: 1,
            episode_number: number,
            released_ms,
            watched,
            ..Default::default()
        };
        store
            .bulk_insert_episodes(
                &[
                    episode(100, 1, 100, WatchedFlag::Watched),
                    episode(101, 2, 200, WatchedFlag::Skipped),
                    episode(102, 3, 300, WatchedFlag::Unwatched),
                    episode(103, 4, NOW + 1000, WatchedFlag::Unwatched),
                    episode(104, 5, -1, WatchedFlag::Unwatched),
                ],
                None,
            )
            .unwrap();
    }

    #[test]
    fn counters_match_episode_rows() {
        let store = Store::open_memory().unwrap();
        seed(&store);

        let unit = store.unit_of_work().unwrap();
        recompute_season_counters(&store, 10, NOW, &unit).unwrap();
        unit.commit().unwrap();

        let season = store.get_season(10).unwrap().unwrap();
        assert_eq!(season.total_count, 5);
        assert_eq!(season.watched_count, 1);
        assert_eq!(season.unaired_count, 1);
        assert_eq!(season.noairdate_count, 1);
        assert!(
            season.watched_count + season.unaired_count + season.noairdate_count
                <= season.total_count
        );
    }

    #[test]
    fn recompute_is_idempotent() {
        let store = Store::open_memory().unwrap();
        seed(&store);

        let unit = store.unit_of_work().unwrap();
        recompute_season_counters(&store, 10, NOW, &unit).unwrap();
        unit.commit().unwrap();
        let first = store.get_season(10).unwrap().unwrap();

        let unit = store.unit_of_work().unwrap();
        recompute_season_counters(&store, 10, NOW, &unit).unwrap();
        unit.commit().unwrap();
        let second = store.get_season(10).unwrap().unwrap();

        assert_eq!(first.watched_count, second.watched_count);
        assert_eq!(first.unaired_count, second.unaired_count);
        assert_eq!(first.noairdate_count, second.noairdate_count);
        assert_eq!(first.total_count, second.total_count);
    }

    #[test]
    fn last_and_next_episode_references() {
        let store = Store::open_memory().unwrap();
        seed(&store);

        let unit = store.unit_of_work().unwrap();
        recompute_show(&store, 1, NOW, &unit).unwrap();
        unit.commit().unwrap();

        let show = store.get_show(1).unwrap().unwrap();
        assert_eq!(show.last_watched_episode_id, Some(100));
        // Episode 102 is the earliest released unwatched one (101 is
        // skipped, not unwatched).
        assert_eq!(show.next_episode_id, Some(102));
    }
}
