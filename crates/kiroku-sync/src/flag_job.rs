//! Flag jobs: watched / collected / rating changes over a scope of
//! episodes.
//!
//! The local leg runs first, in one unit of work, with counters and
//! next/last references recomputed before commit. Remote legs run after
//! the commit and are independent of it and of each other; a remote
//! failure is reported, never rolled back into local state.

use kiroku_api::traits::{CloudService, EpisodeFlagUpload, EpisodeNumbers, TrackerService};
use kiroku_core::counters;
use kiroku_core::models::WatchedFlag;
use kiroku_core::resource::Resource;
use kiroku_core::store::{EpisodeKey, Store};
use rusqlite::types::Value;

use crate::{Connectivity, SyncError};

/// Which episode rows a job touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagScope {
    Episode {
        episode_id: i64,
    },
    Season {
        season_id: i64,
    },
    Show {
        show_id: i64,
    },
    /// Every aired episode of the show strictly before the threshold,
    /// ordered by (release, episode number).
    WatchedUpTo {
        show_id: i64,
        released_before_ms: i64,
        episode_number: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagAction {
    Watch(WatchedFlag),
    Collect(bool),
    Rate(i64),
}

/// A validated flag change. Construction is the validation boundary:
/// raw integers that are not a legal tri-state value, or ratings outside
/// 1..=10, never reach the store.
#[derive(Debug, Clone, Copy)]
pub struct FlagJob {
    pub scope: FlagScope,
    pub action: FlagAction,
}

impl FlagJob {
    pub fn new(scope: FlagScope, action: FlagAction) -> Self {
        Self { scope, action }
    }

    /// Build a watch job from a raw integer flag value.
    pub fn set_watched_raw(scope: FlagScope, raw: i64) -> Result<Self, SyncError> {
        let flag = WatchedFlag::from_db(raw)
            .ok_or_else(|| SyncError::Validation(format!("invalid watched flag value {raw}")))?;
        Ok(Self::new(scope, FlagAction::Watch(flag)))
    }

    pub fn rate(scope: FlagScope, rating: i64) -> Result<Self, SyncError> {
        if !(1..=10).contains(&rating) {
            return Err(SyncError::Validation(format!(
                "rating {rating} outside 1..=10"
            )));
        }
        Ok(Self::new(scope, FlagAction::Rate(rating)))
    }

    /// SQL predicate over the episodes table selecting the affected rows.
    ///
    /// Marking a season or show watched skips episodes the user skipped
    /// and episodes that have not aired yet; explicitly flagging a single
    /// episode always applies.
    fn selection(&self, now_ms: i64) -> (String, Vec<Value>) {
        let (mut clause, mut args) = match self.scope {
            FlagScope::Episode { episode_id } => {
                ("episode_id = ?".to_owned(), vec![Value::Integer(episode_id)])
            }
            FlagScope::Season { season_id } => {
                ("season_id = ?".to_owned(), vec![Value::Integer(season_id)])
            }
            FlagScope::Show { show_id } => {
                ("show_id = ?".to_owned(), vec![Value::Integer(show_id)])
            }
            FlagScope::WatchedUpTo {
                show_id,
                released_before_ms,
                episode_number,
            } => (
                "show_id = ? AND released_ms >= 0 \
                 AND (released_ms < ? OR (released_ms = ? AND episode_number < ?))"
                    .to_owned(),
                vec![
                    Value::Integer(show_id),
                    Value::Integer(released_before_ms),
                    Value::Integer(released_before_ms),
                    Value::Integer(episode_number),
                ],
            ),
        };

        if self.action == FlagAction::Watch(WatchedFlag::Watched)
            && !matches!(self.scope, FlagScope::Episode { .. })
        {
            clause.push_str(" AND watched != 2");
            if !matches!(self.scope, FlagScope::WatchedUpTo { .. }) {
                clause.push_str(" AND released_ms >= 0 AND released_ms <= ?");
                args.push(Value::Integer(now_ms));
            }
        }
        (clause, args)
    }

    fn set_values(&self) -> Vec<(&'static str, Value)> {
        match self.action {
            FlagAction::Watch(flag) => {
                let mut set = vec![("watched", Value::Integer(flag.as_db()))];
                if flag == WatchedFlag::Unwatched {
                    set.push(("plays", Value::Integer(0)));
                }
                set
            }
            FlagAction::Collect(collected) => {
                vec![("collected", Value::Integer(collected as i64))]
            }
            FlagAction::Rate(rating) => vec![("rating_user", Value::Integer(rating))],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteBackend {
    Hexagon,
    Trakt,
}

/// Result of one remote mirror leg.
#[derive(Debug)]
pub struct RemoteOutcome {
    pub backend: RemoteBackend,
    pub result: Result<(), SyncError>,
}

/// Local outcome plus the independent remote legs.
#[derive(Debug)]
pub struct JobOutcome {
    pub rows_affected: usize,
    pub remotes: Vec<RemoteOutcome>,
}

pub struct FlagJobExecutor<'a, T, H> {
    store: &'a Store,
    tracker: Option<&'a T>,
    cloud: Option<&'a H>,
    connectivity: &'a dyn Connectivity,
}

impl<'a, T, H> FlagJobExecutor<'a, T, H>
where
    T: TrackerService,
    H: CloudService,
{
    pub fn new(
        store: &'a Store,
        tracker: Option<&'a T>,
        cloud: Option<&'a H>,
        connectivity: &'a dyn Connectivity,
    ) -> Self {
        Self {
            store,
            tracker,
            cloud,
            connectivity,
        }
    }

    pub async fn execute(&self, job: &FlagJob) -> Result<JobOutcome, SyncError> {
        let now = counters::now_ms();
        let (selection, args) = job.selection(now);
        let keys = self.store.episode_keys(&selection, &args)?;
        if keys.is_empty() {
            return Ok(JobOutcome {
                rows_affected: 0,
                remotes: Vec::new(),
            });
        }

        let rows_affected = self.apply_local(job, &selection, &args, &keys, now)?;
        let remotes = self.mirror(job, &selection, &args, &keys).await;

        Ok(JobOutcome {
            rows_affected,
            remotes,
        })
    }

    fn apply_local(
        &self,
        job: &FlagJob,
        selection: &str,
        args: &[Value],
        keys: &[EpisodeKey],
        now_ms: i64,
    ) -> Result<usize, SyncError> {
        let uow = self.store.unit_of_work()?;

        // A watch event increments plays, but only for rows actually
        // transitioning; re-watching an already watched season must not
        // double count. Runs before the flag write by necessity.
        if job.action == FlagAction::Watch(WatchedFlag::Watched) {
            let bump = format!("({selection}) AND watched != 1");
            self.store.bump_episode_plays(&bump, args, Some(&uow))?;
        }

        let rows = self.store.update(
            &Resource::Episodes,
            &job.set_values(),
            Some(selection),
            args,
            Some(&uow),
        )?;

        if matches!(job.action, FlagAction::Watch(_)) {
            let mut seasons: Vec<i64> = keys.iter().map(|k| k.season_id).collect();
            seasons.sort_unstable();
            seasons.dedup();
            for season_id in seasons {
                counters::recompute_season_counters(self.store, season_id, now_ms, &uow)?;
            }
            let mut shows: Vec<i64> = keys.iter().map(|k| k.show_id).collect();
            shows.sort_unstable();
            shows.dedup();
            for show_id in shows {
                counters::update_last_watched_episode(self.store, show_id, &uow)?;
                counters::update_next_episode(self.store, show_id, &uow)?;
            }
        }

        uow.commit()?;
        tracing::debug!(rows, action = ?job.action, "flag job applied locally");
        Ok(rows)
    }

    /// Run the remote legs after the local commit. Each leg reports its
    /// own outcome; none of them touches local state.
    async fn mirror(
        &self,
        job: &FlagJob,
        selection: &str,
        args: &[Value],
        keys: &[EpisodeKey],
    ) -> Vec<RemoteOutcome> {
        let mut remotes = Vec::new();
        // All scopes resolve within one show.
        let show_id = keys[0].show_id;

        if let Some(cloud) = self.cloud {
            // Ratings are not mirrored to the cloud.
            if !matches!(job.action, FlagAction::Rate(_)) {
                let result = if self.connectivity.is_online() {
                    self.upload_flags(cloud, show_id, selection, args).await
                } else {
                    Err(SyncError::Offline)
                };
                remotes.push(RemoteOutcome {
                    backend: RemoteBackend::Hexagon,
                    result,
                });
            }
        }

        if let Some(tracker) = self.tracker {
            // Skipped is a purely local state with no tracker leg.
            if job.action != FlagAction::Watch(WatchedFlag::Skipped) {
                let result = if self.connectivity.is_online() {
                    self.tracker_leg(tracker, job, show_id, keys).await
                } else {
                    Err(SyncError::Offline)
                };
                remotes.push(RemoteOutcome {
                    backend: RemoteBackend::Trakt,
                    result,
                });
            }
        }

        remotes
    }

    async fn upload_flags(
        &self,
        cloud: &H,
        show_id: i64,
        selection: &str,
        args: &[Value],
    ) -> Result<(), SyncError> {
        let flags = self.store.query_map(
            &Resource::Episodes,
            &["season_number", "episode_number", "watched", "collected"],
            Some(selection),
            args,
            Some("season_number, episode_number"),
            |row| {
                Ok(EpisodeFlagUpload {
                    season: row.get(0)?,
                    episode: row.get(1)?,
                    watched: row.get(2)?,
                    collected: row.get::<_, i64>(3)? != 0,
                })
            },
        )?;
        cloud
            .upload_episode_flags(show_id, &flags)
            .await
            .map_err(|e| {
                tracing::warn!(show_id, error = %e, "cloud mirror failed");
                SyncError::Remote {
                    service: "hexagon",
                    message: e.to_string(),
                }
            })
    }

    /// The tracker speaks season/episode numbers, never local row ids.
    async fn tracker_leg(
        &self,
        tracker: &T,
        job: &FlagJob,
        show_id: i64,
        keys: &[EpisodeKey],
    ) -> Result<(), SyncError> {
        let numbers: Vec<EpisodeNumbers> = keys
            .iter()
            .map(|k| EpisodeNumbers {
                season: k.season_number,
                episode: k.episode_number,
            })
            .collect();

        let result = match job.action {
            // Skipped never reaches this leg; treat it as unwatched if it
            // ever does.
            FlagAction::Watch(flag) => {
                tracker
                    .set_watched(show_id, &numbers, flag.counts_as_watched())
                    .await
            }
            FlagAction::Collect(collected) => {
                tracker.set_collected(show_id, &numbers, collected).await
            }
            FlagAction::Rate(rating) => {
                let mut outcome = Ok(());
                for key in keys {
                    if let Err(e) = tracker
                        .rate_episode(show_id, key.season_number, key.episode_number, rating)
                        .await
                    {
                        outcome = Err(e);
                        break;
                    }
                }
                outcome
            }
        };

        result.map_err(|e| {
            tracing::warn!(show_id, error = %e, "tracker mirror failed");
            SyncError::Remote {
                service: "trakt",
                message: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use kiroku_api::traits::EpisodeStateMap;
    use kiroku_core::models::{Episode, Season, Show};

    use crate::{AlwaysOnline, ForcedOffline};

    #[derive(Default)]
    struct RecordingTracker {
        fail: bool,
        watched_calls: Mutex<Vec<(i64, Vec<EpisodeNumbers>, bool)>>,
    }

    impl TrackerService for RecordingTracker {
        type Error = std::io::Error;

        async fn watched_episodes(&self) -> Result<EpisodeStateMap, Self::Error> {
            Ok(EpisodeStateMap::new())
        }

        async fn collected_episodes(&self) -> Result<EpisodeStateMap, Self::Error> {
            Ok(EpisodeStateMap::new())
        }

        async fn set_watched(
            &self,
            show_id: i64,
            episodes: &[EpisodeNumbers],
            watched: bool,
        ) -> Result<(), Self::Error> {
            if self.fail {
                return Err(std::io::Error::other("trakt down"));
            }
            self.watched_calls
                .lock()
                .unwrap()
                .push((show_id, episodes.to_vec(), watched));
            Ok(())
        }

        async fn set_collected(
            &self,
            _show_id: i64,
            _episodes: &[EpisodeNumbers],
            _collected: bool,
        ) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn rate_episode(
            &self,
            _show_id: i64,
            _season: i64,
            _episode: i64,
            _rating: i64,
        ) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingCloud {
        uploads: Mutex<Vec<(i64, Vec<EpisodeFlagUpload>)>>,
    }

    impl CloudService for RecordingCloud {
        type Error = std::io::Error;

        async fn upload_show(
            &self,
            _show: &kiroku_api::traits::ShowUpload,
        ) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn upload_episode_flags(
            &self,
            show_id: i64,
            flags: &[EpisodeFlagUpload],
        ) -> Result<(), Self::Error> {
            self.uploads
                .lock()
                .unwrap()
                .push((show_id, flags.to_vec()));
            Ok(())
        }
    }

    /// Show 1, season 10, five episodes: three aired unwatched, one aired
    /// skipped, one unaired.
    fn seed(store: &Store) {
        let show = Show {
            show_id: 1,
            title: "Seeded".into(),
            ..Show::default()
        };
        store.insert_show(&show, None).unwrap();
        store
            .bulk_insert_seasons(
                &[Season {
                    season_id: 10,
                    season_number: 1,
                    show_id: 1,
                    ..Season::default()
                }],
                None,
            )
            .unwrap();
        let far_future = counters::now_ms() + 86_400_000;
        let eps = [
            (101, 1, 100, WatchedFlag::Unwatched),
            (102, 2, 200, WatchedFlag::Unwatched),
            (103, 3, 300, WatchedFlag::Unwatched),
            (104, 4, 400, WatchedFlag::Skipped),
            (105, 5, far_future, WatchedFlag::Unwatched),
        ];
        let episodes: Vec<Episode> = eps
            .iter()
            .map(|&(id, number, released_ms, watched)| Episode {
                episode_id: id,
                season_number: 1,
                episode_number: number,
                season_id: 10,
                show_id: 1,
                title: format!("E{number}"),
                released_ms,
                watched,
                ..Episode::default()
            })
            .collect();
        store.bulk_insert_episodes(&episodes, None).unwrap();
    }

    fn executor<'a>(
        store: &'a Store,
        tracker: Option<&'a RecordingTracker>,
        cloud: Option<&'a RecordingCloud>,
        connectivity: &'a dyn Connectivity,
    ) -> FlagJobExecutor<'a, RecordingTracker, RecordingCloud> {
        FlagJobExecutor::new(store, tracker, cloud, connectivity)
    }

    #[test]
    fn raw_flag_values_are_validated_before_any_write() {
        let err = FlagJob::set_watched_raw(FlagScope::Episode { episode_id: 101 }, 5).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        let err = FlagJob::rate(FlagScope::Episode { episode_id: 101 }, 11).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[tokio::test]
    async fn season_watched_skips_skipped_and_unaired_episodes() {
        let store = Store::open_memory().unwrap();
        seed(&store);
        let exec = executor(&store, None, None, &AlwaysOnline);

        let job = FlagJob::new(
            FlagScope::Season { season_id: 10 },
            FlagAction::Watch(WatchedFlag::Watched),
        );
        let outcome = exec.execute(&job).await.unwrap();
        assert_eq!(outcome.rows_affected, 3);
        assert!(outcome.remotes.is_empty());

        let season = store.get_season(10).unwrap().unwrap();
        assert_eq!(season.watched_count, 3);
        assert_eq!(season.total_count, 5);
        // The skipped episode stays skipped, the unaired one unwatched.
        assert_eq!(
            store.get_episode(104).unwrap().unwrap().watched,
            WatchedFlag::Skipped
        );
        assert_eq!(
            store.get_episode(105).unwrap().unwrap().watched,
            WatchedFlag::Unwatched
        );
        let show = store.get_show(1).unwrap().unwrap();
        assert_eq!(show.last_watched_episode_id, Some(103));
        // Skipped episodes are never the next episode.
        assert_eq!(show.next_episode_id, Some(105));
    }

    #[tokio::test]
    async fn watch_bumps_plays_only_on_transition() {
        let store = Store::open_memory().unwrap();
        seed(&store);
        let exec = executor(&store, None, None, &AlwaysOnline);
        let job = FlagJob::new(
            FlagScope::Episode { episode_id: 101 },
            FlagAction::Watch(WatchedFlag::Watched),
        );

        exec.execute(&job).await.unwrap();
        assert_eq!(store.get_episode(101).unwrap().unwrap().plays, 1);
        // Re-watching the same already-watched episode via a season job
        // must not double count.
        let season_job = FlagJob::new(
            FlagScope::Season { season_id: 10 },
            FlagAction::Watch(WatchedFlag::Watched),
        );
        exec.execute(&season_job).await.unwrap();
        assert_eq!(store.get_episode(101).unwrap().unwrap().plays, 1);
        assert_eq!(store.get_episode(102).unwrap().unwrap().plays, 1);

        // Unwatching resets the play count.
        let unwatch = FlagJob::new(
            FlagScope::Episode { episode_id: 101 },
            FlagAction::Watch(WatchedFlag::Unwatched),
        );
        exec.execute(&unwatch).await.unwrap();
        let ep = store.get_episode(101).unwrap().unwrap();
        assert_eq!(ep.watched, WatchedFlag::Unwatched);
        assert_eq!(ep.plays, 0);
    }

    #[tokio::test]
    async fn watched_up_to_respects_the_release_and_number_threshold() {
        let store = Store::open_memory().unwrap();
        seed(&store);
        let exec = executor(&store, None, None, &AlwaysOnline);

        let job = FlagJob::new(
            FlagScope::WatchedUpTo {
                show_id: 1,
                released_before_ms: 300,
                episode_number: 3,
            },
            FlagAction::Watch(WatchedFlag::Watched),
        );
        let outcome = exec.execute(&job).await.unwrap();
        assert_eq!(outcome.rows_affected, 2);
        assert_eq!(
            store.get_episode(102).unwrap().unwrap().watched,
            WatchedFlag::Watched
        );
        assert_eq!(
            store.get_episode(103).unwrap().unwrap().watched,
            WatchedFlag::Unwatched
        );
    }

    #[tokio::test]
    async fn remote_failure_does_not_roll_back_the_local_commit() {
        let store = Store::open_memory().unwrap();
        seed(&store);
        let tracker = RecordingTracker {
            fail: true,
            ..RecordingTracker::default()
        };
        let exec = executor(&store, Some(&tracker), None, &AlwaysOnline);

        let job = FlagJob::new(
            FlagScope::Episode { episode_id: 101 },
            FlagAction::Watch(WatchedFlag::Watched),
        );
        let outcome = exec.execute(&job).await.unwrap();
        assert_eq!(outcome.rows_affected, 1);
        assert_eq!(outcome.remotes.len(), 1);
        assert!(matches!(
            outcome.remotes[0].result,
            Err(SyncError::Remote { service: "trakt", .. })
        ));
        assert_eq!(
            store.get_episode(101).unwrap().unwrap().watched,
            WatchedFlag::Watched
        );
    }

    #[tokio::test]
    async fn tracker_leg_sends_numbers_and_cloud_gets_flags() {
        let store = Store::open_memory().unwrap();
        seed(&store);
        let tracker = RecordingTracker::default();
        let cloud = RecordingCloud::default();
        let exec = executor(&store, Some(&tracker), Some(&cloud), &AlwaysOnline);

        let job = FlagJob::new(
            FlagScope::Episode { episode_id: 102 },
            FlagAction::Watch(WatchedFlag::Watched),
        );
        let outcome = exec.execute(&job).await.unwrap();
        assert_eq!(outcome.remotes.len(), 2);
        assert!(outcome.remotes.iter().all(|r| r.result.is_ok()));

        let calls = tracker.watched_calls.lock().unwrap();
        assert_eq!(
            calls[0],
            (
                1,
                vec![EpisodeNumbers {
                    season: 1,
                    episode: 2
                }],
                true
            )
        );
        let uploads = cloud.uploads.lock().unwrap();
        assert_eq!(uploads[0].0, 1);
        assert_eq!(uploads[0].1[0].watched, 1);
    }

    #[tokio::test]
    async fn skipping_has_no_tracker_representation() {
        let store = Store::open_memory().unwrap();
        seed(&store);
        let tracker = RecordingTracker::default();
        let exec = executor(&store, Some(&tracker), None, &AlwaysOnline);

        let job = FlagJob::set_watched_raw(FlagScope::Episode { episode_id: 101 }, 2).unwrap();
        let outcome = exec.execute(&job).await.unwrap();
        assert_eq!(outcome.rows_affected, 1);
        assert!(outcome.remotes.is_empty());
        assert!(tracker.watched_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ratings_are_not_mirrored_to_the_cloud() {
        let store = Store::open_memory().unwrap();
        seed(&store);
        let tracker = RecordingTracker::default();
        let cloud = RecordingCloud::default();
        let exec = executor(&store, Some(&tracker), Some(&cloud), &AlwaysOnline);

        let job = FlagJob::rate(FlagScope::Episode { episode_id: 101 }, 8).unwrap();
        let outcome = exec.execute(&job).await.unwrap();
        assert_eq!(store.get_episode(101).unwrap().unwrap().rating_user, Some(8));
        assert_eq!(outcome.remotes.len(), 1);
        assert_eq!(outcome.remotes[0].backend, RemoteBackend::Trakt);
        assert!(cloud.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_applies_locally_and_reports_offline_legs() {
        let store = Store::open_memory().unwrap();
        seed(&store);
        let tracker = RecordingTracker::default();
        let exec = executor(&store, Some(&tracker), None, &ForcedOffline);

        let job = FlagJob::new(
            FlagScope::Episode { episode_id: 101 },
            FlagAction::Watch(WatchedFlag::Watched),
        );
        let outcome = exec.execute(&job).await.unwrap();
        assert_eq!(outcome.rows_affected, 1);
        assert!(matches!(
            outcome.remotes[0].result,
            Err(SyncError::Offline)
        ));
        assert_eq!(
            store.get_episode(101).unwrap().unwrap().watched,
            WatchedFlag::Watched
        );
    }

    #[tokio::test]
    async fn empty_scope_is_a_no_op() {
        let store = Store::open_memory().unwrap();
        seed(&store);
        let exec = executor(&store, None, None, &AlwaysOnline);

        let job = FlagJob::new(
            FlagScope::Season { season_id: 999 },
            FlagAction::Watch(WatchedFlag::Watched),
        );
        let outcome = exec.execute(&job).await.unwrap();
        assert_eq!(outcome.rows_affected, 0);
        assert!(outcome.remotes.is_empty());
    }
}
