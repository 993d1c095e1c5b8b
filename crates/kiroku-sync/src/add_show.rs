//! Sequential add-show pipeline.
//!
//! Items are processed strictly in order, each in its own unit of work.
//! When the tracker is connected (and the cloud mirror is not the source
//! of truth), watched and collected state is fetched once per run and the
//! new episode rows are written with their flags already set, so the show
//! lands fully reconciled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kiroku_api::traits::{
    CloudService, EpisodeStateMap, RemoteShow, ShowMetadataService, ShowUpload, TrackerService,
};
use kiroku_core::counters;
use kiroku_core::models::{resolve_release_ms, Episode, Season, Show, WatchedFlag};
use kiroku_core::store::Store;

use crate::{Connectivity, SyncError};

/// Terminal state of one queued item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddItemOutcome {
    Added,
    /// The show is already in the local catalog. Not an error.
    AlreadyExists,
    InvalidId,
    /// The metadata source has no show under this id.
    DoesNotExist,
    MetadataError(String),
    CloudError(String),
    StorageError(String),
}

/// Why a run stopped before draining its queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    Offline,
    /// The once-per-run watched/collected fetch failed.
    TrackerUnavailable(String),
    Cancelled,
}

/// Everything that happened in one run: per-item outcomes in queue
/// order, plus the abort reason if the queue was not drained.
#[derive(Debug)]
pub struct AddShowReport {
    pub results: Vec<(i64, AddItemOutcome)>,
    pub aborted: Option<AbortReason>,
}

impl AddShowReport {
    pub fn added_count(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, o)| *o == AddItemOutcome::Added)
            .count()
    }
}

/// Watched/collected state fetched once per run.
struct TrackerState {
    watched: EpisodeStateMap,
    collected: EpisodeStateMap,
}

pub struct AddShowPipeline<'a, M, T, H> {
    store: &'a Store,
    metadata: &'a M,
    tracker: Option<&'a T>,
    cloud: Option<&'a H>,
    connectivity: &'a dyn Connectivity,
    cancel: Arc<AtomicBool>,
    language: String,
}

impl<'a, M, T, H> AddShowPipeline<'a, M, T, H>
where
    M: ShowMetadataService,
    T: TrackerService,
    H: CloudService,
{
    pub fn new(
        store: &'a Store,
        metadata: &'a M,
        tracker: Option<&'a T>,
        cloud: Option<&'a H>,
        connectivity: &'a dyn Connectivity,
        language: impl Into<String>,
    ) -> Self {
        Self {
            store,
            metadata,
            tracker,
            cloud,
            connectivity,
            cancel: Arc::new(AtomicBool::new(false)),
            language: language.into(),
        }
    }

    /// Handle used to stop the run between items.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Drain the queue. Items are independent except for the shared
    /// tracker snapshot; a failed item never blocks the next one, while
    /// connectivity loss or a failed snapshot fetch aborts the rest.
    pub async fn run(&self, queue: &[i64]) -> Result<AddShowReport, SyncError> {
        let mut report = AddShowReport {
            results: Vec::with_capacity(queue.len()),
            aborted: None,
        };
        // Fetched lazily, at most once per run.
        let mut tracker_state: Option<TrackerState> = None;

        for &show_id in queue {
            if self.cancel.load(Ordering::Relaxed) {
                report.aborted = Some(AbortReason::Cancelled);
                break;
            }
            if show_id <= 0 {
                tracing::warn!(show_id, "skipping invalid show id");
                report.results.push((show_id, AddItemOutcome::InvalidId));
                continue;
            }
            if !self.connectivity.is_online() {
                report.aborted = Some(AbortReason::Offline);
                break;
            }

            match self.add_one(show_id, &mut tracker_state).await {
                Ok(outcome) => report.results.push((show_id, outcome)),
                Err(abort) => {
                    report.aborted = Some(abort);
                    break;
                }
            }
        }

        if report.added_count() > 0 {
            self.store.renew_search_table()?;
            // Ratings checkpoints restart so the new episodes get rated
            // on the next ratings pass.
            self.store.clear_ratings_checkpoints()?;
        }
        Ok(report)
    }

    /// One item. `Err` carries run-level aborts only; everything scoped
    /// to the item comes back as an outcome.
    async fn add_one(
        &self,
        show_id: i64,
        tracker_state: &mut Option<TrackerState>,
    ) -> Result<AddItemOutcome, AbortReason> {
        match self.store.get_show(show_id) {
            Ok(Some(_)) => return Ok(AddItemOutcome::AlreadyExists),
            Ok(None) => {}
            Err(e) => return Ok(AddItemOutcome::StorageError(e.to_string())),
        }

        let remote = match self.metadata.get_show(show_id, &self.language).await {
            Ok(Some(show)) => show,
            Ok(None) => return Ok(AddItemOutcome::DoesNotExist),
            Err(e) => {
                tracing::warn!(show_id, error = %e, "metadata fetch failed");
                return Ok(AddItemOutcome::MetadataError(e.to_string()));
            }
        };

        // Reconcile from the tracker only when the cloud mirror is not
        // already the source of truth for flags.
        if tracker_state.is_none() {
            if let (Some(tracker), None) = (self.tracker, self.cloud) {
                let watched = tracker
                    .watched_episodes()
                    .await
                    .map_err(|e| AbortReason::TrackerUnavailable(e.to_string()))?;
                let collected = tracker
                    .collected_episodes()
                    .await
                    .map_err(|e| AbortReason::TrackerUnavailable(e.to_string()))?;
                *tracker_state = Some(TrackerState { watched, collected });
            }
        }

        // The cloud mirror learns about the show before anything is
        // written locally, so a mirror failure leaves no partial state.
        if let Some(cloud) = self.cloud {
            let upload = ShowUpload {
                show_id,
                title: remote.title.clone(),
                favorite: false,
                hidden: false,
                language: self.language.clone(),
            };
            if let Err(e) = cloud.upload_show(&upload).await {
                tracing::warn!(show_id, error = %e, "cloud upload failed");
                return Ok(AddItemOutcome::CloudError(e.to_string()));
            }
        }

        match self.write_show(remote, tracker_state.as_ref()) {
            Ok(()) => {
                tracing::info!(show_id, "show added");
                Ok(AddItemOutcome::Added)
            }
            Err(e) => Ok(AddItemOutcome::StorageError(e.to_string())),
        }
    }

    /// Insert show, seasons and episodes in one unit of work, flags
    /// pre-set, counters and next/last references computed before commit.
    fn write_show(
        &self,
        remote: RemoteShow,
        tracker_state: Option<&TrackerState>,
    ) -> Result<(), SyncError> {
        let show_id = remote.show_id;
        let watched = tracker_state.and_then(|s| s.watched.get(&show_id));
        let collected = tracker_state.and_then(|s| s.collected.get(&show_id));

        let show = Show {
            show_id,
            title: remote.title,
            overview: remote.overview,
            poster: remote.poster,
            network: remote.network,
            release_time: remote.release_time,
            status: remote.status,
            sync_enabled: true,
            last_updated_ms: counters::now_ms(),
            language: remote.language,
            ..Show::default()
        };

        let mut seasons = Vec::with_capacity(remote.seasons.len());
        let mut episodes = Vec::new();
        for season in remote.seasons {
            seasons.push(Season {
                season_id: season.season_id,
                season_number: season.number,
                show_id,
                ..Season::default()
            });
            for ep in season.episodes {
                let numbers = (season.number, ep.number);
                let watched_flag = if watched.is_some_and(|set| set.contains(&numbers)) {
                    WatchedFlag::Watched
                } else {
                    WatchedFlag::Unwatched
                };
                let released_ms = resolve_release_ms(ep.first_released.as_deref());
                episodes.push(Episode {
                    episode_id: ep.episode_id,
                    season_number: season.number,
                    episode_number: ep.number,
                    absolute_number: ep.absolute_number,
                    season_id: season.season_id,
                    show_id,
                    title: ep.title,
                    overview: ep.overview,
                    first_released: ep.first_released,
                    released_ms,
                    watched: watched_flag,
                    collected: collected.is_some_and(|set| set.contains(&numbers)),
                    rating_global: ep.rating,
                    plays: if watched_flag.counts_as_watched() { 1 } else { 0 },
                    last_edited_ms: ep.last_edited_ms,
                    ..Episode::default()
                });
            }
        }

        let uow = self.store.unit_of_work()?;
        self.store.insert_show(&show, Some(&uow))?;
        self.store.bulk_insert_seasons(&seasons, Some(&uow))?;
        self.store.bulk_insert_episodes(&episodes, Some(&uow))?;
        counters::recompute_show(self.store, show_id, counters::now_ms(), &uow)?;
        uow.commit()?;
        Ok(())
    }
}
