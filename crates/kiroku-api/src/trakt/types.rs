use serde::{Deserialize, Serialize};

use crate::traits::{EpisodeNumbers, EpisodeStateMap};

#[derive(Debug, Deserialize)]
pub struct WatchedShow {
    pub show: ShowRef,
    pub seasons: Vec<WatchedSeason>,
}

#[derive(Debug, Deserialize)]
pub struct ShowRef {
    pub ids: ShowIds,
}

#[derive(Debug, Deserialize)]
pub struct ShowIds {
    pub tvdb: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct WatchedSeason {
    pub number: i64,
    pub episodes: Vec<WatchedEpisode>,
}

#[derive(Debug, Deserialize)]
pub struct WatchedEpisode {
    pub number: i64,
}

/// Collapse the nested show/season/episode response into the per-show
/// sets the sync layer reconciles against. Shows without a tvdb id are
/// skipped.
pub fn into_state_map(shows: Vec<WatchedShow>) -> EpisodeStateMap {
    let mut map = EpisodeStateMap::new();
    for show in shows {
        let Some(tvdb_id) = show.show.ids.tvdb else {
            continue;
        };
        let entry = map.entry(tvdb_id).or_default();
        for season in show.seasons {
            for ep in season.episodes {
                entry.insert((season.number, ep.number));
            }
        }
    }
    map
}

// ---------------------------------------------------------------------------
// Sync request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SyncShows {
    pub shows: Vec<SyncShow>,
}

#[derive(Debug, Serialize)]
pub struct SyncShow {
    pub ids: SyncShowIds,
    pub seasons: Vec<SyncSeason>,
}

#[derive(Debug, Serialize)]
pub struct SyncShowIds {
    pub tvdb: i64,
}

#[derive(Debug, Serialize)]
pub struct SyncSeason {
    pub number: i64,
    pub episodes: Vec<SyncEpisode>,
}

#[derive(Debug, Serialize)]
pub struct SyncEpisode {
    pub number: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<i64>,
}

impl SyncShows {
    /// Group a flat episode list by season for one show.
    pub fn for_episodes(show_id: i64, episodes: &[EpisodeNumbers]) -> Self {
        let mut seasons: Vec<SyncSeason> = Vec::new();
        for ep in episodes {
            let entry = SyncEpisode {
                number: ep.episode,
                rating: None,
            };
            match seasons.iter_mut().find(|s| s.number == ep.season) {
                Some(season) => season.episodes.push(entry),
                None => seasons.push(SyncSeason {
                    number: ep.season,
                    episodes: vec![entry],
                }),
            }
        }
        Self {
            shows: vec![SyncShow {
                ids: SyncShowIds { tvdb: show_id },
                seasons,
            }],
        }
    }

    pub fn for_rating(show_id: i64, season: i64, episode: i64, rating: i64) -> Self {
        Self {
            shows: vec![SyncShow {
                ids: SyncShowIds { tvdb: show_id },
                seasons: vec![SyncSeason {
                    number: season,
                    episodes: vec![SyncEpisode {
                        number: episode,
                        rating: Some(rating),
                    }],
                }],
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_map_skips_shows_without_tvdb_id() {
        let shows = vec![
            WatchedShow {
                show: ShowRef {
                    ids: ShowIds { tvdb: Some(42) },
                },
                seasons: vec![WatchedSeason {
                    number: 1,
                    episodes: vec![WatchedEpisode { number: 1 }, WatchedEpisode { number: 2 }],
                }],
            },
            WatchedShow {
                show: ShowRef {
                    ids: ShowIds { tvdb: None },
                },
                seasons: vec![],
            },
        ];
        let map = into_state_map(shows);
        assert_eq!(map.len(), 1);
        assert!(map[&42].contains(&(1, 2)));
    }

    #[test]
    fn sync_body_groups_by_season() {
        let eps = [
            EpisodeNumbers {
                season: 1,
                episode: 1,
            },
            EpisodeNumbers {
                season: 2,
                episode: 1,
            },
            EpisodeNumbers {
                season: 1,
                episode: 2,
            },
        ];
        let body = SyncShows::for_episodes(7, &eps);
        assert_eq!(body.shows[0].seasons.len(), 2);
        assert_eq!(body.shows[0].seasons[0].episodes.len(), 2);
    }
}
