use serde::Deserialize;

use crate::traits::{RemoteEpisode, RemoteSeason, RemoteShow};

#[derive(Debug, Deserialize)]
pub struct SeriesResponse {
    pub data: SeriesData,
}

#[derive(Debug, Deserialize)]
pub struct SeriesData {
    pub id: i64,
    #[serde(rename = "seriesName")]
    pub series_name: Option<String>,
    pub overview: Option<String>,
    pub network: Option<String>,
    #[serde(rename = "airsTime")]
    pub airs_time: Option<String>,
    pub status: Option<String>,
    pub poster: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EpisodesResponse {
    pub data: Vec<EpisodeData>,
    pub links: PageLinks,
}

#[derive(Debug, Deserialize)]
pub struct PageLinks {
    pub next: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct EpisodeData {
    pub id: i64,
    #[serde(rename = "airedSeason")]
    pub aired_season: Option<i64>,
    #[serde(rename = "airedSeasonID")]
    pub aired_season_id: Option<i64>,
    #[serde(rename = "airedEpisodeNumber")]
    pub aired_episode_number: Option<i64>,
    #[serde(rename = "absoluteNumber")]
    pub absolute_number: Option<i64>,
    #[serde(rename = "episodeName")]
    pub episode_name: Option<String>,
    pub overview: Option<String>,
    #[serde(rename = "firstAired")]
    pub first_aired: Option<String>,
    #[serde(rename = "siteRating")]
    pub site_rating: Option<f64>,
    #[serde(rename = "lastUpdated")]
    pub last_updated: Option<i64>,
}

/// Parse the series airs time ("8:00 PM" style) into minutes since
/// midnight, if well formed.
pub fn parse_airs_time(raw: &str) -> Option<i64> {
    enum Meridiem {
        None,
        Am,
        Pm,
    }
    let raw = raw.trim();
    let (clock, meridiem) = if let Some(rest) = raw.strip_suffix("PM") {
        (rest.trim(), Meridiem::Pm)
    } else if let Some(rest) = raw.strip_suffix("AM") {
        (rest.trim(), Meridiem::Am)
    } else {
        (raw, Meridiem::None)
    };
    let (h, m) = clock.split_once(':')?;
    let h: i64 = h.trim().parse().ok()?;
    let m: i64 = m.trim().parse().ok()?;
    if !(0..24).contains(&h) || !(0..60).contains(&m) {
        return None;
    }
    // 12-hour clock wraps at 12: 12 AM is hour 0, 12 PM stays 12.
    let h = match meridiem {
        Meridiem::Am if h == 12 => 0,
        Meridiem::Pm if h < 12 => h + 12,
        _ => h,
    };
    Some(h * 60 + m)
}

impl SeriesData {
    /// Assemble the flat episode pages into the nested show shape, sorted
    /// by season and episode number.
    pub fn into_remote_show(self, language: &str, episodes: Vec<EpisodeData>) -> RemoteShow {
        let mut seasons: Vec<RemoteSeason> = Vec::new();
        for ep in episodes {
            let number = ep.aired_season.unwrap_or(0);
            let season_id = ep.aired_season_id.unwrap_or(number);
            let remote = RemoteEpisode {
                episode_id: ep.id,
                number: ep.aired_episode_number.unwrap_or(0),
                absolute_number: ep.absolute_number,
                title: ep.episode_name.unwrap_or_default(),
                overview: ep.overview,
                first_released: ep.first_aired.filter(|s| !s.is_empty()),
                rating: ep.site_rating,
                last_edited_ms: ep.last_updated.unwrap_or(0) * 1000,
            };
            match seasons.iter_mut().find(|s| s.number == number) {
                Some(season) => season.episodes.push(remote),
                None => seasons.push(RemoteSeason {
                    season_id,
                    number,
                    episodes: vec![remote],
                }),
            }
        }
        seasons.sort_by_key(|s| s.number);
        for season in &mut seasons {
            season.episodes.sort_by_key(|e| e.number);
        }

        RemoteShow {
            show_id: self.id,
            title: self.series_name.unwrap_or_default(),
            overview: self.overview,
            poster: self.poster,
            network: self.network,
            release_time: self.airs_time.as_deref().and_then(parse_airs_time),
            status: self.status,
            language: language.to_owned(),
            seasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn airs_time_parses_12h_clock() {
        assert_eq!(parse_airs_time("8:00 PM"), Some(20 * 60));
        assert_eq!(parse_airs_time("8:00 AM"), Some(8 * 60));
        assert_eq!(parse_airs_time("21:15"), Some(21 * 60 + 15));
        assert_eq!(parse_airs_time("garbage"), None);
    }

    #[test]
    fn airs_time_wraps_at_the_12_oclock_boundary() {
        assert_eq!(parse_airs_time("12:30 AM"), Some(30));
        assert_eq!(parse_airs_time("12:00 AM"), Some(0));
        assert_eq!(parse_airs_time("12:30 PM"), Some(12 * 60 + 30));
    }

    #[test]
    fn episodes_group_into_sorted_seasons() {
        let eps = vec![
            EpisodeData {
                id: 3,
                aired_season: Some(2),
                aired_season_id: Some(20),
                aired_episode_number: Some(1),
                absolute_number: None,
                episode_name: Some("s2e1".into()),
                overview: None,
                first_aired: Some("2020-01-01".into()),
                site_rating: None,
                last_updated: Some(1),
            },
            EpisodeData {
                id: 2,
                aired_season: Some(1),
                aired_season_id: Some(10),
                aired_episode_number: Some(2),
                absolute_number: Some(2),
                episode_name: Some("s1e2".into()),
                overview: None,
                first_aired: None,
                site_rating: None,
                last_updated: None,
            },
            EpisodeData {
                id: 1,
                aired_season: Some(1),
                aired_season_id: Some(10),
                aired_episode_number: Some(1),
                absolute_number: Some(1),
                episode_name: Some("s1e1".into()),
                overview: None,
                first_aired: Some("".into()),
                site_rating: None,
                last_updated: None,
            },
        ];
        let series = SeriesData {
            id: 100,
            series_name: Some("Show".into()),
            overview: None,
            network: None,
            airs_time: None,
            status: None,
            poster: None,
        };
        let show = series.into_remote_show("en", eps);
        assert_eq!(show.seasons.len(), 2);
        assert_eq!(show.seasons[0].number, 1);
        assert_eq!(show.seasons[0].episodes[0].episode_id, 1);
        assert_eq!(show.seasons[0].episodes[1].episode_id, 2);
        // Empty air date strings become None.
        assert!(show.seasons[0].episodes[0].first_released.is_none());
        assert_eq!(show.seasons[1].number, 2);
    }
}
