//! Full-text episode search over an FTS table that is rebuilt on demand
//! (after adding shows, or via the maintenance endpoint).

use rusqlite::params;

use crate::error::KirokuError;
use crate::resource::Resource;
use crate::store::Store;

const CREATE_FTS: &str =
    "CREATE VIRTUAL TABLE episodes_search USING fts4 (title, overview, show_title);";

const POPULATE_FTS: &str = "INSERT INTO episodes_search (docid, title, overview, show_title)
     SELECT episodes.episode_id, episodes.title, COALESCE(episodes.overview, ''), shows.title
     FROM episodes JOIN shows ON episodes.show_id = shows.show_id";

const SEARCH_SELECT: &str = "SELECT episodes.episode_id, episodes.show_id, episodes.title,
            COALESCE(episodes.overview, ''), shows.title
     FROM episodes_search
     JOIN episodes ON episodes_search.docid = episodes.episode_id
     JOIN shows ON episodes.show_id = shows.show_id";

#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSearchResult {
    pub episode_id: i64,
    pub show_id: i64,
    pub title: String,
    pub overview: String,
    pub show_title: String,
}

impl Store {
    /// Drop and rebuild the search table from the current episode rows,
    /// as one unit of work.
    pub fn renew_search_table(&self) -> Result<(), KirokuError> {
        let unit = self.unit_of_work()?;
        self.conn
            .execute_batch("DROP TABLE IF EXISTS episodes_search;")?;
        self.conn.execute_batch(CREATE_FTS)?;
        self.conn.execute(POPULATE_FTS, [])?;
        unit.touch(Resource::RenewFtsTable.path());
        unit.commit()
    }

    /// Match episodes against an FTS query, joined back to their shows.
    pub fn search_episodes(&self, query: &str) -> Result<Vec<EpisodeSearchResult>, KirokuError> {
        let sql = format!("{SEARCH_SELECT} WHERE episodes_search MATCH ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![query], row_to_result)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Prefix suggestions over episode titles.
    pub fn suggest_episodes(&self, prefix: &str) -> Result<Vec<EpisodeSearchResult>, KirokuError> {
        let sanitized: String = prefix
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .collect();
        if sanitized.trim().is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("{SEARCH_SELECT} WHERE episodes_search MATCH ?1 LIMIT 20");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![format!("title:{}*", sanitized.trim())], row_to_result)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn row_to_result(row: &rusqlite::Row<'_>) -> rusqlite::Result<EpisodeSearchResult> {
    Ok(EpisodeSearchResult {
        episode_id: row.get(0)?,
        show_id: row.get(1)?,
        title: row.get(2)?,
        overview: row.get(3)?,
        show_title: row.get(4)?,
    })
}
