use rusqlite::types::Value;

use crate::error::KirokuError;

/// An addressable logical resource: the small fixed vocabulary of paths
/// the UI and background jobs use instead of direct table access.
///
/// Parsing is the only entry point; an unknown path is an error at the
/// boundary, and every variant below is exhaustively matched when it is
/// turned into a concrete query mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Shows,
    Show(i64),
    ShowsFilter(String),
    ShowsWithLastEpisode,
    ShowsWithNextEpisode,
    Episodes,
    Episode(i64),
    EpisodesWithShow,
    EpisodeWithShow(i64),
    EpisodesOfShow(i64),
    EpisodesOfSeason(i64),
    EpisodesOfSeasonWithShow(i64),
    Seasons,
    Season(i64),
    SeasonsOfShow(i64),
    Lists,
    List(String),
    ListsWithListItem { item_ref_id: i64, item_type: i64 },
    ListItems,
    ListItem(String),
    ListItemsWithDetails,
    Movies,
    Movie(i64),
    EpisodeSearch,
    SearchSuggest,
    RenewFtsTable,
}

/// Base mapping a resource resolves to: a table or join expression, an
/// optional fixed predicate with its arguments, column aliasing rules for
/// joins, and the write target (None for read-only views).
#[derive(Debug, Clone)]
pub struct QueryMapping {
    pub table: String,
    pub fixed_where: Option<String>,
    pub fixed_args: Vec<Value>,
    /// Logical column name -> qualified expression. Empty for plain tables.
    pub projection: Vec<(String, String)>,
    pub write_table: Option<&'static str>,
    /// Replace-on-conflict on insert; used where duplicate natural keys
    /// are expected (repeated upstream ingestion, list re-adds).
    pub replace_on_conflict: bool,
    pub content_type: &'static str,
}

impl QueryMapping {
    fn table_read(table: &'static str, content_type: &'static str) -> Self {
        Self {
            table: table.into(),
            fixed_where: None,
            fixed_args: Vec::new(),
            projection: Vec::new(),
            write_table: Some(table),
            replace_on_conflict: false,
            content_type,
        }
    }

    fn with_where(mut self, clause: String, args: Vec<Value>) -> Self {
        self.fixed_where = Some(clause);
        self.fixed_args = args;
        self
    }

    fn replacing(mut self) -> Self {
        self.replace_on_conflict = true;
        self
    }
}

impl Resource {
    /// Parse a logical resource path. Unknown patterns fail fast.
    pub fn parse(path: &str) -> Result<Self, KirokuError> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let unknown = || KirokuError::Validation(format!("unknown resource path: {path}"));

        let resource = match segments.as_slice() {
            ["shows"] => Self::Shows,
            ["shows", "filter", sub] => Self::ShowsFilter((*sub).to_string()),
            ["shows", "withLastEpisode"] => Self::ShowsWithLastEpisode,
            ["shows", "withNextEpisode"] => Self::ShowsWithNextEpisode,
            ["shows", id] => Self::Show(parse_id(id).ok_or_else(unknown)?),
            ["episodes"] => Self::Episodes,
            ["episodes", "withShow"] => Self::EpisodesWithShow,
            ["episodes", "ofShow", id] => Self::EpisodesOfShow(parse_id(id).ok_or_else(unknown)?),
            ["episodes", "ofSeason", "withShow", id] => {
                Self::EpisodesOfSeasonWithShow(parse_id(id).ok_or_else(unknown)?)
            }
            ["episodes", "ofSeason", id] => {
                Self::EpisodesOfSeason(parse_id(id).ok_or_else(unknown)?)
            }
            ["episodes", id, "withShow"] => {
                Self::EpisodeWithShow(parse_id(id).ok_or_else(unknown)?)
            }
            ["episodes", id] => Self::Episode(parse_id(id).ok_or_else(unknown)?),
            ["seasons"] => Self::Seasons,
            ["seasons", "ofShow", id] => Self::SeasonsOfShow(parse_id(id).ok_or_else(unknown)?),
            ["seasons", id] => Self::Season(parse_id(id).ok_or_else(unknown)?),
            ["lists"] => Self::Lists,
            ["lists", "withListItem", item] => {
                let (item_ref_id, item_type) = parse_item_ref(item).ok_or_else(unknown)?;
                Self::ListsWithListItem {
                    item_ref_id,
                    item_type,
                }
            }
            ["lists", id] => Self::List((*id).to_string()),
            ["listitems"] => Self::ListItems,
            ["listitems", "withDetails"] => Self::ListItemsWithDetails,
            ["listitems", id] => Self::ListItem((*id).to_string()),
            ["movies"] => Self::Movies,
            ["movies", id] => Self::Movie(parse_id(id).ok_or_else(unknown)?),
            ["episodesearch", "search"] => Self::EpisodeSearch,
            ["episodesearch", "suggest"] => Self::SearchSuggest,
            ["episodesearch", "renewftstable"] => Self::RenewFtsTable,
            _ => return Err(unknown()),
        };
        Ok(resource)
    }

    /// The canonical path for this resource, used for change notifications.
    pub fn path(&self) -> String {
        match self {
            Self::Shows => "shows".into(),
            Self::Show(id) => format!("shows/{id}"),
            Self::ShowsFilter(sub) => format!("shows/filter/{sub}"),
            Self::ShowsWithLastEpisode => "shows/withLastEpisode".into(),
            Self::ShowsWithNextEpisode => "shows/withNextEpisode".into(),
            Self::Episodes => "episodes".into(),
            Self::Episode(id) => format!("episodes/{id}"),
            Self::EpisodesWithShow => "episodes/withShow".into(),
            Self::EpisodeWithShow(id) => format!("episodes/{id}/withShow"),
            Self::EpisodesOfShow(id) => format!("episodes/ofShow/{id}"),
            Self::EpisodesOfSeason(id) => format!("episodes/ofSeason/{id}"),
            Self::EpisodesOfSeasonWithShow(id) => format!("episodes/ofSeason/withShow/{id}"),
            Self::Seasons => "seasons".into(),
            Self::Season(id) => format!("seasons/{id}"),
            Self::SeasonsOfShow(id) => format!("seasons/ofShow/{id}"),
            Self::Lists => "lists".into(),
            Self::List(id) => format!("lists/{id}"),
            Self::ListsWithListItem {
                item_ref_id,
                item_type,
            } => format!("lists/withListItem/{item_ref_id}-{item_type}"),
            Self::ListItems => "listitems".into(),
            Self::ListItem(id) => format!("listitems/{id}"),
            Self::ListItemsWithDetails => "listitems/withDetails".into(),
            Self::Movies => "movies".into(),
            Self::Movie(id) => format!("movies/{id}"),
            Self::EpisodeSearch => "episodesearch/search".into(),
            Self::SearchSuggest => "episodesearch/suggest".into(),
            Self::RenewFtsTable => "episodesearch/renewftstable".into(),
        }
    }

    /// Logical content type, so generic consumers can branch on
    /// multiple-vs-single without hardcoding the resource.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Shows
            | Self::ShowsFilter(_)
            | Self::ShowsWithLastEpisode
            | Self::ShowsWithNextEpisode => "vnd.kiroku.dir/shows",
            Self::Show(_) => "vnd.kiroku.item/shows",
            Self::Episodes
            | Self::EpisodesWithShow
            | Self::EpisodesOfShow(_)
            | Self::EpisodesOfSeason(_)
            | Self::EpisodesOfSeasonWithShow(_) => "vnd.kiroku.dir/episodes",
            Self::Episode(_) | Self::EpisodeWithShow(_) => "vnd.kiroku.item/episodes",
            Self::Seasons | Self::SeasonsOfShow(_) => "vnd.kiroku.dir/seasons",
            Self::Season(_) => "vnd.kiroku.item/seasons",
            Self::Lists | Self::ListsWithListItem { .. } => "vnd.kiroku.dir/lists",
            Self::List(_) => "vnd.kiroku.item/lists",
            Self::ListItems | Self::ListItemsWithDetails => "vnd.kiroku.dir/listitems",
            Self::ListItem(_) => "vnd.kiroku.item/listitems",
            Self::Movies => "vnd.kiroku.dir/movies",
            Self::Movie(_) => "vnd.kiroku.item/movies",
            Self::EpisodeSearch | Self::SearchSuggest => "vnd.kiroku.dir/episodesearch",
            Self::RenewFtsTable => "vnd.kiroku.item/episodesearch",
        }
    }

    /// Resolve this resource to its base query mapping.
    ///
    /// The search endpoints are not row-addressable; they are served by
    /// the dedicated search operations on the store.
    pub fn mapping(&self) -> Result<QueryMapping, KirokuError> {
        let ct = self.content_type();
        let mapping = match self {
            Self::Shows => QueryMapping::table_read("shows", ct),
            Self::Show(id) => QueryMapping::table_read("shows", ct)
                .with_where("show_id = ?".into(), vec![Value::Integer(*id)]),
            Self::ShowsFilter(sub) => QueryMapping::table_read("shows", ct).with_where(
                "title LIKE ?".into(),
                vec![Value::Text(format!("%{sub}%"))],
            ),
            Self::ShowsWithLastEpisode => {
                shows_with_episode("shows.last_watched_episode_id", ct)
            }
            Self::ShowsWithNextEpisode => shows_with_episode("shows.next_episode_id", ct),
            Self::Episodes => QueryMapping::table_read("episodes", ct).replacing(),
            Self::Episode(id) => QueryMapping::table_read("episodes", ct)
                .replacing()
                .with_where("episode_id = ?".into(), vec![Value::Integer(*id)]),
            Self::EpisodesWithShow => episodes_with_show(ct),
            Self::EpisodeWithShow(id) => episodes_with_show(ct).with_where(
                "episodes.episode_id = ?".into(),
                vec![Value::Integer(*id)],
            ),
            Self::EpisodesOfShow(id) => QueryMapping::table_read("episodes", ct)
                .replacing()
                .with_where("show_id = ?".into(), vec![Value::Integer(*id)]),
            Self::EpisodesOfSeason(id) => QueryMapping::table_read("episodes", ct)
                .replacing()
                .with_where("season_id = ?".into(), vec![Value::Integer(*id)]),
            Self::EpisodesOfSeasonWithShow(id) => episodes_with_show(ct).with_where(
                "episodes.season_id = ?".into(),
                vec![Value::Integer(*id)],
            ),
            Self::Seasons => QueryMapping::table_read("seasons", ct).replacing(),
            Self::Season(id) => QueryMapping::table_read("seasons", ct)
                .replacing()
                .with_where("season_id = ?".into(), vec![Value::Integer(*id)]),
            Self::SeasonsOfShow(id) => QueryMapping::table_read("seasons", ct)
                .replacing()
                .with_where("show_id = ?".into(), vec![Value::Integer(*id)]),
            Self::Lists => QueryMapping::table_read("lists", ct).replacing(),
            Self::List(id) => QueryMapping::table_read("lists", ct)
                .replacing()
                .with_where("list_id = ?".into(), vec![Value::Text(id.clone())]),
            Self::ListsWithListItem {
                item_ref_id,
                item_type,
            } => lists_with_list_item(*item_ref_id, *item_type, ct),
            Self::ListItems => QueryMapping::table_read("list_items", ct).replacing(),
            Self::ListItem(id) => QueryMapping::table_read("list_items", ct)
                .replacing()
                .with_where("list_item_id = ?".into(), vec![Value::Text(id.clone())]),
            Self::ListItemsWithDetails => list_items_with_details(ct),
            Self::Movies => QueryMapping::table_read("movies", ct).replacing(),
            Self::Movie(id) => QueryMapping::table_read("movies", ct)
                .replacing()
                .with_where("movie_id = ?".into(), vec![Value::Integer(*id)]),
            Self::EpisodeSearch | Self::SearchSuggest | Self::RenewFtsTable => {
                return Err(KirokuError::Validation(format!(
                    "resource '{}' is not row-addressable",
                    self.path()
                )))
            }
        };
        Ok(mapping)
    }
}

fn parse_id(segment: &str) -> Option<i64> {
    segment.parse::<i64>().ok()
}

/// Item reference segment "{item_ref_id}-{item_type}". Parsed strictly so
/// the values can be inlined into a join expression without quoting.
fn parse_item_ref(segment: &str) -> Option<(i64, i64)> {
    let (id, ty) = segment.split_once('-')?;
    Some((id.parse().ok()?, ty.parse().ok()?))
}

fn join_mapping(
    table: String,
    projection: Vec<(String, String)>,
    content_type: &'static str,
) -> QueryMapping {
    QueryMapping {
        table,
        fixed_where: None,
        fixed_args: Vec::new(),
        projection,
        write_table: None,
        replace_on_conflict: false,
        content_type,
    }
}

fn qualify(table: &str, columns: &[&str]) -> Vec<(String, String)> {
    columns
        .iter()
        .map(|c| ((*c).to_string(), format!("{table}.{c}")))
        .collect()
}

const SHOW_COLUMNS: &[&str] = &[
    "show_id",
    "title",
    "overview",
    "poster",
    "network",
    "release_time",
    "status",
    "favorite",
    "hidden",
    "sync_enabled",
    "next_episode_id",
    "last_watched_episode_id",
    "last_updated_ms",
    "last_edited_ms",
    "language",
];

const EPISODE_COLUMNS: &[&str] = &[
    "episode_id",
    "season_number",
    "episode_number",
    "absolute_number",
    "season_id",
    "show_id",
    "title",
    "overview",
    "first_released",
    "released_ms",
    "watched",
    "collected",
    "rating_global",
    "rating_user",
    "plays",
    "last_edited_ms",
];

const LIST_ITEM_COLUMNS: &[&str] = &["list_item_id", "item_ref_id", "item_type", "list_id"];

fn episodes_with_show(ct: &'static str) -> QueryMapping {
    let mut projection = qualify("episodes", EPISODE_COLUMNS);
    projection.extend([
        ("show_title".to_string(), "shows.title".to_string()),
        ("show_poster".to_string(), "shows.poster".to_string()),
        ("show_network".to_string(), "shows.network".to_string()),
        ("show_status".to_string(), "shows.status".to_string()),
        ("favorite".to_string(), "shows.favorite".to_string()),
        ("hidden".to_string(), "shows.hidden".to_string()),
    ]);
    join_mapping(
        "episodes JOIN shows ON episodes.show_id = shows.show_id".into(),
        projection,
        ct,
    )
}

fn shows_with_episode(join_column: &str, ct: &'static str) -> QueryMapping {
    let mut projection = qualify("shows", SHOW_COLUMNS);
    projection.extend([
        ("episode_id".to_string(), "episodes.episode_id".to_string()),
        ("episode_title".to_string(), "episodes.title".to_string()),
        (
            "episode_number".to_string(),
            "episodes.episode_number".to_string(),
        ),
        (
            "episode_season_number".to_string(),
            "episodes.season_number".to_string(),
        ),
        (
            "episode_released_ms".to_string(),
            "episodes.released_ms".to_string(),
        ),
        ("episode_watched".to_string(), "episodes.watched".to_string()),
    ]);
    join_mapping(
        format!("shows LEFT OUTER JOIN episodes ON {join_column} = episodes.episode_id"),
        projection,
        ct,
    )
}

fn lists_with_list_item(item_ref_id: i64, item_type: i64, ct: &'static str) -> QueryMapping {
    let mut projection = qualify("lists", &["list_id", "name", "list_order"]);
    projection.extend([
        ("list_item_id".to_string(), "li.list_item_id".to_string()),
        ("item_ref_id".to_string(), "li.item_ref_id".to_string()),
        ("item_type".to_string(), "li.item_type".to_string()),
    ]);
    join_mapping(
        format!(
            "lists LEFT OUTER JOIN (SELECT list_id, list_item_id, item_ref_id, item_type \
             FROM list_items WHERE item_ref_id = {item_ref_id} AND item_type = {item_type}) \
             AS li ON lists.list_id = li.list_id"
        ),
        projection,
        ct,
    )
}

fn list_items_with_details(ct: &'static str) -> QueryMapping {
    let mut projection = qualify("list_items", LIST_ITEM_COLUMNS);
    projection.extend([
        ("show_title".to_string(), "shows.title".to_string()),
        ("show_poster".to_string(), "shows.poster".to_string()),
        ("show_status".to_string(), "shows.status".to_string()),
        ("favorite".to_string(), "shows.favorite".to_string()),
        (
            "next_episode_id".to_string(),
            "shows.next_episode_id".to_string(),
        ),
    ]);
    join_mapping(
        "list_items LEFT OUTER JOIN shows ON list_items.item_ref_id = shows.show_id".into(),
        projection,
        ct,
    )
}
