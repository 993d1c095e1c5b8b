use serde::Serialize;

use crate::traits::{EpisodeFlagUpload, ShowUpload};

#[derive(Debug, Serialize)]
pub struct ShowUploadBody<'a> {
    pub shows: [&'a ShowUpload; 1],
}

#[derive(Debug, Serialize)]
pub struct EpisodeFlagsBody<'a> {
    pub show_id: i64,
    pub episodes: &'a [EpisodeFlagUpload],
}
