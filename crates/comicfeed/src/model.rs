use serde::{Deserialize, Serialize};

use crate::day::DayKey;

/// A comic image found on a candidate page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedComic {
    /// The candidate URL as it appeared in the candidates file
    pub candidate_url: String,
    /// Page URL after following redirects; used as the outbound link
    pub final_page_url: String,
    /// Absolute URL of the comic image
    pub image_url: String,
    pub resolved_at: DayKey,
}

/// What the store remembers about one published comic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub date: DayKey,
    pub image_url: String,
    /// Canonical (post-redirect) page of the comic
    pub page_url: String,
    /// Candidate URL the comic was resolved from
    pub source_url: String,
}

impl From<ResolvedComic> for PublicationRecord {
    fn from(comic: ResolvedComic) -> Self {
        PublicationRecord {
            date: comic.resolved_at,
            image_url: comic.image_url,
            page_url: comic.final_page_url,
            source_url: comic.candidate_url,
        }
    }
}
