pub mod candidates;
pub mod day;
pub mod fs;
pub mod model;
pub mod publisher;
pub mod resolver;
pub mod store;
pub mod strategy;

use std::path::PathBuf;

use comicfeed_util_error::FmtCompact as _;
use serde::Serialize;
use snafu::{ResultExt as _, Snafu};
use tracing::{debug, error, info, warn};

use crate::day::DayKey;
use crate::model::PublicationRecord;
use crate::publisher::{PublicationBuilder, PublishError, PublishedArtifacts};
use crate::resolver::{ComicResolver, Resolution, ResolverError, save_debug_page};
use crate::store::{StoreError, UsedComicsStore};

pub const PROJECT_NAME: &str = "comicfeed";
pub const LOG_TARGET: &str = "comicfeed::run";

/// How many candidates a single run tries at most
pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

#[derive(Debug, Snafu)]
pub enum RunError {
    #[snafu(display("Store error: {source}"))]
    Store { source: StoreError },
    #[snafu(display("Publishing error: {source}"))]
    Publish { source: PublishError },
    #[snafu(display("Could not save debug page: {source}"))]
    DebugPage { source: ResolverError },
}

pub type RunResult<T> = std::result::Result<T, RunError>;

/// How a run ended, when it did not fail outright.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum RunOutcome {
    /// A new comic was published and recorded
    Published {
        key: String,
        record: PublicationRecord,
        artifacts: PublishedArtifacts,
    },
    /// Today's comic is already out; nothing to do
    AlreadyPublished { day: DayKey, image_url: String },
    /// Every candidate was already published
    NothingToDo { candidates: usize },
    /// Candidates were tried but none yielded a new comic
    Exhausted {
        attempted: usize,
        debug_page: Option<PathBuf>,
    },
}

impl RunOutcome {
    /// Whether the run ended in a state that needs operator attention
    pub fn needs_attention(&self) -> bool {
        matches!(self, RunOutcome::Exhausted { .. })
    }
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Day the comic is published for
    pub day: DayKey,
    pub max_attempts: usize,
    /// Where the body of an unparseable page is kept
    pub debug_file: PathBuf,
}

/// Resolve and publish at most one new comic.
///
/// Candidates are tried in order until one yields a comic that was never
/// published. Fetch failures and pages without a recognizable comic only
/// move on to the next candidate. The store is written only after every
/// artifact was written successfully.
pub async fn run_once(
    settings: &RunSettings,
    candidates: &[String],
    store: &mut UsedComicsStore,
    resolver: &ComicResolver,
    publisher: &PublicationBuilder,
) -> RunResult<RunOutcome> {
    let day = settings.day;

    if let Some(existing) = store.published_on(day) {
        info!(target: LOG_TARGET, %day, image_url = %existing.image_url, "Already published today, skipping");
        return Ok(RunOutcome::AlreadyPublished {
            day,
            image_url: existing.image_url.clone(),
        });
    }

    let fresh: Vec<&String> = candidates
        .iter()
        .filter(|url| {
            let used = store.is_used(&store.key_for(day, url)) || store.is_candidate_used(url);
            if used {
                debug!(target: LOG_TARGET, %url, "Candidate already published, skipping");
            }
            !used
        })
        .take(settings.max_attempts)
        .collect();

    if fresh.is_empty() {
        info!(target: LOG_TARGET, candidates = candidates.len(), "No fresh candidates left");
        return Ok(RunOutcome::NothingToDo {
            candidates: candidates.len(),
        });
    }

    info!(target: LOG_TARGET, %day, fresh = fresh.len(), "Resolving candidates");

    let mut last_miss = None;
    let mut attempted = 0;
    for url in fresh {
        attempted += 1;

        let comic = match resolver.resolve(url, day).await {
            Ok(Resolution::Found(comic)) => comic,
            Ok(Resolution::NotFound { final_url, body }) => {
                warn!(target: LOG_TARGET, %url, %final_url, "No comic image found on page");
                last_miss = Some((final_url, body));
                continue;
            }
            Err(err) => {
                warn!(target: LOG_TARGET, %url, err = %err.fmt_compact(), "Failed to fetch candidate");
                continue;
            }
        };

        if store.is_image_used(&comic.image_url) || store.is_candidate_used(&comic.final_page_url) {
            warn!(
                target: LOG_TARGET,
                %url,
                image_url = %comic.image_url,
                page_url = %comic.final_page_url,
                "Candidate resolved to an already published comic, skipping"
            );
            continue;
        }

        let key = store.key_for(day, &comic.candidate_url);
        let record = PublicationRecord::from(comic);
        store
            .record(key.clone(), record.clone())
            .context(StoreSnafu)?;
        let artifacts = publisher.publish(&record, store).context(PublishSnafu)?;
        store.persist().context(StoreSnafu)?;

        return Ok(RunOutcome::Published {
            key,
            record,
            artifacts,
        });
    }

    let debug_page = match last_miss {
        Some((final_url, body)) => {
            save_debug_page(&settings.debug_file, &final_url, &body).context(DebugPageSnafu)?;
            Some(settings.debug_file.clone())
        }
        None => None,
    };

    error!(target: LOG_TARGET, attempted, "Could not resolve any candidate");
    Ok(RunOutcome::Exhausted {
        attempted,
        debug_page,
    })
}
