use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use rand::SeedableRng as _;
use rand::rngs::StdRng;
use rand::seq::SliceRandom as _;
use snafu::{ResultExt as _, Snafu};
use tracing::debug;

use crate::day::DayKey;

const LOG_TARGET: &str = "comicfeed::candidates";

#[derive(Debug, Snafu)]
pub enum CandidateError {
    #[snafu(display("Failed to read candidates file {}", path.display()))]
    Read { path: PathBuf, source: io::Error },
}

pub type CandidateResult<T> = std::result::Result<T, CandidateError>;

/// How the candidate list is ordered before it is tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CandidateOrder {
    /// File order
    #[default]
    InOrder,
    /// Shuffled, with the same order for the whole day
    DailyShuffle,
    /// Rotated by one position per day
    DailyRotate,
}

/// Ordered list of page URLs that may host today's comic.
#[derive(Debug, Clone, Default)]
pub struct CandidateSource {
    urls: Vec<String>,
}

impl CandidateSource {
    /// Parse a line-delimited list. Blank lines and `#` comments are ignored
    /// and repeated URLs are kept only once.
    pub fn parse(contents: &str) -> Self {
        let mut seen = BTreeSet::new();
        let urls = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter(|line| seen.insert(*line))
            .map(str::to_string)
            .collect();

        Self { urls }
    }

    pub fn read(path: &Path) -> CandidateResult<Self> {
        let contents = std::fs::read_to_string(path).context(ReadSnafu { path })?;
        let source = Self::parse(&contents);
        debug!(target: LOG_TARGET, path = %path.display(), count = source.urls.len(), "Read candidates");
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Candidates in the order they should be tried on `day`.
    ///
    /// Deterministic: the same list and day always yield the same order.
    pub fn ordered_for(&self, day: DayKey, order: CandidateOrder) -> Vec<String> {
        let mut urls = self.urls.clone();
        match order {
            CandidateOrder::InOrder => {}
            CandidateOrder::DailyShuffle => {
                let mut rng = StdRng::seed_from_u64(day.day_number());
                urls.shuffle(&mut rng);
            }
            CandidateOrder::DailyRotate => {
                if !urls.is_empty() {
                    let shift = (day.day_number() % urls.len() as u64) as usize;
                    urls.rotate_left(shift);
                }
            }
        }
        urls
    }
}
