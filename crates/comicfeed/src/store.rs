use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{fmt, io};

use serde::{Deserialize, Serialize};
use snafu::{ResultExt as _, Snafu, ensure};
use tracing::{debug, info};

use crate::day::DayKey;
use crate::fs::write_atomic;
use crate::model::PublicationRecord;

const LOG_TARGET: &str = "comicfeed::store";

const STORE_FORMAT_VERSION: u32 = 1;

/// Which identity a publication is deduplicated by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum KeyMode {
    /// One publication per calendar day
    Date,
    /// One publication per distinct candidate page
    SourceUrl,
}

impl fmt::Display for KeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMode::Date => f.write_str("date"),
            KeyMode::SourceUrl => f.write_str("source-url"),
        }
    }
}

#[derive(Debug, Snafu)]
pub enum StoreError {
    #[snafu(display("Failed to read store {}", path.display()))]
    Read { path: PathBuf, source: io::Error },
    #[snafu(display("Store {} is corrupted", path.display()))]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[snafu(display("Store {} has unsupported format version {version}", path.display()))]
    UnsupportedVersion { path: PathBuf, version: u32 },
    #[snafu(display(
        "Store {} is keyed by {stored}, but {configured} was requested",
        path.display()
    ))]
    KeyModeMismatch {
        path: PathBuf,
        stored: KeyMode,
        configured: KeyMode,
    },
    #[snafu(display("Key `{key}` is already recorded"))]
    DuplicateKey { key: String },
    #[snafu(display("Failed to serialize store"))]
    Serialize { source: serde_json::Error },
    #[snafu(display("Failed to write store {}", path.display()))]
    Write { path: PathBuf, source: io::Error },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    key_mode: KeyMode,
    records: BTreeMap<String, PublicationRecord>,
}

/// Persistent record of every comic that was ever published.
///
/// This is the only place that decides whether something was already
/// published; generated pages in the output directory are never consulted.
#[derive(Debug)]
pub struct UsedComicsStore {
    path: PathBuf,
    key_mode: KeyMode,
    records: BTreeMap<String, PublicationRecord>,
}

impl UsedComicsStore {
    /// Load the store from `path`.
    ///
    /// A missing file is an empty store. Anything else that prevents reading
    /// it is an error: starting from scratch would republish the whole
    /// history.
    pub fn load(path: impl Into<PathBuf>, key_mode: KeyMode) -> StoreResult<Self> {
        let path = path.into();

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(target: LOG_TARGET, path = %path.display(), "No store file yet, starting empty");
                return Ok(Self {
                    path,
                    key_mode,
                    records: BTreeMap::new(),
                });
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        let file: StoreFile = serde_json::from_slice(&bytes).context(ParseSnafu { path: &path })?;

        ensure!(
            file.version == STORE_FORMAT_VERSION,
            UnsupportedVersionSnafu {
                path: &path,
                version: file.version,
            }
        );
        ensure!(
            file.key_mode == key_mode,
            KeyModeMismatchSnafu {
                path: &path,
                stored: file.key_mode,
                configured: key_mode,
            }
        );

        debug!(target: LOG_TARGET, path = %path.display(), count = file.records.len(), "Loaded store");

        Ok(Self {
            path,
            key_mode,
            records: file.records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key_mode(&self) -> KeyMode {
        self.key_mode
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Identity key of a publication made on `day` from `candidate_url`
    pub fn key_for(&self, day: DayKey, candidate_url: &str) -> String {
        match self.key_mode {
            KeyMode::Date => day.to_string(),
            KeyMode::SourceUrl => candidate_url.to_string(),
        }
    }

    pub fn is_used(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&PublicationRecord> {
        self.records.get(key)
    }

    /// Whether anything was published with `day` as its date
    pub fn published_on(&self, day: DayKey) -> Option<&PublicationRecord> {
        self.records.values().find(|record| record.date == day)
    }

    /// Whether `url` was already published, either as the candidate itself
    /// or as the page a candidate redirected to
    pub fn is_candidate_used(&self, url: &str) -> bool {
        self.records
            .values()
            .any(|record| record.source_url == url || record.page_url == url)
    }

    pub fn is_image_used(&self, image_url: &str) -> bool {
        self.records
            .values()
            .any(|record| record.image_url == image_url)
    }

    /// Insert a new publication.
    ///
    /// Callers check [`Self::is_used`] first; recording an existing key is a
    /// program bug, not something to paper over.
    pub fn record(&mut self, key: String, record: PublicationRecord) -> StoreResult<()> {
        ensure!(!self.records.contains_key(&key), DuplicateKeySnafu { key });

        info!(target: LOG_TARGET, %key, date = %record.date, image_url = %record.image_url, "Recorded publication");
        self.records.insert(key, record);
        Ok(())
    }

    /// Up to `limit` records, most recent date first.
    ///
    /// Ties (possible in [`KeyMode::SourceUrl`]) are broken by key so the
    /// order never depends on anything but the store content.
    pub fn newest_first(&self, limit: usize) -> Vec<(&str, &PublicationRecord)> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .map(|(key, record)| (key.as_str(), record))
            .collect();
        records.sort_by(|(a_key, a), (b_key, b)| b.date.cmp(&a.date).then_with(|| a_key.cmp(b_key)));
        records.truncate(limit);
        records
    }

    pub fn latest(&self) -> Option<&PublicationRecord> {
        self.newest_first(1).into_iter().next().map(|(_, record)| record)
    }

    /// Atomically overwrite the store file with the current content
    pub fn persist(&self) -> StoreResult<()> {
        let file = StoreFile {
            version: STORE_FORMAT_VERSION,
            key_mode: self.key_mode,
            records: self.records.clone(),
        };
        let mut bytes = serde_json::to_vec_pretty(&file).context(SerializeSnafu)?;
        bytes.push(b'\n');

        write_atomic(&self.path, &bytes).context(WriteSnafu { path: &self.path })?;

        info!(target: LOG_TARGET, path = %self.path.display(), count = self.records.len(), "Persisted store");
        Ok(())
    }
}
