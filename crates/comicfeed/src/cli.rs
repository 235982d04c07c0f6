use std::path::PathBuf;
use std::time::Duration;

use clap::builder::RangedU64ValueParser;
use clap::{Args, Parser, Subcommand};
use comicfeed::DEFAULT_MAX_ATTEMPTS;
use comicfeed::candidates::CandidateOrder;
use comicfeed::day::DayKey;
use comicfeed::publisher::SiteConfig;
use comicfeed::resolver::DEFAULT_USER_AGENT;
use comicfeed::store::KeyMode;
use comicfeed::strategy::{DEFAULT_ASSET_PATTERN, DEFAULT_CONTAINER_SELECTORS, SiteProfile};
use url::Url;

/// Publishes the comic of the day as a static page and an RSS feed
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Opts {
    #[command(subcommand)]
    pub cmd: OptsCmd,
}

#[derive(Debug, Subcommand)]
pub enum OptsCmd {
    /// Resolve today's comic and publish it, unless already done
    Run(RunOpts),
    /// Regenerate all pages and the feed from the store, without fetching
    Rebuild {
        #[command(flatten)]
        state: StateOpts,
        #[command(flatten)]
        site: SiteOpts,
    },
    /// Development and debugging commands
    #[command(subcommand)]
    Dev(DevCmd),
}

#[derive(Debug, Args)]
pub struct RunOpts {
    /// Line-delimited list of candidate page URLs
    #[arg(long, env = "COMICFEED_CANDIDATES", default_value = "comic_urls.txt")]
    pub candidates: PathBuf,

    /// Order in which candidates are tried
    #[arg(long, value_enum, env = "COMICFEED_CANDIDATE_ORDER", default_value = "in-order")]
    pub candidate_order: CandidateOrder,

    /// Maximum number of candidates tried per run
    #[arg(
        long,
        env = "COMICFEED_MAX_ATTEMPTS",
        default_value_t = DEFAULT_MAX_ATTEMPTS,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub max_attempts: usize,

    /// Publish for this day (YYYY-MM-DD) instead of today (UTC)
    #[arg(long, env = "COMICFEED_DATE")]
    pub date: Option<DayKey>,

    /// Where to keep the page body when no comic could be found
    #[arg(long, env = "COMICFEED_DEBUG_FILE", default_value = "debug.html")]
    pub debug_file: PathBuf,

    #[command(flatten)]
    pub fetch: FetchOpts,

    #[command(flatten)]
    pub state: StateOpts,

    #[command(flatten)]
    pub site: SiteOpts,
}

impl RunOpts {
    pub fn day(&self) -> DayKey {
        self.date.unwrap_or_else(DayKey::today_utc)
    }
}

/// Options controlling how candidate pages are fetched and read
#[derive(Debug, Args)]
pub struct FetchOpts {
    /// Timeout for each page fetch, in seconds
    #[arg(
        long,
        env = "COMICFEED_TIMEOUT_SECS",
        default_value = "10",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout_secs: u64,

    #[arg(long, env = "COMICFEED_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// URL substring identifying comic images
    #[arg(long, env = "COMICFEED_ASSET_PATTERN", default_value = DEFAULT_ASSET_PATTERN)]
    pub asset_pattern: String,

    /// CSS selector of an element holding the comic image (repeatable)
    #[arg(long = "container", env = "COMICFEED_CONTAINERS", value_delimiter = ',')]
    pub containers: Vec<String>,
}

impl FetchOpts {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn site_profile(&self) -> SiteProfile {
        let container_selectors = if self.containers.is_empty() {
            DEFAULT_CONTAINER_SELECTORS
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            self.containers.clone()
        };

        SiteProfile {
            asset_pattern: self.asset_pattern.clone(),
            container_selectors,
        }
    }
}

/// Options locating the publication store
#[derive(Debug, Args)]
pub struct StateOpts {
    /// JSON file recording every published comic
    #[arg(long, env = "COMICFEED_STATE_FILE", default_value = "used_comics.json")]
    pub state_file: PathBuf,

    /// Identity publications are deduplicated by
    #[arg(long, value_enum, env = "COMICFEED_KEY_MODE", default_value = "date")]
    pub key_mode: KeyMode,
}

/// Options describing the generated site
#[derive(Debug, Args)]
pub struct SiteOpts {
    /// Public URL the output directory is served from
    #[arg(long, env = "COMICFEED_BASE_URL")]
    pub base_url: Url,

    #[arg(long, env = "COMICFEED_OUTPUT_DIR", default_value = "docs")]
    pub output_dir: PathBuf,

    #[arg(long, env = "COMICFEED_TITLE", default_value = "Cyanide and Happiness")]
    pub title: String,

    #[arg(
        long,
        env = "COMICFEED_FEED_TITLE",
        default_value = "Cyanide and Happiness Daily"
    )]
    pub feed_title: String,

    #[arg(
        long,
        env = "COMICFEED_FEED_DESCRIPTION",
        default_value = "Daily Cyanide and Happiness comic from Explosm.net"
    )]
    pub feed_description: String,

    #[arg(long, env = "COMICFEED_LANGUAGE", default_value = "en")]
    pub language: String,

    /// Prefix of the dated page names
    #[arg(long, env = "COMICFEED_PREFIX", default_value = "cnh")]
    pub prefix: String,

    /// File name of the RSS feed inside the output directory
    #[arg(long, env = "COMICFEED_FEED_FILE", default_value = "cnh-clean.xml")]
    pub feed_file: String,

    /// Number of most recent comics in the feed
    #[arg(long, env = "COMICFEED_FEED_ITEMS", default_value = "30")]
    pub feed_items: usize,
}

impl SiteOpts {
    pub fn to_site_config(&self) -> SiteConfig {
        SiteConfig {
            base_url: self.base_url.clone(),
            title: self.title.clone(),
            feed_title: self.feed_title.clone(),
            feed_description: self.feed_description.clone(),
            language: self.language.clone(),
            prefix: self.prefix.clone(),
            feed_file: self.feed_file.clone(),
            feed_items: self.feed_items,
            output_dir: self.output_dir.clone(),
        }
    }
}

/// Development and debugging commands
#[derive(Debug, Subcommand)]
pub enum DevCmd {
    /// Resolve a single page and print what would be published
    Resolve {
        /// Page URL to resolve
        url: String,

        #[command(flatten)]
        fetch: FetchOpts,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_run(extra: &[&str]) -> Result<Opts, clap::Error> {
        let mut args = vec!["comicfeed", "run", "--base-url", "https://comics.example/"];
        args.extend_from_slice(extra);
        Opts::try_parse_from(args)
    }

    #[test]
    fn run_defaults() {
        let opts = parse_run(&[]).unwrap();
        let OptsCmd::Run(run) = opts.cmd else {
            panic!("expected run command");
        };
        assert_eq!(run.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(run.fetch.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn rejects_zero_attempts_and_zero_timeout() {
        assert!(parse_run(&["--max-attempts", "0"]).is_err());
        assert!(parse_run(&["--timeout-secs", "0"]).is_err());
        assert!(parse_run(&["--max-attempts", "1", "--timeout-secs", "1"]).is_ok());
    }
}
