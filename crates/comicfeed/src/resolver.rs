use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use scraper::Html;
use snafu::{ResultExt as _, Snafu};
use tracing::{debug, info};
use url::Url;

use crate::day::DayKey;
use crate::fs::write_atomic;
use crate::model::ResolvedComic;
use crate::strategy::{self, BoxedStrategy};

const LOG_TARGET: &str = "comicfeed::resolver";

pub const DEFAULT_USER_AGENT: &str = concat!("comicfeed/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Snafu)]
pub enum FetchError {
    #[snafu(display("Invalid candidate URL `{url}`"))]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    #[snafu(display("HTTP request to {url} failed"))]
    Http { url: String, source: reqwest::Error },
    #[snafu(display("{url} responded with HTTP {status}"))]
    Status { url: String, status: u16 },
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;

#[derive(Debug, Snafu)]
pub enum ResolverError {
    #[snafu(display("Failed to build HTTP client"))]
    Client { source: reqwest::Error },
    #[snafu(display("Failed to write debug page {}", path.display()))]
    DebugWrite { path: PathBuf, source: io::Error },
}

pub type ResolverResult<T> = std::result::Result<T, ResolverError>;

/// A page body together with the URL it was served from after redirects
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: Url,
    pub body: String,
}

/// Source of candidate pages.
#[async_trait::async_trait]
pub trait PageFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<FetchedPage>;
}

/// [`PageFetcher`] over HTTP, following redirects.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> ResolverResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context(ClientSnafu)?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<FetchedPage> {
        let parsed = Url::parse(url).context(InvalidUrlSnafu { url })?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .context(HttpSnafu { url })?;

        let status = response.status();
        if !status.is_success() {
            return StatusSnafu {
                url,
                status: status.as_u16(),
            }
            .fail();
        }

        let final_url = response.url().clone();
        let body = response.text().await.context(HttpSnafu { url })?;

        Ok(FetchedPage { final_url, body })
    }
}

/// Outcome of resolving a candidate that could be fetched.
#[derive(Debug)]
pub enum Resolution {
    Found(ResolvedComic),
    /// The page was fetched, but no strategy found an image on it
    NotFound { final_url: Url, body: String },
}

/// Turns candidate page URLs into comic image URLs.
pub struct ComicResolver {
    fetcher: Box<dyn PageFetcher + Send + Sync>,
    strategies: Vec<BoxedStrategy>,
}

impl ComicResolver {
    pub fn new(fetcher: Box<dyn PageFetcher + Send + Sync>, strategies: Vec<BoxedStrategy>) -> Self {
        Self {
            fetcher,
            strategies,
        }
    }

    /// Fetch `candidate_url` once and run the strategy chain over it.
    ///
    /// Transport failures are returned as errors; a page without a
    /// recognizable comic is a regular [`Resolution::NotFound`].
    pub async fn resolve(&self, candidate_url: &str, day: DayKey) -> FetchResult<Resolution> {
        info!(target: LOG_TARGET, url = %candidate_url, "Fetching candidate");
        let page = self.fetcher.fetch(candidate_url).await?;

        if page.final_url.as_str() != candidate_url {
            info!(target: LOG_TARGET, from = %candidate_url, to = %page.final_url, "Candidate redirected");
        }

        let Some((strategy, image_url)) = self.extract(&page) else {
            return Ok(Resolution::NotFound {
                final_url: page.final_url,
                body: page.body,
            });
        };

        info!(target: LOG_TARGET, %strategy, %image_url, "Found comic image");
        Ok(Resolution::Found(ResolvedComic {
            candidate_url: candidate_url.to_string(),
            final_page_url: page.final_url.into(),
            image_url,
            resolved_at: day,
        }))
    }

    fn extract(&self, page: &FetchedPage) -> Option<(&'static str, String)> {
        let document = Html::parse_document(&page.body);
        let found = strategy::extract_first(&self.strategies, &document, &page.final_url);
        if found.is_none() {
            debug!(
                target: LOG_TARGET,
                url = %page.final_url,
                strategies = self.strategies.len(),
                "No strategy matched"
            );
        }
        found
    }
}

/// Keep the raw body of a page nothing could be extracted from, for manual
/// inspection. Overwrites the previous capture.
pub fn save_debug_page(path: &Path, final_url: &Url, body: &str) -> ResolverResult<()> {
    write_atomic(path, body.as_bytes()).context(DebugWriteSnafu { path })?;
    info!(target: LOG_TARGET, path = %path.display(), url = %final_url, bytes = body.len(), "Saved page for debugging");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tempfile::tempdir;

    use super::*;
    use crate::strategy::{SiteProfile, default_chain};

    struct StaticFetcher {
        pages: BTreeMap<String, FetchedPage>,
    }

    #[async_trait::async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> FetchResult<FetchedPage> {
            self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn resolver(pages: &[(&str, &str, &str)]) -> ComicResolver {
        let pages = pages
            .iter()
            .map(|(url, final_url, body)| {
                (
                    url.to_string(),
                    FetchedPage {
                        final_url: Url::parse(final_url).unwrap(),
                        body: body.to_string(),
                    },
                )
            })
            .collect();
        ComicResolver::new(
            Box::new(StaticFetcher { pages }),
            default_chain(&SiteProfile::default()).unwrap(),
        )
    }

    fn today() -> DayKey {
        "2024-01-02".parse().unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn resolves_through_redirect() {
        let resolver = resolver(&[(
            "https://explosm.net/comics/latest",
            "https://explosm.net/comics/dated-42",
            r#"<html><head><meta property="og:image" content="//files.explosm.net/comics/42.png"></head></html>"#,
        )]);

        let Resolution::Found(comic) = resolver
            .resolve("https://explosm.net/comics/latest", today())
            .await
            .unwrap()
        else {
            panic!("expected a comic");
        };

        assert_eq!(comic.candidate_url, "https://explosm.net/comics/latest");
        assert_eq!(comic.final_page_url, "https://explosm.net/comics/dated-42");
        assert_eq!(comic.image_url, "https://files.explosm.net/comics/42.png");
        assert_eq!(comic.resolved_at, today());
    }

    #[test_log::test(tokio::test)]
    async fn miss_keeps_body() {
        let resolver = resolver(&[(
            "https://explosm.net/comics/empty",
            "https://explosm.net/comics/empty",
            "<html><body>nothing here</body></html>",
        )]);

        let resolution = resolver
            .resolve("https://explosm.net/comics/empty", today())
            .await
            .unwrap();
        assert!(matches!(
            resolution,
            Resolution::NotFound { ref body, .. } if body.contains("nothing here")
        ));
    }

    #[test_log::test(tokio::test)]
    async fn fetch_failure_is_an_error() {
        let resolver = resolver(&[]);
        assert!(matches!(
            resolver.resolve("https://explosm.net/gone", today()).await,
            Err(FetchError::Status { status: 404, .. })
        ));
    }

    #[test_log::test(tokio::test)]
    async fn http_fetcher_rejects_invalid_url() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1), DEFAULT_USER_AGENT).unwrap();
        assert!(matches!(
            fetcher.fetch("not a url").await,
            Err(FetchError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn debug_page_is_overwritten() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("debug.html");
        let url = Url::parse("https://explosm.net/").unwrap();

        save_debug_page(&path, &url, "<p>first</p>").unwrap();
        save_debug_page(&path, &url, "<p>second</p>").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<p>second</p>");
    }
}
