use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

use maud::{DOCTYPE, Markup, html};
use rss::extension::atom::{AtomExtension, Link};
use rss::extension::{Extension, ExtensionMap};
use rss::{Channel, Enclosure, Guid, Item};
use serde::Serialize;
use snafu::{ResultExt as _, Snafu};
use tracing::{debug, info};
use url::Url;

use crate::day::DayKey;
use crate::fs::write_atomic;
use crate::model::PublicationRecord;
use crate::store::UsedComicsStore;

const LOG_TARGET: &str = "comicfeed::publisher";

pub const MEDIA_NAMESPACE: &str = "http://search.yahoo.com/mrss/";

/// Stable entry point, always showing the most recent comic
pub const LATEST_FILE: &str = "index.html";
pub const STATUS_FILE: &str = "status.html";

#[derive(Debug, Snafu)]
pub enum PublishError {
    #[snafu(display("Failed to create output directory {}", path.display()))]
    CreateDir { path: PathBuf, source: io::Error },
    #[snafu(display("Failed to write {}", path.display()))]
    Write { path: PathBuf, source: io::Error },
    #[snafu(display("Failed to serialize feed"))]
    Feed { source: rss::Error },
    #[snafu(display("Cannot express {date} as a feed date"))]
    FeedDate {
        date: DayKey,
        source: time::error::Format,
    },
}

pub type PublishResult<T> = std::result::Result<T, PublishError>;

/// Where and how the generated site is published.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Public URL the output directory is served from
    pub base_url: Url,
    /// Comic name, used in page and item titles
    pub title: String,
    pub feed_title: String,
    pub feed_description: String,
    pub language: String,
    /// Dated pages are named `<prefix>-<YYYY-MM-DD>.html`
    pub prefix: String,
    pub feed_file: String,
    /// How many of the most recent publications the feed carries
    pub feed_items: usize,
    pub output_dir: PathBuf,
}

/// Files written for one publication.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedArtifacts {
    pub page: PathBuf,
    pub page_url: String,
    pub latest: PathBuf,
    pub feed: PathBuf,
    pub status: PathBuf,
}

/// Generates the static site from the store.
///
/// Everything except the dated page of the new comic is regenerated from the
/// full store content on every run, never patched, so that running it twice
/// over the same store yields the same files.
pub struct PublicationBuilder {
    site: SiteConfig,
    base: String,
}

impl PublicationBuilder {
    pub fn new(site: SiteConfig) -> Self {
        let mut base = site.base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Self { site, base }
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    pub fn artifact_name(&self, date: DayKey) -> String {
        format!("{}-{date}.html", self.site.prefix)
    }

    pub fn page_url(&self, date: DayKey) -> String {
        format!("{}{}", self.base, self.artifact_name(date))
    }

    pub fn feed_url(&self) -> String {
        format!("{}{}", self.base, self.site.feed_file)
    }

    fn page_title(&self, date: DayKey) -> String {
        format!("{} - {date}", self.site.title)
    }

    /// Write the artifacts for a record that was just added to `store`.
    pub fn publish(
        &self,
        record: &PublicationRecord,
        store: &UsedComicsStore,
    ) -> PublishResult<PublishedArtifacts> {
        self.ensure_output_dir()?;

        let page = self.write(
            &self.artifact_name(record.date),
            self.render_page(record).into_string().as_bytes(),
        )?;
        // a backfilled day must not displace a newer comic
        let newest = store.latest().unwrap_or(record);
        let latest = self.write(LATEST_FILE, self.render_page(newest).into_string().as_bytes())?;
        let feed = self.write(&self.site.feed_file, &self.render_feed(store)?)?;
        let status = self.write(STATUS_FILE, self.render_status(store).into_string().as_bytes())?;

        let page_url = self.page_url(record.date);
        info!(target: LOG_TARGET, date = %record.date, %page_url, "Published comic");

        Ok(PublishedArtifacts {
            page,
            page_url,
            latest,
            feed,
            status,
        })
    }

    /// Regenerate every artifact from `store` alone.
    ///
    /// Returns `None` when nothing was ever published.
    pub fn rebuild(&self, store: &UsedComicsStore) -> PublishResult<Option<PublishedArtifacts>> {
        let Some(latest_record) = store.latest() else {
            info!(target: LOG_TARGET, "Store is empty, nothing to rebuild");
            return Ok(None);
        };

        self.ensure_output_dir()?;

        let mut written = BTreeSet::new();
        for (key, record) in store.newest_first(usize::MAX) {
            // one page per day; the record listed first owns it
            if !written.insert(record.date) {
                debug!(target: LOG_TARGET, %key, date = %record.date, "Day already has a page, skipping");
                continue;
            }
            self.write(
                &self.artifact_name(record.date),
                self.render_page(record).into_string().as_bytes(),
            )?;
        }
        info!(target: LOG_TARGET, pages = written.len(), "Rebuilt dated pages");

        self.publish(latest_record, store).map(Some)
    }

    pub fn render_page(&self, record: &PublicationRecord) -> Markup {
        let title = self.page_title(record.date);
        let page_url = self.page_url(record.date);
        let alt = format!("{} comic for {}", self.site.title, record.date);

        html! {
            (DOCTYPE)
            html lang=(self.site.language) {
                head {
                    meta charset="utf-8";
                    meta name="viewport" content="width=device-width, initial-scale=1.0";
                    title { (title) }
                    link rel="canonical" href=(page_url);
                    link rel="alternate" type="application/rss+xml"
                         title=(self.site.feed_title) href=(self.feed_url());
                    meta property="og:type" content="article";
                    meta property="og:title" content=(title);
                    meta property="og:url" content=(page_url);
                    meta property="og:image" content=(record.image_url);
                    meta name="twitter:card" content="summary_large_image";
                    meta name="twitter:image" content=(record.image_url);
                }
                body {
                    main {
                        h1 { (title) }
                        a href=(record.page_url) {
                            img src=(record.image_url) alt=(alt) style="width:100%;max-width:800px;";
                        }
                        p {
                            "Source: "
                            a href=(record.page_url) { (record.page_url) }
                        }
                    }
                }
            }
        }
    }

    /// Build the feed channel from the newest records in `store`
    pub fn build_feed(&self, store: &UsedComicsStore) -> PublishResult<Channel> {
        let records = store.newest_first(self.site.feed_items);

        let items = records
            .iter()
            .map(|(_, record)| self.feed_item(record))
            .collect::<PublishResult<Vec<_>>>()?;

        let mut self_link = Link::default();
        self_link.set_href(self.feed_url());
        self_link.set_rel("self");
        self_link.set_mime_type(Some("application/rss+xml".to_string()));
        let mut atom = AtomExtension::default();
        atom.set_links(vec![self_link]);

        let mut channel = Channel::default();
        channel.set_title(self.site.feed_title.as_str());
        channel.set_link(self.base.as_str());
        channel.set_description(self.site.feed_description.as_str());
        channel.set_language(Some(self.site.language.clone()));
        channel.set_generator(Some(crate::PROJECT_NAME.to_string()));
        channel.set_atom_ext(Some(atom));
        channel.set_namespaces(BTreeMap::from([(
            "media".to_string(),
            MEDIA_NAMESPACE.to_string(),
        )]));
        // derived from content rather than the clock, so reruns are
        // byte-identical
        if let Some((_, newest)) = records.first() {
            let date = feed_date(newest.date)?;
            channel.set_last_build_date(Some(date.clone()));
            channel.set_pub_date(Some(date));
        }
        channel.set_items(items);
        Ok(channel)
    }

    fn feed_item(&self, record: &PublicationRecord) -> PublishResult<Item> {
        let title = self.page_title(record.date);
        let page_url = self.page_url(record.date);

        let description = html! {
            a href=(record.page_url) {
                img src=(record.image_url) alt=(title);
            }
        }
        .into_string();

        let mut guid = Guid::default();
        guid.set_value(page_url.as_str());
        guid.set_permalink(true);

        let mut enclosure = Enclosure::default();
        enclosure.set_url(record.image_url.as_str());
        enclosure.set_length("0");
        enclosure.set_mime_type(image_mime_type(&record.image_url));

        let mut media = Extension::default();
        media.set_name("media:content");
        media.attrs = BTreeMap::from([
            ("url".to_string(), record.image_url.clone()),
            ("medium".to_string(), "image".to_string()),
        ]);

        let mut item = Item::default();
        item.set_title(title);
        item.set_link(page_url);
        item.set_guid(guid);
        item.set_pub_date(feed_date(record.date)?);
        item.set_description(description);
        item.set_enclosure(enclosure);
        item.set_extensions(ExtensionMap::from([(
            "media".to_string(),
            BTreeMap::from([("content".to_string(), vec![media])]),
        )]));
        Ok(item)
    }

    pub fn render_feed(&self, store: &UsedComicsStore) -> PublishResult<Vec<u8>> {
        self.build_feed(store)?
            .pretty_write_to(Vec::new(), b' ', 2)
            .context(FeedSnafu)
    }

    /// Human readable summary of the most recent publication
    pub fn render_status(&self, store: &UsedComicsStore) -> Markup {
        let latest = store.latest();
        let recent = store.newest_first(self.site.feed_items);

        html! {
            (DOCTYPE)
            html lang=(self.site.language) {
                head {
                    meta charset="utf-8";
                    meta name="viewport" content="width=device-width, initial-scale=1.0";
                    title { (self.site.feed_title) " - status" }
                    link rel="alternate" type="application/rss+xml"
                         title=(self.site.feed_title) href=(self.feed_url());
                }
                body {
                    main {
                        h1 { (self.site.feed_title) }
                        @if let Some(latest) = latest {
                            p {
                                "Last published: "
                                a href=(self.page_url(latest.date)) { (latest.date.to_string()) }
                            }
                            p {
                                "Image: "
                                a href=(latest.image_url) { (latest.image_url) }
                            }
                            p {
                                "Source: "
                                a href=(latest.page_url) { (latest.page_url) }
                            }
                        } @else {
                            p { "Nothing published yet." }
                        }
                        p { "Comics published so far: " (store.len()) }
                        p { a href=(self.feed_url()) { "RSS feed" } }
                        @if !recent.is_empty() {
                            h2 { "Recent" }
                            ul {
                                @for (_, record) in &recent {
                                    li {
                                        a href=(self.page_url(record.date)) { (record.date.to_string()) }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    fn ensure_output_dir(&self) -> PublishResult<()> {
        let path = &self.site.output_dir;
        std::fs::create_dir_all(path).context(CreateDirSnafu { path })
    }

    fn write(&self, name: &str, contents: &[u8]) -> PublishResult<PathBuf> {
        let path = self.site.output_dir.join(name);
        write_atomic(&path, contents).context(WriteSnafu { path: &path })?;
        debug!(target: LOG_TARGET, path = %path.display(), bytes = contents.len(), "Wrote artifact");
        Ok(path)
    }
}

fn feed_date(date: DayKey) -> PublishResult<String> {
    date.to_rfc2822().context(FeedDateSnafu { date })
}

/// Best-effort MIME type of an image from its URL's extension
fn image_mime_type(image_url: &str) -> &'static str {
    let path = Url::parse(image_url)
        .map(|url| url.path().to_ascii_lowercase())
        .unwrap_or_else(|_| image_url.to_ascii_lowercase());

    match Path::new(&path).extension().and_then(|ext| ext.to_str()) {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
