//! Image extraction strategies.
//!
//! The comic page is outside of our control and its markup changes without
//! notice, so the image is looked up by several independent strategies tried
//! in order of confidence. The first strategy to produce a URL wins.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use snafu::Snafu;
use url::Url;

/// URL substring identifying comic images on the default site
pub const DEFAULT_ASSET_PATTERN: &str = "files.explosm.net/comics";

/// Containers known to hold the comic image on the default site
pub const DEFAULT_CONTAINER_SELECTORS: &[&str] =
    &["#comic-wrap", "#main-comic", "[class*=\"ComicImage\"]"];

static META_IMAGE_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        r#"meta[property="og:image"]"#,
        r#"meta[name="og:image"]"#,
        r#"meta[property="og:image:url"]"#,
        r#"meta[name="twitter:image"]"#,
        r#"meta[property="twitter:image"]"#,
    ]
    .into_iter()
    .map(|s| Selector::parse(s).expect("Valid selector"))
    .collect()
});

static PRELOAD_IMAGE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"link[rel~="preload"][as="image"]"#).expect("Valid selector")
});

static IMG_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src]").expect("Valid selector"));

#[derive(Debug, Snafu)]
pub enum StrategyError {
    #[snafu(display("Invalid container selector `{selector}`"))]
    InvalidSelector { selector: String },
    #[snafu(display("Asset path pattern must not be empty"))]
    EmptyAssetPattern,
}

pub type StrategyResult<T> = std::result::Result<T, StrategyError>;

/// One way of finding the comic image on a parsed page.
pub trait ExtractStrategy {
    /// Short name, used in logs
    fn name(&self) -> &'static str;

    /// Absolute image URL, or `None` if this strategy does not match
    fn try_extract(&self, page: &Html, base: &Url) -> Option<String>;
}

pub type BoxedStrategy = Box<dyn ExtractStrategy + Send + Sync>;

/// Site-specific knowledge the heuristic strategies need.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    pub asset_pattern: String,
    pub container_selectors: Vec<String>,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            asset_pattern: DEFAULT_ASSET_PATTERN.to_string(),
            container_selectors: DEFAULT_CONTAINER_SELECTORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// The strategy chain, highest confidence first
pub fn default_chain(profile: &SiteProfile) -> StrategyResult<Vec<BoxedStrategy>> {
    if profile.asset_pattern.trim().is_empty() {
        return Err(StrategyError::EmptyAssetPattern);
    }

    Ok(vec![
        Box::new(MetaImage),
        Box::new(PreloadHint::new(&profile.asset_pattern)),
        Box::new(ContentContainer::new(&profile.container_selectors)?),
        Box::new(ImageScan::new(&profile.asset_pattern)),
    ])
}

/// Turn an attribute value into an absolute http(s) URL relative to the page.
///
/// Handles protocol-relative (`//host/..`) and root-relative (`/path`) values.
pub fn absolutize(base: &Url, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("data:") {
        return None;
    }

    let url = base.join(raw).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url.into()),
        _ => None,
    }
}

/// `og:image` and friends
pub struct MetaImage;

impl ExtractStrategy for MetaImage {
    fn name(&self) -> &'static str {
        "meta-image"
    }

    fn try_extract(&self, page: &Html, base: &Url) -> Option<String> {
        META_IMAGE_SELECTORS.iter().find_map(|selector| {
            page.select(selector)
                .filter_map(|meta| meta.value().attr("content"))
                .find_map(|content| absolutize(base, content))
        })
    }
}

/// `<link rel="preload" as="image">` pointing at a comic asset
pub struct PreloadHint {
    asset_pattern: String,
}

impl PreloadHint {
    pub fn new(asset_pattern: &str) -> Self {
        Self {
            asset_pattern: asset_pattern.to_string(),
        }
    }
}

impl ExtractStrategy for PreloadHint {
    fn name(&self) -> &'static str {
        "preload-hint"
    }

    fn try_extract(&self, page: &Html, base: &Url) -> Option<String> {
        page.select(&PRELOAD_IMAGE_SELECTOR)
            .filter_map(|link| link.value().attr("href"))
            .filter(|href| href.contains(&self.asset_pattern))
            .find_map(|href| absolutize(base, href))
    }
}

/// First `<img>` inside one of the known comic containers
pub struct ContentContainer {
    containers: Vec<Selector>,
}

impl ContentContainer {
    pub fn new(selectors: &[String]) -> StrategyResult<Self> {
        let containers = selectors
            .iter()
            .map(|selector| {
                Selector::parse(selector).map_err(|_| StrategyError::InvalidSelector {
                    selector: selector.clone(),
                })
            })
            .collect::<StrategyResult<Vec<_>>>()?;

        Ok(Self { containers })
    }

    fn img_src<'a>(container: ElementRef<'a>) -> Option<&'a str> {
        if container.value().name() == "img" {
            if let Some(src) = container.value().attr("src") {
                return Some(src);
            }
        }
        container
            .select(&IMG_SELECTOR)
            .find_map(|img| img.value().attr("src"))
    }
}

impl ExtractStrategy for ContentContainer {
    fn name(&self) -> &'static str {
        "content-container"
    }

    fn try_extract(&self, page: &Html, base: &Url) -> Option<String> {
        self.containers.iter().find_map(|selector| {
            page.select(selector)
                .filter_map(Self::img_src)
                .find_map(|src| absolutize(base, src))
        })
    }
}

/// Any `<img>` on the page whose `src` looks like a comic asset
pub struct ImageScan {
    asset_pattern: String,
}

impl ImageScan {
    pub fn new(asset_pattern: &str) -> Self {
        Self {
            asset_pattern: asset_pattern.to_string(),
        }
    }
}

impl ExtractStrategy for ImageScan {
    fn name(&self) -> &'static str {
        "image-scan"
    }

    fn try_extract(&self, page: &Html, base: &Url) -> Option<String> {
        page.select(&IMG_SELECTOR)
            .filter_map(|img| img.value().attr("src"))
            .filter(|src| src.contains(&self.asset_pattern))
            .find_map(|src| absolutize(base, src))
    }
}

/// Run `chain` against `page`, returning the winning strategy's name and URL
pub fn extract_first(
    chain: &[BoxedStrategy],
    page: &Html,
    base: &Url,
) -> Option<(&'static str, String)> {
    chain
        .iter()
        .find_map(|strategy| Some((strategy.name(), strategy.try_extract(page, base)?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://explosm.net/comics/some-comic").unwrap()
    }

    fn page(body: &str) -> Html {
        Html::parse_document(&format!("<html><head></head><body>{body}</body></html>"))
    }

    fn doc(head: &str, body: &str) -> Html {
        Html::parse_document(&format!("<html><head>{head}</head><body>{body}</body></html>"))
    }

    #[test]
    fn absolutize_handles_relative_forms() {
        let base = base();
        assert_eq!(
            absolutize(&base, "//files.explosm.net/comics/a.png").as_deref(),
            Some("https://files.explosm.net/comics/a.png")
        );
        assert_eq!(
            absolutize(&base, "/static/a.png").as_deref(),
            Some("https://explosm.net/static/a.png")
        );
        assert_eq!(
            absolutize(&base, " https://cdn.example/a.png ").as_deref(),
            Some("https://cdn.example/a.png")
        );
        assert_eq!(absolutize(&base, ""), None);
        assert_eq!(absolutize(&base, "data:image/png;base64,AAAA"), None);
        assert_eq!(absolutize(&base, "javascript:void(0)"), None);
    }

    #[test]
    fn meta_image_reads_og_image() {
        let html = doc(
            r#"<meta property="og:image" content="https://files.explosm.net/comics/og.png">"#,
            "",
        );
        assert_eq!(
            MetaImage.try_extract(&html, &base()).as_deref(),
            Some("https://files.explosm.net/comics/og.png")
        );
    }

    #[test]
    fn meta_image_falls_back_to_twitter_card() {
        let html = doc(
            r#"<meta property="og:image" content=""><meta name="twitter:image" content="/tw.png">"#,
            "",
        );
        assert_eq!(
            MetaImage.try_extract(&html, &base()).as_deref(),
            Some("https://explosm.net/tw.png")
        );
    }

    #[test]
    fn preload_hint_requires_asset_pattern() {
        let strategy = PreloadHint::new(DEFAULT_ASSET_PATTERN);
        let html = doc(
            r#"<link rel="preload" as="image" href="https://explosm.net/logo.png">
               <link rel="preload" as="image" href="https://files.explosm.net/comics/pre.png">"#,
            "",
        );
        assert_eq!(
            strategy.try_extract(&html, &base()).as_deref(),
            Some("https://files.explosm.net/comics/pre.png")
        );

        let html = doc(
            r#"<link rel="preload" as="font" href="https://files.explosm.net/comics/x.woff">"#,
            "",
        );
        assert_eq!(strategy.try_extract(&html, &base()), None);
    }

    #[test]
    fn container_normalizes_protocol_relative_src() {
        let strategy = ContentContainer::new(&["#comic-wrap".to_string()]).unwrap();
        let html = page(
            r#"<img src="/logo.png">
               <div id="comic-wrap"><img src="//files.explosm.net/comics/wrap.png"></div>"#,
        );
        assert_eq!(
            strategy.try_extract(&html, &base()).as_deref(),
            Some("https://files.explosm.net/comics/wrap.png")
        );
    }

    #[test]
    fn container_matches_class_pattern_and_bare_img() {
        let strategy = ContentContainer::new(&["[class*=\"ComicImage\"]".to_string()]).unwrap();

        let html = page(r#"<div class="MainComic__ComicImage-sc-1"><img src="/c.png"></div>"#);
        assert_eq!(
            strategy.try_extract(&html, &base()).as_deref(),
            Some("https://explosm.net/c.png")
        );

        let html = page(r#"<img class="ComicImage" src="/d.png">"#);
        assert_eq!(
            strategy.try_extract(&html, &base()).as_deref(),
            Some("https://explosm.net/d.png")
        );
    }

    #[test]
    fn container_rejects_invalid_selector() {
        assert!(matches!(
            ContentContainer::new(&["[[".to_string()]),
            Err(StrategyError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn image_scan_filters_by_pattern() {
        let strategy = ImageScan::new(DEFAULT_ASSET_PATTERN);
        let html = page(
            r#"<img src="/ads/banner.png"><img src="https://files.explosm.net/comics/scan.png">"#,
        );
        assert_eq!(
            strategy.try_extract(&html, &base()).as_deref(),
            Some("https://files.explosm.net/comics/scan.png")
        );
        assert_eq!(strategy.try_extract(&page("<img src=\"/a.png\">"), &base()), None);
    }

    #[test]
    fn chain_prefers_metadata_over_fallbacks() {
        let chain = default_chain(&SiteProfile::default()).unwrap();
        let html = doc(
            r#"<meta property="og:image" content="https://files.explosm.net/comics/meta.png">"#,
            r#"<div id="comic-wrap"><img src="https://files.explosm.net/comics/fallback.png"></div>"#,
        );
        assert_eq!(
            extract_first(&chain, &html, &base()),
            Some(("meta-image", "https://files.explosm.net/comics/meta.png".to_string()))
        );
    }

    #[test]
    fn chain_order_is_by_confidence() {
        let chain = default_chain(&SiteProfile::default()).unwrap();
        let names: Vec<_> = chain.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            ["meta-image", "preload-hint", "content-container", "image-scan"]
        );
    }

    #[test]
    fn chain_reaches_last_resort() {
        let chain = default_chain(&SiteProfile::default()).unwrap();
        let html = page(r#"<p><img src="//files.explosm.net/comics/last.png"></p>"#);
        assert_eq!(
            extract_first(&chain, &html, &base()),
            Some(("image-scan", "https://files.explosm.net/comics/last.png".to_string()))
        );
    }

    #[test]
    fn chain_reports_miss() {
        let chain = default_chain(&SiteProfile::default()).unwrap();
        let html = page(r#"<img src="/logo.png"><p>No comic today</p>"#);
        assert_eq!(extract_first(&chain, &html, &base()), None);
    }

    #[test]
    fn empty_asset_pattern_is_rejected() {
        let profile = SiteProfile {
            asset_pattern: " ".into(),
            ..SiteProfile::default()
        };
        assert!(matches!(
            default_chain(&profile),
            Err(StrategyError::EmptyAssetPattern)
        ));
    }
}
