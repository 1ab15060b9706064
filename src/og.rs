use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use regex_lite::{Regex, RegexBuilder};
use reqwest::Url;
use scraper::{Html, Selector};
use tokio::time;
use tracing::{debug, debug_span, Instrument};

use crate::config::{OgFallbackConfig, OgParser};
use crate::image::absolutize;

const URL_PLACEHOLDER: &str = "{url}";

/// Looks up a page's `og:image` through a fetching proxy.
///
/// Never fails: anything that goes wrong (including the timeout) is reported as "no image".
pub struct OgImageLookup {
    http_client: reqwest::Client,
    proxy_url: String,
    timeout: Duration,
    parser: OgParser,
}

impl OgImageLookup {
    pub fn new(cfg: &OgFallbackConfig) -> Result<Self> {
        if !cfg.proxy_url.contains(URL_PLACEHOLDER) {
            return Err(anyhow!(
                "the proxy URL `{}` has no `{URL_PLACEHOLDER}` placeholder",
                cfg.proxy_url
            ));
        }

        let http_client = reqwest::Client::builder()
            .build()
            .context("could not create an HTTP client")?;

        Ok(Self {
            http_client,
            proxy_url: cfg.proxy_url.clone(),
            timeout: cfg.timeout.into(),
            parser: cfg.parser,
        })
    }

    pub async fn lookup(&self, page: &Url) -> Option<Url> {
        let span = debug_span!("og_lookup", %page);

        match time::timeout(self.timeout, self.fetch(page)).instrument(span).await {
            Ok(Ok(Some(image))) => {
                debug!(%page, %image, "Found an og:image");
                Some(image)
            }

            Ok(Ok(None)) => {
                debug!(%page, "The page declares no og:image");
                None
            }

            Ok(Err(e)) => {
                debug!(%page, "Could not look up the og:image: {e:#}");
                None
            }

            Err(_) => {
                debug!(
                    %page,
                    "Timed out after {}ms looking up the og:image",
                    self.timeout.as_millis()
                );
                None
            }
        }
    }

    fn request_url(&self, page: &Url) -> Result<Url> {
        let url = self
            .proxy_url
            .replace(URL_PLACEHOLDER, &urlencoding::encode(page.as_str()));

        Url::parse(&url).with_context(|| anyhow!("`{url}` is not a valid proxy URL"))
    }

    async fn fetch(&self, page: &Url) -> Result<Option<Url>> {
        let response = self
            .http_client
            .get(self.request_url(page)?)
            .send()
            .await
            .map_err(Into::into)
            .and_then(|r| r.error_for_status().context("server returned an error"))
            .with_context(|| anyhow!("could not fetch `{page}` through the proxy"))?;
        let html = response
            .text()
            .await
            .with_context(|| anyhow!("could not read the page `{page}`"))?;

        let image = match self.parser {
            OgParser::Pattern => find_by_pattern(&html),
            OgParser::Document => find_in_document(&html),
        };

        Ok(image.and_then(|image| absolutize(&image, Some(page))))
    }
}

/// Pattern-matches `<meta property="og:image" content="...">` in either attribute order.
pub fn find_by_pattern(html: &str) -> Option<String> {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();

    let patterns = PATTERNS.get_or_init(|| {
        [
            r#"<meta[^>]+property=["']og:image["'][^>]+content=["']([^"']+)["']"#,
            r#"<meta[^>]+content=["']([^"']+)["'][^>]+property=["']og:image["']"#,
        ]
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .unwrap()
        })
    });

    patterns.iter().find_map(|pattern| {
        pattern
            .captures(html)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_owned())
    })
}

/// Parses the document and reads the first `og:image` meta tag.
pub fn find_in_document(html: &str) -> Option<String> {
    let selector = Selector::parse(r#"meta[property="og:image"], meta[name="og:image"]"#).ok()?;
    let document = Html::parse_document(html);

    document
        .select(&selector)
        .filter_map(|meta| meta.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(String::from)
}
