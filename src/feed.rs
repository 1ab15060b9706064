mod rss2json;
mod xml;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;

use crate::config::{SourceConfig, SourceKind};

pub use self::rss2json::Rss2JsonSource;
pub use self::xml::RssSource;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A feed entry as received from upstream, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub content: String,
    pub pub_date: String,
    pub author: Option<String>,
    pub thumbnail: Option<String>,
    pub enclosure: Option<Enclosure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enclosure {
    pub link: String,
    pub mime_type: Option<String>,
}

/// Where the primary feed comes from.
pub enum FeedSource {
    Rss2Json(Rss2JsonSource),
    Rss(RssSource),
}

impl FeedSource {
    pub fn new(cfg: &SourceConfig, feed_url: Url) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(cfg.timeout.into())
            .build()
            .context("could not create an HTTP client")?;

        Ok(match cfg.kind {
            SourceKind::Rss2json => Self::Rss2Json(Rss2JsonSource::new(
                http_client,
                cfg.endpoint.clone(),
                feed_url,
            )),

            SourceKind::Rss => Self::Rss(RssSource::new(http_client, feed_url)),
        })
    }

    pub fn feed_url(&self) -> &Url {
        match self {
            Self::Rss2Json(source) => source.feed_url(),
            Self::Rss(source) => source.feed_url(),
        }
    }

    /// Fetches the feed. Any error here fails the whole batch.
    pub async fn fetch(&self) -> Result<Vec<RawFeedItem>> {
        match self {
            Self::Rss2Json(source) => source.fetch().await,
            Self::Rss(source) => source.fetch().await,
        }
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}
