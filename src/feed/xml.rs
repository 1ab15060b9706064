use anyhow::{anyhow, Context, Result};
use reqwest::header::{HeaderValue, CACHE_CONTROL};
use reqwest::Url;
use rss::{Channel, Item};
use tracing::{debug, instrument, warn};

use super::{non_empty, Enclosure, RawFeedItem};

/// The RSS document, fetched and parsed directly.
pub struct RssSource {
    http_client: reqwest::Client,
    feed_url: Url,
}

impl RssSource {
    pub fn new(http_client: reqwest::Client, feed_url: Url) -> Self {
        Self {
            http_client,
            feed_url,
        }
    }

    pub fn feed_url(&self) -> &Url {
        &self.feed_url
    }

    #[instrument(level = "DEBUG", skip(self), fields(feed_url = %self.feed_url))]
    pub async fn fetch(&self) -> Result<Vec<RawFeedItem>> {
        debug!("Requesting the feed");

        let response = self
            .http_client
            .get(self.feed_url.clone())
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
            .send()
            .await
            .map_err(Into::into)
            .and_then(|r| r.error_for_status().context("server returned an error"))
            .with_context(|| anyhow!("could not fetch the feed `{}`", self.feed_url))?;
        let body = response.bytes().await.with_context(|| {
            anyhow!(
                "could not read the response when fetching the feed `{}`",
                self.feed_url
            )
        })?;

        parse(&body).with_context(|| anyhow!("could not parse the feed `{}`", self.feed_url))
    }
}

fn parse(body: &[u8]) -> Result<Vec<RawFeedItem>> {
    let channel = Channel::read_from(body).context("the response is not an RSS document")?;
    let mut items = Vec::with_capacity(channel.items().len());

    for (idx, item) in channel.items().iter().enumerate() {
        let idx = idx + 1;

        let Some(link) = non_empty(item.link().map(String::from)) else {
            warn!("Skipping entry #{idx}: it has no link");
            continue;
        };

        items.push(RawFeedItem {
            title: item.title().unwrap_or_default().into(),
            link,
            description: item.description().unwrap_or_default().into(),
            content: item.content().unwrap_or_default().into(),
            pub_date: item.pub_date().unwrap_or_default().into(),
            author: author(item),
            thumbnail: media_thumbnail(item),
            enclosure: item.enclosure().and_then(|enclosure| {
                non_empty(Some(enclosure.url().into())).map(|link| Enclosure {
                    link,
                    mime_type: non_empty(Some(enclosure.mime_type().into())),
                })
            }),
        });
    }

    Ok(items)
}

fn author(item: &Item) -> Option<String> {
    non_empty(item.author().map(String::from)).or_else(|| {
        item.dublin_core_ext()
            .and_then(|dc| dc.creators().first())
            .and_then(|creator| non_empty(Some(creator.clone())))
    })
}

fn media_thumbnail(item: &Item) -> Option<String> {
    item.extensions()
        .get("media")
        .and_then(|media| media.get("thumbnail"))
        .and_then(|thumbnails| thumbnails.first())
        .and_then(|thumbnail| non_empty(thumbnail.attrs().get("url").cloned()))
}
