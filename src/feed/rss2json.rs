use anyhow::{anyhow, bail, Context, Result};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use super::{non_empty, Enclosure, RawFeedItem};

const STATUS_OK: &str = "ok";

#[derive(Deserialize, Debug)]
struct Response {
    status: String,
    message: Option<String>,
    items: Option<Vec<Item>>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Item {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    content: Option<String>,
    pub_date: Option<String>,
    author: Option<String>,
    thumbnail: Option<String>,

    // the service sends `{}` or `[]` when there is no enclosure.
    #[serde(default)]
    enclosure: Value,
}

impl Item {
    fn into_raw(self, link: String) -> RawFeedItem {
        let enclosure = match self.enclosure {
            Value::Object(map) => {
                let get = |key: &str| map.get(key).and_then(Value::as_str).map(String::from);

                non_empty(get("link")).map(|url| Enclosure {
                    link: url,
                    mime_type: non_empty(get("type")),
                })
            }

            _ => None,
        };

        RawFeedItem {
            title: self.title.unwrap_or_default(),
            link,
            description: self.description.unwrap_or_default(),
            content: self.content.unwrap_or_default(),
            pub_date: self.pub_date.unwrap_or_default(),
            author: non_empty(self.author),
            thumbnail: non_empty(self.thumbnail),
            enclosure,
        }
    }
}

/// A feed-to-JSON conversion service (`GET {endpoint}?rss_url=...`).
pub struct Rss2JsonSource {
    http_client: reqwest::Client,
    endpoint: Url,
    feed_url: Url,
}

impl Rss2JsonSource {
    pub fn new(http_client: reqwest::Client, endpoint: Url, feed_url: Url) -> Self {
        Self {
            http_client,
            endpoint,
            feed_url,
        }
    }

    pub fn feed_url(&self) -> &Url {
        &self.feed_url
    }

    fn request_url(&self) -> Url {
        // a fresh value on every request keeps intermediaries from serving a stale feed.
        let cache_buster = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;

        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("rss_url", self.feed_url.as_str())
            .append_pair("_", &cache_buster.to_string());

        url
    }

    #[instrument(level = "DEBUG", skip(self), fields(feed_url = %self.feed_url))]
    pub async fn fetch(&self) -> Result<Vec<RawFeedItem>> {
        let url = self.request_url();
        debug!(%url, "Requesting the feed");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(Into::into)
            .and_then(|r| r.error_for_status().context("server returned an error"))
            .with_context(|| anyhow!("could not fetch the feed `{}`", self.feed_url))?;
        let body = response.text().await.with_context(|| {
            anyhow!(
                "could not read the response when fetching the feed `{}`",
                self.feed_url
            )
        })?;

        parse(&body).with_context(|| anyhow!("could not parse the feed `{}`", self.feed_url))
    }
}

fn parse(body: &str) -> Result<Vec<RawFeedItem>> {
    let response: Response =
        serde_json::from_str(body).context("the response is not a valid feed payload")?;

    if response.status != STATUS_OK {
        match response.message {
            Some(message) => bail!("the feed service reported `{}`: {message}", response.status),
            None => bail!("the feed service reported `{}`", response.status),
        }
    }

    let items = response
        .items
        .ok_or_else(|| anyhow!("the payload has no `items` field"))?;

    let mut raw_items = Vec::with_capacity(items.len());

    for (idx, mut item) in items.into_iter().enumerate() {
        let idx = idx + 1;

        let Some(link) = non_empty(item.link.take()) else {
            warn!("Skipping entry #{idx}: it has no link");
            continue;
        };

        raw_items.push(item.into_raw(link));
    }

    Ok(raw_items)
}
