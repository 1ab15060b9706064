use std::future;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::{stream, StreamExt};
use reqwest::Url;
use ::time::UtcOffset;
use tokio::sync::{watch, Notify};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::feed::{FeedSource, RawFeedItem};
use crate::image::{absolutize, ImageExtractor};
use crate::og::OgImageLookup;
use crate::post::{DisplayPost, PostAssembler};

/// Where an activation is at.
///
/// `Ready` and `Failed` are final: nothing is retried until the next activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BatchState {
    #[default]
    Idle,
    Loading,
    Ready(Vec<DisplayPost>),
    Failed,
}

impl BatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready(_) => "ready",
            Self::Failed => "failed",
        }
    }

    pub fn posts(&self) -> &[DisplayPost] {
        match self {
            Self::Ready(posts) => posts,
            _ => &[],
        }
    }

    pub fn presentation(&self, skeleton_count: usize) -> Presentation<'_> {
        match self {
            // nothing has been fetched yet, so the section is about to load.
            Self::Idle | Self::Loading => Presentation::Skeletons(skeleton_count),
            Self::Ready(posts) if !posts.is_empty() => Presentation::Posts(posts),
            Self::Ready(_) | Self::Failed => Presentation::Nothing,
        }
    }
}

/// What the posts section shows for a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation<'a> {
    Nothing,
    Skeletons(usize),
    Posts(&'a [DisplayPost]),
}

/// Runs one fetch-and-normalize pass over the feed.
pub struct Normalizer {
    source: FeedSource,
    images: ImageExtractor,
    og: Option<OgImageLookup>,
    assembler: PostAssembler,
    max_concurrency: usize,
}

impl Normalizer {
    pub fn new(cfg: &Config) -> Result<Self> {
        let source = FeedSource::new(&cfg.source, cfg.feed_url.clone())?;
        let og = if cfg.og_fallback.enabled {
            Some(OgImageLookup::new(&cfg.og_fallback)?)
        } else {
            None
        };

        let offset = UtcOffset::current_local_offset().unwrap_or_else(|e| {
            debug!("Could not determine the local UTC offset, using UTC: {e}");
            UtcOffset::UTC
        });

        Ok(Self {
            source,
            images: ImageExtractor::new(&cfg.images),
            og,
            assembler: PostAssembler {
                author_fallback: cfg.author_fallback.clone(),
                excerpt_length: cfg.excerpt_length,
                date_format: cfg.date_format.clone().map(|format| format.into_inner()),
                offset,
            },
            max_concurrency: cfg.og_fallback.max_concurrency,
        })
    }

    /// Fetches the feed and normalizes every entry.
    ///
    /// Only a failure of the feed itself fails the batch.
    pub async fn run(&self) -> BatchState {
        let items = match self.source.fetch().await {
            Ok(items) => items,

            Err(e) => {
                warn!("Could not load the feed `{}`: {e:#}", self.source.feed_url());
                return BatchState::Failed;
            }
        };

        BatchState::Ready(self.normalize(items).await)
    }

    /// Builds the posts in feed order, waiting for every og:image lookup to settle.
    pub async fn normalize(&self, items: Vec<RawFeedItem>) -> Vec<DisplayPost> {
        let limit = match self.max_concurrency {
            0 => items.len().max(1),
            n => n,
        };

        stream::iter(items.into_iter().enumerate())
            .map(|(index, item)| self.normalize_item(index, item))
            .buffered(limit)
            .collect()
            .await
    }

    async fn normalize_item(&self, index: usize, item: RawFeedItem) -> DisplayPost {
        let link = Url::parse(&item.link).ok();
        let mut image = self
            .images
            .resolve_image(&item)
            .and_then(|candidate| absolutize(&candidate, link.as_ref()));

        if image.is_none() {
            if let (Some(og), Some(link)) = (&self.og, &link) {
                image = og.lookup(link).await;
            }
        }

        self.assembler.assemble(index, item, image)
    }
}

/// A read side of the activation loop, shared with the HTTP handlers.
#[derive(Clone)]
pub struct BatchHandle {
    state: watch::Receiver<BatchState>,
    refresh: Arc<Notify>,
}

impl BatchHandle {
    #[cfg(test)]
    pub fn fixed(state: BatchState) -> Self {
        let (_, rx) = watch::channel(state);

        Self {
            state: rx,
            refresh: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> BatchState {
        self.state.borrow().clone()
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<BatchState> {
        self.state.clone()
    }

    /// Requests a new activation. Requests made while one is running are coalesced.
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }
}

/// Publishes the outcome of each activation.
pub struct Activator {
    normalizer: Normalizer,
    state: watch::Sender<BatchState>,
    refresh: Arc<Notify>,
    refresh_interval: Option<Duration>,
}

impl Activator {
    pub fn new(normalizer: Normalizer, refresh_interval: Option<Duration>) -> (Self, BatchHandle) {
        let (state, rx) = watch::channel(BatchState::Idle);
        let refresh = Arc::new(Notify::new());

        let activator = Self {
            normalizer,
            state,
            refresh: refresh.clone(),
            refresh_interval,
        };

        (activator, BatchHandle { state: rx, refresh })
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        async move {
            loop {
                if !self.activate(&cancel).await {
                    break;
                }

                let next = async {
                    match self.refresh_interval {
                        Some(interval) => {
                            debug!("Scheduling the next activation in {}s", interval.as_secs());
                            time::sleep(interval).await
                        }

                        None => future::pending().await,
                    }
                };
                let next = pin!(next);

                select! {
                    _ = cancel.cancelled() => {
                        debug!("Received a cancellation signal; exiting");
                        break;
                    }

                    _ = self.refresh.notified() => {
                        info!("Received a refresh request");
                    }

                    _ = next => {}
                }
            }

            Ok(())
        }
        .instrument(info_span!("activator"))
        .await
    }

    /// Returns `false` if cancelled mid-way, discarding the outcome.
    async fn activate(&self, cancel: &CancellationToken) -> bool {
        self.state.send_replace(BatchState::Loading);

        let outcome = select! {
            _ = cancel.cancelled() => {
                debug!("Received a cancellation signal; discarding the activation");
                return false;
            }

            outcome = self.normalizer.run().instrument(info_span!("activation")) => outcome,
        };

        match &outcome {
            BatchState::Ready(posts) => info!("Loaded {} posts", posts.len()),
            _ => info!("The activation ended in the `{}` state", outcome.as_str()),
        }

        self.state.send_replace(outcome);

        true
    }
}
