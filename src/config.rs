mod types;

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use serde::Deserialize;
use take_mut::take;
use tracing::{debug, info};

pub use self::types::*;

const DEFAULT_FEED_URL: &str = "https://opensession.substack.com/feed";
const DEFAULT_RSS2JSON_ENDPOINT: &str = "https://api.rss2json.com/v1/api.json";
const DEFAULT_PROXY_URL: &str = "https://api.allorigins.win/raw?url={url}";

fn parse_default_url(s: &str) -> Url {
    // only called on the constants above.
    Url::parse(s).unwrap()
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct Config {
    pub bind_addr: String,
    pub feed_url: Url,
    pub site_name: String,
    pub subscribe_url: Option<Url>,
    pub template_path: Option<PathBuf>,
    pub refresh_interval: Option<Duration>,
    pub date_format: Option<DateTimeFormat>,
    pub author_fallback: String,
    pub excerpt_length: usize,
    pub skeleton_count: usize,
    pub source: SourceConfig,
    pub images: ImageConfig,
    pub og_fallback: OgFallbackConfig,
}

impl Config {
    pub fn update(&mut self, args: &crate::cli::Args) {
        fn set_if_some<T: Clone>(dst: &mut T, v: &Option<T>) {
            if let Some(v) = v {
                *dst = v.clone();
            }
        }

        set_if_some(&mut self.bind_addr, &args.bind_addr);
        set_if_some(&mut self.feed_url, &args.feed_url);
    }

    pub fn resolve_relative_paths(&mut self, config_dir: impl AsRef<Path>) {
        let config_dir = config_dir.as_ref();

        // listing every field keeps this in sync when new paths are added.
        take(self, |this| Self {
            bind_addr: this.bind_addr,
            feed_url: this.feed_url,
            site_name: this.site_name,
            subscribe_url: this.subscribe_url,
            template_path: this.template_path.map(|path| config_dir.join(path)),
            refresh_interval: this.refresh_interval,
            date_format: this.date_format,
            author_fallback: this.author_fallback,
            excerpt_length: this.excerpt_length,
            skeleton_count: this.skeleton_count,
            source: this.source,
            images: this.images,
            og_fallback: this.og_fallback,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "127.0.0.1:20655".into(),
            feed_url: parse_default_url(DEFAULT_FEED_URL),
            site_name: "Open Session".into(),
            subscribe_url: None,
            template_path: None,
            refresh_interval: None,
            date_format: None,
            author_fallback: "Open Session".into(),
            excerpt_length: 200,
            skeleton_count: 3,
            source: Default::default(),
            images: Default::default(),
            og_fallback: Default::default(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// A feed-to-JSON conversion service speaking the rss2json protocol.
    #[default]
    Rss2json,

    /// The RSS document itself.
    Rss,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub endpoint: Url,
    pub timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            kind: SourceKind::default(),
            endpoint: parse_default_url(DEFAULT_RSS2JSON_ENDPOINT),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct ImageConfig {
    /// Hosts whose image URLs carry a `/w_<width>,c_limit/` segment.
    pub cdn_hosts: Vec<String>,
    pub thumbnail_width: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        ImageConfig {
            cdn_hosts: vec!["substackcdn.com".into()],
            thumbnail_width: 400,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OgParser {
    #[default]
    Pattern,
    Document,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct OgFallbackConfig {
    pub enabled: bool,

    /// Proxy URL template; `{url}` is replaced with the percent-encoded page URL.
    pub proxy_url: String,
    pub timeout: Duration,
    pub parser: OgParser,

    /// `0` lifts the limit.
    pub max_concurrency: usize,
}

impl Default for OgFallbackConfig {
    fn default() -> Self {
        OgFallbackConfig {
            enabled: true,
            proxy_url: DEFAULT_PROXY_URL.into(),
            timeout: Duration::from_secs(5),
            parser: OgParser::default(),
            max_concurrency: 8,
        }
    }
}

pub fn load(search_paths: &[PathBuf]) -> Result<Config> {
    for path in search_paths {
        debug!("Trying to load {}", path.display());
        let mut contents = String::new();

        {
            let mut f = match File::open(path) {
                Ok(f) => f,

                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(file = %path.display(), "File not found, skipping");
                    continue;
                }

                Err(e) => {
                    return Err(e)
                        .context(anyhow!("could not load a config file `{}`", path.display()));
                }
            };

            f.read_to_string(&mut contents).with_context(|| {
                anyhow!(
                    "could not read the contents of a config file `{}`",
                    path.display()
                )
            })?;
        }

        let mut cfg: Config = toml::from_str(&contents)
            .with_context(|| anyhow!("could not load the config file `{}`", path.display()))?;

        if let Some(parent) = path.parent() {
            cfg.resolve_relative_paths(parent);
        }

        info!("Loaded a config file `{}`", path.display());

        return Ok(cfg);
    }

    info!("Using the default config");

    Ok(Default::default())
}
