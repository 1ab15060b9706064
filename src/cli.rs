use clap::ValueHint;

use std::path::PathBuf;

use reqwest::Url;

#[derive(clap::Parser, Debug, Clone)]
#[command(version, about)]
pub struct Args {
    /// Path to the config file.
    ///
    /// By default, postfeed looks for a file named `postfeed.toml` in the following directories
    /// (in order):
    ///
    /// - `./` (the current directory)
    /// - `/etc`
    #[arg(
        short,
        env = "POSTFEED_CONFIG",
        value_hint(ValueHint::FilePath)
    )]
    pub config_path: Option<PathBuf>,

    /// HTTP server address to bind to.
    #[arg(long, env = "POSTFEED_BIND_ADDR")]
    pub bind_addr: Option<String>,

    /// URL of the RSS feed to present.
    #[arg(long, env = "POSTFEED_FEED_URL", value_hint(ValueHint::Url))]
    pub feed_url: Option<Url>,

    /// Fetch and normalize the feed once, print the posts as JSON and exit.
    #[arg(long)]
    pub once: bool,
}

impl Args {
    pub fn parse() -> Self {
        clap::Parser::parse()
    }
}
