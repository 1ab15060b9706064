mod batch;
mod cli;
mod config;
mod feed;
mod image;
mod og;
mod post;
mod sanitize;
mod server;
mod state;
mod template;

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use batch::{Activator, BatchState, Normalizer};
use cli::Args;
use config::Config;
use server::Server;
use state::State;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

fn set_up_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(
            EnvFilter::builder()
                .with_regex(false)
                .with_default_directive(Level::INFO.into())
                .with_env_var("POSTFEED_LOG")
                .from_env_lossy(),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    set_up_logging();

    let cancel = CancellationToken::new();

    tokio::spawn({
        let cancel = cancel.clone();

        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("could not listen for the interrupt signal: {e}");
            }

            cancel.cancel();
        }
    });

    let mut args = Args::parse();
    let config_paths = args
        .config_path
        .take()
        .into_iter()
        .chain(["./postfeed.toml".into(), "/etc/postfeed.toml".into()])
        .collect::<Vec<_>>();
    let config = match config::load(&config_paths) {
        Ok(mut config) => {
            config.update(&args);
            config
        }

        Err(e) => {
            error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    if args.once {
        return match run_once(&config).await {
            Ok(code) => code,

            Err(e) => {
                error!("{e:#}");
                ExitCode::FAILURE
            }
        };
    }

    let mut tasks = match start(config, cancel.clone()).await {
        Ok(tasks) => tasks,

        Err(e) => {
            error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    let mut exit_code = ExitCode::SUCCESS;

    while let Some(task_result) = tasks.join_next().await {
        cancel.cancel();

        match task_result {
            Ok(Ok(())) => {}

            Ok(Err(e)) => {
                error!("{e:#}");
                exit_code = ExitCode::FAILURE;
            }

            Err(e) => {
                error!("{e:#}");
                exit_code = ExitCode::FAILURE;
            }
        }
    }

    exit_code
}

async fn run_once(config: &Config) -> Result<ExitCode> {
    let normalizer = Normalizer::new(config)?;
    let state = normalizer.run().await;

    let printed = write_posts(&state, &mut io::stdout().lock())?;

    Ok(if printed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Writes the posts of a ready batch as pretty JSON. Returns `false` if there is nothing to print.
fn write_posts(state: &BatchState, out: &mut impl Write) -> Result<bool> {
    let BatchState::Ready(posts) = state else {
        return Ok(false);
    };

    serde_json::to_writer_pretty(&mut *out, posts).context("could not write the posts")?;
    writeln!(out).context("could not write the posts")?;

    Ok(true)
}

async fn start(config: Config, cancel: CancellationToken) -> Result<JoinSet<Result<()>>> {
    let normalizer = Normalizer::new(&config)?;
    let (activator, batch) =
        Activator::new(normalizer, config.refresh_interval.map(Into::into));
    let state = State::new(config, batch)?;
    let server = Server::new(state).await?;

    let mut tasks = JoinSet::new();
    tasks.spawn(activator.run(cancel.clone()));
    tasks.spawn(server.serve(cancel.clone()));

    Ok(tasks)
}
