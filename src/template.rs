use std::fmt::{self, Display};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::info;

use crate::batch::{BatchState, Presentation};
use crate::post::DisplayPost;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Index,
}

impl Template {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Index => "index",
        }
    }
}

impl Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

pub fn new(index_path: Option<&Path>) -> Result<Handlebars<'static>> {
    let mut tt = Handlebars::new();

    match index_path {
        Some(path) => {
            tt.register_template_file(Template::Index.as_str(), path)
                .with_context(|| anyhow!("could not load the template `{}`", path.display()))?;
            info!("Using the page template `{}`", path.display());
        }

        None => tt
            .register_template_string(Template::Index.as_str(), include_str!("template/index.hbs"))
            .context("could not compile the built-in page template")?,
    }

    Ok(tt)
}

#[derive(Serialize, Debug, Clone)]
pub struct Section<'a> {
    pub state: &'static str,
    pub skeletons: Vec<usize>,
    pub posts: &'a [DisplayPost],
}

#[derive(Serialize, Debug, Clone)]
pub struct PageContext<'a> {
    pub title: &'a str,
    pub placeholder: String,
    pub subscribe_url: Option<&'a str>,

    /// `None` hides the section altogether.
    pub section: Option<Section<'a>>,
}

impl<'a> PageContext<'a> {
    pub fn new(
        title: &'a str,
        subscribe_url: Option<&'a str>,
        state: &'a BatchState,
        skeleton_count: usize,
    ) -> Self {
        let section = match state.presentation(skeleton_count) {
            Presentation::Nothing => None,

            Presentation::Skeletons(count) => Some(Section {
                state: state.as_str(),
                skeletons: (0..count).collect(),
                posts: &[],
            }),

            Presentation::Posts(posts) => Some(Section {
                state: state.as_str(),
                skeletons: vec![],
                posts,
            }),
        };

        Self {
            title,
            placeholder: initials(title),
            subscribe_url,
            section,
        }
    }
}

fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .take(2)
        .collect()
}
