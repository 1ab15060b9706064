use std::sync::Arc;

use anyhow::Result;
use handlebars::Handlebars;

use crate::batch::BatchHandle;
use crate::config::Config;
use crate::template;

#[derive(Clone)]
pub struct State {
    pub cfg: Arc<Config>,
    pub batch: BatchHandle,
    pub template: Arc<Handlebars<'static>>,
}

impl State {
    pub fn new(cfg: Config, batch: BatchHandle) -> Result<Self> {
        let template = Arc::new(template::new(cfg.template_path.as_deref())?);

        Ok(State {
            cfg: Arc::new(cfg),
            batch,
            template,
        })
    }
}
