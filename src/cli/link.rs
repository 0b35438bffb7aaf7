//! Link command implementation

use super::{build_runner, shutdown_on_ctrl_c};
use crate::config::Config;
use clap::Args;

#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Event slug
    pub slug: String,
}

impl LinkArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let runner = build_runner(config)?;
        shutdown_on_ctrl_c(runner.shutdown_handle());
        runner.run_single(&self.slug).await
    }
}
