//! Discover command implementation

use super::{build_runner, shutdown_on_ctrl_c};
use crate::config::Config;
use clap::Args;

#[derive(Args, Debug, Default)]
pub struct DiscoverArgs {
    /// Run one discovery pass, print the matches and exit
    #[arg(long)]
    pub once: bool,
}

impl DiscoverArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let runner = build_runner(config)?;

        if self.once {
            let pairs = runner.discover(chrono::Utc::now().date_naive()).await?;
            for pair in &pairs {
                println!("{pair}");
            }
            println!("{} pair(s) matched", pairs.len());
            return Ok(());
        }

        shutdown_on_ctrl_c(runner.shutdown_handle());
        runner.run_continuous().await
    }
}
