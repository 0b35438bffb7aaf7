//! Match command implementation

use super::build_sources;
use crate::config::Config;
use crate::error::with_timeout;
use crate::market::EventSource;
use crate::matcher::OptionMatcher;
use crate::options::OptionChainSource;
use crate::registry::{PairRegistry, Registration};
use anyhow::Context;
use clap::Args;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct MatchArgs {
    /// Event slug
    pub slug: String,
}

impl MatchArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let (events, options) = build_sources(config)?;
        let timeout = Duration::from_secs(config.poller.fetch_timeout_secs);

        let event = with_timeout(timeout, events.get_event(&self.slug))
            .await
            .with_context(|| format!("Failed to fetch event {}", self.slug))?
            .ok_or_else(|| anyhow::anyhow!("Event {} not found", self.slug))?;
        let chain = with_timeout(timeout, options.fetch_chain(&config.options.currency))
            .await
            .context("Failed to fetch option chain")?;

        println!("Event:    {}", event.slug);
        println!("Question: {}", event.question);
        println!("Options:  {} listed", chain.len());

        let mut registry = PairRegistry::new(OptionMatcher::with_policy(config.matcher.policy()));
        match registry.register(&event, &chain, chrono::Utc::now().date_naive()) {
            Registration::Activated(pair) => {
                println!("Target:   {}", pair.target);
                println!("Option:   {}", pair.option_symbol);
                println!("Expiry:   {}", pair.option_expiry);
                println!("Distance: {}", pair.match_distance);
            }
            Registration::AlreadyActive(key) => println!("Already active: {key}"),
            Registration::Unmatched(reason) => println!("Unmatched: {}", reason.as_str()),
        }

        Ok(())
    }
}
