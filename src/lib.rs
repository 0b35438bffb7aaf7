//! poly-deribit-link: Polymarket BTC price events linked to Deribit options
//!
//! This library provides the core components for:
//! - Strike and expiry extraction from event questions
//! - Matching events to the replicating option on the chain
//! - A registry of active, retired and unmatched pairs
//! - Per-pair quote polling with bounded fetches
//! - Snapshot persistence to Postgres with a CSV fallback
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod decimal;
pub mod error;
pub mod market;
pub mod matcher;
pub mod options;
pub mod parser;
pub mod poller;
pub mod registry;
pub mod sink;
pub mod telemetry;
