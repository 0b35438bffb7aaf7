//! Integration tests

mod common;
mod config_test;
mod link_test;
mod poller_test;
