//! Configuration loading

use poly_deribit_link::config::Config;
use std::io::Write;

#[test]
fn test_config_example_loads() {
    let config = Config::example().unwrap();
    config.validate().unwrap();
    assert_eq!(config.options.currency, "BTC");
    assert_eq!(config.poller.interval_secs, 60);
    assert!(config.sink.database_url.is_none());
}

#[test]
fn test_config_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [poller]
        interval_secs = 30

        [sink]
        fallback_dir = "/tmp/quotes"
        "#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.poller.interval_secs, 30);
    assert_eq!(config.poller.schedule().interval.as_secs(), 30);
    assert_eq!(config.sink.fallback_dir, std::path::PathBuf::from("/tmp/quotes"));
    assert_eq!(config.events.tag_slug, "crypto");
}
