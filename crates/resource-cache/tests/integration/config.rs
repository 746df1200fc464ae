use std::io::Write;
use std::time::Duration;

use resource_cache::AsyncResourceCache;
use resource_cache::config::Config;

#[test]
fn test_load_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        br#"
logging:
  level: warn
metrics:
  prefix: svc
  custom_tags:
    region: eu
cache:
  name: profiles
  in_memory_capacity: 100
  default_ttl: 30s
  max_retries: 4
  retry_backoff_base: 200ms
"#,
    )
    .unwrap();

    let config = Config::get(Some(file.path())).unwrap();
    assert_eq!(config.metrics.prefix, "svc");
    assert_eq!(config.metrics.custom_tags["region"], "eu");
    assert!(config.sentry_dsn.is_none());

    let cache = AsyncResourceCache::<String>::new(config.cache);
    assert_eq!(cache.name(), "profiles");

    let options = cache.options();
    assert_eq!(options.ttl, Duration::from_secs(30));
    assert_eq!(options.max_retries, 4);
    assert_eq!(options.retry_backoff_base, Duration::from_millis(200));
    assert!(!options.force_refresh);
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::get(Some(&dir.path().join("missing.yml"))).unwrap_err();
    assert_eq!(err.to_string(), "failed to open configuration file");
}
