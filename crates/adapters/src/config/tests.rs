use std::sync::Mutex;

use super::*;

// Environment mutation is process-global; serialize the tests that touch it.
static ENV_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn defaults_are_valid() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.queue.max_queue_size, 1000);
    assert_eq!(config.queue.max_concurrent_jobs, 5);
    assert_eq!(config.http.rate_limit_max, 1000);
    assert_eq!(config.http.rate_limit_window_ms, 900_000);
}

#[test]
fn health_interval_is_floored_at_sixty_seconds() {
    let settings = PrinterSettings {
        health_check_interval_secs: 10,
        ..PrinterSettings::default()
    };
    assert_eq!(
        settings.health_check_interval(),
        std::time::Duration::from_secs(60)
    );

    let generous = PrinterSettings {
        health_check_interval_secs: 120,
        ..PrinterSettings::default()
    };
    assert_eq!(
        generous.health_check_interval(),
        std::time::Duration::from_secs(120)
    );
}

#[test]
fn zero_capacity_is_rejected() {
    let settings = QueueSettings {
        max_queue_size: 0,
        ..QueueSettings::default()
    };
    assert!(matches!(
        settings.validate(),
        Err(ConfigError::InvalidValue(v)) if v.contains("MAX_QUEUE_SIZE")
    ));
}

#[test]
fn env_overrides_are_picked_up() {
    let _guard = ENV_LOCK.lock().unwrap();
    std::env::set_var("MAX_QUEUE_SIZE", "42");
    std::env::set_var("RETRY_DELAY", "500");
    let settings = QueueSettings::from_env().unwrap();
    std::env::remove_var("MAX_QUEUE_SIZE");
    std::env::remove_var("RETRY_DELAY");

    assert_eq!(settings.max_queue_size, 42);
    assert_eq!(settings.retry_delay_ms, 500);
    // Untouched knobs keep their defaults.
    assert_eq!(settings.batch_size, 5);
}

#[test]
fn malformed_env_value_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    std::env::set_var("MAX_CONCURRENT_JOBS", "a lot");
    let result = QueueSettings::from_env();
    std::env::remove_var("MAX_CONCURRENT_JOBS");

    assert!(matches!(
        result,
        Err(ConfigError::InvalidValue(v)) if v == "MAX_CONCURRENT_JOBS"
    ));
}

#[test]
fn allowed_origins_parse_as_comma_list() {
    let _guard = ENV_LOCK.lock().unwrap();
    std::env::set_var("ALLOWED_ORIGINS", "http://a.local, http://b.local,");
    let settings = HttpSettings::from_env().unwrap();
    std::env::remove_var("ALLOWED_ORIGINS");

    assert_eq!(settings.allowed_origins, vec!["http://a.local", "http://b.local"]);
}

#[test]
fn yaml_config_round_trips() {
    let yaml = r#"
server:
  host: 0.0.0.0
  port: 9000
queue:
  max_concurrent_jobs: 8
"#;
    let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.queue.max_concurrent_jobs, 8);
    // Sections absent from the file fall back to defaults.
    assert_eq!(config.queue.max_queue_size, 1000);
    assert!(config.validate().is_ok());
}
