//! Unit tests for configuration loading (`Config::from_env`, `Config::from_args`).
//! These tests modify environment variables, so they are serialized with `ENV_LOCK`.

use super::*;
use once_cell::sync::Lazy;
use std::env;
use std::sync::Mutex;

static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const VARS: [&str; 5] = [
    "MAIL_SINK_INTERFACE",
    "MAIL_SINK_PORT",
    "MAIL_SINK_HOSTNAME",
    "MAIL_SINK_LOG_BODY",
    "MAIL_SINK_STATS_INTERVAL",
];

fn clear_test_env_vars() {
    for var in VARS {
        env::remove_var(var);
    }
}

fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    // A failed test poisons the lock; the guarded data is `()` so recover it.
    let guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_test_env_vars();
    guard
}

#[test]
fn test_config_defaults() {
    let _lock = lock_env();

    let config = Config::from_env().expect("defaults should load");

    assert_eq!(config, Config::default());
    assert_eq!(config.listen_interface, "localhost");
    assert_eq!(config.listen_port, 25);
    assert_eq!(config.greeting_hostname, "localhost");
    assert!(!config.log_body);
    assert_eq!(config.stats_interval_secs, 5);
    assert_eq!(config.listen_address(), "localhost:25");
}

#[test]
fn test_config_from_env_all_set() {
    let _lock = lock_env();

    env::set_var("MAIL_SINK_INTERFACE", "0.0.0.0");
    env::set_var("MAIL_SINK_PORT", "2525");
    env::set_var("MAIL_SINK_HOSTNAME", "sink.example.com");
    env::set_var("MAIL_SINK_LOG_BODY", "TRUE");
    env::set_var("MAIL_SINK_STATS_INTERVAL", "30");

    let config = Config::from_env().expect("Config loading failed when all vars were set");

    assert_eq!(config.listen_interface, "0.0.0.0");
    assert_eq!(config.listen_port, 2525);
    assert_eq!(config.greeting_hostname, "sink.example.com");
    assert!(config.log_body);
    assert_eq!(config.stats_interval_secs, 30);
    assert_eq!(config.listen_address(), "0.0.0.0:2525");

    clear_test_env_vars();
}

#[test]
fn test_config_from_env_invalid_port() {
    let _lock = lock_env();

    env::set_var("MAIL_SINK_PORT", "not-a-port");
    let err_msg = Config::from_env().unwrap_err().to_string();
    assert!(err_msg.contains("MAIL_SINK_PORT"));
    assert!(err_msg.contains("not-a-port"));

    env::set_var("MAIL_SINK_PORT", "70000");
    assert!(Config::from_env().is_err());

    clear_test_env_vars();
}

#[test]
fn test_config_from_env_invalid_bool() {
    let _lock = lock_env();

    env::set_var("MAIL_SINK_LOG_BODY", "sometimes");
    let err_msg = Config::from_env().unwrap_err().to_string();
    assert!(err_msg.contains("MAIL_SINK_LOG_BODY"));
    assert!(err_msg.contains("sometimes"));

    clear_test_env_vars();
}

#[test]
fn test_config_rejects_zero_stats_interval() {
    let _lock = lock_env();

    env::set_var("MAIL_SINK_STATS_INTERVAL", "0");
    assert!(Config::from_env().is_err());
    clear_test_env_vars();

    assert!(Config::from_args(["mail_sink", "--stats-interval", "0"]).is_err());
}

#[test]
fn test_cli_flags_override_env() {
    let _lock = lock_env();

    env::set_var("MAIL_SINK_PORT", "2525");
    env::set_var("MAIL_SINK_HOSTNAME", "from-env");

    let config = Config::from_args([
        "mail_sink",
        "-p",
        "1025",
        "-i",
        "127.0.0.1",
        "-H",
        "from-cli",
        "-v",
    ])
    .expect("valid flags should parse");

    assert_eq!(config.listen_port, 1025);
    assert_eq!(config.listen_interface, "127.0.0.1");
    assert_eq!(config.greeting_hostname, "from-cli");
    assert!(config.log_body);
    assert_eq!(config.stats_interval_secs, 5);

    clear_test_env_vars();
}

#[test]
fn test_cli_without_flags_keeps_env() {
    let _lock = lock_env();

    env::set_var("MAIL_SINK_PORT", "2525");
    env::set_var("MAIL_SINK_LOG_BODY", "yes");

    let config = Config::from_args(["mail_sink"]).unwrap();
    assert_eq!(config.listen_port, 2525);
    assert!(config.log_body);

    clear_test_env_vars();
}

#[test]
fn test_cli_rejects_bad_port() {
    let _lock = lock_env();
    assert!(Config::from_args(["mail_sink", "--port", "abc"]).is_err());
}

#[test]
fn test_cli_flags_skip_invalid_env_values() {
    let _lock = lock_env();

    env::set_var("MAIL_SINK_STATS_INTERVAL", "0");
    env::set_var("MAIL_SINK_PORT", "abc");
    env::set_var("MAIL_SINK_LOG_BODY", "sometimes");

    let config = Config::from_args([
        "mail_sink",
        "--stats-interval",
        "5",
        "-p",
        "2525",
        "-v",
    ])
    .expect("flags should take precedence over malformed env values");

    assert_eq!(config.stats_interval_secs, 5);
    assert_eq!(config.listen_port, 2525);
    assert!(config.log_body);

    clear_test_env_vars();
}
