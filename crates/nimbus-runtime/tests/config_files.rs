//! Loading `SyncConfig` from disk.

use std::fs;

use nimbus_core::{DependencyId, Duration, Scheduler};
use nimbus_runtime::{ConfigError, RuntimeContext, StrategyPolicy, SyncConfig, UpdateStrategy};

#[test]
fn json_file_configures_context() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sync.json");
    fs::write(
        &path,
        r#"{
            "base_proxy_path": "/gateway",
            "poll_interval_ms": 4000,
            "strategies": [
                {"dependency": "compute/vms", "policy": "interval"},
                {"dependency": "billing", "policy": "stale_after", "interval_ms": 60000}
            ]
        }"#,
    )
    .unwrap();

    let config = SyncConfig::from_path(&path).unwrap();
    assert_eq!(config.strategies[1].policy, StrategyPolicy::StaleAfter);
    let ctx = RuntimeContext::from_config(config, &Scheduler::new());
    let vms = ctx
        .registry()
        .get_strategy(&DependencyId::from_url("/gateway/compute/vms"));
    assert_eq!(vms.interval(), Duration::from_secs(4));
    let billing = ctx
        .registry()
        .get_strategy(&DependencyId::from_url("/gateway/billing"));
    assert_eq!(billing.name(), "stale_after");
    assert_eq!(billing.interval(), Duration::from_secs(60));
}

#[test]
fn missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let err = SyncConfig::from_path(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("absent.json"));
}

#[cfg(feature = "policy-config")]
#[test]
fn toml_file_matches_json_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sync.toml");
    fs::write(
        &path,
        r#"
fetch_timeout_ms = 5000

[[strategies]]
dependency = "/proxy/tags"
policy = "never"
"#,
    )
    .unwrap();
    let config = SyncConfig::from_path(&path).unwrap();
    assert_eq!(config.fetch_timeout(), Duration::from_secs(5));
    assert_eq!(config.poll_interval(), Duration::from_secs(15));
    assert_eq!(config.strategies[0].policy, StrategyPolicy::Never);
}

#[cfg(not(feature = "policy-config"))]
#[test]
fn toml_needs_policy_config() {
    let err = SyncConfig::from_path("sync.toml").unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
}
