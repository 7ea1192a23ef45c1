//! Tests for configuration validation and loading

use std::collections::HashMap;
use std::time::Duration;

use prometheus_work_scheduler::config::scheduler::{
    ENV_HARD_MEMORY_CAP_BYTES, ENV_MAX_CONCURRENCY, ENV_MEMORY_PER_ITEM_DEFAULT_BYTES,
    ENV_WORKER_COUNT,
};
use prometheus_work_scheduler::config::{MemoryBudget, SchedulerConfig};

#[test]
fn test_defaults() {
    let cfg = SchedulerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.hard_memory_cap_bytes, 0);
    assert_eq!(cfg.memory_per_item_default_bytes, 64 * 1024 * 1024);
    assert_eq!(cfg.static_max_concurrency(), -1);
    assert!(cfg.resolved_worker_count() >= 1);
    assert_eq!(cfg.destroy_stall_warning(), Duration::from_secs(5));
    assert_eq!(cfg.memory_budget(), MemoryBudget::default());
}

#[test]
fn test_invalid_values_rejected() {
    assert!(SchedulerConfig::new().with_max_concurrency(-2).validate().is_err());
    assert!(SchedulerConfig::new().with_worker_count(0).validate().is_err());
    assert!(SchedulerConfig::new().with_thread_stack_size(0).validate().is_err());
    assert!(SchedulerConfig::new()
        .with_memory_per_item_default(-1)
        .validate()
        .is_err());

    assert!(SchedulerConfig::new().with_max_concurrency(-1).validate().is_ok());
    assert!(SchedulerConfig::new().with_max_concurrency(0).validate().is_ok());
}

#[test]
fn test_hard_cap_disabled_when_not_positive() {
    let mut budget = MemoryBudget::default();
    assert_eq!(budget.hard_cap(), None);
    budget.hard_memory_cap_bytes = -5;
    assert_eq!(budget.hard_cap(), None);
    budget.hard_memory_cap_bytes = 1024;
    assert_eq!(budget.hard_cap(), Some(1024));
}

#[test]
fn test_json_partial_uses_defaults() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{ "hard_memory_cap_bytes": 1073741824, "max_concurrency_override": 4 }"#,
    )
    .unwrap();
    assert_eq!(cfg.hard_memory_cap_bytes, 1 << 30);
    assert_eq!(cfg.static_max_concurrency(), 4);
    assert_eq!(cfg.memory_per_item_default_bytes, 64 * 1024 * 1024);
}

#[test]
fn test_json_invalid_rejected() {
    assert!(SchedulerConfig::from_json_str("{ not json").is_err());
    assert!(SchedulerConfig::from_json_str(r#"{ "worker_count": 0 }"#).is_err());
}

#[test]
fn test_lookup_overrides() {
    let vars: HashMap<&str, &str> = [
        (ENV_HARD_MEMORY_CAP_BYTES, "2048"),
        (ENV_MEMORY_PER_ITEM_DEFAULT_BYTES, " 512 "),
        (ENV_MAX_CONCURRENCY, "3"),
        (ENV_WORKER_COUNT, "6"),
    ]
    .into_iter()
    .collect();
    let cfg = SchedulerConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string())).unwrap();
    assert_eq!(cfg.hard_memory_cap_bytes, 2048);
    assert_eq!(cfg.memory_per_item_default_bytes, 512);
    assert_eq!(cfg.static_max_concurrency(), 3);
    assert_eq!(cfg.resolved_worker_count(), 6);
}

#[test]
fn test_lookup_bad_value_names_the_variable() {
    let err = SchedulerConfig::from_lookup(|k| (k == ENV_WORKER_COUNT).then(|| "many".to_string()))
        .unwrap_err();
    assert!(format!("{err:#}").contains(ENV_WORKER_COUNT));
}

#[test]
fn test_lookup_invalid_result_rejected() {
    assert!(SchedulerConfig::from_lookup(|k| (k == ENV_MAX_CONCURRENCY).then(|| "-7".to_string())).is_err());
}

#[test]
fn test_config_serde_roundtrip() {
    let cfg = SchedulerConfig::new().with_hard_memory_cap(4096).with_worker_count(2);
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(SchedulerConfig::from_json_str(&json).unwrap(), cfg);
}
