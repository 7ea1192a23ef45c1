//! Tests for utility types

use prometheus_work_scheduler::util::{
    FixedMemoryStats, MemoryStatsProvider, QueuedWorkPriority, SystemMemoryStats,
};

#[test]
fn test_priority_ordering() {
    assert!(QueuedWorkPriority::Blocking < QueuedWorkPriority::Highest);
    assert!(QueuedWorkPriority::Highest < QueuedWorkPriority::High);
    assert!(QueuedWorkPriority::Normal < QueuedWorkPriority::Lowest);
    assert!(QueuedWorkPriority::Low.is_lower_than(QueuedWorkPriority::Normal));
    assert!(!QueuedWorkPriority::Normal.is_lower_than(QueuedWorkPriority::Normal));
    assert_eq!(QueuedWorkPriority::default(), QueuedWorkPriority::Normal);
}

#[test]
fn test_priority_index_roundtrip() {
    for (i, p) in QueuedWorkPriority::ALL.iter().enumerate() {
        assert_eq!(p.index(), i);
        assert_eq!(QueuedWorkPriority::from_index(i), Some(*p));
    }
    assert_eq!(QueuedWorkPriority::from_index(QueuedWorkPriority::COUNT), None);
    assert!(QueuedWorkPriority::Blocking.is_blocking());
    assert!(!QueuedWorkPriority::Highest.is_blocking());
}

#[test]
fn test_priority_display_and_serde() {
    assert_eq!(QueuedWorkPriority::Lowest.to_string(), "lowest");
    let json = serde_json::to_string(&QueuedWorkPriority::Blocking).unwrap();
    assert_eq!(json, "\"blocking\"");
    let back: QueuedWorkPriority = serde_json::from_str("\"high\"").unwrap();
    assert_eq!(back, QueuedWorkPriority::High);
}

#[test]
fn test_fixed_memory_stats() {
    let stats = FixedMemoryStats::new(100, 200);
    assert_eq!(stats.available_physical(), 100);
    assert_eq!(stats.available_virtual(), 200);
    stats.set_physical(10);
    stats.set_virtual(20);
    assert_eq!(stats.available_physical(), 10);
    assert_eq!(stats.available_virtual(), 20);
    assert_eq!(FixedMemoryStats::unbounded().available_physical(), u64::MAX);
}

#[test]
fn test_system_memory_stats_virtual_covers_physical() {
    let stats = SystemMemoryStats::with_refresh_interval(std::time::Duration::ZERO);
    stats.refresh();
    let physical = stats.available_physical();
    assert!(physical > 0);
    assert!(stats.available_virtual() >= physical);
}
