//! Integration tests for topological_sort
//!
//! Covers dependency-first ordering, cycle handling under both policies and
//! large fan-in graphs, plus a randomized DAG check.

use std::collections::HashMap;

use prometheus_work_scheduler::core::{topological_sort, TopologicalSortFlags};
use rand::seq::SliceRandom;
use rand::Rng;

fn position_map(nodes: &[u32]) -> HashMap<u32, usize> {
    nodes.iter().enumerate().map(|(i, &n)| (n, i)).collect()
}

// ============================================================================
// ACYCLIC
// ============================================================================

#[test]
fn test_predecessor_chain() {
    let mut nodes = vec![1u32, 2, 3];
    assert!(topological_sort(
        &mut nodes,
        |&n| if n > 1 { vec![n - 1] } else { vec![] },
        TopologicalSortFlags::NONE,
    ));
    assert_eq!(nodes, vec![1, 2, 3]);
}

#[test]
fn test_successor_chain() {
    let mut nodes = vec![1u32, 2, 3];
    assert!(topological_sort(
        &mut nodes,
        |&n| if n < 3 { vec![n + 1] } else { vec![] },
        TopologicalSortFlags::NONE,
    ));
    assert_eq!(nodes, vec![3, 2, 1]);
}

#[test]
fn test_large_fan_in() {
    let mut nodes: Vec<u32> = (0..1000).collect();
    assert!(topological_sort(
        &mut nodes,
        |&n| if n == 500 { vec![] } else { vec![500] },
        TopologicalSortFlags::NONE,
    ));
    assert_eq!(nodes[0], 500);
    assert_eq!(nodes.len(), 1000);
}

#[test]
fn test_random_dag_respects_every_edge() {
    let mut rng = rand::rng();
    for _ in 0..20 {
        let n: u32 = rng.random_range(1..80);
        // Edges only point from higher to lower ranks, so the graph is acyclic.
        let mut deps: HashMap<u32, Vec<u32>> = HashMap::new();
        for node in 1..n {
            let count = rng.random_range(0..4);
            let picks = (0..count).map(|_| rng.random_range(0..node)).collect();
            deps.insert(node, picks);
        }

        let mut nodes: Vec<u32> = (0..n).collect();
        nodes.shuffle(&mut rng);
        assert!(topological_sort(
            &mut nodes,
            |n| deps.get(n).cloned().unwrap_or_default(),
            TopologicalSortFlags::NONE,
        ));

        let pos = position_map(&nodes);
        assert_eq!(pos.len(), n as usize);
        for (node, ds) in &deps {
            for d in ds {
                assert!(pos[d] < pos[node], "{d} must precede {node}");
            }
        }
    }
}

// ============================================================================
// CYCLES
// ============================================================================

#[test]
fn test_cycle_fails_and_leaves_input_unmodified() {
    let mut nodes = vec![1u32, 2];
    let deps = |&n: &u32| if n == 1 { vec![2] } else { vec![1] };
    assert!(!topological_sort(&mut nodes, deps, TopologicalSortFlags::NONE));
    assert_eq!(nodes, vec![1, 2]);
}

#[test]
fn test_cycle_allowed_emits_every_node() {
    let mut nodes = vec![1u32, 2];
    let deps = |&n: &u32| if n == 1 { vec![2] } else { vec![1] };
    assert!(topological_sort(&mut nodes, deps, TopologicalSortFlags::ALLOW_CYCLES));
    let mut sorted = nodes.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![1, 2]);
}

#[test]
fn test_cycle_in_larger_graph_keeps_outside_edges() {
    // 0 <- 1 <-> 2 <- 3
    let mut nodes = vec![3u32, 2, 1, 0];
    let deps = |&n: &u32| match n {
        1 => vec![0, 2],
        2 => vec![1],
        3 => vec![2],
        _ => vec![],
    };
    assert!(!topological_sort(&mut nodes, deps, TopologicalSortFlags::NONE));
    assert_eq!(nodes, vec![3, 2, 1, 0]);

    assert!(topological_sort(&mut nodes, deps, TopologicalSortFlags::ALLOW_CYCLES));
    let pos = position_map(&nodes);
    assert_eq!(pos[&0], 0);
    assert!(pos[&2] < pos[&3]);
}
