//! Dependency-first ordering of a node set (Kahn's algorithm).

use std::collections::HashMap;
use std::hash::Hash;

use tracing::debug;

/// Cycle policy for [`topological_sort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TopologicalSortFlags(u8);

impl TopologicalSortFlags {
    /// Fail on cycles and leave the input untouched.
    pub const NONE: Self = Self(0);
    /// Break cycles by force-emitting one stuck node; never fails.
    pub const ALLOW_CYCLES: Self = Self(1);

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Reorder `nodes` so that every node comes after the nodes it depends on.
///
/// `deps(node)` lists what `node` must come after. Dependencies that are not
/// in `nodes`, and a node listing itself, are ignored. Nodes that become ready
/// together keep their input order.
///
/// Returns `false` and leaves `nodes` unmodified if there is a cycle and
/// `flags` does not contain [`TopologicalSortFlags::ALLOW_CYCLES`]. With that
/// flag, whenever no node is ready, the stuck node with the most remaining
/// edges (in either direction) is emitted next, earliest in input order on
/// ties. The order among the members of a cycle is not otherwise defined.
pub fn topological_sort<T, I, F>(nodes: &mut Vec<T>, mut deps: F, flags: TopologicalSortFlags) -> bool
where
    T: Clone + Eq + Hash,
    I: IntoIterator<Item = T>,
    F: FnMut(&T) -> I,
{
    let n = nodes.len();
    let (mut in_degree, dependents) = {
        let index: HashMap<&T, usize> = nodes.iter().enumerate().map(|(i, t)| (t, i)).collect();
        debug_assert_eq!(index.len(), n, "topological_sort requires unique nodes");

        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, node) in nodes.iter().enumerate() {
            for dep in deps(node) {
                let Some(&j) = index.get(&dep) else {
                    continue;
                };
                if j == i || dependents[j].contains(&i) {
                    continue;
                }
                dependents[j].push(i);
                in_degree[i] += 1;
            }
        }
        (in_degree, dependents)
    };

    let mut emitted = vec![false; n];
    let mut order = Vec::with_capacity(n);
    let mut ready: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();

    while order.len() < n {
        if ready.is_empty() {
            if !flags.contains(TopologicalSortFlags::ALLOW_CYCLES) {
                debug!(
                    sorted = order.len(),
                    total = n,
                    "dependency cycle, leaving order unchanged"
                );
                return false;
            }
            let degree = |i: usize| {
                in_degree[i] + dependents[i].iter().filter(|&&d| !emitted[d]).count()
            };
            let Some(pick) = (0..n)
                .filter(|&i| !emitted[i])
                .max_by(|&a, &b| degree(a).cmp(&degree(b)).then(b.cmp(&a)))
            else {
                break;
            };
            debug!(node = pick, "breaking dependency cycle");
            in_degree[pick] = 0;
            ready.push(pick);
        }

        ready.sort_unstable();
        for i in std::mem::take(&mut ready) {
            emitted[i] = true;
            order.push(i);
            for &d in &dependents[i] {
                if emitted[d] {
                    continue;
                }
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    ready.push(d);
                }
            }
        }
    }

    let sorted: Vec<T> = order.into_iter().map(|i| nodes[i].clone()).collect();
    *nodes = sorted;
    true
}
