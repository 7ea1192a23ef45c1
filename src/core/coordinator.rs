//! Drives per-asset-type compiling managers in dependency order.
//!
//! Each [`AssetCompilingManager`] owns the async build work for one asset type
//! and names the asset types whose results it consumes. The coordinator keeps
//! the registered managers in a topological order over those names and runs
//! them once per frame, producers before consumers.
//!
//! A registration that would close a dependency cycle keeps the manager but
//! permanently drops that manager's own dependency edges, with a single
//! warning.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_work_scheduler::core::AssetCompilingCoordinator;
//!
//! let coordinator = AssetCompilingCoordinator::new();
//! coordinator.register_manager(Arc::new(TextureCompiler::new(pool.clone())));
//! coordinator.register_manager(Arc::new(MaterialCompiler::new(pool.clone())));
//!
//! // Once per frame.
//! coordinator.process_async_tasks(true);
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::core::object_cache::{ObjectGraphSource, ObjectReverseLookupCache};
use crate::core::topological_sort::{topological_sort, TopologicalSortFlags};

/// What a manager receives for one processing call.
#[derive(Debug)]
pub struct ProcessContext<'a> {
    /// The caller wants the manager to bound the time it spends.
    pub limit_execution_time: bool,
    /// Reverse lookup shared by every manager for this call only.
    pub object_cache: &'a ObjectReverseLookupCache,
}

/// A per-asset-type compiler driven by the coordinator.
pub trait AssetCompilingManager: Send + Sync {
    /// Name of the asset type this manager compiles.
    fn asset_type_name(&self) -> &str;

    /// Asset types whose managers must be processed before this one.
    fn dependent_type_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Assets still waiting for or undergoing compilation.
    fn num_remaining_assets(&self) -> usize;

    /// Pump finished async work for one frame.
    fn process_async_tasks(&self, cx: &ProcessContext<'_>);

    /// Block until every pending compilation is done.
    fn finish_all_compilation(&self);

    /// Cancel or finish outstanding work and release resources.
    fn shutdown(&self);
}

/// Shared handle to a registered manager.
pub type ManagerHandle = Arc<dyn AssetCompilingManager>;

fn manager_id(manager: &ManagerHandle) -> usize {
    Arc::as_ptr(manager).cast::<()>() as usize
}

#[derive(Default)]
struct CoordinatorState {
    /// Registration order.
    managers: Vec<ManagerHandle>,
    /// Processing order.
    ordered: Vec<ManagerHandle>,
    /// Managers whose dependency edges were dropped to break a cycle.
    edges_dropped: HashSet<usize>,
}

impl CoordinatorState {
    /// Sort `managers` by their declared dependencies. Returns `None` on a cycle.
    fn sorted(&self, flags: TopologicalSortFlags) -> Option<Vec<ManagerHandle>> {
        let mut by_name: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, m) in self.managers.iter().enumerate() {
            by_name.entry(m.asset_type_name()).or_default().push(i);
        }

        let mut nodes: Vec<usize> = (0..self.managers.len()).collect();
        let deps = |&i: &usize| -> Vec<usize> {
            let manager = &self.managers[i];
            if self.edges_dropped.contains(&manager_id(manager)) {
                return Vec::new();
            }
            manager
                .dependent_type_names()
                .iter()
                .filter_map(|name| by_name.get(name.as_str()))
                .flatten()
                .copied()
                .collect()
        };
        if !topological_sort(&mut nodes, deps, flags) {
            return None;
        }
        Some(nodes.into_iter().map(|i| Arc::clone(&self.managers[i])).collect())
    }
}

/// Owns the registered compiling managers and drives them every frame.
pub struct AssetCompilingCoordinator {
    state: RwLock<CoordinatorState>,
    object_graph: RwLock<Option<Arc<dyn ObjectGraphSource>>>,
    cycle_diagnostics: AtomicU64,
    last_reported_remaining: Mutex<Option<usize>>,
}

impl Default for AssetCompilingCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetCompilingCoordinator {
    /// A coordinator with no managers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CoordinatorState::default()),
            object_graph: RwLock::new(None),
            cycle_diagnostics: AtomicU64::new(0),
            last_reported_remaining: Mutex::new(None),
        }
    }

    /// Object graph the per-call reverse lookup cache is built from.
    pub fn set_object_graph(&self, source: Option<Arc<dyn ObjectGraphSource>>) {
        *self.object_graph.write() = source;
    }

    /// Register `manager` and recompute the processing order.
    ///
    /// Dependency names that match no registered manager are ignored. If the
    /// new manager closes a cycle, its own dependency edges are dropped for
    /// good and a diagnostic is logged; the manager stays registered.
    pub fn register_manager(&self, manager: ManagerHandle) {
        let mut st = self.state.write();
        let id = manager_id(&manager);
        if st.managers.iter().any(|m| manager_id(m) == id) {
            warn!(asset_type = manager.asset_type_name(), "manager already registered");
            return;
        }
        st.managers.push(Arc::clone(&manager));

        let sorted = st.sorted(TopologicalSortFlags::NONE);
        let ordered = if let Some(ordered) = sorted {
            ordered
        } else {
            warn!(
                asset_type = manager.asset_type_name(),
                dependencies = ?manager.dependent_type_names(),
                "cyclic dependency between asset compiling managers, ignoring the dependencies of the new manager"
            );
            self.cycle_diagnostics.fetch_add(1, Ordering::Relaxed);
            st.edges_dropped.insert(id);
            // The previous set was acyclic and the new manager now has no
            // outgoing edges, so no cycle is left.
            st.sorted(TopologicalSortFlags::ALLOW_CYCLES)
                .unwrap_or_else(|| st.managers.clone())
        };
        st.ordered = ordered;

        info!(
            asset_type = manager.asset_type_name(),
            managers = st.managers.len(),
            order = ?st.ordered.iter().map(|m| m.asset_type_name()).collect::<Vec<_>>(),
            "registered asset compiling manager"
        );
    }

    /// Remove `manager`. Returns `false` if it was not registered.
    ///
    /// The processing order of the remaining managers is kept as is.
    pub fn unregister_manager(&self, manager: &ManagerHandle) -> bool {
        let id = manager_id(manager);
        let mut st = self.state.write();
        let before = st.managers.len();
        st.managers.retain(|m| manager_id(m) != id);
        st.ordered.retain(|m| manager_id(m) != id);
        st.edges_dropped.remove(&id);
        let removed = st.managers.len() != before;
        if removed {
            info!(asset_type = manager.asset_type_name(), "unregistered asset compiling manager");
        }
        removed
    }

    /// Sum of every manager's remaining assets.
    pub fn num_remaining_assets(&self) -> usize {
        self.managers()
            .iter()
            .map(|m| m.num_remaining_assets())
            .sum()
    }

    /// Run every manager once, in processing order.
    ///
    /// One [`ObjectReverseLookupCache`] is shared by all managers for the
    /// duration of this call.
    pub fn process_async_tasks(&self, limit_execution_time: bool) {
        let ordered = self.state.read().ordered.clone();
        let cache = self
            .object_graph
            .read()
            .clone()
            .map_or_else(ObjectReverseLookupCache::empty, ObjectReverseLookupCache::new);
        {
            let cx = ProcessContext {
                limit_execution_time,
                object_cache: &cache,
            };
            for manager in &ordered {
                manager.process_async_tasks(&cx);
            }
        }
        drop(cache);
        self.report_remaining();
    }

    /// Finish all compilation, in registration order.
    pub fn finish_all_compilation(&self) {
        for manager in self.managers() {
            manager.finish_all_compilation();
        }
        self.report_remaining();
    }

    /// Shut every manager down, in registration order.
    pub fn shutdown(&self) {
        let managers = self.managers();
        info!(managers = managers.len(), "shutting down asset compiling managers");
        for manager in managers {
            manager.shutdown();
        }
    }

    /// Registered managers in registration order.
    pub fn managers(&self) -> Vec<ManagerHandle> {
        self.state.read().managers.clone()
    }

    /// Asset type names in processing order.
    pub fn processing_order(&self) -> Vec<String> {
        self.state
            .read()
            .ordered
            .iter()
            .map(|m| m.asset_type_name().to_owned())
            .collect()
    }

    /// Number of cycle diagnostics emitted so far.
    pub fn cycle_diagnostics(&self) -> u64 {
        self.cycle_diagnostics.load(Ordering::Relaxed)
    }

    /// Remaining-asset total as of the last report, if any.
    pub fn last_reported_remaining(&self) -> Option<usize> {
        *self.last_reported_remaining.lock()
    }

    fn report_remaining(&self) {
        let remaining = self.num_remaining_assets();
        let mut last = self.last_reported_remaining.lock();
        if *last == Some(remaining) {
            return;
        }
        if remaining == 0 {
            info!("all assets compiled");
        } else {
            info!(remaining, "assets left to compile");
        }
        debug!(previous = ?*last, remaining, "remaining asset count changed");
        *last = Some(remaining);
    }
}

impl fmt::Debug for AssetCompilingCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetCompilingCoordinator")
            .field("processing_order", &self.processing_order())
            .field("cycle_diagnostics", &self.cycle_diagnostics())
            .finish_non_exhaustive()
    }
}
