//! Per-frame reverse lookup over an external object graph.
//!
//! Compiling managers often need "who references this object" to decide what
//! to reschedule. Scanning the whole graph per manager is expensive, so the
//! coordinator hands every manager the same [`ObjectReverseLookupCache`] for
//! the duration of one processing call. The cache is built from a snapshot on
//! first use and dropped when the call returns; it never outlives a frame.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::debug;

/// Opaque identifier of an object in the host's object graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

/// The host's object graph, seen as a list of reference edges.
pub trait ObjectGraphSource: Send + Sync {
    /// Call `visit(referencer, referenced)` once per reference edge.
    fn for_each_reference(&self, visit: &mut dyn FnMut(ObjectId, ObjectId));
}

/// Read-only map from an object to the objects that reference it.
pub struct ObjectReverseLookupCache {
    source: Option<Arc<dyn ObjectGraphSource>>,
    referencers: OnceLock<HashMap<ObjectId, Vec<ObjectId>>>,
}

impl ObjectReverseLookupCache {
    /// A cache over `source`, built on first query.
    pub fn new(source: Arc<dyn ObjectGraphSource>) -> Self {
        Self {
            source: Some(source),
            referencers: OnceLock::new(),
        }
    }

    /// A cache with no graph behind it; every lookup is empty.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            source: None,
            referencers: OnceLock::new(),
        }
    }

    fn map(&self) -> &HashMap<ObjectId, Vec<ObjectId>> {
        self.referencers.get_or_init(|| {
            let mut map: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
            if let Some(source) = &self.source {
                source.for_each_reference(&mut |from, to| {
                    map.entry(to).or_default().push(from);
                });
                debug!(objects = map.len(), "built object reverse lookup cache");
            }
            map
        })
    }

    /// Objects that reference `object`, in graph visiting order.
    pub fn referencers(&self, object: ObjectId) -> &[ObjectId] {
        self.map().get(&object).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether the snapshot has been taken yet.
    pub fn is_built(&self) -> bool {
        self.referencers.get().is_some()
    }
}

impl fmt::Debug for ObjectReverseLookupCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReverseLookupCache")
            .field("has_source", &self.source.is_some())
            .field("built", &self.is_built())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Edges {
        edges: Vec<(u64, u64)>,
        scans: AtomicUsize,
    }

    impl ObjectGraphSource for Edges {
        fn for_each_reference(&self, visit: &mut dyn FnMut(ObjectId, ObjectId)) {
            self.scans.fetch_add(1, Ordering::SeqCst);
            for &(from, to) in &self.edges {
                visit(ObjectId(from), ObjectId(to));
            }
        }
    }

    #[test]
    fn test_reverse_lookup_built_once() {
        let source = Arc::new(Edges {
            edges: vec![(1, 3), (2, 3), (3, 4)],
            scans: AtomicUsize::new(0),
        });
        let cache = ObjectReverseLookupCache::new(Arc::clone(&source) as Arc<dyn ObjectGraphSource>);
        assert!(!cache.is_built());

        assert_eq!(cache.referencers(ObjectId(3)), &[ObjectId(1), ObjectId(2)]);
        assert_eq!(cache.referencers(ObjectId(4)), &[ObjectId(3)]);
        assert!(cache.referencers(ObjectId(1)).is_empty());
        assert_eq!(source.scans.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_cache() {
        let cache = ObjectReverseLookupCache::empty();
        assert!(cache.referencers(ObjectId(7)).is_empty());
    }
}
