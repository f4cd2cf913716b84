//! Per-session cache of object BVHs.
//!
//! Entries are keyed by handle and stamped with the object revision they were built from.
//! A lookup for an object whose revision moved on rebuilds instead of returning the stale
//! tree, so forgetting an `invalidate` costs time but never correctness.

use crate::bvh::Bvh;
use crate::triangle::Triangle;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use u_placement_core::{ObjectHandle, Result, Scene};

#[derive(Debug, Clone)]
struct CachedBvh {
    revision: u64,
    bvh: Arc<Bvh>,
}

/// BVH cache for one placement session.
#[derive(Debug, Clone, Default)]
pub struct BvhCache {
    entries: HashMap<ObjectHandle, CachedBvh>,
    builds: usize,
}

impl BvhCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the BVH for the object's current revision, building it if needed.
    pub fn get_or_build(&mut self, scene: &Scene, handle: ObjectHandle) -> Result<Arc<Bvh>> {
        let object = scene.object(handle)?;
        let revision = object.revision();
        if let Some(entry) = self.entries.get(&handle) {
            if entry.revision == revision {
                return Ok(Arc::clone(&entry.bvh));
            }
            log::debug!("BVH for {} is stale, rebuilding", handle);
        }

        let bvh = Arc::new(Bvh::build(object.world_triangles()));
        self.builds += 1;
        self.entries.insert(
            handle,
            CachedBvh {
                revision,
                bvh: Arc::clone(&bvh),
            },
        );
        Ok(bvh)
    }

    /// Builds every missing or stale BVH among `handles` in parallel. Returns the number of
    /// trees built.
    pub fn warm(&mut self, scene: &Scene, handles: &[ObjectHandle]) -> Result<usize> {
        let mut pending: Vec<(ObjectHandle, u64, Vec<Triangle>)> = Vec::new();
        for &handle in handles {
            if self.is_fresh(scene, handle) || pending.iter().any(|(h, ..)| *h == handle) {
                continue;
            }
            let object = scene.object(handle)?;
            pending.push((handle, object.revision(), object.world_triangles()));
        }

        let built: Vec<(ObjectHandle, u64, Bvh)> = pending
            .into_par_iter()
            .map(|(handle, revision, triangles)| (handle, revision, Bvh::build(triangles)))
            .collect();

        let count = built.len();
        for (handle, revision, bvh) in built {
            self.entries.insert(
                handle,
                CachedBvh {
                    revision,
                    bvh: Arc::new(bvh),
                },
            );
        }
        self.builds += count;
        log::debug!("warmed {} BVHs", count);
        Ok(count)
    }

    /// Drops the entry for `handle`.
    pub fn invalidate(&mut self, handle: ObjectHandle) {
        self.entries.remove(&handle);
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns true if a BVH for the object's current revision is cached.
    pub fn is_fresh(&self, scene: &Scene, handle: ObjectHandle) -> bool {
        match (self.entries.get(&handle), scene.object(handle)) {
            (Some(entry), Ok(object)) => entry.revision == object.revision(),
            _ => false,
        }
    }

    /// Returns true if any entry exists for `handle`, fresh or not.
    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of BVHs built by this cache.
    pub fn build_count(&self) -> usize {
        self.builds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use u_placement_core::TriangleMesh;

    #[test]
    fn test_cached_until_revision_changes() {
        let mut scene = Scene::new();
        let a = scene.add_object("a", TriangleMesh::unit_cube()).unwrap();
        let mut cache = BvhCache::new();

        let first = cache.get_or_build(&scene, a).unwrap();
        let second = cache.get_or_build(&scene, a).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.build_count(), 1);

        // Moved without invalidation: the revision check still catches it.
        scene.translate(a, Vector3::new(5.0, 0.0, 0.0)).unwrap();
        assert!(!cache.is_fresh(&scene, a));
        let moved = cache.get_or_build(&scene, a).unwrap();
        assert_eq!(cache.build_count(), 2);
        assert!(moved.bounds().unwrap().min.x > 4.0);
    }

    #[test]
    fn test_invalidate() {
        let mut scene = Scene::new();
        let a = scene.add_object("a", TriangleMesh::unit_cube()).unwrap();
        let mut cache = BvhCache::new();

        cache.get_or_build(&scene, a).unwrap();
        assert!(cache.contains(a));
        cache.invalidate(a);
        assert!(!cache.contains(a));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_missing_object() {
        let mut scene = Scene::new();
        let a = scene.add_object("a", TriangleMesh::unit_cube()).unwrap();
        scene.remove_object(a).unwrap();
        let mut cache = BvhCache::new();
        assert!(cache.get_or_build(&scene, a).is_err());
    }

    #[test]
    fn test_warm_builds_missing_only() {
        let mut scene = Scene::new();
        let handles: Vec<_> = (0..6)
            .map(|i| {
                scene
                    .add_object(format!("cube{}", i), TriangleMesh::unit_cube())
                    .unwrap()
            })
            .collect();
        let mut cache = BvhCache::new();
        cache.get_or_build(&scene, handles[0]).unwrap();

        let built = cache.warm(&scene, &handles).unwrap();
        assert_eq!(built, 5);
        assert_eq!(cache.len(), 6);
        assert_eq!(cache.build_count(), 6);
        assert!(handles.iter().all(|&h| cache.is_fresh(&scene, h)));

        assert_eq!(cache.warm(&scene, &handles).unwrap(), 0);
    }

    #[test]
    fn test_warm_builds_repeated_handle_once() {
        let mut scene = Scene::new();
        let a = scene.add_object("a", TriangleMesh::unit_cube()).unwrap();
        let mut cache = BvhCache::new();
        assert_eq!(cache.warm(&scene, &[a, a, a]).unwrap(), 1);
        assert_eq!(cache.build_count(), 1);
        assert!(cache.is_fresh(&scene, a));
    }
}
