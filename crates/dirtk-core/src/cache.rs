//! Caches of derived transformation state, validated by version counters.
//!
//! Entries are checked lazily on read: a stale entry (different domain,
//! interval or parameter version) is recomputed, never returned. Owners also
//! clear their caches when they mutate parameters so that no stale field
//! outlives the write.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, trace};

use crate::error::Result;
use crate::image::{DisplacementField, ImageDomain};

#[derive(Debug)]
struct DisplacementEntry {
    domain: ImageDomain,
    t0: f64,
    t1: f64,
    version: u64,
    field: Arc<DisplacementField>,
}

impl DisplacementEntry {
    fn matches(&self, domain: &ImageDomain, t0: f64, t1: f64, version: u64) -> bool {
        self.version == version && self.t0 == t0 && self.t1 == t1 && self.domain == *domain
    }
}

/// Dense displacement of one domain, tagged with the interval and parameter
/// version that produced it.
///
/// Cloning yields an empty cache: a cloned transformation recomputes its own.
#[derive(Debug, Default)]
pub struct DisplacementCache {
    entry: RwLock<Option<DisplacementEntry>>,
}

impl Clone for DisplacementCache {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl DisplacementCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached field for exactly this domain, interval and version.
    pub fn get(&self, domain: &ImageDomain, t0: f64, t1: f64, version: u64) -> Option<Arc<DisplacementField>> {
        let guard = self.entry.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|e| e.matches(domain, t0, t1, version))
            .map(|e| Arc::clone(&e.field))
    }

    /// Return the cached field or compute, store and return a new one.
    pub fn get_or_try_insert_with<F>(
        &self,
        domain: &ImageDomain,
        t0: f64,
        t1: f64,
        version: u64,
        compute: F,
    ) -> Result<Arc<DisplacementField>>
    where
        F: FnOnce() -> Result<DisplacementField>,
    {
        if let Some(field) = self.get(domain, t0, t1, version) {
            trace!(version, "displacement cache hit");
            return Ok(field);
        }
        debug!(version, t0, t1, voxels = domain.num_voxels(), "computing displacement field");
        let field = Arc::new(compute()?);
        let mut guard = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(DisplacementEntry {
            domain: domain.clone(),
            t0,
            t1,
            version,
            field: Arc::clone(&field),
        });
        Ok(field)
    }

    /// Drop the cached field.
    pub fn clear(&self) {
        let mut guard = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        if guard.take().is_some() {
            debug!("displacement cache invalidated");
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entry.read().unwrap_or_else(PoisonError::into_inner).is_none()
    }
}

/// A value derived from versioned state, recomputed when the version moves.
#[derive(Debug)]
pub struct VersionedCache<T> {
    slot: RwLock<Option<(u64, T)>>,
}

impl<T> Default for VersionedCache<T> {
    fn default() -> Self {
        Self { slot: RwLock::new(None) }
    }
}

impl<T> Clone for VersionedCache<T> {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl<T: Clone> VersionedCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `version`, computing it with `compute` if stale.
    pub fn get_or_try_insert_with<F>(&self, version: u64, compute: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        {
            let guard = self.slot.read().unwrap_or_else(PoisonError::into_inner);
            if let Some((cached, value)) = guard.as_ref() {
                if *cached == version {
                    return Ok(value.clone());
                }
            }
        }
        let value = compute()?;
        let mut guard = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some((version, value.clone()));
        Ok(value)
    }

    /// Version of the stored value, if any.
    pub fn cached_version(&self) -> Option<u64> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(v, _)| *v)
    }

    pub fn clear(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Point3, Vector3};
    use std::cell::Cell;

    fn domain() -> ImageDomain {
        ImageDomain::axis_aligned([2, 2, 2], Point3::origin(), Vector3::repeat(1.0)).unwrap()
    }

    #[test]
    fn test_displacement_cache_reuses_until_version_changes() {
        let cache = DisplacementCache::new();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok(DisplacementField::zeros(domain()))
        };
        let a = cache.get_or_try_insert_with(&domain(), 0.0, 1.0, 3, compute).unwrap();
        let b = cache.get_or_try_insert_with(&domain(), 0.0, 1.0, 3, compute).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.get(), 1);

        cache.get_or_try_insert_with(&domain(), 0.0, 1.0, 4, compute).unwrap();
        cache.get_or_try_insert_with(&domain(), 0.0, 0.5, 4, compute).unwrap();
        assert_eq!(calls.get(), 3);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.clone().is_empty());
    }

    #[test]
    fn test_failed_computation_is_not_cached() {
        let cache = DisplacementCache::new();
        let result = cache.get_or_try_insert_with(&domain(), 0.0, 1.0, 0, || {
            Err(crate::error::TransformError::configuration("boom"))
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_versioned_cache() {
        let cache = VersionedCache::<f64>::new();
        assert_eq!(cache.get_or_try_insert_with(1, || Ok(2.0)).unwrap(), 2.0);
        assert_eq!(cache.get_or_try_insert_with(1, || Ok(5.0)).unwrap(), 2.0);
        assert_eq!(cache.get_or_try_insert_with(2, || Ok(5.0)).unwrap(), 5.0);
        assert_eq!(cache.cached_version(), Some(2));
    }
}
