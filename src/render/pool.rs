//! Generational object pool for renderable sprites
//!
//! Objects are constructed once by a factory and recycled through a free list.
//! Handles carry a generation stamp: releasing a handle bumps the slot's
//! generation, so any copy of the old handle becomes stale and can never reach
//! the object after it has been rebound to another entity.

use bitvec::prelude::*;

/// Objects that can be returned to a pool
pub trait Poolable {
    /// Restore the default (hidden, neutral) state before the object is reused.
    /// Must clear every entity-specific field.
    fn reset(&mut self);
}

/// Handle to a pooled object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    index: u32,
    generation: u32,
}

impl PoolHandle {
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// Errors from pool release
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("handle {0:?} was already released")]
    DoubleRelease(PoolHandle),
    #[error("handle {0:?} is stale (slot generation is {1})")]
    StaleHandle(PoolHandle, u32),
    #[error("handle {0:?} does not belong to this pool")]
    UnknownHandle(PoolHandle),
}

/// Reusable-object allocator
pub struct ObjectPool<T> {
    /// Every object ever constructed, indexed by handle index
    slots: Vec<T>,
    /// Current generation per slot
    generations: Vec<u32>,
    /// In-use flag per slot
    in_use: BitVec,
    /// Free slot indices (LIFO keeps recently touched objects hot)
    free: Vec<u32>,
    factory: Box<dyn FnMut() -> T>,
}

impl<T: Poolable> ObjectPool<T> {
    pub fn new(factory: impl FnMut() -> T + 'static) -> Self {
        Self {
            slots: Vec::new(),
            generations: Vec::new(),
            in_use: BitVec::new(),
            free: Vec::new(),
            factory: Box::new(factory),
        }
    }

    /// Construct `count` objects up-front into the free list.
    /// Returns handles of the new (free) slots so the owner can attach them.
    pub fn prewarm(&mut self, count: usize) -> Vec<PoolHandle> {
        self.slots.reserve(count);
        self.generations.reserve(count);
        self.free.reserve(count);

        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let index = self.construct();
            self.free.push(index);
            created.push(PoolHandle {
                index,
                generation: self.generations[index as usize],
            });
        }
        // Hand out the lowest indices first
        self.free.reverse();
        created
    }

    /// Get a ready-to-use object, recycled when possible
    #[inline]
    pub fn acquire(&mut self) -> PoolHandle {
        self.acquire_tracked().0
    }

    /// Like `acquire`, also reporting whether the object was freshly constructed
    pub fn acquire_tracked(&mut self) -> (PoolHandle, bool) {
        let (index, fresh) = match self.free.pop() {
            Some(index) => (index, false),
            None => (self.construct(), true),
        };
        self.in_use.set(index as usize, true);
        let handle = PoolHandle {
            index,
            generation: self.generations[index as usize],
        };
        (handle, fresh)
    }

    /// Reset the object and return it to the free list.
    ///
    /// Rejects double release and stale handles without touching pool state.
    pub fn release(&mut self, handle: PoolHandle) -> Result<(), PoolError> {
        let idx = handle.index as usize;
        let Some(&generation) = self.generations.get(idx) else {
            return Err(PoolError::UnknownHandle(handle));
        };
        if generation != handle.generation {
            // A handle one generation behind a free slot is the classic double free
            if !self.in_use[idx] && generation == handle.generation.wrapping_add(1) {
                return Err(PoolError::DoubleRelease(handle));
            }
            return Err(PoolError::StaleHandle(handle, generation));
        }
        if !self.in_use[idx] {
            return Err(PoolError::DoubleRelease(handle));
        }

        self.slots[idx].reset();
        self.in_use.set(idx, false);
        self.generations[idx] = generation.wrapping_add(1);
        self.free.push(handle.index);
        Ok(())
    }

    /// Borrow a live object
    #[inline]
    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        if self.is_live(handle) {
            self.slots.get(handle.index as usize)
        } else {
            None
        }
    }

    /// Mutably borrow a live object
    #[inline]
    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        if self.is_live(handle) {
            self.slots.get_mut(handle.index as usize)
        } else {
            None
        }
    }

    /// True if the handle refers to an in-use object of the current generation
    #[inline]
    pub fn is_live(&self, handle: PoolHandle) -> bool {
        let idx = handle.index as usize;
        idx < self.generations.len()
            && self.generations[idx] == handle.generation
            && self.in_use[idx]
    }

    /// Iterate all in-use objects with their handles
    pub fn iter_live(&self) -> impl Iterator<Item = (PoolHandle, &T)> + '_ {
        self.in_use.iter_ones().map(move |idx| {
            (
                PoolHandle {
                    index: idx as u32,
                    generation: self.generations[idx],
                },
                &self.slots[idx],
            )
        })
    }

    /// Total objects ever constructed
    #[inline]
    pub fn constructed(&self) -> usize {
        self.slots.len()
    }

    /// Objects currently bound to an entity
    #[inline]
    pub fn in_use(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Objects waiting in the free list
    #[inline]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    fn construct(&mut self) -> u32 {
        let index = self.slots.len() as u32;
        let mut object = (self.factory)();
        object.reset();
        self.slots.push(object);
        self.generations.push(0);
        self.in_use.push(false);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Probe {
        owner: Option<u32>,
        visible: bool,
    }

    impl Poolable for Probe {
        fn reset(&mut self) {
            self.owner = None;
            self.visible = false;
        }
    }

    fn counting_pool() -> ObjectPool<Probe> {
        ObjectPool::new(Probe::default)
    }

    #[test]
    fn test_acquire_constructs_when_empty() {
        let mut pool = counting_pool();
        let (_, fresh) = pool.acquire_tracked();
        assert!(fresh);
        assert_eq!(pool.constructed(), 1);
        assert_eq!(pool.in_use(), 1);
    }

    #[test]
    fn test_round_trip_recycles() {
        let mut pool = counting_pool();
        let n = 50;

        let handles: Vec<_> = (0..n).map(|_| pool.acquire()).collect();
        assert_eq!(pool.constructed(), n);

        // Release in a scrambled order
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|i| (i * 7) % n);
        for i in order {
            pool.release(handles[i]).unwrap();
        }
        assert_eq!(pool.in_use(), 0);

        for _ in 0..n {
            let (_, fresh) = pool.acquire_tracked();
            assert!(!fresh, "recycled acquire must not construct");
        }
        assert_eq!(pool.constructed(), n);
    }

    #[test]
    fn test_release_resets_object() {
        let mut pool = counting_pool();
        let h = pool.acquire();
        {
            let probe = pool.get_mut(h).unwrap();
            probe.owner = Some(42);
            probe.visible = true;
        }
        pool.release(h).unwrap();

        let h2 = pool.acquire();
        let probe = pool.get(h2).unwrap();
        assert_eq!(probe.owner, None);
        assert!(!probe.visible);
    }

    #[test]
    fn test_double_release_rejected() {
        let mut pool = counting_pool();
        let h = pool.acquire();
        pool.release(h).unwrap();

        assert_eq!(pool.release(h), Err(PoolError::DoubleRelease(h)));
        // Pool state unchanged by the bad release
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_stale_handle_cannot_touch_rebound_object() {
        let mut pool = counting_pool();
        let old = pool.acquire();
        pool.release(old).unwrap();

        let new = pool.acquire();
        assert_eq!(old.index(), new.index());
        assert_ne!(old.generation(), new.generation());

        assert!(pool.get(old).is_none());
        assert!(pool.get_mut(old).is_none());
        assert!(pool.release(old).is_err());
        assert!(pool.is_live(new));
    }

    #[test]
    fn test_stale_handle_two_generations_back() {
        let mut pool = counting_pool();
        let first = pool.acquire();
        pool.release(first).unwrap();
        let second = pool.acquire();
        pool.release(second).unwrap();
        let _third = pool.acquire();

        assert!(matches!(pool.release(first), Err(PoolError::StaleHandle(_, 2))));
    }

    #[test]
    fn test_unknown_handle() {
        let mut pool = counting_pool();
        let mut other = counting_pool();
        other.acquire();
        let foreign = other.acquire();

        assert_eq!(pool.release(foreign), Err(PoolError::UnknownHandle(foreign)));
    }

    #[test]
    fn test_prewarm_fills_free_list() {
        let mut pool = counting_pool();
        let created = pool.prewarm(16);
        assert_eq!(created.len(), 16);
        assert_eq!(pool.available(), 16);
        assert_eq!(pool.in_use(), 0);

        for _ in 0..16 {
            let (_, fresh) = pool.acquire_tracked();
            assert!(!fresh);
        }
        let (_, fresh) = pool.acquire_tracked();
        assert!(fresh);
        assert_eq!(pool.constructed(), 17);
    }

    #[test]
    fn test_iter_live() {
        let mut pool = counting_pool();
        let a = pool.acquire();
        let b = pool.acquire();
        let c = pool.acquire();
        pool.release(b).unwrap();

        let live: Vec<_> = pool.iter_live().map(|(h, _)| h).collect();
        assert_eq!(live, vec![a, c]);
    }
}
