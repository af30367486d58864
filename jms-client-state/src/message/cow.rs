//! Copy-on-Write Regions for Shared Message Data
//!
//! A sent message and every delivered copy of it start out pointing at the
//! same header, property and body data.  Eagerly cloning that data on every
//! delivery wastes memory under high throughput.  This module wraps each
//! region in an [`Arc`] and defers the actual clone until the first write
//! through a holder that is not the only one.
//!
//! # Design:
//! - `Arc`-backed sharing: reads never copy
//! - Clone only on write via [`Arc::make_mut`], so the sharer count is the
//!   atomic strong count and three-way sharing degrades correctly
//! - Every region carries a [`RegionId`] that is refreshed on clone, so
//!   identity can be observed without holding a reference

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Hand out a process-wide unique identity.
pub(crate) fn next_identity() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Identity of one region allocation.
///
/// Two holders report the same `RegionId` exactly when they share the same
/// underlying value.  A copy-on-write always yields a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(u64);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region-{}", self.0)
    }
}

struct Slot<T> {
    id: RegionId,
    value: T,
}

// Cloning a slot is what `Arc::make_mut` does on a shared write, and the
// copy must not inherit the original's identity.
impl<T: Clone> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            id: RegionId(next_identity()),
            value: self.value.clone(),
        }
    }
}

/// A copy-on-write cell holding one message region.
///
/// Cloning a `CowRegion` shares the value and bumps the sharer count.  A
/// [`write`](Self::write) through a shared region copies the value into a
/// new allocation owned only by the writer.  The remaining holders keep the
/// original and are still shared among themselves when more than one is left.
///
/// ```rust
/// # use jms_client_state::message::cow::CowRegion;
/// let mut mine = CowRegion::new(vec![1, 2, 3]);
/// let theirs = mine.clone();          // shared, no copy
/// mine.write().push(4);               // copies, `theirs` is untouched
/// assert_eq!(theirs.read(), &vec![1, 2, 3]);
/// assert_ne!(mine.id(), theirs.id());
/// ```
pub struct CowRegion<T: Clone> {
    inner: Arc<Slot<T>>,
}

impl<T: Clone> CowRegion<T> {
    /// Wrap `value` in a new, exclusively owned region.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Slot {
                id: RegionId(next_identity()),
                value,
            }),
        }
    }

    /// Read the value. Never copies and never touches the sharer count.
    pub fn read(&self) -> &T {
        &self.inner.value
    }

    /// Get a mutable reference, copying the value first if it is shared.
    pub fn write(&mut self) -> &mut T {
        self.write_tracked().0
    }

    /// Like [`write`](Self::write), also reporting whether a copy was made.
    pub fn write_tracked(&mut self) -> (&mut T, bool) {
        let before = self.inner.id;
        let slot = Arc::make_mut(&mut self.inner);
        let copied = slot.id != before;
        if copied {
            debug!(from = %before, to = %slot.id, "Copied shared region on write");
        }
        (&mut slot.value, copied)
    }

    /// Identity of the allocation this region currently points at.
    pub fn id(&self) -> RegionId {
        self.inner.id
    }

    /// Number of holders sharing this allocation, including `self`.
    pub fn sharers(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Returns `true` when a [`write`](Self::write) would copy.
    pub fn is_shared(&self) -> bool {
        self.sharers() > 1
    }

    /// Returns `true` when both regions point at the same allocation.
    pub fn same_region(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone> Clone for CowRegion<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for CowRegion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CowRegion")
            .field("id", &self.inner.id)
            .field("sharers", &self.sharers())
            .field("value", &self.inner.value)
            .finish()
    }
}

impl<T: Clone + Default> Default for CowRegion<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
