use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use fluxion_error::{DbError, ErrorKind, Result};

/// Tracks memory held by column buffers for a single query.
///
/// Shared by every builder and table in a run. A limit of zero means
/// unlimited.
#[derive(Default)]
pub struct Allocator {
    allocated: AtomicUsize,
    max_allocated: AtomicUsize,
    limit: AtomicUsize,
}

impl Allocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        let alloc = Self::default();
        alloc.set_limit(limit);
        alloc
    }

    pub fn set_limit(&self, limit: usize) {
        self.limit.store(limit, Ordering::Relaxed);
    }

    pub fn limit(&self) -> Option<usize> {
        match self.limit.load(Ordering::Relaxed) {
            0 => None,
            n => Some(n),
        }
    }

    /// Bytes currently allocated.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// High water mark of allocated bytes.
    pub fn max_allocated(&self) -> usize {
        self.max_allocated.load(Ordering::Relaxed)
    }

    /// Account for `bytes` more memory.
    ///
    /// Fails with `ResourceExhausted` if the limit would be exceeded, in
    /// which case nothing is accounted.
    pub fn allocate(&self, bytes: usize) -> Result<()> {
        if bytes == 0 {
            return Ok(());
        }
        let limit = self.limit.load(Ordering::Relaxed);
        let mut current = self.allocated.load(Ordering::Relaxed);
        loop {
            let new = current.saturating_add(bytes);
            if limit != 0 && new > limit {
                return Err(DbError::new("Allocation exceeds memory limit")
                    .with_kind(ErrorKind::ResourceExhausted)
                    .with_field("requested", bytes)
                    .with_field("allocated", current)
                    .with_field("limit", limit));
            }
            match self.allocated.compare_exchange_weak(
                current,
                new,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.max_allocated.fetch_max(new, Ordering::Relaxed);
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn free(&self, bytes: usize) {
        let _ = self
            .allocated
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            });
    }
}

impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocator")
            .field("allocated", &self.allocated())
            .field("max_allocated", &self.max_allocated())
            .field("limit", &self.limit())
            .finish()
    }
}

/// Bytes held against an allocator, released on drop.
#[derive(Debug)]
pub struct Reservation {
    allocator: Arc<Allocator>,
    bytes: usize,
}

impl Reservation {
    pub fn new(allocator: &Arc<Allocator>) -> Self {
        Reservation {
            allocator: allocator.clone(),
            bytes: 0,
        }
    }

    pub fn allocator(&self) -> &Arc<Allocator> {
        &self.allocator
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn grow(&mut self, bytes: usize) -> Result<()> {
        self.allocator.allocate(bytes)?;
        self.bytes += bytes;
        Ok(())
    }

    pub fn shrink(&mut self, bytes: usize) {
        let bytes = bytes.min(self.bytes);
        self.allocator.free(bytes);
        self.bytes -= bytes;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.allocator.free(self.bytes);
    }
}
