use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, PoisonError};

use crate::error::TransportError;

/// Identifies one shared region for the lifetime of the process.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// Fixed-capacity region shared between a producer and its translator.
pub struct SharedMemory {
    id: BufferId,
    bytes: RwLock<Box<[u8]>>,
}

impl fmt::Debug for SharedMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMemory")
            .field("id", &self.id)
            .field("len", &self.len())
            .finish()
    }
}

impl SharedMemory {
    /// Allocates a zeroed region. Allocation failure is reported, not fatal.
    pub fn create(size: usize) -> Result<Arc<Self>, TransportError> {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|_| TransportError::AllocationFailed { size })?;
        bytes.resize(size, 0);

        Ok(Arc::new(Self {
            id: BufferId(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
            bytes: RwLock::new(bytes.into_boxed_slice()),
        }))
    }

    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.bytes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies `data` to `offset`. Out-of-range writes are rejected whole.
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<(), TransportError> {
        let mut bytes = self.bytes.write().unwrap_or_else(PoisonError::into_inner);
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= bytes.len())
            .ok_or(TransportError::Malformed("write past end of shared memory"))?;
        bytes[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Fills `out` from `offset`. Out-of-range reads are rejected whole.
    pub fn read(&self, offset: usize, out: &mut [u8]) -> Result<(), TransportError> {
        let bytes = self.bytes.read().unwrap_or_else(PoisonError::into_inner);
        let end = offset
            .checked_add(out.len())
            .filter(|&end| end <= bytes.len())
            .ok_or(TransportError::Malformed("read past end of shared memory"))?;
        out.copy_from_slice(&bytes[offset..end]);
        Ok(())
    }

    /// Runs `f` over the whole region.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let bytes = self.bytes.read().unwrap_or_else(PoisonError::into_inner);
        f(&bytes)
    }

    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut bytes = self.bytes.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut bytes)
    }

    /// Capability the other side uses to map this region.
    pub fn handle(self: &Arc<Self>) -> TransportHandle {
        TransportHandle(self.clone())
    }
}

/// Opaque capability for a [`SharedMemory`] region, exchanged with the
/// translator at installation and on buffer growth.
#[derive(Clone)]
pub struct TransportHandle(Arc<SharedMemory>);

impl TransportHandle {
    #[inline]
    pub fn id(&self) -> BufferId {
        self.0.id
    }

    pub fn size(&self) -> usize {
        self.0.len()
    }

    /// Maps the region on the receiving side.
    pub fn map(&self) -> Arc<SharedMemory> {
        self.0.clone()
    }
}

impl PartialEq for TransportHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for TransportHandle {}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransportHandle({:?}, {} bytes)", self.0.id, self.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_start_zeroed_with_unique_ids() {
        let a = SharedMemory::create(32).unwrap();
        let b = SharedMemory::create(32).unwrap();
        assert_ne!(a.id(), b.id());
        assert!(a.with_bytes(|bytes| bytes.iter().all(|&v| v == 0)));
    }

    #[test]
    fn out_of_range_access_is_rejected() {
        let m = SharedMemory::create(8).unwrap();
        assert!(m.write(4, &[1, 2, 3, 4]).is_ok());
        assert!(m.write(5, &[1, 2, 3, 4]).is_err());
        let mut out = [0u8; 4];
        assert!(m.read(usize::MAX, &mut out).is_err());
        m.read(4, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn handle_maps_the_same_region() {
        let m = SharedMemory::create(4).unwrap();
        let h = m.handle();
        h.map().write(0, &[9]).unwrap();
        let mut out = [0u8; 1];
        m.read(0, &mut out).unwrap();
        assert_eq!(out, [9]);
        assert_eq!(h, m.handle());
    }
}
