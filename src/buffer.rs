//! Reference counted byte buffers for asynchronous transfers
//!
//! A [`SharedBuffer`] may be handed to a command list as the source of a
//! write or the destination of a read. Each handle is one reference: cloning
//! (or [`SharedBuffer::add_ref`]) takes a reference and dropping (or
//! [`SharedBuffer::release`]) gives it back, so the memory cannot go away
//! while a transfer still points at it.
//!
//! A buffer can additionally be locked by one outstanding operation at a
//! time. Locking is how a read keeps application code from issuing a second
//! transfer into the same memory before the first has completed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

struct Inner {
    data: Mutex<Vec<u8>>,
    locked: AtomicBool,
}

/// Counted handle to a block of bytes
#[derive(Clone)]
pub struct SharedBuffer {
    inner: Arc<Inner>,
}

impl SharedBuffer {
    /// Allocate a zero-filled buffer
    pub fn new(size: usize) -> Self {
        Self::from(vec![0u8; size])
    }

    /// Buffer size in bytes
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// True for a zero-length buffer
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take another reference
    pub fn add_ref(&self) -> SharedBuffer {
        self.clone()
    }

    /// Give this reference back
    pub fn release(self) {}

    /// Number of live references, including this one
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// True if both handles refer to the same memory
    pub fn ptr_eq(&self, other: &SharedBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Lock the buffer for one asynchronous operation.
    ///
    /// Returns `None` if another operation already holds the lock; that is
    /// a normal condition and the caller may retry once it has completed.
    pub fn try_lock(&self) -> Option<BufferLock> {
        self.inner
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()?;
        Some(BufferLock {
            buffer: self.add_ref(),
        })
    }

    /// True while an operation holds the lock
    pub fn is_locked(&self) -> bool {
        self.inner.locked.load(Ordering::Acquire)
    }

    /// Run `f` over the contents
    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.data()[..])
    }

    /// Run `f` over the contents, mutably
    pub fn write<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.data()[..])
    }

    /// Copy the contents out
    pub fn to_vec(&self) -> Vec<u8> {
        self.data().clone()
    }

    fn data(&self) -> MutexGuard<'_, Vec<u8>> {
        self.inner
            .data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl From<Vec<u8>> for SharedBuffer {
    fn from(data: Vec<u8>) -> Self {
        SharedBuffer {
            inner: Arc::new(Inner {
                data: Mutex::new(data),
                locked: AtomicBool::new(false),
            }),
        }
    }
}

impl core::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("len", &self.len())
            .field("refs", &self.ref_count())
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// Exclusive claim on a [`SharedBuffer`] for one outstanding operation.
///
/// Holds its own reference to the buffer. Dropping the lock (or calling
/// [`BufferLock::unlock`]) clears the lock and releases that reference.
pub struct BufferLock {
    buffer: SharedBuffer,
}

impl BufferLock {
    /// The locked buffer
    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    /// Unlock and release
    pub fn unlock(self) {}
}

impl Drop for BufferLock {
    fn drop(&mut self) {
        self.buffer.inner.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_are_counted() {
        let buffer = SharedBuffer::new(16);
        assert_eq!(buffer.ref_count(), 1);
        let extra = buffer.add_ref();
        assert_eq!(buffer.ref_count(), 2);
        extra.release();
        assert_eq!(buffer.ref_count(), 1);
    }

    #[test]
    fn second_lock_fails_until_first_released() {
        let buffer = SharedBuffer::new(8);
        let in_flight = buffer.add_ref();

        let first = buffer.try_lock().expect("first lock");
        assert!(buffer.is_locked());
        assert!(buffer.try_lock().is_none());
        assert!(in_flight.try_lock().is_none());

        first.unlock();
        in_flight.release();
        assert!(!buffer.is_locked());
        assert_eq!(buffer.ref_count(), 1);

        let again = buffer.try_lock();
        assert!(again.is_some());
    }

    #[test]
    fn lock_holds_a_reference() {
        let buffer = SharedBuffer::new(4);
        let lock = buffer.try_lock().expect("lock");
        assert_eq!(buffer.ref_count(), 2);
        assert!(lock.buffer().ptr_eq(&buffer));
        drop(lock);
        assert_eq!(buffer.ref_count(), 1);
    }

    #[test]
    fn contents_are_shared_between_handles() {
        let buffer = SharedBuffer::from(vec![1, 2, 3]);
        let other = buffer.add_ref();
        other.write(|data| data[1] = 9);
        assert_eq!(buffer.to_vec(), vec![1, 9, 3]);
        assert_eq!(buffer.read(|data| data.len()), 3);
    }
}
