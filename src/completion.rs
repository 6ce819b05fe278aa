//! Completion bridge between the transport and task context
//!
//! Transfers finish in a restricted context (an interrupt handler or a DMA
//! driver thread) where nothing may allocate or block. That side only posts
//! a fixed-size [`Signal`] through a [`Notifier`]. The owning task later
//! calls [`CompletionBridge::dispatch`] which performs the real work: pixel
//! format conversion, status reporting, user callbacks and buffer release.

use core::cell::RefCell;
use std::sync::{Arc, Mutex};

use critical_section::Mutex as CsMutex;
use heapless::spsc::Queue;

use crate::buffer::{BufferLock, SharedBuffer};
use crate::display_list::ListCore;
use crate::pixel::{self, PixelFormat};

/// Signals that can be waiting for dispatch at once
pub const SIGNAL_QUEUE_DEPTH: usize = 16;

/// Called when a read has completed, with the buffer and the number of bytes
/// it now holds
pub type ReadCallback = Box<dyn FnOnce(&ReadBuffer, usize) + Send>;

/// Called once a presented command list has finished executing
pub type PresentCallback = Box<dyn FnOnce() + Send>;

/// Destination of a pixel read
#[derive(Debug, Clone)]
pub struct ReadBuffer {
    /// Memory receiving the pixels
    pub buffer: SharedBuffer,
    /// First byte to fill
    pub offset: usize,
    /// Requested output format; [`PixelFormat::None`] reads RGB24
    pub format: PixelFormat,
}

impl ReadBuffer {
    /// Read into `buffer` from its start
    pub fn new(buffer: SharedBuffer, format: PixelFormat) -> Self {
        ReadBuffer {
            buffer,
            offset: 0,
            format,
        }
    }

    /// Bytes available from `offset` onwards
    pub fn size(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }
}

/// Outcome of a read, as reported by the completion path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadResult {
    /// Bytes requested from the controller (3 per pixel)
    pub bytes_requested: usize,
    /// Bytes left in the buffer after format conversion
    pub bytes_read: usize,
    /// Format of the data in the buffer
    pub format: PixelFormat,
    /// Set once the read has completed
    pub done: bool,
}

/// Shared slot a read reports its [`ReadResult`] into
#[derive(Debug, Clone, Default)]
pub struct ReadStatus {
    inner: Arc<Mutex<ReadResult>>,
}

impl ReadStatus {
    /// Fresh status, not done
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current result
    pub fn get(&self) -> ReadResult {
        *self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True once the read has completed
    pub fn is_done(&self) -> bool {
        self.get().done
    }

    pub(crate) fn set(&self, result: ReadResult) {
        *self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = result;
    }
}

/// Work left for task context once a read's data has arrived
pub struct ReadCompletion {
    lock: BufferLock,
    offset: usize,
    bytes_requested: usize,
    format: PixelFormat,
    status: Option<ReadStatus>,
    callback: Option<ReadCallback>,
}

impl ReadCompletion {
    pub(crate) fn new(
        lock: BufferLock,
        buffer: &ReadBuffer,
        bytes_requested: usize,
        status: Option<ReadStatus>,
        callback: Option<ReadCallback>,
    ) -> Self {
        ReadCompletion {
            lock,
            offset: buffer.offset,
            bytes_requested,
            format: buffer.format,
            status,
            callback,
        }
    }

    /// Convert, report, call back, then unlock and release the buffer
    pub(crate) fn run(self) {
        self.complete(true);
    }

    /// Report a read that never executed: zero bytes, buffer untouched
    pub(crate) fn abandon(self) {
        self.complete(false);
    }

    fn complete(self, executed: bool) {
        let ReadCompletion {
            lock,
            offset,
            bytes_requested,
            format,
            status,
            callback,
        } = self;

        let bytes_read = if !executed {
            0
        } else if format == PixelFormat::Rgb24 {
            bytes_requested
        } else {
            lock.buffer().write(|data| {
                let end = (offset + bytes_requested).min(data.len());
                pixel::convert_in_place(&mut data[offset..end], format)
            })
        };
        log::debug!(
            "Read complete: {} bytes requested, {} bytes as {:?}",
            bytes_requested,
            bytes_read,
            format
        );

        if let Some(status) = status {
            status.set(ReadResult {
                bytes_requested,
                bytes_read,
                format,
                done: true,
            });
        }

        if let Some(callback) = callback {
            let buffer = ReadBuffer {
                buffer: lock.buffer().add_ref(),
                offset,
                format,
            };
            callback(&buffer, bytes_read);
        }

        lock.unlock();
    }
}

/// What a [`Signal`] reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The transport reached the callback marker with this index
    Callback(u8),
    /// The whole list has executed
    Done,
}

/// Fixed-size message posted from the completion context
pub struct Signal {
    list: Arc<ListCore>,
    event: Event,
}

impl Signal {
    pub(crate) fn new(list: Arc<ListCore>, event: Event) -> Self {
        Signal { list, event }
    }

    /// What happened
    pub fn event(&self) -> Event {
        self.event
    }

    fn run(self) {
        match self.event {
            Event::Callback(index) => self.list.run_completion(index),
            Event::Done => self.list.finish(),
        }
    }
}

type SignalQueue = CsMutex<RefCell<Queue<Signal, SIGNAL_QUEUE_DEPTH>>>;

/// Posting side of the bridge, safe to use from interrupt context
#[derive(Clone)]
pub struct Notifier {
    queue: Arc<SignalQueue>,
}

impl Notifier {
    /// Queue `signal` for dispatch.
    ///
    /// Does not allocate or block. Hands the signal back if the queue is
    /// full.
    pub fn notify(&self, signal: Signal) -> Result<(), Signal> {
        critical_section::with(|cs| self.queue.borrow_ref_mut(cs).enqueue(signal))
    }
}

/// Task side of the bridge
pub struct CompletionBridge {
    queue: Arc<SignalQueue>,
}

impl CompletionBridge {
    /// Bridge with an empty queue
    pub fn new() -> Self {
        CompletionBridge {
            queue: Arc::new(CsMutex::new(RefCell::new(Queue::new()))),
        }
    }

    /// Handle for the completion context
    pub fn notifier(&self) -> Notifier {
        Notifier {
            queue: self.queue.clone(),
        }
    }

    /// Signals waiting for dispatch
    pub fn pending(&self) -> usize {
        critical_section::with(|cs| self.queue.borrow_ref(cs).len())
    }

    /// Run every queued signal in posting order, returning how many ran.
    ///
    /// Must be called from task context.
    pub fn dispatch(&self) -> usize {
        let mut count = 0;
        while let Some(signal) =
            critical_section::with(|cs| self.queue.borrow_ref_mut(cs).dequeue())
        {
            signal.run();
            count += 1;
        }
        count
    }
}

impl Default for CompletionBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_converts_reports_and_releases() {
        let buffer = SharedBuffer::from(vec![0xF8, 0xFC, 0xF8, 0xF8, 0x00, 0x00]);
        let target = ReadBuffer::new(buffer.clone(), PixelFormat::Rgb565);
        let status = ReadStatus::new();
        let seen = Arc::new(Mutex::new(None));

        let lock = buffer.try_lock().expect("lock");
        let seen_in_callback = seen.clone();
        let completion = ReadCompletion::new(
            lock,
            &target,
            6,
            Some(status.clone()),
            Some(Box::new(move |buf: &ReadBuffer, len: usize| {
                *seen_in_callback.lock().unwrap() = Some((buf.buffer.to_vec(), len));
            })),
        );
        assert!(buffer.is_locked());
        drop(target);

        completion.run();

        let result = status.get();
        assert!(result.done);
        assert_eq!(result.bytes_requested, 6);
        assert_eq!(result.bytes_read, 4);
        assert_eq!(result.format, PixelFormat::Rgb565);

        let (data, len) = seen.lock().unwrap().take().expect("callback ran");
        assert_eq!(len, 4);
        assert_eq!(&data[..4], &[0xFF, 0xFF, 0xF8, 0x00]);

        assert!(!buffer.is_locked());
        assert_eq!(buffer.ref_count(), 1);
    }

    #[test]
    fn rgb24_reads_are_not_converted() {
        let buffer = SharedBuffer::from(vec![1, 2, 3]);
        let target = ReadBuffer::new(buffer.clone(), PixelFormat::Rgb24);
        let status = ReadStatus::new();
        let lock = buffer.try_lock().expect("lock");
        ReadCompletion::new(lock, &target, 3, Some(status.clone()), None).run();

        assert_eq!(status.get().bytes_read, 3);
        assert_eq!(buffer.to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn abandoned_read_reports_nothing_read() {
        let buffer = SharedBuffer::from(vec![0xFF, 0xFF, 0xFF]);
        let target = ReadBuffer::new(buffer.clone(), PixelFormat::Rgb565);
        let status = ReadStatus::new();
        let lens = Arc::new(Mutex::new(Vec::new()));
        let seen = lens.clone();
        let lock = buffer.try_lock().expect("lock");
        ReadCompletion::new(
            lock,
            &target,
            3,
            Some(status.clone()),
            Some(Box::new(move |_: &ReadBuffer, len: usize| {
                seen.lock().unwrap().push(len);
            })),
        )
        .abandon();

        let result = status.get();
        assert!(result.done);
        assert_eq!(result.bytes_requested, 3);
        assert_eq!(result.bytes_read, 0);
        assert_eq!(*lens.lock().unwrap(), vec![0]);
        assert_eq!(buffer.to_vec(), vec![0xFF, 0xFF, 0xFF]);
        assert!(!buffer.is_locked());
    }

    #[test]
    fn empty_bridge_dispatches_nothing() {
        let bridge = CompletionBridge::new();
        assert_eq!(bridge.pending(), 0);
        assert_eq!(bridge.dispatch(), 0);
    }
}
