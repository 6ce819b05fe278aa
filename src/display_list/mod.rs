//! Bounded command lists
//!
//! A [`DisplayList`] collects encoded controller operations in a fixed-size
//! byte buffer so they can be handed to the transport as one asynchronous
//! unit. While a list is executing it cannot be modified; every encoder
//! refuses and returns `false` instead.
//!
//! Encoders never write part of an operation: the full encoded size is
//! reserved first and the call fails without side effects if it does not
//! fit. Callers are expected to present the list and try again later.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use display_interface::DisplayError;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

use crate::buffer::SharedBuffer;
use crate::completion::{Event, Notifier, PresentCallback, ReadCompletion, Signal};
use crate::pixel::{PixelFormat, READ_PIXEL_SIZE};
use crate::transport::Bus;

mod code;
mod window;

use code::Encoder;
pub use code::{
    Entries, Entry, CALLBACK_LEN, COMMAND_LEN, FILL_LEN, READ_LEN, WRITE_BUFFER_LEN, WRITE_LEN,
};
pub use window::{AddressWindow, Mode};

/// Buffers one list can reference
pub const MAX_BUFFERS: usize = 8;

/// Read completions one list can carry
pub const MAX_COMPLETIONS: usize = 8;

/// Largest single read transaction, in bytes. A multiple of the 3-byte read
/// pixel so no pixel is split between transactions.
pub const MAX_READ_PACKET: usize = 63;

/// Default largest single write transaction, in bytes
pub const DEFAULT_MAX_TRANSFER: usize = 64;

/// Largest bus write when streaming a fill
const FILL_CHUNK: usize = 64;

/// Largest length an inline or buffer write entry can describe
const MAX_ENTRY_DATA: usize = u16::MAX as usize;

/// Encoded size of a window change: column, row and write start commands
pub const WINDOW_LEN: usize = 3 * COMMAND_LEN + 8;

/// Controller opcodes used by the encoders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Commands {
    /// Column address set
    pub set_column: u8,
    /// Page (row) address set
    pub set_row: u8,
    /// Memory read from the start of the window
    pub read_start: u8,
    /// Memory read continuing from the cursor
    pub read: u8,
    /// Memory write from the start of the window
    pub write_start: u8,
}

pub(crate) struct Body {
    data: Vec<u8>,
    buffers: heapless::Vec<SharedBuffer, MAX_BUFFERS>,
    completions: heapless::Vec<Option<ReadCompletion>, MAX_COMPLETIONS>,
    on_present: Option<PresentCallback>,
    /// Largest bus write a fill may issue
    fill_chunk: usize,
}

impl Body {
    fn clear(&mut self) {
        self.data.clear();
        self.buffers.clear();
        self.completions.clear();
        self.on_present = None;
    }

    fn buffer(&self, slot: u8) -> Result<&SharedBuffer, DisplayError> {
        self.buffers.get(slot as usize).ok_or_else(|| {
            log::error!("Command list references missing buffer slot {}", slot);
            DisplayError::OutOfBoundsError
        })
    }

    /// Walk the encoded entries, driving `bus`
    fn execute<B: Bus>(
        &self,
        bus: &mut B,
        mut on_callback: impl FnMut(u8),
    ) -> Result<(), DisplayError> {
        for entry in Entries::new(&self.data) {
            match entry {
                Entry::Command { cmd, params } => {
                    bus.command(cmd)?;
                    if !params.is_empty() {
                        bus.data(params)?;
                    }
                }
                Entry::Write(data) => bus.data(data)?,
                Entry::WriteBuffer { slot, offset, len } => {
                    self.buffer(slot)?.read(|data| match data.get(offset..offset + len) {
                        Some(src) => bus.data(src),
                        None => Err(DisplayError::OutOfBoundsError),
                    })?;
                }
                Entry::Read {
                    cmd,
                    slot,
                    offset,
                    len,
                } => {
                    self.buffer(slot)?
                        .write(|data| match data.get_mut(offset..offset + len) {
                            Some(dst) => bus.read(cmd, true, dst),
                            None => Err(DisplayError::OutOfBoundsError),
                        })?;
                }
                Entry::Fill { pattern, repeat } => {
                    send_repeated(bus, pattern, repeat, self.fill_chunk)?;
                }
                Entry::Callback(index) => on_callback(index),
            }
        }
        Ok(())
    }
}

/// Send `pattern` `repeat` times, batching whole patterns into bus writes
/// of at most `limit` bytes
fn send_repeated<B: Bus>(
    bus: &mut B,
    pattern: &[u8],
    repeat: u32,
    limit: usize,
) -> Result<(), DisplayError> {
    if pattern.is_empty() {
        return Ok(());
    }
    let limit = limit.clamp(1, FILL_CHUNK);
    if pattern.len() > limit {
        for _ in 0..repeat {
            for piece in pattern.chunks(limit) {
                bus.data(piece)?;
            }
        }
        return Ok(());
    }

    let per_chunk = limit / pattern.len();
    let mut chunk = [0u8; FILL_CHUNK];
    for copy in chunk.chunks_exact_mut(pattern.len()).take(per_chunk) {
        copy.copy_from_slice(pattern);
    }

    let repeat = repeat as usize;
    for _ in 0..repeat / per_chunk {
        bus.data(&chunk[..per_chunk * pattern.len()])?;
    }
    let remainder = repeat % per_chunk;
    if remainder > 0 {
        bus.data(&chunk[..remainder * pattern.len()])?;
    }
    Ok(())
}

/// State shared between a list, its transport and the completion bridge
pub struct ListCore {
    busy: AtomicBool,
    used: AtomicUsize,
    /// Completions whose marker was reached but could not be signalled
    deferred: AtomicU8,
    capacity: usize,
    body: Mutex<Body>,
}

impl ListCore {
    fn body(&self) -> MutexGuard<'_, Body> {
        self.body
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn append(&self, f: impl FnOnce(&mut Encoder<'_>)) {
        let mut body = self.body();
        f(&mut Encoder::new(&mut body.data));
        self.used.store(body.data.len(), Ordering::Release);
    }

    /// Note that the marker for completion `index` was reached
    fn defer(&self, index: u8) {
        if usize::from(index) < MAX_COMPLETIONS {
            self.deferred.fetch_or(1u8 << index, Ordering::AcqRel);
        }
    }

    /// Stage two handling of a callback marker
    pub(crate) fn run_completion(&self, index: u8) {
        let completion = self
            .body()
            .completions
            .get_mut(index as usize)
            .and_then(Option::take);
        match completion {
            Some(completion) => completion.run(),
            None => log::warn!("No pending completion at index {}", index),
        }
    }

    /// Stage two handling of the end of a list
    pub(crate) fn finish(&self) {
        let (leftover, on_present) = {
            let mut body = self.body();
            let leftover = core::mem::replace(&mut body.completions, heapless::Vec::new());
            let on_present = body.on_present.take();
            body.clear();
            self.used.store(0, Ordering::Release);
            (leftover, on_present)
        };

        // Markers the transport never reached still owe their callers a result
        let deferred = self.deferred.swap(0, Ordering::AcqRel);
        for (index, completion) in leftover.into_iter().enumerate() {
            let Some(completion) = completion else {
                continue;
            };
            if deferred & (1u8 << index) != 0 {
                completion.run();
            } else {
                log::warn!("Read {} never reached its callback marker", index);
                completion.abandon();
            }
        }

        self.busy.store(false, Ordering::Release);
        log::debug!("Command list complete");

        if let Some(callback) = on_present {
            callback();
        }
    }
}

/// A command list handed to a transport for execution.
///
/// The transport must call [`Request::complete`] exactly once, after the
/// last entry has executed; consuming the request makes a second call
/// impossible.
pub struct Request {
    core: Arc<ListCore>,
    notifier: Notifier,
}

impl Request {
    /// Execute every entry against `bus`.
    ///
    /// Callback markers are posted to the completion bridge as they are
    /// reached.
    pub fn execute<B: Bus>(&self, bus: &mut B) -> Result<(), DisplayError> {
        let body = self.core.body();
        body.execute(bus, |index| {
            let signal = Signal::new(self.core.clone(), Event::Callback(index));
            if self.notifier.notify(signal).is_err() {
                // finish() runs it instead
                log::warn!("Completion queue full, deferring callback {}", index);
                self.core.defer(index);
            }
        })
    }

    /// Inspect the encoded entries
    pub fn with_entries<R>(&self, f: impl FnOnce(Entries<'_>) -> R) -> R {
        f(Entries::new(&self.core.body().data))
    }

    /// Signal that the list has finished executing.
    ///
    /// Only posts a message; safe from interrupt context. Hands the signal
    /// back if the completion queue is full.
    pub fn complete(self) -> Result<(), Signal> {
        let Request { core, notifier } = self;
        notifier.notify(Signal::new(core, Event::Done))
    }
}

/// Usage snapshot of a list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Bytes holding encoded entries
    pub used: usize,
    /// Bytes still free
    pub available: usize,
}

/// Bounded, append-only buffer of encoded controller operations
pub struct DisplayList {
    commands: Commands,
    max_transfer: usize,
    format: PixelFormat,
    core: Arc<ListCore>,
    stage: Vec<u8>,
    staged: usize,
}

impl DisplayList {
    /// Empty list holding at most `capacity` bytes of entries
    pub fn new(commands: Commands, capacity: usize) -> Self {
        DisplayList {
            commands,
            max_transfer: DEFAULT_MAX_TRANSFER,
            format: PixelFormat::Rgb565,
            core: Arc::new(ListCore {
                busy: AtomicBool::new(false),
                used: AtomicUsize::new(0),
                deferred: AtomicU8::new(0),
                capacity,
                body: Mutex::new(Body {
                    data: Vec::with_capacity(capacity),
                    buffers: heapless::Vec::new(),
                    completions: heapless::Vec::new(),
                    on_present: None,
                    fill_chunk: FILL_CHUNK,
                }),
            }),
            stage: vec![0; DEFAULT_MAX_TRANSFER],
            staged: 0,
        }
    }

    /// Limit single write transactions to `max_transfer` bytes.
    ///
    /// Capped at the largest length a write entry can describe.
    pub fn with_max_transfer(mut self, max_transfer: usize) -> Self {
        self.max_transfer = max_transfer.clamp(1, MAX_ENTRY_DATA);
        self.apply_packet();
        self
    }

    /// Format of pixel data written through this list
    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self.apply_packet();
        self
    }

    /// Size staging and fill streaming to the current write packet
    fn apply_packet(&mut self) {
        let packet = self.write_packet();
        self.stage = vec![0; packet];
        self.staged = 0;
        self.core.body().fill_chunk = packet.min(FILL_CHUNK);
    }

    /// Controller opcodes used by this list
    pub fn commands(&self) -> &Commands {
        &self.commands
    }

    /// Total space for entries
    pub fn capacity(&self) -> usize {
        self.core.capacity
    }

    /// Bytes holding encoded entries
    pub fn used(&self) -> usize {
        self.core.used.load(Ordering::Acquire)
    }

    /// Bytes still free
    pub fn free_space(&self) -> usize {
        self.capacity().saturating_sub(self.used())
    }

    /// Usage snapshot
    pub fn stat(&self) -> Stat {
        Stat {
            used: self.used(),
            available: self.free_space(),
        }
    }

    /// True while the transport owns the list
    pub fn is_busy(&self) -> bool {
        self.core.busy.load(Ordering::Acquire)
    }

    /// True if nothing is queued and nothing is executing
    pub fn is_empty(&self) -> bool {
        !self.is_busy() && self.used() == 0
    }

    /// True if `bytes` more bytes can be encoded now
    pub fn reserve(&self, bytes: usize) -> bool {
        !self.is_busy() && self.free_space() >= bytes
    }

    fn pixel_bytes(&self) -> usize {
        self.format.bytes_per_pixel().max(1)
    }

    /// Largest pixel-aligned write transaction
    fn write_packet(&self) -> usize {
        let unit = self.pixel_bytes();
        (self.max_transfer / unit * unit).clamp(unit, MAX_ENTRY_DATA / unit * unit)
    }

    fn overruns(buffer: &SharedBuffer, offset: usize, len: usize) -> bool {
        offset.checked_add(len).map_or(true, |end| end > buffer.len())
    }

    fn start_len(window: &AddressWindow, mode: Mode) -> usize {
        if window.needs_start(mode) {
            COMMAND_LEN
        } else {
            0
        }
    }

    /// Discard everything queued.
    ///
    /// Refused while executing. Attached buffers are released and pending
    /// reads are dropped without completing.
    pub fn reset(&mut self) -> bool {
        if self.is_busy() {
            log::warn!("Cannot reset a command list while it is executing");
            return false;
        }
        self.core.body().clear();
        self.core.used.store(0, Ordering::Release);
        self.core.deferred.store(0, Ordering::Release);
        self.staged = 0;
        true
    }

    /// Append a command with parameter bytes
    pub fn write_command(&mut self, cmd: u8, params: &[u8]) -> bool {
        if params.len() > u8::MAX as usize || !self.reserve(COMMAND_LEN + params.len()) {
            return false;
        }
        self.core.append(|enc| enc.command(cmd, params));
        true
    }

    /// Select a new address window.
    ///
    /// Encodes column, row and write start commands. Fails without changes
    /// if `rect` lies entirely off screen or there is no room.
    pub fn set_window(&mut self, window: &mut AddressWindow, rect: Rectangle) -> bool {
        let Some(bounds) = window.clip(rect) else {
            log::debug!("Window {:?} is empty after clipping", rect);
            return false;
        };
        if !self.reserve(WINDOW_LEN) {
            return false;
        }
        window.set_window(bounds);

        let start = bounds.top_left;
        let end = start + bounds.size - Size::new(1, 1);
        let span = |a: i32, b: i32| {
            let [a_hi, a_lo] = (a as u16).to_be_bytes();
            let [b_hi, b_lo] = (b as u16).to_be_bytes();
            [a_hi, a_lo, b_hi, b_lo]
        };
        let commands = self.commands;
        self.core.append(|enc| {
            enc.command(commands.set_column, &span(start.x, end.x));
            enc.command(commands.set_row, &span(start.y, end.y));
            enc.command(commands.write_start, &[]);
        });
        true
    }

    fn encode_write_start(&self, window: &mut AddressWindow, enc: &mut Encoder<'_>) {
        if window.needs_start(Mode::Write) {
            enc.command(self.commands.write_start, &[]);
            window.start(Mode::Write);
        }
    }

    /// Encoded size of `len` bytes of inline data, excluding any start
    /// command
    pub fn write_data_len(&self, len: usize) -> usize {
        len.div_ceil(self.write_packet()) * WRITE_LEN + len
    }

    /// Append pixel data carried inside the list
    pub fn write_data(&mut self, window: &mut AddressWindow, data: &[u8]) -> bool {
        if data.is_empty() {
            return true;
        }
        let packet = self.write_packet();
        let needed = Self::start_len(window, Mode::Write) + self.write_data_len(data.len());
        if !self.reserve(needed) {
            return false;
        }
        let this = &*self;
        this.core.append(|enc| {
            this.encode_write_start(window, enc);
            for chunk in data.chunks(packet) {
                enc.write(chunk);
            }
        });
        window.seek((data.len() / self.pixel_bytes()) as u32);
        true
    }

    /// Find or add a slot for `buffer`, taking a reference for the list
    fn attach(&mut self, buffer: &SharedBuffer) -> Option<u8> {
        let mut body = self.core.body();
        if let Some(slot) = body.buffers.iter().position(|b| b.ptr_eq(buffer)) {
            return Some(slot as u8);
        }
        body.buffers.push(buffer.add_ref()).ok()?;
        Some((body.buffers.len() - 1) as u8)
    }

    /// Append a write of `len` bytes from `buffer` starting at `offset`.
    ///
    /// The list holds a reference to `buffer` until it has executed.
    /// Locked buffers are refused.
    pub fn write_buffer(
        &mut self,
        window: &mut AddressWindow,
        buffer: &SharedBuffer,
        offset: usize,
        len: usize,
    ) -> bool {
        if len == 0 {
            return true;
        }
        if Self::overruns(buffer, offset, len) {
            log::warn!(
                "Write of {} bytes at {} overruns {} byte buffer",
                len,
                offset,
                buffer.len()
            );
            return false;
        }
        if buffer.is_locked() {
            log::debug!("Buffer is locked by a pending operation");
            return false;
        }
        let packet = self.write_packet();
        let needed =
            Self::start_len(window, Mode::Write) + len.div_ceil(packet) * WRITE_BUFFER_LEN;
        if !self.reserve(needed) {
            return false;
        }
        let Some(slot) = self.attach(buffer) else {
            log::debug!("No free buffer slot");
            return false;
        };

        let this = &*self;
        this.core.append(|enc| {
            this.encode_write_start(window, enc);
            let mut pos = 0;
            while pos < len {
                let n = packet.min(len - pos);
                enc.write_buffer(slot, offset + pos, n);
                pos += n;
            }
        });
        window.seek((len / self.pixel_bytes()) as u32);
        true
    }

    /// Encoded size of a read of `len` bytes
    pub fn read_len(len: usize) -> usize {
        len.div_ceil(MAX_READ_PACKET) * READ_LEN
    }

    /// Append a read of `len` bytes into `buffer` at `offset`.
    ///
    /// The read is split into transactions of at most [`MAX_READ_PACKET`]
    /// bytes. The first uses the read start command unless the window is
    /// already in read mode; the rest continue from the cursor.
    pub fn read(
        &mut self,
        window: &mut AddressWindow,
        buffer: &SharedBuffer,
        offset: usize,
        len: usize,
    ) -> bool {
        if len == 0 {
            return true;
        }
        if Self::overruns(buffer, offset, len) {
            log::warn!(
                "Read of {} bytes at {} overruns {} byte buffer",
                len,
                offset,
                buffer.len()
            );
            return false;
        }
        if !self.reserve(Self::read_len(len)) {
            return false;
        }
        let Some(slot) = self.attach(buffer) else {
            log::debug!("No free buffer slot");
            return false;
        };

        let commands = self.commands;
        self.core.append(|enc| {
            let mut pos = 0;
            while pos < len {
                let n = MAX_READ_PACKET.min(len - pos);
                let cmd = if window.needs_start(Mode::Read) {
                    window.start(Mode::Read);
                    commands.read_start
                } else {
                    commands.read
                };
                enc.read(cmd, slot, offset + pos, n);
                pos += n;
            }
        });
        window.seek((len / READ_PIXEL_SIZE) as u32);
        true
    }

    /// Append `pattern` repeated `repeat` times
    pub fn fill(&mut self, window: &mut AddressWindow, pattern: &[u8], repeat: u32) -> bool {
        if pattern.is_empty() || repeat == 0 {
            return true;
        }
        if pattern.len() > u8::MAX as usize {
            return false;
        }
        let needed = Self::start_len(window, Mode::Write) + FILL_LEN + pattern.len();
        if !self.reserve(needed) {
            return false;
        }
        let this = &*self;
        this.core.append(|enc| {
            this.encode_write_start(window, enc);
            enc.fill(pattern, repeat);
        });
        let bytes = pattern.len() as u64 * u64::from(repeat);
        window.seek((bytes / self.pixel_bytes() as u64).min(u64::from(u32::MAX)) as u32);
        true
    }

    /// Append a completion marker for `completion`.
    ///
    /// On failure the completion is dropped, releasing its buffer lock.
    pub fn callback(&mut self, completion: ReadCompletion) -> bool {
        if !self.reserve(CALLBACK_LEN) {
            return false;
        }
        let index = {
            let mut body = self.core.body();
            if body.completions.push(Some(completion)).is_err() {
                log::debug!("No free completion slot");
                return false;
            }
            (body.completions.len() - 1) as u8
        };
        self.core.append(|enc| enc.callback(index));
        true
    }

    /// True if a read of `len` bytes and its completion marker fit
    pub fn can_read(&self, len: usize) -> bool {
        self.reserve(Self::read_len(len) + CALLBACK_LEN)
            && self.core.body().completions.len() < MAX_COMPLETIONS
    }

    /// Borrow staging space for at least `min_bytes` of pixel data.
    ///
    /// Returns `None` if that much cannot be committed right now. The slice
    /// may be longer than requested but never exceeds the largest write
    /// transaction. Nothing is queued until [`DisplayList::commit`].
    pub fn get_buffer(&mut self, window: &AddressWindow, min_bytes: usize) -> Option<&mut [u8]> {
        self.staged = 0;
        let header = Self::start_len(window, Mode::Write) + WRITE_LEN;
        if !self.reserve(header + min_bytes) {
            return None;
        }
        let available = (self.free_space() - header).min(self.stage.len());
        if available < min_bytes || available == 0 {
            return None;
        }
        self.staged = available;
        Some(&mut self.stage[..available])
    }

    /// Queue the first `len` bytes of the staging space.
    ///
    /// Dropped if other entries have since taken the space it needs.
    pub fn commit(&mut self, window: &mut AddressWindow, len: usize) -> bool {
        let len = len.min(self.staged);
        self.staged = 0;
        if len == 0 {
            return true;
        }
        if !self.reserve(Self::start_len(window, Mode::Write) + WRITE_LEN + len) {
            log::warn!("Dropping {} staged bytes, command list is full", len);
            return false;
        }
        let this = &*self;
        this.core.append(|enc| {
            this.encode_write_start(window, enc);
            enc.write(&this.stage[..len]);
        });
        window.seek((len / self.pixel_bytes()) as u32);
        true
    }

    /// Inspect the encoded entries
    pub fn with_entries<R>(&self, f: impl FnOnce(Entries<'_>) -> R) -> R {
        f(Entries::new(&self.core.body().data))
    }

    /// Hand the list over for asynchronous execution.
    ///
    /// Returns `None` if the list is empty or already executing.
    pub fn request(
        &mut self,
        notifier: Notifier,
        on_present: Option<PresentCallback>,
    ) -> Option<Request> {
        if self.is_busy() || self.used() == 0 {
            return None;
        }
        self.core.body().on_present = on_present;
        self.core.busy.store(true, Ordering::Release);
        Some(Request {
            core: self.core.clone(),
            notifier,
        })
    }

    /// Execute the list synchronously against `bus`, then empty it.
    ///
    /// Used for one-shot sequences which carry no completions.
    pub fn run<B: Bus>(&mut self, bus: &mut B) -> Result<(), DisplayError> {
        if self.is_busy() {
            return Err(DisplayError::BusWriteError);
        }
        let result = self.core.body().execute(bus, |index| {
            log::warn!("Ignoring callback {} in synchronous command list", index);
        });
        self.reset();
        result
    }
}
