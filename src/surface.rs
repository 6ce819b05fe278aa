//! Drawing surface
//!
//! A [`Surface`] is what drawing code talks to. It owns one
//! [`DisplayList`] and borrows the device for its whole lifetime. Operations
//! queue entries on the list; nothing reaches the controller until
//! [`Surface::present`].
//!
//! Operations return `false` (or [`Rejected`]) when the list is full or
//! executing. The usual response is to present what is queued, dispatch
//! completions, and try again.

use core::fmt;

use display_interface::DisplayError;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use embedded_hal::delay::DelayNs;

use crate::buffer::SharedBuffer;
use crate::completion::{
    PresentCallback, ReadBuffer, ReadCallback, ReadCompletion, ReadResult, ReadStatus,
};
use crate::display_list::{DisplayList, Mode, Stat, FILL_LEN, WINDOW_LEN};
use crate::ili9341::driver::Ili9341;
use crate::pixel::{self, PixelFormat, READ_PIXEL_SIZE};
use crate::transport::Transport;

/// Rectangles up to this many pixels are filled with inline data
pub const SMALL_FILL_PIXELS: u32 = 32;

/// Why a read could not be queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    /// Not enough room in the command list
    NoSpace,
    /// The buffer is locked by an earlier read
    Locked,
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejected::NoSpace => write!(f, "command list full"),
            Rejected::Locked => write!(f, "buffer locked by a pending read"),
        }
    }
}

impl std::error::Error for Rejected {}

/// Drawing surface backed by one command list
pub struct Surface<'d, T, D> {
    device: &'d mut Ili9341<T, D>,
    list: DisplayList,
}

impl<'d, T, D> Surface<'d, T, D>
where
    T: Transport,
    D: DelayNs,
{
    pub(crate) fn new(device: &'d mut Ili9341<T, D>, list: DisplayList) -> Self {
        Surface { device, list }
    }

    /// The device this surface draws to
    pub fn device(&self) -> &Ili9341<T, D> {
        self.device
    }

    /// Screen extent
    pub fn size(&self) -> Size {
        self.device.size()
    }

    /// Format of pixel data accepted by the write operations
    pub fn pixel_format(&self) -> PixelFormat {
        self.device.pixel_format()
    }

    /// Command list usage
    pub fn stat(&self) -> Stat {
        self.list.stat()
    }

    /// True while the command list is executing
    pub fn is_busy(&self) -> bool {
        self.list.is_busy()
    }

    /// Select the address window for subsequent pixel data
    pub fn set_window(&mut self, rect: Rectangle) -> bool {
        let (_, window, _) = self.device.parts();
        self.list.set_window(window, rect)
    }

    /// Staging space for at least `min_bytes` of pixel data, to be queued
    /// with [`Surface::commit`]
    pub fn get_buffer(&mut self, min_bytes: usize) -> Option<&mut [u8]> {
        let (_, window, _) = self.device.parts();
        self.list.get_buffer(window, min_bytes)
    }

    /// Queue `len` bytes of the staging space returned by
    /// [`Surface::get_buffer`]. Returns `false` if the space was taken by
    /// other operations in between.
    pub fn commit(&mut self, len: usize) -> bool {
        let (_, window, _) = self.device.parts();
        self.list.commit(window, len)
    }

    /// Write `pattern` `repeat` times into the current window
    pub fn block_fill(&mut self, pattern: &[u8], repeat: u32) -> bool {
        let (_, window, _) = self.device.parts();
        self.list.fill(window, pattern, repeat)
    }

    /// Write `len` bytes of `buffer` from `offset` into the current window.
    ///
    /// The buffer is referenced, not copied; it stays alive until the list
    /// has executed. Refused while the buffer is locked by a read.
    pub fn write_buffer(&mut self, buffer: &SharedBuffer, offset: usize, len: usize) -> bool {
        let (_, window, _) = self.device.parts();
        self.list.write_buffer(window, buffer, offset, len)
    }

    /// Set one pixel
    pub fn set_pixel(&mut self, color: Rgb565, point: Point) -> bool {
        if !self.list.reserve(WINDOW_LEN + self.list.write_data_len(2)) {
            return false;
        }
        let (_, window, _) = self.device.parts();
        self.list
            .set_window(window, Rectangle::new(point, Size::new(1, 1)))
            && self.list.write_data(window, &pixel::rgb565_bytes(color))
    }

    /// Fill `rect` with one colour.
    ///
    /// Small areas are written as inline data, larger ones as a repeated
    /// pattern. Both produce the same pixels. A rectangle entirely off
    /// screen succeeds without queueing anything.
    pub fn fill_rect(&mut self, rect: Rectangle, color: Rgb565) -> bool {
        let (_, window, _) = self.device.parts();
        let Some(area) = window.clip(rect) else {
            return true;
        };
        let pixels = area.size.width * area.size.height;
        let bytes = pixel::rgb565_bytes(color);
        let small = pixels <= SMALL_FILL_PIXELS;

        let needed = WINDOW_LEN
            + if small {
                self.list.write_data_len(bytes.len() * pixels as usize)
            } else {
                FILL_LEN + bytes.len()
            };
        if !self.list.reserve(needed) || !self.list.set_window(window, area) {
            return false;
        }

        if small {
            let mut data = [0u8; 2 * SMALL_FILL_PIXELS as usize];
            for px in data.chunks_exact_mut(2).take(pixels as usize) {
                px.copy_from_slice(&bytes);
            }
            self.list.write_data(window, &data[..2 * pixels as usize])
        } else {
            self.list.fill(window, &bytes, pixels)
        }
    }

    /// Queue a read of the current window into `buffer`.
    ///
    /// Reads as many pixels as fit in the buffer, up to the end of the
    /// window, and returns that count. `Ok(0)` means there was nothing to
    /// read. Data arrives as RGB24 and is converted to `buffer.format`
    /// when the read completes; [`PixelFormat::None`] is taken as RGB24.
    ///
    /// The buffer stays locked until the completion has run, after which
    /// `status` is filled in and `callback` is called.
    pub fn read_buffer(
        &mut self,
        buffer: &mut ReadBuffer,
        status: Option<&ReadStatus>,
        callback: Option<ReadCallback>,
    ) -> Result<usize, Rejected> {
        let pixel_count = buffer.size() / READ_PIXEL_SIZE;
        if pixel_count == 0 {
            log::warn!("Read buffer too small for a pixel");
            return Ok(0);
        }

        let (_, window, _) = self.device.parts();
        if window.is_empty() {
            log::warn!("Read without an address window");
            return Ok(0);
        }
        let pixels = pixel_count.min(window.available(Mode::Read) as usize);
        if pixels == 0 {
            return Ok(0);
        }
        let bytes = pixels * READ_PIXEL_SIZE;

        if !self.list.can_read(bytes) {
            log::debug!("No space for a {} byte read", bytes);
            return Err(Rejected::NoSpace);
        }
        let Some(lock) = buffer.buffer.try_lock() else {
            return Err(Rejected::Locked);
        };

        if buffer.format == PixelFormat::None {
            buffer.format = PixelFormat::Rgb24;
        }
        if let Some(status) = status {
            status.set(ReadResult::default());
        }

        if !self.list.read(window, &buffer.buffer, buffer.offset, bytes) {
            return Err(Rejected::NoSpace);
        }
        let completion = ReadCompletion::new(lock, buffer, bytes, status.cloned(), callback);
        if !self.list.callback(completion) {
            log::error!("No space for read completion marker");
        }
        Ok(pixels)
    }

    /// Hand the queued operations to the transport.
    ///
    /// Returns `Ok(false)` if there is nothing to present or the previous
    /// list is still executing. `callback` runs from
    /// [`Surface::dispatch_completions`] once the list has finished.
    pub fn present(&mut self, callback: Option<PresentCallback>) -> Result<bool, DisplayError> {
        if self.list.is_busy() {
            log::warn!("Command list busy, not presenting");
            return Ok(false);
        }
        let (transport, _, bridge) = self.device.parts();
        let Some(request) = self.list.request(bridge.notifier(), callback) else {
            return Ok(false);
        };
        transport.submit(request)?;
        Ok(true)
    }

    /// Discard queued operations.
    ///
    /// Refused while executing. The address window is forgotten if anything
    /// was discarded, since the controller never saw it.
    pub fn reset(&mut self) -> bool {
        if self.list.is_busy() {
            return false;
        }
        if !self.list.is_empty() {
            let (_, window, _) = self.device.parts();
            window.invalidate();
        }
        self.list.reset()
    }

    /// Run pending completion work; see [`Ili9341::dispatch_completions`]
    pub fn dispatch_completions(&self) -> usize {
        self.device.dispatch_completions()
    }
}
