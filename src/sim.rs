//! Host-side ILI9341 model
//!
//! [`Simulator`] implements [`Bus`] by interpreting the command stream the
//! way the controller does: column/page address windows, a shared RAM
//! cursor, MADCTL address mapping, sleep and display state, and the status
//! registers. GRAM holds 18-bit colour, so RGB565 writes are widened and
//! reads return the top six bits of each channel, like the real part.
//!
//! The model ignores the BGR bit; it only changes how the panel is driven.

use display_interface::DisplayError;
use embedded_hal::delay::DelayNs;

use crate::ili9341::cmd::Cmd;
use crate::ili9341::flag::Flag;
use crate::ili9341::{HEIGHT, WIDTH};
use crate::transport::Bus;

const PANEL_WIDTH: usize = WIDTH as usize;
const PANEL_HEIGHT: usize = HEIGHT as usize;

/// Id bytes returned by RDDID
pub const DISPLAY_ID: [u8; 3] = [0x00, 0x93, 0x41];

/// One GRAM cell, six significant bits per channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rgb666 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb666 {
    /// Widen an RGB565 value the way the controller does
    pub fn from_rgb565(raw: u16) -> Self {
        let r5 = ((raw >> 11) & 0x1F) as u8;
        let g6 = ((raw >> 5) & 0x3F) as u8;
        let b5 = (raw & 0x1F) as u8;
        Rgb666 {
            r: (r5 << 1) | (r5 >> 4),
            g: g6,
            b: (b5 << 1) | (b5 >> 4),
        }
    }

    /// Bytes produced by a GRAM read
    pub fn read_bytes(self) -> [u8; 3] {
        [self.r << 2, self.g << 2, self.b << 2]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Idle,
    Write,
    Read,
}

/// Simulated ILI9341 attached to a bus
pub struct Simulator {
    gram: Vec<Rgb666>,
    madctl: u8,
    pixfmt: u8,
    awake: bool,
    display_on: bool,
    columns: (u16, u16),
    pages: (u16, u16),
    cursor: (u16, u16),
    command: Option<u8>,
    params: Vec<u8>,
    access: Access,
    pending: Option<u8>,
    history: Vec<(u8, Vec<u8>)>,
    resets: usize,
    failures: usize,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    /// Controller in its power-on state
    pub fn new() -> Self {
        Simulator {
            gram: vec![Rgb666::default(); PANEL_WIDTH * PANEL_HEIGHT],
            madctl: 0,
            pixfmt: Flag::PIXFMT_18BIT,
            awake: false,
            display_on: false,
            columns: (0, WIDTH - 1),
            pages: (0, HEIGHT - 1),
            cursor: (0, 0),
            command: None,
            params: Vec::new(),
            access: Access::Idle,
            pending: None,
            history: Vec::new(),
            resets: 0,
            failures: 0,
        }
    }

    /// Commands received so far with their parameters. Pixel data and
    /// read results are not recorded.
    pub fn history(&self) -> &[(u8, Vec<u8>)] {
        &self.history
    }

    /// Forget the recorded history
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Hardware resets seen
    pub fn resets(&self) -> usize {
        self.resets
    }

    /// Current MADCTL value
    pub fn madctl(&self) -> u8 {
        self.madctl
    }

    /// True after SLPOUT
    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// True after DISPON
    pub fn is_display_on(&self) -> bool {
        self.display_on
    }

    /// Make the next bus transaction fail
    pub fn fail_next(&mut self) {
        self.failures += 1;
    }

    fn check_failure(&mut self) -> Result<(), DisplayError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(DisplayError::BusWriteError);
        }
        Ok(())
    }

    /// Logical screen extent for the current MADCTL
    fn logical_size(&self) -> (usize, usize) {
        if self.madctl & Flag::MADCTL_MV != 0 {
            (PANEL_HEIGHT, PANEL_WIDTH)
        } else {
            (PANEL_WIDTH, PANEL_HEIGHT)
        }
    }

    /// GRAM index for logical column `x` and row `y`
    fn index(&self, x: usize, y: usize) -> Option<usize> {
        let (width, height) = self.logical_size();
        if x >= width || y >= height {
            return None;
        }
        let x = if self.madctl & Flag::MADCTL_MX != 0 {
            width - 1 - x
        } else {
            x
        };
        let y = if self.madctl & Flag::MADCTL_MY != 0 {
            height - 1 - y
        } else {
            y
        };
        let (px, py) = if self.madctl & Flag::MADCTL_MV != 0 {
            (y, x)
        } else {
            (x, y)
        };
        Some(py * PANEL_WIDTH + px)
    }

    /// Pixel at logical position `(x, y)` for the current orientation
    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgb666> {
        self.index(x, y).map(|i| self.gram[i])
    }

    fn rewind(&mut self) {
        self.cursor = (self.columns.0, self.pages.0);
    }

    fn advance(&mut self) {
        let (x, y) = self.cursor;
        if x < self.columns.1 {
            self.cursor.0 = x + 1;
        } else {
            self.cursor.0 = self.columns.0;
            self.cursor.1 = if y < self.pages.1 { y + 1 } else { self.pages.0 };
        }
    }

    fn store(&mut self, raw: u16) {
        let (x, y) = self.cursor;
        if let Some(i) = self.index(x as usize, y as usize) {
            self.gram[i] = Rgb666::from_rgb565(raw);
        }
        self.advance();
    }

    fn load(&mut self) -> [u8; 3] {
        let (x, y) = self.cursor;
        let bytes = self
            .index(x as usize, y as usize)
            .map(|i| self.gram[i].read_bytes())
            .unwrap_or_default();
        self.advance();
        bytes
    }

    fn span(params: &[u8]) -> Option<(u16, u16)> {
        match params {
            [a, b, c, d, ..] => Some((
                u16::from_be_bytes([*a, *b]),
                u16::from_be_bytes([*c, *d]),
            )),
            _ => None,
        }
    }

    /// Apply the parameters received so far
    fn apply(&mut self, cmd: u8) {
        match cmd {
            Cmd::CASET => {
                if let Some(span) = Self::span(&self.params) {
                    self.columns = span;
                }
            }
            Cmd::PASET => {
                if let Some(span) = Self::span(&self.params) {
                    self.pages = span;
                }
            }
            Cmd::MADCTL => {
                if let Some(&value) = self.params.first() {
                    self.madctl = value;
                }
            }
            Cmd::PIXFMT => {
                if let Some(&value) = self.params.first() {
                    self.pixfmt = value;
                }
            }
            _ => {}
        }
    }

    fn register(&self, cmd: u8) -> Vec<u8> {
        let booster = if self.awake { 0x80 } else { 0x00 };
        match cmd {
            Cmd::RDDID => DISPLAY_ID.to_vec(),
            Cmd::RDDST => vec![
                booster | (self.madctl >> 1),
                ((self.pixfmt & 0x07) << 4) | (u8::from(self.awake) << 2) | 0x01,
                u8::from(self.display_on) << 2,
                0x00,
            ],
            Cmd::RDMODE => vec![
                booster | (u8::from(self.awake) << 4) | 0x08 | (u8::from(self.display_on) << 2),
            ],
            Cmd::RDMADCTL => vec![self.madctl],
            Cmd::RDPIXFMT => vec![self.pixfmt],
            Cmd::RDSELFDIAG => vec![if self.awake { 0xC0 } else { 0x00 }],
            _ => Vec::new(),
        }
    }
}

impl Bus for Simulator {
    fn command(&mut self, cmd: u8) -> Result<(), DisplayError> {
        self.check_failure()?;
        self.params.clear();
        self.pending = None;
        self.access = Access::Idle;
        match cmd {
            Cmd::SWRESET => {
                *self = Simulator {
                    resets: self.resets,
                    history: std::mem::take(&mut self.history),
                    ..Simulator::new()
                }
            }
            Cmd::SLPOUT => self.awake = true,
            Cmd::SLPIN => self.awake = false,
            Cmd::DISPON => self.display_on = true,
            Cmd::DISPOFF => self.display_on = false,
            Cmd::RAMWR => {
                self.rewind();
                self.access = Access::Write;
            }
            _ => {}
        }
        self.command = Some(cmd);
        self.history.push((cmd, Vec::new()));
        Ok(())
    }

    fn data(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        self.check_failure()?;
        if self.access == Access::Write {
            for &byte in data {
                match self.pending.take() {
                    Some(high) => self.store(u16::from_be_bytes([high, byte])),
                    None => self.pending = Some(byte),
                }
            }
            return Ok(());
        }
        let Some(cmd) = self.command else {
            return Ok(());
        };
        self.params.extend_from_slice(data);
        if let Some((_, params)) = self.history.last_mut() {
            params.extend_from_slice(data);
        }
        self.apply(cmd);
        Ok(())
    }

    fn read(&mut self, cmd: u8, _dummy: bool, buf: &mut [u8]) -> Result<(), DisplayError> {
        self.check_failure()?;
        self.params.clear();
        self.pending = None;
        self.command = Some(cmd);
        self.history.push((cmd, Vec::new()));
        match cmd {
            Cmd::RAMRD | Cmd::RAMRD_CONT => {
                if cmd == Cmd::RAMRD || self.access != Access::Read {
                    self.rewind();
                }
                self.access = Access::Read;
                for px in buf.chunks_mut(3) {
                    let bytes = self.load();
                    px.copy_from_slice(&bytes[..px.len()]);
                }
            }
            _ => {
                self.access = Access::Idle;
                let value = self.register(cmd);
                for (i, byte) in buf.iter_mut().enumerate() {
                    *byte = value.get(i).copied().unwrap_or(0);
                }
            }
        }
        Ok(())
    }

    fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), DisplayError> {
        let resets = self.resets + 1;
        *self = Simulator::new();
        self.resets = resets;
        delay.delay_ms(5);
        Ok(())
    }
}

/// [`DelayNs`] backed by the host clock
#[derive(Debug, Default, Clone, Copy)]
pub struct HostDelay;

impl DelayNs for HostDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb565_round_trips_through_gram() {
        for raw in [0x0000u16, 0xFFFF, 0xF800, 0x07E0, 0x001F, 0x1234] {
            let [r, g, b] = Rgb666::from_rgb565(raw).read_bytes();
            let back = (u16::from(r >> 3) << 11) | (u16::from(g >> 2) << 5) | u16::from(b >> 3);
            assert_eq!(back, raw);
        }
    }

    #[test]
    fn write_then_read_window() {
        let mut sim = Simulator::new();
        sim.command(Cmd::CASET).unwrap();
        sim.data(&[0, 10, 0, 11]).unwrap();
        sim.command(Cmd::PASET).unwrap();
        sim.data(&[0, 20, 0, 20]).unwrap();
        sim.command(Cmd::RAMWR).unwrap();
        sim.data(&[0xF8, 0x00, 0x00, 0x1F]).unwrap();

        assert_eq!(sim.pixel(10, 20), Some(Rgb666::from_rgb565(0xF800)));
        assert_eq!(sim.pixel(11, 20), Some(Rgb666::from_rgb565(0x001F)));

        let mut buf = [0u8; 6];
        sim.read(Cmd::RAMRD, true, &mut buf).unwrap();
        assert_eq!(buf, [0xFC, 0x00, 0x00, 0x00, 0x00, 0xFC]);
    }

    #[test]
    fn read_continue_keeps_cursor() {
        let mut sim = Simulator::new();
        sim.command(Cmd::RAMWR).unwrap();
        sim.data(&[0xFF, 0xFF]).unwrap();

        let mut first = [0u8; 3];
        let mut second = [0u8; 3];
        sim.read(Cmd::RAMRD, true, &mut first).unwrap();
        sim.read(Cmd::RAMRD_CONT, true, &mut second).unwrap();
        assert_eq!(first, [0xFC, 0xFC, 0xFC]);
        assert_eq!(second, [0, 0, 0]);
    }

    #[test]
    fn madctl_exchange_swaps_axes() {
        let mut sim = Simulator::new();
        sim.command(Cmd::MADCTL).unwrap();
        sim.data(&[Flag::MADCTL_MV]).unwrap();
        sim.command(Cmd::CASET).unwrap();
        sim.data(&[0x01, 0x3F, 0x01, 0x3F]).unwrap();
        sim.command(Cmd::PASET).unwrap();
        sim.data(&[0, 0, 0, 0]).unwrap();
        sim.command(Cmd::RAMWR).unwrap();
        sim.data(&[0xFF, 0xFF]).unwrap();

        assert_eq!(sim.madctl(), Flag::MADCTL_MV);
        assert_eq!(sim.pixel(319, 0), Some(Rgb666::from_rgb565(0xFFFF)));
        assert_eq!(sim.gram[319 * PANEL_WIDTH], Rgb666::from_rgb565(0xFFFF));
    }

    #[test]
    fn registers_reflect_state() {
        let mut sim = Simulator::new();
        sim.command(Cmd::SLPOUT).unwrap();
        sim.command(Cmd::DISPON).unwrap();

        let mut id = [0u8; 4];
        sim.read(Cmd::RDDID, true, &mut id).unwrap();
        assert_eq!(id, [0x00, 0x93, 0x41, 0x00]);

        let mut mode = [0u8; 1];
        sim.read(Cmd::RDMODE, false, &mut mode).unwrap();
        assert_eq!(mode[0], 0x9C);
    }
}
