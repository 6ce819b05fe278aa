//! ILI9341 Device Session
//!
//! Owns the transport and the controller state that outlives any single
//! command list: the address window tracker, the orientation and the
//! completion bridge.
//!
//! ## Bring-up
//!
//! [`Ili9341::initialize`] pulses the reset line, replays [`INIT_TABLE`]
//! (ending with exit-sleep), waits out the 120 ms the controller needs to
//! leave sleep, turns the display on and applies the configured orientation.
//!
//! ## Drawing
//!
//! Drawing goes through a [`Surface`] created with
//! [`Ili9341::create_surface`]. The surface borrows the device for as long
//! as it lives, so there is only ever one command list in flight.

pub use display_interface::DisplayError;

use core::fmt;

use embedded_graphics::prelude::*;
use embedded_hal::delay::DelayNs;

use crate::completion::CompletionBridge;
use crate::display_list::{AddressWindow, DisplayList};
use crate::ili9341::cmd::{Cmd, COMMANDS};
use crate::ili9341::flag::Flag;
use crate::ili9341::{HEIGHT, WIDTH};
use crate::pixel::PixelFormat;
use crate::surface::Surface;
use crate::transport::Transport;

/// Settle time after exit-sleep before further commands
const SLEEP_OUT_DELAY_MS: u32 = 120;

/// Surface list size used when none is requested
pub const DEFAULT_SURFACE_BUFFER: usize = 512;

/// Power, timing and gamma setup replayed by [`Ili9341::initialize`]
pub const INIT_TABLE: &[(u8, &[u8])] = &[
    (Cmd::PWCTRA, &[0x39, 0x2C, 0x00, 0x34, 0x02]),
    (Cmd::PWCTRB, &[0x00, 0xC1, 0x30]),
    (Cmd::DRVTMA, &[0x85, 0x00, 0x78]),
    (Cmd::DRVTMB, &[0x00, 0x00]),
    (Cmd::PWRSEQ, &[0x64, 0x03, 0x12, 0x81]),
    (Cmd::PMPRC, &[0x20]),
    (Cmd::PWCTR1, &[0x23]),       // VRH[5:0]
    (Cmd::PWCTR2, &[0x10]),       // SAP[2:0], BT[3:0]
    (Cmd::VMCTR1, &[0x3E, 0x28]), // Contrast
    (Cmd::VMCTR2, &[0x86]),
    (Cmd::MADCTL, &[Flag::MADCTL_MX | Flag::MADCTL_BGR]),
    (Cmd::PIXFMT, &[Flag::PIXFMT_16BIT]),
    (Cmd::FRMCTR1, &[0x00, 0x18]),
    (Cmd::DFUNCTR, &[0x08, 0x82, 0x27]),
    (Cmd::ENA3G, &[0x00]),    // 3Gamma off
    (Cmd::GAMMASET, &[0x01]), // Gamma curve 1
    (
        Cmd::GMCTRP1,
        &[
            0x0F, 0x31, 0x2B, 0x0C, 0x0E, 0x08, 0x4E, 0xF1, 0x37, 0x07, 0x10, 0x03, 0x0E, 0x09,
            0x00,
        ],
    ),
    (
        Cmd::GMCTRN1,
        &[
            0x00, 0x0E, 0x14, 0x03, 0x11, 0x07, 0x31, 0xC1, 0x48, 0x08, 0x0F, 0x0C, 0x31, 0x36,
            0x0F,
        ],
    ),
    (Cmd::SLPOUT, &[]),
];

const DISPLAY_ON: &[(u8, &[u8])] = &[(Cmd::DISPON, &[])];

/// Encoded size of a command sequence
const fn sequence_len(commands: &[(u8, &[u8])]) -> usize {
    let mut len = 0;
    let mut i = 0;
    while i < commands.len() {
        len += 3 + commands[i].1.len();
        i += 1;
    }
    len
}

/// Display rotation, clockwise
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Orientation {
    /// Portrait, 240 x 320
    #[default]
    Deg0,
    /// Landscape, 320 x 240
    Deg90,
    /// Portrait, upside down
    Deg180,
    /// Landscape, upside down
    Deg270,
}

impl Orientation {
    /// MADCTL value selecting this orientation
    pub fn madctl(self, order: ColorOrder) -> u8 {
        let rotation = match self {
            Orientation::Deg0 => Flag::MADCTL_MX,
            Orientation::Deg90 => Flag::MADCTL_MV,
            Orientation::Deg180 => Flag::MADCTL_MY,
            Orientation::Deg270 => Flag::MADCTL_MX | Flag::MADCTL_MY | Flag::MADCTL_MV,
        };
        let order = match order {
            ColorOrder::Rgb => Flag::MADCTL_RGB,
            ColorOrder::Bgr => Flag::MADCTL_BGR,
        };
        rotation | order
    }

    /// True if rows and columns are exchanged
    pub fn is_landscape(self) -> bool {
        matches!(self, Orientation::Deg90 | Orientation::Deg270)
    }

    /// Screen extent in this orientation
    pub fn size(self) -> Size {
        if self.is_landscape() {
            Size::new(u32::from(HEIGHT), u32::from(WIDTH))
        } else {
            Size::new(u32::from(WIDTH), u32::from(HEIGHT))
        }
    }
}

/// Orientation given in degrees that is not a multiple of 90
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedOrientation(pub u16);

impl fmt::Display for UnsupportedOrientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported orientation: {} degrees", self.0)
    }
}

impl std::error::Error for UnsupportedOrientation {}

impl TryFrom<u16> for Orientation {
    type Error = UnsupportedOrientation;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Orientation::Deg0),
            90 => Ok(Orientation::Deg90),
            180 => Ok(Orientation::Deg180),
            270 => Ok(Orientation::Deg270),
            other => Err(UnsupportedOrientation(other)),
        }
    }
}

/// Order of the colour channels on the panel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColorOrder {
    /// Red first
    Rgb,
    /// Blue first; most ILI9341 modules are wired this way
    #[default]
    Bgr,
}

/// Session settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Orientation applied by [`Ili9341::initialize`]
    pub orientation: Orientation,
    /// Panel channel order
    pub color_order: ColorOrder,
    /// Command list size for surfaces created with a size of 0
    pub surface_buffer: usize,
    /// Largest single write transaction the transport accepts
    pub max_transfer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            orientation: Orientation::Deg0,
            color_order: ColorOrder::Bgr,
            surface_buffer: DEFAULT_SURFACE_BUFFER,
            max_transfer: crate::display_list::DEFAULT_MAX_TRANSFER,
        }
    }
}

/// ILI9341 TFT Display Driver
///
/// ## Type Parameters
///
/// - `T` - Transport executing command lists
/// - `D` - Delay provider for timing
pub struct Ili9341<T, D> {
    transport: T,
    delay: D,
    window: AddressWindow,
    bridge: CompletionBridge,
    orientation: Orientation,
    config: Config,
}

impl<T, D> Ili9341<T, D>
where
    T: Transport,
    D: DelayNs,
{
    /// Create the session. Nothing is sent until [`Ili9341::initialize`].
    pub fn new(transport: T, delay: D, config: Config) -> Self {
        Ili9341 {
            transport,
            delay,
            window: AddressWindow::new(Orientation::Deg0.size()),
            bridge: CompletionBridge::new(),
            orientation: Orientation::Deg0,
            config,
        }
    }

    /// Reset and configure the controller, then switch the display on
    pub fn initialize(&mut self) -> Result<(), DisplayError> {
        log::info!("Initializing ILI9341");

        self.transport.hardware_reset(&mut self.delay)?;

        self.run_sequence(INIT_TABLE, sequence_len(INIT_TABLE))?;

        // Exit-sleep takes a while
        self.delay.delay_ms(SLEEP_OUT_DELAY_MS);

        self.run_sequence(DISPLAY_ON, sequence_len(DISPLAY_ON))?;

        // The table leaves the controller in the portrait orientation
        self.orientation = Orientation::Deg0;
        self.window = AddressWindow::new(self.orientation.size());

        self.set_orientation(self.config.orientation)?;
        log::info!("ILI9341 ready, {:?}", self.size());
        Ok(())
    }

    /// Execute `commands` as one blocking list
    fn run_sequence(&mut self, commands: &[(u8, &[u8])], size: usize) -> Result<(), DisplayError> {
        let mut list = DisplayList::new(COMMANDS, size);
        for &(cmd, params) in commands {
            if !list.write_command(cmd, params) {
                log::error!("Command 0x{:02X} does not fit its list", cmd);
                return Err(DisplayError::OutOfBoundsError);
            }
        }
        self.transport.execute(&mut list)
    }

    /// Rotate the display.
    ///
    /// Any address window is forgotten, so the next drawing operation
    /// re-addresses the controller.
    pub fn set_orientation(&mut self, orientation: Orientation) -> Result<(), DisplayError> {
        let madctl = orientation.madctl(self.config.color_order);
        log::debug!("Orientation {:?}, MADCTL 0x{:02X}", orientation, madctl);

        let params = [madctl];
        self.run_sequence(&[(Cmd::MADCTL, &params[..])], 16)?;
        self.orientation = orientation;
        self.window.set_screen(orientation.size());
        self.window.invalidate();
        Ok(())
    }

    /// Current orientation
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Screen extent for the current orientation
    pub fn size(&self) -> Size {
        self.orientation.size()
    }

    /// Format of pixel data written to the controller
    pub fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Rgb565
    }

    /// Session settings
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read a status register.
    ///
    /// Registers wider than two bytes start with a dummy byte. The result is
    /// assembled most significant byte first.
    pub fn read_register(&mut self, cmd: u8, count: usize) -> Result<u32, DisplayError> {
        if count > 4 {
            return Err(DisplayError::OutOfBoundsError);
        }
        let mut buf = [0u8; 4];
        self.transport.read(cmd, count > 2, &mut buf[..count])?;
        Ok(buf[..count]
            .iter()
            .fold(0u32, |value, &byte| (value << 8) | u32::from(byte)))
    }

    /// Manufacturer, version and driver id bytes
    pub fn read_display_id(&mut self) -> Result<u32, DisplayError> {
        Ok(self.read_register(Cmd::RDDID, 4)? >> 8)
    }

    /// Display status word
    pub fn read_display_status(&mut self) -> Result<u32, DisplayError> {
        self.read_register(Cmd::RDDST, 4)
    }

    /// Power mode
    pub fn read_power_mode(&mut self) -> Result<u8, DisplayError> {
        Ok(self.read_register(Cmd::RDMODE, 1)? as u8)
    }

    /// Memory access control
    pub fn read_madctl(&mut self) -> Result<u8, DisplayError> {
        Ok(self.read_register(Cmd::RDMADCTL, 1)? as u8)
    }

    /// Pixel format
    pub fn read_pixel_format(&mut self) -> Result<u8, DisplayError> {
        Ok(self.read_register(Cmd::RDPIXFMT, 1)? as u8)
    }

    /// Image format
    pub fn read_image_format(&mut self) -> Result<u8, DisplayError> {
        Ok(self.read_register(Cmd::RDIMGFMT, 1)? as u8)
    }

    /// Signal mode
    pub fn read_signal_mode(&mut self) -> Result<u8, DisplayError> {
        Ok(self.read_register(Cmd::RDSIGMODE, 1)? as u8)
    }

    /// Self-diagnostic result
    pub fn read_self_diag(&mut self) -> Result<u8, DisplayError> {
        Ok(self.read_register(Cmd::RDSELFDIAG, 1)? as u8)
    }

    /// NV memory status
    pub fn read_nv_mem_status(&mut self) -> Result<u16, DisplayError> {
        Ok((self.read_register(Cmd::NVMEMST, 3)? >> 8) as u16)
    }

    /// Create a drawing surface whose command list holds `buffer_size`
    /// bytes; 0 selects the configured default.
    pub fn create_surface(&mut self, buffer_size: usize) -> Surface<'_, T, D> {
        let size = if buffer_size == 0 {
            self.config.surface_buffer
        } else {
            buffer_size
        };
        let list = DisplayList::new(COMMANDS, size)
            .with_max_transfer(self.config.max_transfer)
            .with_pixel_format(self.pixel_format());
        Surface::new(self, list)
    }

    /// Run completion work posted since the last call, returning how many
    /// signals were handled. Call from task context.
    pub fn dispatch_completions(&self) -> usize {
        self.bridge.dispatch()
    }

    /// The completion bridge
    pub fn bridge(&self) -> &CompletionBridge {
        &self.bridge
    }

    /// The transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The transport, mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Address window tracker
    pub fn window(&self) -> &AddressWindow {
        &self.window
    }

    pub(crate) fn parts(&mut self) -> (&mut T, &mut AddressWindow, &CompletionBridge) {
        (&mut self.transport, &mut self.window, &self.bridge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orientation_from_degrees() {
        assert_eq!(Orientation::try_from(0), Ok(Orientation::Deg0));
        assert_eq!(Orientation::try_from(270), Ok(Orientation::Deg270));
        assert_eq!(
            Orientation::try_from(45),
            Err(UnsupportedOrientation(45))
        );
    }

    #[test]
    fn madctl_bits_per_orientation() {
        let bgr = ColorOrder::Bgr;
        assert_eq!(Orientation::Deg0.madctl(bgr), 0x48);
        assert_eq!(Orientation::Deg90.madctl(bgr), 0x28);
        assert_eq!(Orientation::Deg180.madctl(bgr), 0x88);
        assert_eq!(Orientation::Deg270.madctl(bgr), 0xE8);
        assert_eq!(Orientation::Deg0.madctl(ColorOrder::Rgb), 0x40);
    }

    #[test]
    fn landscape_swaps_extent() {
        assert_eq!(Orientation::Deg0.size(), Size::new(240, 320));
        assert_eq!(Orientation::Deg90.size(), Size::new(320, 240));
    }

    #[test]
    fn init_table_fits_its_list() {
        let mut list = DisplayList::new(COMMANDS, sequence_len(INIT_TABLE));
        for &(cmd, params) in INIT_TABLE {
            assert!(list.write_command(cmd, params));
        }
        assert_eq!(list.free_space(), 0);
        assert_eq!(INIT_TABLE.last().map(|e| e.0), Some(Cmd::SLPOUT));
    }
}
