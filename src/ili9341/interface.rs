//! Display interface using SPI
use display_interface::DisplayError;
use embedded_hal::{
    delay::DelayNs,
    digital::OutputPin,
    spi::{Operation, SpiDevice},
};

use crate::transport::Bus;

const RESET_PULSE_MS: u32 = 10;
const RESET_SETTLE_MS: u32 = 1;

/// 4-wire SPI connection to an ILI9341
///
pub struct DisplayInterface<SPI, DC, RST> {
    /// SPI device
    spi: SPI,
    /// Data/Command Control Pin (High for data, Low for command)
    dc: DC,
    /// Pin for Reseting, if wired
    rst: Option<RST>,
    /// Last level driven on `dc`, to skip redundant pin writes
    dc_high: Option<bool>,
}

impl<SPI, DC, RST> DisplayInterface<SPI, DC, RST> {
    /// Create the interface. Pass `None` for `rst` if the reset line is
    /// tied high.
    pub fn new(spi: SPI, dc: DC, rst: Option<RST>) -> Self {
        DisplayInterface {
            spi,
            dc,
            rst,
            dc_high: None,
        }
    }

    /// Give back the SPI device and pins
    pub fn release(self) -> (SPI, DC, Option<RST>) {
        (self.spi, self.dc, self.rst)
    }
}

impl<SPI, DC, RST> DisplayInterface<SPI, DC, RST>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
{
    fn set_dc(&mut self, high: bool) -> Result<(), DisplayError> {
        if self.dc_high == Some(high) {
            return Ok(());
        }
        if high {
            self.dc.set_high().map_err(|_| DisplayError::DCError)?;
        } else {
            self.dc.set_low().map_err(|_| DisplayError::DCError)?;
        }
        self.dc_high = Some(high);
        Ok(())
    }

    /// Basic function for sending commands
    pub(crate) fn cmd(&mut self, command: u8) -> Result<(), DisplayError> {
        // low for commands
        self.set_dc(false)?;

        match self.spi.write(&[command]) {
            Ok(_) => Ok(()),
            Err(e) => {
                log::error!("SPI write error for command 0x{:02X}: {:?}", command, e);
                Err(DisplayError::BusWriteError)
            }
        }
    }

    /// Basic function for sending an array of u8-values of data over spi
    pub(crate) fn data(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        // high for data
        self.set_dc(true)?;
        self.spi
            .write(data)
            .map_err(|_| DisplayError::BusWriteError)
    }

    /// Send `command`, then read `buf.len()` bytes with the data line high.
    ///
    /// Most multi-byte reads start with a dummy byte which is clocked out
    /// and discarded.
    pub(crate) fn read_data(
        &mut self,
        command: u8,
        dummy: bool,
        buf: &mut [u8],
    ) -> Result<(), DisplayError> {
        self.cmd(command)?;
        self.set_dc(true)?;

        let mut skip = [0u8; 1];
        let result = if dummy {
            self.spi
                .transaction(&mut [Operation::Read(&mut skip), Operation::Read(buf)])
        } else {
            self.spi.read(buf)
        };
        result.map_err(|e| {
            log::error!("SPI read error for command 0x{:02X}: {:?}", command, e);
            DisplayError::BusWriteError
        })
    }

    /// Pulse the reset line, if there is one
    pub(crate) fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), DisplayError> {
        let Some(rst) = self.rst.as_mut() else {
            log::debug!("No reset line, skipping hardware reset");
            return Ok(());
        };
        rst.set_high().map_err(|_| DisplayError::RSError)?;
        rst.set_low().map_err(|_| DisplayError::RSError)?;
        delay.delay_ms(RESET_PULSE_MS);
        rst.set_high().map_err(|_| DisplayError::RSError)?;
        delay.delay_ms(RESET_SETTLE_MS);
        log::info!("Display hardware reset complete");
        Ok(())
    }
}

impl<SPI, DC, RST> Bus for DisplayInterface<SPI, DC, RST>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
{
    fn command(&mut self, cmd: u8) -> Result<(), DisplayError> {
        self.cmd(cmd)
    }

    fn data(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        DisplayInterface::data(self, data)
    }

    fn read(&mut self, cmd: u8, dummy: bool, buf: &mut [u8]) -> Result<(), DisplayError> {
        self.read_data(cmd, dummy, buf)
    }

    fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), DisplayError> {
        DisplayInterface::reset(self, delay)
    }
}
