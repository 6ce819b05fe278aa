//! Bus and transport seams
//!
//! A [`Bus`] frames single transactions: a command byte with the
//! data/command line low, data bytes with it high, and reads. A
//! [`Transport`] runs whole command lists over a bus and reports their
//! completion through the [`crate::completion::CompletionBridge`].

use display_interface::DisplayError;
use embedded_hal::delay::DelayNs;

use crate::display_list::{DisplayList, Request};

/// Transaction-level access to the controller
pub trait Bus {
    /// Send one command byte
    fn command(&mut self, cmd: u8) -> Result<(), DisplayError>;

    /// Send data or parameter bytes
    fn data(&mut self, data: &[u8]) -> Result<(), DisplayError>;

    /// Send `cmd`, clock out one dummy byte if `dummy` is set, then fill `buf`
    fn read(&mut self, cmd: u8, dummy: bool, buf: &mut [u8]) -> Result<(), DisplayError>;

    /// Pulse the reset line, if there is one
    fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), DisplayError> {
        let _ = delay;
        Ok(())
    }
}

/// Executes command lists on behalf of a device
pub trait Transport {
    /// Start executing `request`.
    ///
    /// Execution may finish later; the transport must call
    /// [`Request::complete`] once it has. An error means the list could not
    /// be run, but completion is still signalled.
    fn submit(&mut self, request: Request) -> Result<(), DisplayError>;

    /// Run `list` to completion before returning. No completions are raised.
    fn execute(&mut self, list: &mut DisplayList) -> Result<(), DisplayError>;

    /// Blocking register read
    fn read(&mut self, cmd: u8, dummy: bool, buf: &mut [u8]) -> Result<(), DisplayError>;

    /// Hardware reset pulse
    fn hardware_reset(&mut self, delay: &mut impl DelayNs) -> Result<(), DisplayError>;
}

/// Transport which executes every submitted list immediately on a [`Bus`]
pub struct BusTransport<B> {
    bus: B,
}

impl<B: Bus> BusTransport<B> {
    /// Wrap `bus`
    pub fn new(bus: B) -> Self {
        BusTransport { bus }
    }

    /// The underlying bus
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// The underlying bus, mutably
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Give the bus back
    pub fn release(self) -> B {
        self.bus
    }
}

impl<B: Bus> Transport for BusTransport<B> {
    fn submit(&mut self, request: Request) -> Result<(), DisplayError> {
        let result = request.execute(&mut self.bus);
        if let Err(e) = &result {
            log::error!("Command list failed: {:?}", e);
        }
        if request.complete().is_err() {
            log::error!("Completion queue full, list will stay busy");
        }
        result
    }

    fn execute(&mut self, list: &mut DisplayList) -> Result<(), DisplayError> {
        list.run(&mut self.bus)
    }

    fn read(&mut self, cmd: u8, dummy: bool, buf: &mut [u8]) -> Result<(), DisplayError> {
        self.bus.read(cmd, dummy, buf)
    }

    fn hardware_reset(&mut self, delay: &mut impl DelayNs) -> Result<(), DisplayError> {
        self.bus.reset(delay)
    }
}
