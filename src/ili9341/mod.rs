//! ILI9341 TFT Display Driver
//!
//! Used with the common 2.4" and 2.8" 240x320 SPI modules.
//!
//! ### Usage
//!
//! 1. wrap the SPI device and pins in an [`interface::DisplayInterface`] and
//!    hand it to a [`crate::transport::BusTransport`]
//! 1. create a [`driver::Ili9341`] and call [`driver::Ili9341::initialize`]
//! 1. create a [`crate::surface::Surface`], queue drawing operations and
//!    `present()` them
//! 1. call [`driver::Ili9341::dispatch_completions`] from task context to
//!    finish reads and run present callbacks

pub mod cmd;
pub mod driver;
pub mod flag;
pub mod interface;

/// Panel width in the default portrait orientation
pub const WIDTH: u16 = 240;

/// Panel height in the default portrait orientation
pub const HEIGHT: u16 = 320;
