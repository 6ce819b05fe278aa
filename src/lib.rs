//! ILI9341 command-list display driver
//!
//! Drawing operations are encoded into a bounded [`display_list::DisplayList`]
//! and handed to a [`transport::Transport`] as one unit. Completion comes
//! back in two stages: the transport posts a fixed-size signal from whatever
//! context its transfer finished in, and the application later runs
//! [`completion::CompletionBridge::dispatch`] in task context to convert
//! read-back pixels, report status, call back and release buffers.
//!
//! For a complete example see `src/main.rs`, which draws the colour test
//! bars on the simulated controller.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod buffer;
pub mod completion;
pub mod display_list;
pub mod ili9341;
pub mod pixel;
pub mod sim;
pub mod surface;
pub mod transport;

pub use crate::buffer::SharedBuffer;
pub use crate::completion::{CompletionBridge, ReadBuffer, ReadStatus};
pub use crate::ili9341::cmd::Cmd;
pub use crate::ili9341::driver::{ColorOrder, Config, DisplayError, Ili9341, Orientation};
pub use crate::ili9341::flag::Flag;
pub use crate::pixel::PixelFormat;
pub use crate::surface::{Rejected, Surface};
pub use crate::transport::{Bus, BusTransport, Transport};
