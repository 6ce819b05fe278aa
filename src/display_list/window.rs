//! Model of the controller's address window and RAM cursor

use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

/// Direction of the current RAM access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Memory write in progress
    Write,
    /// Memory read in progress
    Read,
}

/// Tracks the window the controller will be addressing once every encoded
/// command has executed.
///
/// The controller auto-advances its cursor as pixels stream through, so the
/// tracker is advanced at encode time: later operations know how much of the
/// window is left without asking the hardware.
#[derive(Debug, Clone)]
pub struct AddressWindow {
    screen: Size,
    bounds: Rectangle,
    cursor: u32,
    mode: Mode,
}

impl AddressWindow {
    /// Tracker for a screen of the given size, with no window set
    pub fn new(screen: Size) -> Self {
        AddressWindow {
            screen,
            bounds: Rectangle::zero(),
            cursor: 0,
            mode: Mode::Write,
        }
    }

    /// Update the screen extent used for clipping.
    ///
    /// The current window is left alone.
    pub fn set_screen(&mut self, screen: Size) {
        self.screen = screen;
    }

    /// Current screen extent
    pub fn screen(&self) -> Size {
        self.screen
    }

    /// Select a new window, clipped to the screen.
    ///
    /// Resets the cursor and selects write mode. Returns `false` and leaves
    /// the tracker untouched if nothing of `rect` is on screen.
    pub fn set_window(&mut self, rect: Rectangle) -> bool {
        let Some(clipped) = self.clip(rect) else {
            return false;
        };
        self.bounds = clipped;
        self.cursor = 0;
        self.mode = Mode::Write;
        true
    }

    /// Clip `rect` to the screen, `None` if nothing remains
    pub fn clip(&self, rect: Rectangle) -> Option<Rectangle> {
        let clipped = rect.intersection(&Rectangle::new(Point::zero(), self.screen));
        if clipped.size.width == 0 || clipped.size.height == 0 {
            None
        } else {
            Some(clipped)
        }
    }

    /// Forget the window, so the next access must re-address
    pub fn invalidate(&mut self) {
        self.bounds = Rectangle::zero();
        self.cursor = 0;
        self.mode = Mode::Write;
    }

    /// Current window
    pub fn bounds(&self) -> Rectangle {
        self.bounds
    }

    /// True if no window has been set
    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    /// Pixels in the window
    pub fn area(&self) -> u32 {
        self.bounds.size.width * self.bounds.size.height
    }

    /// Linear cursor offset within the window
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Current access direction
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Advance the cursor, saturating at the end of the window
    pub fn seek(&mut self, pixels: u32) {
        self.cursor = self.cursor.saturating_add(pixels).min(self.area());
    }

    /// Pixels left before the cursor reaches the end of the window
    pub fn remaining_pixels(&self) -> u32 {
        self.area() - self.cursor
    }

    /// True if an access in `mode` needs a start command first
    pub fn needs_start(&self, mode: Mode) -> bool {
        self.mode != mode
    }

    /// Pixels an access in `mode` could reach, accounting for the cursor
    /// reset caused by a start command.
    pub fn available(&self, mode: Mode) -> u32 {
        if self.needs_start(mode) {
            self.area()
        } else {
            self.remaining_pixels()
        }
    }

    /// Record a start command for `mode`: the hardware rewinds to the top
    /// left of the window.
    pub fn start(&mut self, mode: Mode) {
        self.mode = mode;
        self.cursor = 0;
    }
}
