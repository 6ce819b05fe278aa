//! Colour test
//!
//! Draws red, green, blue and white bars across the screen in the 270 degree
//! orientation, then reads a pixel back from each bar. A panel with the
//! wrong colour order shows red and blue swapped; set `COLOR_ORDER=rgb` to
//! try the other order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use embedded_graphics::pixelcolor::{Rgb565, RgbColor};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

use ili9341_displaylist::sim::{HostDelay, Simulator};
use ili9341_displaylist::{
    BusTransport, ColorOrder, Config, Ili9341, Orientation, PixelFormat, ReadBuffer, ReadStatus,
    SharedBuffer,
};

const BARS: [(&str, Rgb565); 4] = [
    ("red", Rgb565::RED),
    ("green", Rgb565::GREEN),
    ("blue", Rgb565::BLUE),
    ("white", Rgb565::WHITE),
];

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let color_order = match std::env::var("COLOR_ORDER").as_deref() {
        Ok("rgb") => ColorOrder::Rgb,
        _ => ColorOrder::Bgr,
    };
    let config = Config {
        orientation: Orientation::Deg270,
        color_order,
        ..Config::default()
    };
    log::info!("Display start, {:?}", config);

    let transport = BusTransport::new(Simulator::new());
    let mut tft = Ili9341::new(transport, HostDelay, config);
    if let Err(e) = tft.initialize() {
        log::error!("Display init failed: {:?}", e);
        return Err(anyhow::anyhow!("Display init failed: {:?}", e));
    }

    let id = tft
        .read_display_id()
        .map_err(|e| anyhow::anyhow!("Reading display id failed: {:?}", e))?;
    log::info!("Display id 0x{:06X}", id);

    let mut surface = tft.create_surface(0);
    let size = surface.size();
    let bar_width = size.width / BARS.len() as u32;

    for (i, (name, color)) in BARS.iter().enumerate() {
        let bar = Rectangle::new(
            Point::new((i as u32 * bar_width) as i32, 0),
            Size::new(bar_width, size.height),
        );
        log::info!("Filling {} bar {:?}", name, bar);
        if !surface.fill_rect(bar, *color) {
            return Err(anyhow::anyhow!("No room for {} bar", name));
        }
    }

    let ready = Arc::new(AtomicBool::new(false));
    let flag = ready.clone();
    let presented = surface
        .present(Some(Box::new(move || flag.store(true, Ordering::Release))))
        .map_err(|e| anyhow::anyhow!("Present failed: {:?}", e))?;
    surface.dispatch_completions();
    log::info!(
        "Scene ready: presented {}, complete {}",
        presented,
        ready.load(Ordering::Acquire)
    );

    // Read one pixel back from the middle of each bar
    for (i, (name, color)) in BARS.iter().enumerate() {
        let point = Point::new((i as u32 * bar_width + bar_width / 2) as i32, 0);
        if !surface.set_window(Rectangle::new(point, Size::new(1, 1))) {
            return Err(anyhow::anyhow!("Cannot address {:?}", point));
        }

        let mut target = ReadBuffer::new(SharedBuffer::new(3), PixelFormat::Rgb565);
        let status = ReadStatus::new();
        let pixels = surface
            .read_buffer(&mut target, Some(&status), None)
            .map_err(|e| anyhow::anyhow!("Read of {} bar rejected: {}", name, e))?;
        surface
            .present(None)
            .map_err(|e| anyhow::anyhow!("Present failed: {:?}", e))?;
        surface.dispatch_completions();

        let result = status.get();
        let data = target.buffer.to_vec();
        let read = u16::from_be_bytes([data[0], data[1]]);
        log::info!(
            "{:>5}: wrote 0x{:04X}, read 0x{:04X} ({} pixel, {} bytes, done {})",
            name,
            color.into_storage(),
            read,
            pixels,
            result.bytes_read,
            result.done
        );
    }

    let stat = surface.stat();
    log::info!("Surface used {} available {}", stat.used, stat.available);
    Ok(())
}
