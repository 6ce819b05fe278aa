//! Pixel formats and read-back conversion
//!
//! The controller returns GRAM contents as three bytes per pixel, one per
//! channel, with only the top six bits of each byte significant. Writes use
//! the surface format, RGB565 by default.

use embedded_graphics::pixelcolor::{IntoStorage, Rgb565};

/// Size of one pixel as delivered by a GRAM read.
pub const READ_PIXEL_SIZE: usize = 3;

/// Pixel layouts understood by the driver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PixelFormat {
    /// Not specified; reads fall back to [`PixelFormat::Rgb24`]
    #[default]
    None,
    /// 8 bits per channel, R/G/B order
    Rgb24,
    /// 8 bits per channel, B/G/R order
    Bgr24,
    /// 5/6/5 bits packed big-endian
    Rgb565,
}

impl PixelFormat {
    /// Bytes occupied by one pixel
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::None => 0,
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
            PixelFormat::Rgb565 => 2,
        }
    }
}

/// Encode a colour the way the controller expects it on the wire
pub fn rgb565_bytes(color: Rgb565) -> [u8; 2] {
    color.into_storage().to_be_bytes()
}

/// Convert read-back data in place.
///
/// `data` holds whole 3-byte pixels in R/G/B order. Returns the number of
/// bytes holding the converted pixels, which is never more than
/// `data.len()`. Trailing partial pixels are dropped.
pub fn convert_in_place(data: &mut [u8], format: PixelFormat) -> usize {
    let pixels = data.len() / READ_PIXEL_SIZE;
    match format {
        PixelFormat::None | PixelFormat::Rgb24 => pixels * READ_PIXEL_SIZE,
        PixelFormat::Bgr24 => {
            for px in data.chunks_exact_mut(READ_PIXEL_SIZE) {
                px.swap(0, 2);
            }
            pixels * READ_PIXEL_SIZE
        }
        PixelFormat::Rgb565 => {
            // Output index never passes the input index, so one pass works
            for i in 0..pixels {
                let src = i * READ_PIXEL_SIZE;
                let color = Rgb565::new(data[src] >> 3, data[src + 1] >> 2, data[src + 2] >> 3);
                let dst = i * 2;
                data[dst..dst + 2].copy_from_slice(&rgb565_bytes(color));
            }
            pixels * 2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::pixelcolor::RgbColor;

    #[test]
    fn white_packs_to_two_bytes() {
        let mut data = [0xF8, 0xFC, 0xF8];
        let len = convert_in_place(&mut data, PixelFormat::Rgb565);
        assert_eq!(len, 2);
        assert_eq!(&data[..2], &[0xFF, 0xFF]);
    }

    #[test]
    fn channels_land_in_their_fields() {
        // red, green, blue
        let mut data = [0xF8, 0x00, 0x00, 0x00, 0xFC, 0x00, 0x00, 0x00, 0xF8];
        let len = convert_in_place(&mut data, PixelFormat::Rgb565);
        assert_eq!(len, 6);
        assert_eq!(&data[..2], &rgb565_bytes(Rgb565::RED));
        assert_eq!(&data[2..4], &rgb565_bytes(Rgb565::GREEN));
        assert_eq!(&data[4..6], &rgb565_bytes(Rgb565::BLUE));
    }

    #[test]
    fn rgb24_is_passed_through() {
        let mut data = [1, 2, 3, 4, 5, 6, 7];
        assert_eq!(convert_in_place(&mut data, PixelFormat::Rgb24), 6);
        assert_eq!(data, [1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn bgr24_swaps_red_and_blue() {
        let mut data = [0x10, 0x20, 0x30];
        assert_eq!(convert_in_place(&mut data, PixelFormat::Bgr24), 3);
        assert_eq!(data, [0x30, 0x20, 0x10]);
    }

    #[test]
    fn bytes_per_pixel() {
        assert_eq!(PixelFormat::Rgb565.bytes_per_pixel(), 2);
        assert_eq!(PixelFormat::Rgb24.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::None.bytes_per_pixel(), 0);
    }
}
