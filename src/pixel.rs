//! Pixel conversions between the camera's RGB888 stream, the CNN's signed input words and
//! the RGB565 display format.
//!
//! The CNN consumes one 32-bit word per pixel with the channels packed as `0x00BBGGRR`. Every
//! channel is a signed 8-bit value, so the unsigned camera samples are shifted into
//! `[-128, 127]` by flipping the top bit of each byte.

use embedded_graphics::pixelcolor::{
    raw::{RawData, RawU16},
    Rgb565, RgbColor,
};

/// Flips the sign bit of the three channel bytes.
pub const SIGN_FLIP: u32 = 0x0080_8080;

/// Pack an RGB888 sample into a CNN input word.
#[inline]
pub fn encode_accelerator_word(r: u8, g: u8, b: u8) -> u32 {
    ((b as u32) << 16 | (g as u32) << 8 | r as u32) ^ SIGN_FLIP
}

/// Recover the RGB888 sample from a CNN input word.
#[inline]
pub fn decode_accelerator_word(word: u32) -> (u8, u8, u8) {
    let pixel = word ^ SIGN_FLIP;
    (pixel as u8, (pixel >> 8) as u8, (pixel >> 16) as u8)
}

/// Truncate an RGB888 sample to RGB565.
#[inline]
pub fn rgb565_color(r: u8, g: u8, b: u8) -> Rgb565 {
    Rgb565::new(r >> 3, g >> 2, b >> 3)
}

/// Truncate an RGB888 sample to a raw RGB565 value: red in bits 15-11, green in 10-5, blue in
/// 4-0. Use `to_be_bytes` for the display byte order.
#[inline]
pub fn encode_rgb565(r: u8, g: u8, b: u8) -> u16 {
    RawU16::from(rgb565_color(r, g, b)).into_inner()
}

/// Expand a raw RGB565 value back to (lossy) RGB888.
pub fn decode_rgb565(raw: u16) -> (u8, u8, u8) {
    let color = Rgb565::from(RawU16::new(raw));
    (color.r() << 3, color.g() << 2, color.b() << 3)
}
