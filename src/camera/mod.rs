//! Camera bring-up and the line-buffered stream the capture loop drains.

mod sccb;
mod stream;

pub use sccb::{RegMap, Register, Sccb, SccbError};
pub use stream::{capture, CaptureReport};

use core::ops::Deref;
use embedded_hal::blocking::i2c;
use log::{error, info};

use crate::config::{CAMERA_FREQ_HZ, IMAGE_HEIGHT, IMAGE_WIDTH};
use crate::error::{InitFailure, Result, SensorFault};

/// Bytes per pixel in a stream line: `R, G, B, 0`.
pub const BYTES_PER_PIXEL: usize = 4;

/// Camera parameters fixed at build time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CameraSettings {
    /// Sensor clock (XCLK) frequency in Hz.
    pub freq_hz: u32,
    /// Pixels per line.
    pub width: u16,
    /// Lines per frame.
    pub height: u16,
}

impl CameraSettings {
    /// Settings from `config`.
    pub const fn new() -> Self {
        CameraSettings {
            freq_hz: CAMERA_FREQ_HZ,
            width: IMAGE_WIDTH,
            height: IMAGE_HEIGHT,
        }
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// A camera peripheral streaming RGB888 frames into a small ring of DMA line buffers.
///
/// The capture loop is the only consumer. Each buffer handed out by `acquire_line_buffer` must
/// be given back with `release_line_buffer` before the DMA can reuse it, use `lock_line` to get
/// a guard that does this on every exit path.
pub trait StreamCamera {
    /// Set up the peripheral for RGB888 streaming DMA at the given size and clock. Returns the
    /// vendor status code on failure.
    fn setup(&mut self, settings: &CameraSettings) -> core::result::Result<(), i32>;

    /// Reset the stream statistics and begin producing a frame.
    fn start_frame(&mut self);

    /// Dimensions of the frame being produced as (width, height).
    fn dimensions(&self) -> (u16, u16);

    /// Take ownership of the next filled line buffer. Returns `false` if none is ready yet.
    fn acquire_line_buffer(&mut self) -> bool;

    /// Contents of the line buffer taken by the last successful `acquire_line_buffer`.
    fn line_buffer(&self) -> &[u8];

    /// Hand the current line buffer back to the DMA.
    fn release_line_buffer(&mut self);

    /// `true` once the peripheral has received the whole frame.
    fn is_frame_complete(&self) -> bool;

    /// Number of lines the DMA dropped since `start_frame`.
    fn overflow_count(&self) -> u32;
}

/// Borrow of an acquired line buffer, released back to the camera when dropped.
pub struct LineGuard<'a, C: StreamCamera + ?Sized> {
    camera: &'a mut C,
}

impl<'a, C: StreamCamera + ?Sized> Deref for LineGuard<'a, C> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.camera.line_buffer()
    }
}

impl<'a, C: StreamCamera + ?Sized> Drop for LineGuard<'a, C> {
    fn drop(&mut self) {
        self.camera.release_line_buffer();
    }
}

/// Try to take the next line buffer.
pub fn lock_line<C: StreamCamera + ?Sized>(camera: &mut C) -> Option<LineGuard<'_, C>> {
    if camera.acquire_line_buffer() {
        Some(LineGuard { camera })
    } else {
        None
    }
}

/// Sensor registers written after the vendor setup.
pub fn sensor_config() -> RegMap {
    let mut reg_vals = RegMap::new();

    // Run the pixel clock undivided, a slower clock overflows the stream at this frame size
    reg_vals.insert(Register::CLK_RC, 0x00).ok();

    reg_vals
}

/// Initialize the camera.
/// * Runs the peripheral setup for streaming DMA.
/// * Checks the sensor identity over SCCB.
/// * Applies `sensor_config`.
pub fn init<C, I2C, E>(
    camera: &mut C,
    i2c: &mut I2C,
    settings: &CameraSettings,
) -> Result<()>
where
    C: StreamCamera,
    I2C: i2c::Read<Error = E> + i2c::Write<Error = E>,
{
    info!("Init Camera.");
    camera.setup(settings).map_err(|code| {
        error!("Error returned from setting up camera. Error {}", code);
        InitFailure::Camera(code)
    })?;

    let sccb = Sccb::new(i2c);
    let sensor_err = |err: SccbError<E>| {
        let fault = SensorFault::from(err);
        error!("Sensor configuration failed: {:?}", fault);
        InitFailure::Sensor(fault)
    };
    sccb.check_id(i2c).map_err(sensor_err)?;
    sccb.apply_config(i2c, &sensor_config(), true)
        .map_err(sensor_err)?;

    info!(
        "Camera ready: {}x{} at {} Hz",
        settings.width, settings.height, settings.freq_hz
    );
    Ok(())
}
