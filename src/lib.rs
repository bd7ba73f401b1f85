//! Camera capture and CNN inference for the MAX78000.
//!
//! Frames stream out of the camera one line at a time and are converted in a single pass into
//! the CNN input format and an RGB565 display image. The CNN driver streams the frame through
//! the accelerator FIFO, sleeps until the completion interrupt and reduces the raw outputs to a
//! class and a confidence. `pipeline` sequences both once per frame.

#![cfg_attr(not(test), no_std)]

pub mod camera;
pub mod cnn;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod pixel;
pub mod report;

/// MAX78000 board support, only available with the `firmware` feature.
#[cfg(all(feature = "firmware", not(test)))]
pub mod board;

#[cfg(test)]
mod mock;

pub use error::{Error, Result};
