//! Errors reported by the capture and inference pipeline.

use crate::cnn::CnnState;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Status code returned by a failing vendor CNN library call.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct EngineFault(pub i32);

/// Failures talking to the image sensor over SCCB.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SensorFault {
    /// The I2C transaction itself failed.
    Bus,
    /// Manufacturer ID mismatch.
    ManufacturerId,
    /// Product ID mismatch.
    ProductId,
    /// Register write-readback mismatch: (register, value read back).
    RegMismatch(u8, u8),
}

/// Hardware refused to come up. Nothing can be captured or classified after one of these.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum InitFailure {
    /// Vendor camera setup returned this status.
    #[error("camera: setup failed ({0})")]
    Camera(i32),
    /// Sensor identification or configuration failed.
    #[error("sensor: {0:?}")]
    Sensor(SensorFault),
    /// The CNN could not be enabled, loaded or configured.
    #[error("cnn: initialization failed ({0})")]
    Accelerator(EngineFault),
}

/// Pipeline errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// The camera produced data faster than it was drained, the frame is garbage.
    #[error("camera: overflow count {overflow_count} after {lines} lines")]
    CaptureOverflow { overflow_count: u32, lines: u16 },
    /// The camera reported the frame complete before all lines were drained.
    #[error("camera: frame ended after {lines} of {expected} lines")]
    CaptureIncomplete { lines: u16, expected: u16 },
    /// No line buffer arrived within the configured poll limit.
    #[error("camera: no line buffer for line {line}")]
    CaptureTimeout { line: u16 },
    /// The CNN input FIFO stayed full past the poll limit after `written` words.
    #[error("cnn: input FIFO stuck full after {written} words")]
    FifoTimeout { written: usize },
    /// The CNN completion interrupt never arrived.
    #[error("cnn: completion interrupt never fired")]
    InferenceTimeout,
    /// `op` is not allowed while the CNN driver is in `state`.
    #[error("cnn: {op} while {state:?}")]
    InvalidState { op: &'static str, state: CnnState },
    /// A vendor CNN call failed outside of initialization.
    #[error("cnn: library call failed ({0})")]
    Accelerator(EngineFault),
    /// Camera, sensor or CNN initialization failed.
    #[error(transparent)]
    Init(#[from] InitFailure),
    /// The pipeline is latched after a broken frame and needs `clear_halt`.
    #[error("pipeline halted after a broken frame")]
    Halted,
}

impl Error {
    /// Whether the next cycle may succeed without operator intervention.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::CaptureOverflow { .. }
                | Error::CaptureIncomplete { .. }
                | Error::CaptureTimeout { .. }
                | Error::FifoTimeout { .. }
                | Error::InferenceTimeout
        )
    }

    /// The frame itself is unusable, the overflow policy decides what happens next.
    pub fn is_broken_frame(&self) -> bool {
        matches!(
            self,
            Error::CaptureOverflow { .. } | Error::CaptureIncomplete { .. }
        )
    }
}
