//! Single pass over the camera stream producing both the CNN input and the display image.

use log::{debug, error};

use super::{lock_line, StreamCamera, BYTES_PER_PIXEL};
use crate::config::PollLimit;
use crate::error::{Error, Result};
use crate::pixel::{encode_accelerator_word, encode_rgb565};

/// What one capture wrote.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CaptureReport {
    /// Lines drained from the camera.
    pub lines: u16,
    /// CNN words written into the frame buffer.
    pub words: usize,
    /// Bytes written into the display buffer.
    pub display_bytes: usize,
}

/// Capture one frame.
///
/// Every pixel is written to `frame` as a CNN word and, when `display` is given, to `display`
/// as a big-endian RGB565 sample. Each sink stops filling when it is full, independently of the
/// other; the rest of the frame is dropped for that sink. A frame that overflowed in the camera
/// is reported as `Error::CaptureOverflow`, one that ended before its last line as
/// `Error::CaptureIncomplete`. The buffers of either must not be used.
pub fn capture<C: StreamCamera + ?Sized>(
    camera: &mut C,
    frame: &mut [u32],
    mut display: Option<&mut [u8]>,
    line_wait: PollLimit,
) -> Result<CaptureReport> {
    camera.start_frame();

    let (width, height) = camera.dimensions();
    debug!(
        "W:{} H:{} L:{}",
        width,
        height,
        width as usize * height as usize * BYTES_PER_PIXEL
    );

    let mut report = CaptureReport::default();

    for row in 0..height {
        let mut polls = 0;
        let line = loop {
            if let Some(line) = lock_line(&mut *camera) {
                break Some(line);
            }
            if camera.is_frame_complete() {
                break None;
            }
            polls += 1;
            if line_wait.exhausted(polls) {
                error!("No line buffer for line {} after {} polls", row, polls);
                return Err(Error::CaptureTimeout { line: row });
            }
        };
        let line = match line {
            Some(line) => line,
            None => break,
        };

        for px in line.chunks_exact(BYTES_PER_PIXEL).take(width as usize) {
            let (r, g, b) = (px[0], px[1], px[2]);

            if let Some(slot) = frame.get_mut(report.words) {
                *slot = encode_accelerator_word(r, g, b);
                report.words += 1;
            }

            if let Some(buf) = display.as_deref_mut() {
                let at = report.display_bytes;
                if let Some(dst) = buf.get_mut(at..at + 2) {
                    dst.copy_from_slice(&encode_rgb565(r, g, b).to_be_bytes());
                    report.display_bytes += 2;
                }
            }
        }

        report.lines += 1;
    }

    let overflow_count = camera.overflow_count();
    if overflow_count > 0 {
        error!("OVERFLOW DISP = {}", overflow_count);
        return Err(Error::CaptureOverflow {
            overflow_count,
            lines: report.lines,
        });
    }

    if report.lines < height {
        error!("Frame ended after {} of {} lines", report.lines, height);
        return Err(Error::CaptureIncomplete {
            lines: report.lines,
            expected: height,
        });
    }

    Ok(report)
}
