//! Classification report written to the log.

use core::fmt::Write;

use heapless::String;
use log::info;

use crate::cnn::InferenceResult;
use crate::config::CLASS_NAMES;
use crate::pipeline::FrameReport;

/// One formatted report line.
pub type Line = String<64>;

/// Label of `class`, `"?"` for indices the network does not have.
pub fn class_name(class: usize) -> &'static str {
    CLASS_NAMES.get(class).copied().unwrap_or("?")
}

/// `[   raw] -> name: xx.x%` for one class.
pub fn class_line(result: &InferenceResult, class: usize) -> Line {
    let mut line = Line::new();
    let raw = result.raw_output.get(class).copied().unwrap_or(0);
    let permille = result.permille(class);
    // Truncated to the line length, never fails otherwise
    write!(
        line,
        "[{:7}] -> {}: {}.{}%",
        raw,
        class_name(class),
        permille / 10,
        permille % 10
    )
    .ok();
    line
}

/// `name (xx% confidence)` for the winning class.
pub fn prediction_line(result: &InferenceResult) -> Line {
    let mut line = Line::new();
    write!(
        line,
        "{} ({}% confidence)",
        class_name(result.predicted_class),
        result.confidence_percent
    )
    .ok();
    line
}

/// Log the full classification: every class, the prediction and the inference time.
pub fn log_result(result: &InferenceResult) {
    info!("Classification results:");
    for class in 0..result.raw_output.len() {
        info!("{}", class_line(result, class));
    }
    info!("Prediction: {}", prediction_line(result));
    info!("Approximate inference time: {} us", result.elapsed_us);
}

/// Log the one-line status of a live feed frame.
pub fn log_live_frame(report: &FrameReport) {
    info!("{}", live_line(report));
}

/// `frame n | name (xx%)`.
pub fn live_line(report: &FrameReport) -> Line {
    let mut line = Line::new();
    write!(
        line,
        "frame {} | {} ({}%)",
        report.capture_id,
        class_name(report.result.predicted_class),
        report.result.confidence_percent
    )
    .ok();
    line
}
