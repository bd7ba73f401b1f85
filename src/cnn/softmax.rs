//! Reduction of raw CNN outputs into a ranked classification.

use core::time::Duration;

use crate::config::NUM_CLASSES;

/// Full scale of a Q15 probability.
pub const Q15_ONE: i32 = 1 << 15;

/// Power-of-two softmax over fixed-point logits with `frac_bits` fractional bits, producing
/// Q15 probabilities that sum to roughly `Q15_ONE`.
///
/// Logits more than 16 units below the maximum come out as 0. `frac_bits` is clamped to
/// `1..=24`. `output` must be at least as long as `input`.
pub fn softmax_q15(input: &[i32], frac_bits: u8, output: &mut [i16]) {
    let frac = frac_bits.max(1).min(24) as u32;
    let one = 1i64 << frac;
    let half = one >> 1;

    let max = match input.iter().max() {
        Some(max) => *max as i64,
        None => return,
    };
    let base = max - 16 * one;

    // Every term is at most 1 << 16 and the maximum always contributes it
    let sum: i64 = input
        .iter()
        .map(|v| *v as i64)
        .filter(|v| *v > base)
        .map(|v| 1i64 << ((half + v - base) >> frac))
        .sum();

    let output_base = (1i64 << 32) / sum;

    for (out, v) in output.iter_mut().zip(input.iter().map(|v| *v as i64)) {
        *out = if v > base {
            // Between 1 (the maximum) and 17
            let shift = 17 + ((half - 1 + base - v) >> frac);
            (output_base >> shift).min(i16::MAX as i64) as i16
        } else {
            0
        };
    }
}

/// Index of the largest value, the first one wins on ties.
pub fn argmax(values: &[i16]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Q15 probability to a rounded percentage.
pub fn percent(p: i16) -> u8 {
    let p = p.max(0) as u32;
    ((p * 100 + 0x4000) >> 15).min(100) as u8
}

/// Q15 probability to rounded tenths of a percent.
pub fn permille(p: i16) -> u16 {
    let p = p.max(0) as u32;
    ((p * 1000 + 0x4000) >> 15).min(1000) as u16
}

/// Outcome of one inference.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InferenceResult<const M: usize = NUM_CLASSES> {
    /// Raw fixed-point CNN outputs.
    pub raw_output: [i32; M],
    /// Q15 probabilities.
    pub softmax: [i16; M],
    /// Index of the most probable class.
    pub predicted_class: usize,
    /// Probability of `predicted_class` in percent.
    pub confidence_percent: u8,
    /// Inference time in microseconds as measured by the completion interrupt.
    pub elapsed_us: u32,
}

impl<const M: usize> InferenceResult<M> {
    /// Run the softmax and pick the winning class.
    pub fn reduce(raw_output: [i32; M], frac_bits: u8, elapsed_us: u32) -> Self {
        let mut softmax = [0i16; M];
        softmax_q15(&raw_output, frac_bits, &mut softmax);

        let predicted_class = argmax(&softmax);
        let confidence_percent = softmax.get(predicted_class).copied().map_or(0, percent);

        InferenceResult {
            raw_output,
            softmax,
            predicted_class,
            confidence_percent,
            elapsed_us,
        }
    }

    /// Probability of `class` in tenths of a percent.
    pub fn permille(&self, class: usize) -> u16 {
        self.softmax.get(class).copied().map_or(0, permille)
    }

    /// Inference time.
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.elapsed_us as u64)
    }
}
