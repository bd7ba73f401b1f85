//! Build-time configuration and the runtime policy knobs of the pipeline.

/// Number of horizontal pixels captured from the camera.
pub const IMAGE_WIDTH: u16 = 64 * 2;

/// Number of vertical pixels captured from the camera.
pub const IMAGE_HEIGHT: u16 = 64 * 2;

/// Camera clock frequency in Hz.
pub const CAMERA_FREQ_HZ: u32 = 5 * 1000 * 1000;

/// Number of 32-bit words the CNN input FIFO consumes per frame.
pub const INPUT_WORDS: usize = 16384;

/// Size of the RGB565 display buffer in bytes (2 bytes per pixel).
pub const DATA565_SIZE: usize = (IMAGE_WIDTH as usize) * (IMAGE_HEIGHT as usize) * 2;

/// Number of classes the network distinguishes.
pub const NUM_CLASSES: usize = 2;

/// Human readable class labels, indexed by the network's output index.
pub const CLASS_NAMES: [&str; NUM_CLASSES] = ["Horse", "Human"];

/// Fractional bits of the raw accelerator outputs (Q17.14).
pub const OUTPUT_FRAC_BITS: u8 = 14;

/// Time between frames in live feed mode in milliseconds.
pub const LIVE_FEED_DELAY_MS: u32 = 50;

/// Number of button polls that make a press a "hold".
pub const LONG_PRESS_POLLS: u32 = 10;

/// Time between button polls while detecting a hold in milliseconds.
pub const LONG_PRESS_POLL_MS: u32 = 100;

/// Debounce after leaving live feed mode in milliseconds.
pub const EXIT_DEBOUNCE_MS: u32 = 500;

/// What the orchestrator does with a frame the camera overflowed on or cut short.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OverflowPolicy {
    /// Latch the pipeline in `OverflowHalt` until an operator clears it.
    Halt,
    /// Drop the frame and report the overflow, the next cycle starts fresh.
    Skip,
    /// Recapture up to `attempts` more times before reporting the overflow.
    Retry { attempts: u8 },
}

/// Upper bound on a polling loop that waits for hardware.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PollLimit {
    /// Wait forever.
    Unbounded,
    /// Give up after this many polls.
    Bounded(u32),
}

impl PollLimit {
    /// `true` once `polls` has used up the allowance.
    pub fn exhausted(self, polls: u32) -> bool {
        match self {
            PollLimit::Unbounded => false,
            PollLimit::Bounded(max) => polls >= max,
        }
    }
}

/// Runtime policy for a `Pipeline`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PipelineConfig {
    /// Handling of broken frames in single-shot cycles.
    pub overflow_policy: OverflowPolicy,
    /// Handling of broken frames in live mode.
    pub live_overflow_policy: OverflowPolicy,
    /// Bound on polls while waiting for a camera line buffer.
    pub line_wait: PollLimit,
    /// Bound on polls of the CNN FIFO-full flag before each word.
    pub fifo_wait: PollLimit,
    /// Bound on sleeps while waiting for the CNN completion interrupt. The wait arms a
    /// periodic wakeup, on the board one sleep is at most 1 ms.
    pub completion_wait: PollLimit,
    /// Fractional bits of the raw accelerator outputs.
    pub output_frac_bits: u8,
}

impl PipelineConfig {
    /// The firmware defaults: a broken frame halts single-shot mode and is dropped in live
    /// mode, hardware waits are bounded.
    pub const fn new() -> Self {
        PipelineConfig {
            overflow_policy: OverflowPolicy::Halt,
            live_overflow_policy: OverflowPolicy::Skip,
            line_wait: PollLimit::Bounded(1_000_000),
            fifo_wait: PollLimit::Bounded(100_000),
            completion_wait: PollLimit::Bounded(10_000),
            output_frac_bits: OUTPUT_FRAC_BITS,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}
