//! Capture, inference and reporting sequenced once per frame.

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::digital::v2::InputPin;
use log::{error, info, warn};

use crate::camera::{self, CaptureReport, StreamCamera};
use crate::cnn::{CnnDriver, CnnEngine, FifoPort, Idle, InferenceResult};
#[cfg(feature = "display")]
use crate::config::DATA565_SIZE;
use crate::config::{
    OverflowPolicy, PipelineConfig, EXIT_DEBOUNCE_MS, INPUT_WORDS, LIVE_FEED_DELAY_MS,
    LONG_PRESS_POLLS, LONG_PRESS_POLL_MS,
};
use crate::error::{Error, Result};

/// Where the pipeline is in the current cycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PipelineState {
    Idle,
    Capturing,
    Loading,
    Running,
    Reporting,
    /// Latched after a camera overflow, see `Pipeline::clear_halt`.
    OverflowHalt,
}

/// Operating mode picked with the push button.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    /// One frame per press.
    Single,
    /// Frames back to back until the next press.
    Live,
}

/// The statically allocated buffers reused by every cycle.
///
/// `words` feeds the CNN FIFO and `display` holds the same image as big-endian RGB565. Both
/// are overwritten by the next capture, readers must be done with them before that.
pub struct FrameArena {
    /// One frame in the CNN input format.
    pub words: [u32; INPUT_WORDS],

    /// One frame as RGB565 for the display.
    #[cfg(feature = "display")]
    pub display: [u8; DATA565_SIZE],
}

impl FrameArena {
    /// Creates a zeroed arena, `const` so it can live in a `static`.
    pub const fn new() -> Self {
        FrameArena {
            words: [0; INPUT_WORDS],
            #[cfg(feature = "display")]
            display: [0; DATA565_SIZE],
        }
    }

    /// The display image, if this build produces one.
    pub fn display(&self) -> Option<&[u8]> {
        #[cfg(feature = "display")]
        return Some(&self.display);

        #[cfg(not(feature = "display"))]
        return None;
    }

    /// Both capture sinks.
    fn sinks(&mut self) -> (&mut [u32], Option<&mut [u8]>) {
        #[cfg(feature = "display")]
        return (&mut self.words, Some(&mut self.display));

        #[cfg(not(feature = "display"))]
        return (&mut self.words, None);
    }
}

impl Default for FrameArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one successful cycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameReport {
    /// Running capture number, starting at 1.
    pub capture_id: u32,
    /// What the capture wrote into the arena.
    pub capture: CaptureReport,
    /// The classification.
    pub result: InferenceResult,
}

/// The orchestrator. Owns the camera, the CNN driver and the frame arena.
pub struct Pipeline<'a, 't, C, E, F, I> {
    camera: C,
    cnn: CnnDriver<'t, E, F, I>,
    arena: &'a mut FrameArena,
    config: PipelineConfig,
    state: PipelineState,
    /// Number of cycles started. Increases forever.
    captures: u32,
}

impl<'a, 't, C, E, F, I> Pipeline<'a, 't, C, E, F, I>
where
    C: StreamCamera,
    E: CnnEngine,
    F: FifoPort,
    I: Idle,
{
    /// Creates an idle pipeline. The camera and the CNN must already be initialized.
    pub fn new(
        camera: C,
        cnn: CnnDriver<'t, E, F, I>,
        arena: &'a mut FrameArena,
        config: PipelineConfig,
    ) -> Self {
        Pipeline {
            camera,
            cnn,
            arena,
            config,
            state: PipelineState::Idle,
            captures: 0,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Buffers of the last captured frame.
    pub fn arena(&self) -> &FrameArena {
        &*self.arena
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    pub fn cnn(&self) -> &CnnDriver<'t, E, F, I> {
        &self.cnn
    }

    pub fn cnn_mut(&mut self) -> &mut CnnDriver<'t, E, F, I> {
        &mut self.cnn
    }

    /// Leave `OverflowHalt`, the operator has dealt with the camera.
    pub fn clear_halt(&mut self) {
        if self.state == PipelineState::OverflowHalt {
            info!("Overflow halt cleared");
            self.state = PipelineState::Idle;
        }
    }

    /// Capture one frame and classify it.
    ///
    /// A frame the camera overflowed on or cut short never reaches the CNN. Depending on
    /// `overflow_policy` the pipeline then latches in `OverflowHalt`, recaptures, or reports
    /// the broken frame.
    pub fn run_single(&mut self) -> Result<FrameReport> {
        self.run_cycle(self.config.overflow_policy)
    }

    fn run_cycle(&mut self, policy: OverflowPolicy) -> Result<FrameReport> {
        if self.state == PipelineState::OverflowHalt {
            error!("Pipeline halted after a broken frame");
            return Err(Error::Halted);
        }

        self.captures = self.captures.wrapping_add(1);
        let outcome = self.cycle(policy);
        if self.state != PipelineState::OverflowHalt {
            self.state = PipelineState::Idle;
        }
        outcome
    }

    fn cycle(&mut self, policy: OverflowPolicy) -> Result<FrameReport> {
        info!("Capture #{}", self.captures);
        let capture = self.capture(policy)?;

        // The CNN consumes its input while running, so it is started before the FIFO is fed
        self.state = PipelineState::Loading;
        self.cnn.start()?;
        self.cnn.load_input(&self.arena.words)?;

        self.state = PipelineState::Running;
        let result = self.cnn.wait()?;

        self.state = PipelineState::Reporting;
        Ok(FrameReport {
            capture_id: self.captures,
            capture,
            result,
        })
    }

    fn capture(&mut self, policy: OverflowPolicy) -> Result<CaptureReport> {
        let mut retries = match policy {
            OverflowPolicy::Retry { attempts } => attempts,
            _ => 0,
        };

        loop {
            self.state = PipelineState::Capturing;
            let (words, display) = self.arena.sinks();
            let err = match camera::capture(&mut self.camera, words, display, self.config.line_wait) {
                Err(err) if err.is_broken_frame() => err,
                other => return other,
            };

            match policy {
                OverflowPolicy::Halt => {
                    error!("Broken frame! Halting. ({})", err);
                    self.state = PipelineState::OverflowHalt;
                    return Err(err);
                }
                OverflowPolicy::Retry { .. } if retries > 0 => {
                    retries -= 1;
                    warn!("Broken frame, recapturing ({} retries left)", retries);
                }
                _ => {
                    warn!("Broken frame dropped ({})", err);
                    return Err(err);
                }
            }
        }
    }

    /// Wait for a button press and pick the mode: holding the button for
    /// `LONG_PRESS_POLLS` polls selects `Mode::Live`, anything shorter `Mode::Single`.
    /// Returns once the button is released.
    pub fn select_mode<B, D>(&mut self, button: &B, delay: &mut D) -> Mode
    where
        B: InputPin,
        D: DelayMs<u32>,
    {
        while !is_pressed(button) {}

        let mut held = 0;
        while is_pressed(button) && held < LONG_PRESS_POLLS {
            delay.delay_ms(LONG_PRESS_POLL_MS);
            held += 1;
        }

        if held < LONG_PRESS_POLLS || !cfg!(feature = "live-feed") {
            return Mode::Single;
        }

        while is_pressed(button) {
            delay.delay_ms(LONG_PRESS_POLL_MS);
        }
        Mode::Live
    }

    /// Classify frames back to back until the button is pressed. The button is checked once per
    /// cycle, a frame in flight always completes. `on_frame` sees every classified frame along
    /// with its buffers. Returns the number of frames classified.
    ///
    /// Broken frames are handled with `live_overflow_policy`. Recoverable errors drop the frame
    /// and the loop carries on, anything else ends live mode.
    pub fn run_live<B, D, H>(&mut self, button: &B, delay: &mut D, mut on_frame: H) -> Result<u32>
    where
        B: InputPin,
        D: DelayMs<u32>,
        H: FnMut(&FrameReport, &FrameArena),
    {
        info!("Live feed, press the button to exit");
        let mut frames: u32 = 0;

        loop {
            if is_pressed(button) {
                info!("Exiting live feed after {} frames", frames);
                delay.delay_ms(EXIT_DEBOUNCE_MS);
                return Ok(frames);
            }

            match self.run_cycle(self.config.live_overflow_policy) {
                Ok(report) => {
                    frames += 1;
                    on_frame(&report, &*self.arena);
                }
                Err(err) if err.is_recoverable() && self.state != PipelineState::OverflowHalt => {
                    continue;
                }
                Err(err) => return Err(err),
            }

            delay.delay_ms(LIVE_FEED_DELAY_MS);
        }
    }
}

/// Button level, a read error counts as released.
fn is_pressed<B: InputPin>(button: &B) -> bool {
    button.is_high().unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cnn::{CnnState, InferenceTimer};
    use crate::config::{PollLimit, IMAGE_HEIGHT, IMAGE_WIDTH};
    use crate::mock::{Call, MockButton, MockCamera, MockDelay, MockEngine, MockFifo, SignalAfter};
    use crate::pixel::decode_accelerator_word;

    type TestPipeline<'a, 't> = Pipeline<'a, 't, MockCamera, MockEngine, MockFifo, SignalAfter<'t>>;

    fn pipeline<'a, 't>(
        camera: MockCamera,
        raw: &[i32],
        timer: &'t InferenceTimer,
        arena: &'a mut FrameArena,
        config: PipelineConfig,
    ) -> TestPipeline<'a, 't> {
        let mut cnn = CnnDriver::new(
            MockEngine::new(raw),
            MockFifo::new(),
            SignalAfter::new(timer, 2, 1800),
            timer,
            &config,
        );
        cnn.initialize().unwrap();
        Pipeline::new(camera, cnn, arena, config)
    }

    fn camera() -> MockCamera {
        MockCamera::gradient(IMAGE_WIDTH, IMAGE_HEIGHT)
    }

    fn policy(overflow_policy: OverflowPolicy) -> PipelineConfig {
        PipelineConfig {
            overflow_policy,
            ..PipelineConfig::new()
        }
    }

    #[test]
    fn classifies_a_full_frame() {
        let timer = InferenceTimer::new();
        let mut arena = FrameArena::new();
        let config = PipelineConfig {
            output_frac_bits: 8,
            ..PipelineConfig::new()
        };
        let mut pipe = pipeline(camera(), &[1000, -500], &timer, &mut arena, config);

        let report = pipe.run_single().unwrap();
        assert_eq!(report.capture_id, 1);
        assert_eq!(report.capture.lines, IMAGE_HEIGHT);
        assert_eq!(report.capture.words, INPUT_WORDS);
        assert_eq!(report.result.predicted_class, 0);
        assert!(report.result.confidence_percent >= 90);
        assert_eq!(report.result.elapsed_us, 1800);
        assert_eq!(pipe.state(), PipelineState::Idle);
        assert_eq!(pipe.cnn().state(), CnnState::Ready);

        // The whole frame went through the FIFO in capture order
        let fed = &pipe.cnn().fifo_port().written;
        assert_eq!(fed.len(), INPUT_WORDS);
        assert_eq!(&fed[..], &pipe.arena().words[..]);
        assert_eq!(decode_accelerator_word(fed[130]), MockCamera::gradient_pixel(1, 2));

        // Same input, same answer
        let again = pipe.run_single().unwrap();
        assert_eq!(again.capture_id, 2);
        assert_eq!(again.result, report.result);
    }

    #[cfg(feature = "display")]
    #[test]
    fn display_buffer_is_filled_in_the_same_pass() {
        let timer = InferenceTimer::new();
        let mut arena = FrameArena::new();
        let mut pipe = pipeline(camera(), &[0, 0], &timer, &mut arena, PipelineConfig::new());

        let report = pipe.run_single().unwrap();
        assert_eq!(report.capture.display_bytes, DATA565_SIZE);
        let display = pipe.arena().display().unwrap();
        let (r, g, b) = MockCamera::gradient_pixel(0, 1);
        let raw = crate::pixel::encode_rgb565(r, g, b);
        assert_eq!(&display[2..4], &raw.to_be_bytes());
    }

    #[test]
    fn overflow_never_reaches_the_cnn() {
        let timer = InferenceTimer::new();
        let mut arena = FrameArena::new();
        let mut cam = camera();
        cam.overflow = 4;
        let mut pipe = pipeline(cam, &[1, 2], &timer, &mut arena, PipelineConfig::new());

        let err = pipe.run_single().unwrap_err();
        assert_eq!(
            err,
            Error::CaptureOverflow {
                overflow_count: 4,
                lines: IMAGE_HEIGHT
            }
        );
        assert_eq!(pipe.state(), PipelineState::OverflowHalt);
        assert_eq!(pipe.cnn().engine().count(Call::Start), 0);
        assert!(pipe.cnn().fifo_port().written.is_empty());

        // Latched until cleared
        assert_eq!(pipe.run_single(), Err(Error::Halted));
        assert_eq!(pipe.camera().starts, 1);

        pipe.clear_halt();
        assert_eq!(pipe.state(), PipelineState::Idle);
    }

    #[test]
    fn short_frame_never_reaches_the_cnn() {
        let timer = InferenceTimer::new();
        let mut arena = FrameArena::new();
        let mut cam = camera();
        cam.deliver_lines = 3;
        let mut pipe = pipeline(cam, &[1, 2], &timer, &mut arena, policy(OverflowPolicy::Skip));

        assert_eq!(
            pipe.run_single(),
            Err(Error::CaptureIncomplete {
                lines: 3,
                expected: IMAGE_HEIGHT
            })
        );
        assert_eq!(pipe.state(), PipelineState::Idle);
        assert_eq!(pipe.cnn().engine().count(Call::Start), 0);
        assert!(pipe.cnn().fifo_port().written.is_empty());
    }

    #[test]
    fn short_frame_halts_by_default() {
        let timer = InferenceTimer::new();
        let mut arena = FrameArena::new();
        let mut cam = camera();
        cam.deliver_lines = 0;
        let mut pipe = pipeline(cam, &[1, 2], &timer, &mut arena, PipelineConfig::new());

        assert!(matches!(
            pipe.run_single(),
            Err(Error::CaptureIncomplete { lines: 0, .. })
        ));
        assert_eq!(pipe.state(), PipelineState::OverflowHalt);
        assert_eq!(pipe.cnn().engine().count(Call::Start), 0);
    }

    #[test]
    fn skip_policy_reports_and_stays_idle() {
        let timer = InferenceTimer::new();
        let mut arena = FrameArena::new();
        let mut cam = camera();
        cam.overflow = 1;
        cam.overflow_once = true;
        let mut pipe = pipeline(cam, &[5, 1], &timer, &mut arena, policy(OverflowPolicy::Skip));

        assert!(matches!(pipe.run_single(), Err(Error::CaptureOverflow { .. })));
        assert_eq!(pipe.state(), PipelineState::Idle);
        assert_eq!(pipe.cnn().engine().count(Call::Start), 0);

        let report = pipe.run_single().unwrap();
        assert_eq!(report.capture_id, 2);
    }

    #[test]
    fn retry_policy_recaptures() {
        let timer = InferenceTimer::new();
        let mut arena = FrameArena::new();
        let mut cam = camera();
        cam.overflow = 1;
        cam.overflow_once = true;
        let config = policy(OverflowPolicy::Retry { attempts: 2 });
        let mut pipe = pipeline(cam, &[5, 1], &timer, &mut arena, config);

        let report = pipe.run_single().unwrap();
        assert_eq!(report.capture_id, 1);
        assert_eq!(pipe.camera().starts, 2);
        assert_eq!(pipe.cnn().engine().count(Call::Start), 1);
    }

    #[test]
    fn retry_policy_gives_up() {
        let timer = InferenceTimer::new();
        let mut arena = FrameArena::new();
        let mut cam = camera();
        cam.overflow = 1;
        let config = policy(OverflowPolicy::Retry { attempts: 2 });
        let mut pipe = pipeline(cam, &[5, 1], &timer, &mut arena, config);

        assert!(matches!(pipe.run_single(), Err(Error::CaptureOverflow { .. })));
        assert_eq!(pipe.camera().starts, 3);
        assert_eq!(pipe.state(), PipelineState::Idle);
        assert_eq!(pipe.cnn().engine().count(Call::Start), 0);
    }

    #[test]
    fn cnn_timeout_aborts_the_cycle_only() {
        let timer = InferenceTimer::new();
        let mut arena = FrameArena::new();
        let config = PipelineConfig {
            completion_wait: PollLimit::Bounded(1),
            ..PipelineConfig::new()
        };
        let mut pipe = pipeline(camera(), &[5, 1], &timer, &mut arena, config);

        // The mock interrupt needs two sleeps
        assert_eq!(pipe.run_single(), Err(Error::InferenceTimeout));
        assert_eq!(pipe.state(), PipelineState::Idle);
        assert_eq!(pipe.cnn().state(), CnnState::Configured);
        assert_eq!(pipe.cnn().engine().count(Call::Stop), 1);
    }

    #[test]
    fn short_press_selects_single() {
        let timer = InferenceTimer::new();
        let mut arena = FrameArena::new();
        let mut pipe = pipeline(camera(), &[0, 0], &timer, &mut arena, PipelineConfig::new());
        let button = MockButton::new(&[false, false, true, true, true, false]);
        let mut delay = MockDelay::default();

        assert_eq!(pipe.select_mode(&button, &mut delay), Mode::Single);
        assert_eq!(delay.delays, [LONG_PRESS_POLL_MS; 2]);
    }

    #[cfg(feature = "live-feed")]
    #[test]
    fn long_press_selects_live() {
        let timer = InferenceTimer::new();
        let mut arena = FrameArena::new();
        let mut pipe = pipeline(camera(), &[0, 0], &timer, &mut arena, PipelineConfig::new());
        let mut script = [true; 14];
        script[0] = false;
        script[13] = false;
        let button = MockButton::new(&script);
        let mut delay = MockDelay::default();

        assert_eq!(pipe.select_mode(&button, &mut delay), Mode::Live);
        assert_eq!(button.reads(), 14);
    }

    #[test]
    fn live_feed_stops_at_cycle_boundary() {
        let timer = InferenceTimer::new();
        let mut arena = FrameArena::new();
        let mut pipe = pipeline(camera(), &[9000, 100], &timer, &mut arena, PipelineConfig::new());
        let button = MockButton::new(&[false, false, false, true]);
        let mut delay = MockDelay::default();

        let mut seen = Vec::new();
        let frames = pipe
            .run_live(&button, &mut delay, |report, arena| {
                assert_eq!(arena.words.len(), INPUT_WORDS);
                seen.push(report.capture_id);
            })
            .unwrap();

        assert_eq!(frames, 3);
        assert_eq!(seen, [1, 2, 3]);
        assert_eq!(
            delay.delays,
            [LIVE_FEED_DELAY_MS, LIVE_FEED_DELAY_MS, LIVE_FEED_DELAY_MS, EXIT_DEBOUNCE_MS]
        );
        assert_eq!(pipe.state(), PipelineState::Idle);
    }

    #[test]
    fn live_feed_skips_dropped_frames_by_default() {
        let timer = InferenceTimer::new();
        let mut arena = FrameArena::new();
        let mut cam = camera();
        cam.overflow = 1;
        cam.overflow_once = true;
        let mut pipe = pipeline(cam, &[9000, 100], &timer, &mut arena, PipelineConfig::new());
        let button = MockButton::new(&[false, false, false, true]);
        let mut delay = MockDelay::default();

        let mut seen = Vec::new();
        let frames = pipe
            .run_live(&button, &mut delay, |report, _| seen.push(report.capture_id))
            .unwrap();
        assert_eq!(frames, 2);
        assert_eq!(seen, [2, 3]);
        assert_eq!(pipe.camera().starts, 3);
        assert_eq!(pipe.state(), PipelineState::Idle);

        // Single shot still halts on the same fault
        pipe.camera.overflow = 1;
        pipe.camera.overflow_once = false;
        assert!(pipe.run_single().is_err());
        assert_eq!(pipe.state(), PipelineState::OverflowHalt);
    }

    #[test]
    fn live_feed_ends_on_halt() {
        let timer = InferenceTimer::new();
        let mut arena = FrameArena::new();
        let mut cam = camera();
        cam.overflow = 1;
        let config = PipelineConfig {
            live_overflow_policy: OverflowPolicy::Halt,
            ..PipelineConfig::new()
        };
        let mut pipe = pipeline(cam, &[9000, 100], &timer, &mut arena, config);
        let button = MockButton::new(&[]);
        let mut delay = MockDelay::default();

        assert!(matches!(
            pipe.run_live(&button, &mut delay, |_, _| {}),
            Err(Error::CaptureOverflow { .. })
        ));
        assert_eq!(pipe.state(), PipelineState::OverflowHalt);
        assert!(delay.delays.is_empty());
    }
}
