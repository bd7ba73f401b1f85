//! Load / run / unload sequencing for the CNN accelerator.

use log::{debug, error, info};

use super::{CnnEngine, EngineResult, FifoPort, Idle, InferenceResult, InferenceTimer};
use crate::config::{PipelineConfig, PollLimit};
use crate::error::{Error, InitFailure, Result};

/// Where the accelerator is in its load / run / unload cycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CnnState {
    /// Not initialized since power up.
    Uninitialized,
    /// Weights, biases and layers loaded, nothing queued.
    Configured,
    /// Input written to the FIFO, not started yet.
    Loaded,
    /// Started, waiting for the completion interrupt.
    Running,
    /// Finished, results read back.
    Ready,
    /// Powered down.
    Disabled,
}

/// CNN driver. Owns the vendor library handle, the input FIFO and the low power wait, and
/// shares the completion timer with the CNN interrupt.
pub struct CnnDriver<'t, E, F, I> {
    engine: E,
    fifo: F,
    idle: I,
    timer: &'t InferenceTimer,
    state: CnnState,
    /// Weights and biases are in CNN memory.
    weights_loaded: bool,
    fifo_wait: PollLimit,
    completion_wait: PollLimit,
    output_frac_bits: u8,
}

impl<'t, E, F, I> CnnDriver<'t, E, F, I>
where
    E: CnnEngine,
    F: FifoPort,
    I: Idle,
{
    /// Creates a driver, the CNN is left untouched until `initialize`.
    pub fn new(engine: E, fifo: F, idle: I, timer: &'t InferenceTimer, config: &PipelineConfig) -> Self {
        CnnDriver {
            engine,
            fifo,
            idle,
            timer,
            state: CnnState::Uninitialized,
            weights_loaded: false,
            fifo_wait: config.fifo_wait,
            completion_wait: config.completion_wait,
            output_frac_bits: config.output_frac_bits,
        }
    }

    /// Current state.
    pub fn state(&self) -> CnnState {
        self.state
    }

    /// Vendor library handle.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The input FIFO.
    pub fn fifo_port(&self) -> &F {
        &self.fifo
    }

    fn require_state(&self, op: &'static str, allowed: &[CnnState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            error!("CNN {} rejected in state {:?}", op, self.state);
            Err(Error::InvalidState {
                op,
                state: self.state,
            })
        }
    }

    /// Enable the CNN, load weights and biases and configure the layers. Only allowed after
    /// power up or `disable`.
    pub fn initialize(&mut self) -> Result<()> {
        self.require_state("initialize", &[CnnState::Uninitialized, CnnState::Disabled])?;

        bring_up(&mut self.engine).map_err(|fault| {
            error!("CNN initialization failed: {:?}", fault);
            InitFailure::Accelerator(fault)
        })?;

        info!("CNN initialized");
        self.weights_loaded = true;
        self.state = CnnState::Configured;
        Ok(())
    }

    /// Write `words` into the input FIFO, waiting out back-pressure before every word.
    pub fn load_input(&mut self, words: &[u32]) -> Result<()> {
        self.require_state(
            "load_input",
            &[
                CnnState::Configured,
                CnnState::Loaded,
                CnnState::Running,
                CnnState::Ready,
            ],
        )?;

        for (written, word) in words.iter().enumerate() {
            let mut polls = 0;
            while self.fifo.is_full() {
                polls += 1;
                if self.fifo_wait.exhausted(polls) {
                    error!("CNN FIFO full for {} polls after {} words", polls, written);
                    self.abort();
                    return Err(Error::FifoTimeout { written });
                }
            }
            self.fifo.write(*word);
        }

        if self.state != CnnState::Running {
            self.state = CnnState::Loaded;
        }
        Ok(())
    }

    /// Zero the completion timer and start the CNN. Does not block.
    pub fn start(&mut self) -> Result<()> {
        self.require_state(
            "start",
            &[CnnState::Configured, CnnState::Loaded, CnnState::Ready],
        )?;

        self.timer.reset();
        self.engine.start().map_err(|fault| {
            error!("CNN start failed: {:?}", fault);
            Error::Accelerator(fault)
        })?;

        self.state = CnnState::Running;
        Ok(())
    }

    /// Sleep until the completion interrupt fires, then read back and reduce the outputs.
    pub fn wait<const M: usize>(&mut self) -> Result<InferenceResult<M>> {
        self.require_state("wait", &[CnnState::Running])?;

        self.idle.arm_wakeup();
        let mut sleeps = 0;
        let completed = loop {
            if let Some(elapsed) = self.timer.elapsed() {
                break Some(elapsed.get());
            }
            if self.completion_wait.exhausted(sleeps) {
                break None;
            }
            self.idle.wait_for_interrupt();
            sleeps += 1;
        };
        self.idle.disarm_wakeup();

        let elapsed_us = match completed {
            Some(elapsed_us) => elapsed_us,
            None => {
                error!("CNN did not complete after {} sleeps", sleeps);
                self.abort();
                return Err(Error::InferenceTimeout);
            }
        };

        let mut raw_output = [0i32; M];
        self.engine.unload(&mut raw_output).map_err(|fault| {
            error!("CNN unload failed: {:?}", fault);
            self.state = CnnState::Configured;
            Error::Accelerator(fault)
        })?;
        self.state = CnnState::Ready;

        let result = InferenceResult::reduce(raw_output, self.output_frac_bits, elapsed_us);
        debug!(
            "CNN done in {} us: class {} ({}%)",
            elapsed_us, result.predicted_class, result.confidence_percent
        );
        Ok(result)
    }

    /// Run one frame: start, stream `words` through the FIFO and wait for the result.
    pub fn run<const M: usize>(&mut self, words: &[u32]) -> Result<InferenceResult<M>> {
        self.start()?;
        self.load_input(words)?;
        self.wait()
    }

    /// Stop a run that will not finish and go back to `Configured`. The weights stay loaded,
    /// the next cycle starts from scratch.
    fn abort(&mut self) {
        if let Err(fault) = self.engine.stop() {
            error!("CNN stop failed: {:?}", fault);
        }
        self.state = CnnState::Configured;
    }

    /// Power down the CNN. Allowed from any state.
    pub fn disable(&mut self) -> Result<()> {
        self.engine.disable().map_err(Error::Accelerator)?;
        self.state = CnnState::Disabled;
        Ok(())
    }

    /// Turn the CNN clock back on without reloading weights. Coming out of `Disabled` the
    /// driver is `Configured` if weights were loaded before, otherwise `initialize` is needed.
    pub fn enable(&mut self) {
        self.engine.clock_enable();
        if self.state == CnnState::Disabled && self.weights_loaded {
            self.state = CnnState::Configured;
        }
    }
}

/// The vendor bring-up sequence, stops at the first failing call.
fn bring_up<E: CnnEngine>(engine: &mut E) -> EngineResult {
    engine.enable()?;
    engine.init()?;
    engine.load_weights()?;
    engine.load_bias()?;
    engine.configure()
}
