//! CNN accelerator: vendor library seam, input FIFO registers, completion signal and driver.

mod driver;
mod softmax;

pub use driver::{CnnDriver, CnnState};
pub use softmax::{argmax, percent, permille, softmax_q15, InferenceResult, Q15_ONE};

use core::num::NonZeroU32;
use core::ptr;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::EngineFault;

/// Result of a vendor CNN library call.
pub type EngineResult = core::result::Result<(), EngineFault>;

/// The code generated alongside the network weights. Its internals (kernels, weights, layer
/// setup) are opaque, the driver only sequences the calls.
pub trait CnnEngine {
    /// Turn on the CNN clock and enable its interrupt.
    fn enable(&mut self) -> EngineResult;

    /// Bring the CNN state machine into a consistent state.
    fn init(&mut self) -> EngineResult;

    /// Load the kernels.
    fn load_weights(&mut self) -> EngineResult;

    /// Load the biases.
    fn load_bias(&mut self) -> EngineResult;

    /// Configure the layers.
    fn configure(&mut self) -> EngineResult;

    /// Start processing, input is then streamed through the FIFO.
    fn start(&mut self) -> EngineResult;

    /// Stop processing, used to abandon a run that timed out.
    fn stop(&mut self) -> EngineResult;

    /// Copy the raw outputs of the last layer into `out`.
    fn unload(&mut self, out: &mut [i32]) -> EngineResult;

    /// Power down the CNN.
    fn disable(&mut self) -> EngineResult;

    /// Turn the CNN clock back on. Weights survive only if the memories stayed powered.
    fn clock_enable(&mut self);
}

/// The CNN input FIFO.
pub trait FifoPort {
    /// `true` while the FIFO cannot take another word.
    fn is_full(&self) -> bool;

    /// Push one word.
    fn write(&mut self, word: u32);
}

/// FIFO status register (bit 0 = full).
pub const FIFO_STATUS_ADDR: usize = 0x5000_0004;

/// FIFO data-in register.
pub const FIFO_DATA_ADDR: usize = 0x5000_0008;

const FIFO_FULL: u32 = 1 << 0;

/// The memory mapped CNN input FIFO.
pub struct MmioFifo {
    status: *const u32,
    data: *mut u32,
}

impl MmioFifo {
    /// FIFO at the given register addresses.
    ///
    /// # Safety
    /// Both addresses must be the CNN FIFO registers and nothing else may write the FIFO.
    pub unsafe fn new(status: usize, data: usize) -> Self {
        MmioFifo {
            status: status as *const u32,
            data: data as *mut u32,
        }
    }

    /// The MAX78000 FIFO 0.
    ///
    /// # Safety
    /// Only one `MmioFifo` may exist.
    pub unsafe fn fifo0() -> Self {
        Self::new(FIFO_STATUS_ADDR, FIFO_DATA_ADDR)
    }
}

impl FifoPort for MmioFifo {
    fn is_full(&self) -> bool {
        unsafe { ptr::read_volatile(self.status) & FIFO_FULL != 0 }
    }

    fn write(&mut self, word: u32) {
        unsafe { ptr::write_volatile(self.data, word) }
    }
}

/// Low power wait used while the CNN is running.
///
/// The driver arms a periodic wakeup before the first sleep and disarms it after the last, so
/// a sleep lasts at most one wakeup period even if the CNN never interrupts.
pub trait Idle {
    /// Start the periodic wakeup.
    fn arm_wakeup(&mut self);

    /// Sleep until the next interrupt (any interrupt, the caller re-checks its condition).
    fn wait_for_interrupt(&mut self);

    /// Stop the periodic wakeup.
    fn disarm_wakeup(&mut self);
}

/// Elapsed inference time in microseconds, written by the CNN completion interrupt.
///
/// Zero means "still running". The driver zeroes it right before starting the CNN and only
/// reads it after waking up in `wait`; the interrupt is the only other writer. The layout is a
/// plain `u32` so the firmware can export it to the vendor interrupt handler.
#[repr(transparent)]
pub struct InferenceTimer(AtomicU32);

impl InferenceTimer {
    /// A timer reading "still running".
    pub const fn new() -> Self {
        InferenceTimer(AtomicU32::new(0))
    }

    /// Record completion, called from the CNN interrupt.
    pub fn signal(&self, elapsed_us: u32) {
        // A zero reading would look like the CNN is still running
        self.0.store(elapsed_us.max(1), Ordering::Release);
    }

    pub(crate) fn reset(&self) {
        self.0.store(0, Ordering::Release);
    }

    pub(crate) fn elapsed(&self) -> Option<NonZeroU32> {
        NonZeroU32::new(self.0.load(Ordering::Acquire))
    }
}

impl Default for InferenceTimer {
    fn default() -> Self {
        Self::new()
    }
}
