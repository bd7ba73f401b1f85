//! Test doubles for the hardware collaborators.

use core::cell::Cell;
use core::convert::Infallible;

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c;
use embedded_hal::digital::v2::InputPin;

use crate::camera::{CameraSettings, StreamCamera, BYTES_PER_PIXEL};
use crate::cnn::{CnnEngine, EngineResult, FifoPort, Idle, InferenceTimer};
use crate::error::EngineFault;

enum Fill {
    Solid((u8, u8, u8)),
    Gradient,
}

/// Line-buffered camera producing a synthetic image.
pub struct MockCamera {
    width: u16,
    height: u16,
    fill: Fill,
    line: Vec<u8>,
    streaming: bool,
    next_row: u16,
    stalled: u32,
    pub starts: u32,
    pub acquired: u32,
    pub released: u32,
    /// Reported by `overflow_count` after every frame.
    pub overflow: u32,
    /// Clear `overflow` when the second frame starts.
    pub overflow_once: bool,
    /// Lines produced before the frame reports complete.
    pub deliver_lines: u16,
    /// Failed acquisitions before every line, `u32::MAX` never delivers.
    pub stall_polls: u32,
    pub setup_with: Option<CameraSettings>,
    pub setup_status: i32,
}

impl MockCamera {
    fn new(width: u16, height: u16, fill: Fill) -> Self {
        MockCamera {
            width,
            height,
            fill,
            line: vec![0; width as usize * BYTES_PER_PIXEL],
            streaming: false,
            next_row: 0,
            stalled: 0,
            starts: 0,
            acquired: 0,
            released: 0,
            overflow: 0,
            overflow_once: false,
            deliver_lines: height,
            stall_polls: 0,
            setup_with: None,
            setup_status: 0,
        }
    }

    pub fn solid(width: u16, height: u16, rgb: (u8, u8, u8)) -> Self {
        Self::new(width, height, Fill::Solid(rgb))
    }

    pub fn gradient(width: u16, height: u16) -> Self {
        Self::new(width, height, Fill::Gradient)
    }

    /// Pixel at (`row`, `col`) of a `gradient` camera.
    pub fn gradient_pixel(row: usize, col: usize) -> (u8, u8, u8) {
        ((row * 31 + col * 7) as u8, (col * 13) as u8, (255 - row % 256) as u8)
    }

    fn fill_line(&mut self, row: u16) {
        for (col, px) in self.line.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let (r, g, b) = match self.fill {
                Fill::Solid(rgb) => rgb,
                Fill::Gradient => Self::gradient_pixel(row as usize, col),
            };
            px.copy_from_slice(&[r, g, b, 0]);
        }
    }
}

impl StreamCamera for MockCamera {
    fn setup(&mut self, settings: &CameraSettings) -> Result<(), i32> {
        self.setup_with = Some(*settings);
        match self.setup_status {
            0 => Ok(()),
            code => Err(code),
        }
    }

    fn start_frame(&mut self) {
        self.starts += 1;
        if self.overflow_once && self.starts > 1 {
            self.overflow = 0;
        }
        self.streaming = true;
        self.next_row = 0;
        self.stalled = 0;
    }

    fn dimensions(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    fn acquire_line_buffer(&mut self) -> bool {
        if !self.streaming || self.next_row >= self.deliver_lines.min(self.height) {
            return false;
        }
        if self.stalled < self.stall_polls {
            self.stalled += 1;
            return false;
        }
        self.stalled = 0;
        let row = self.next_row;
        self.fill_line(row);
        self.next_row += 1;
        self.acquired += 1;
        true
    }

    fn line_buffer(&self) -> &[u8] {
        &self.line
    }

    fn release_line_buffer(&mut self) {
        self.released += 1;
    }

    fn is_frame_complete(&self) -> bool {
        self.streaming && self.next_row >= self.deliver_lines.min(self.height)
    }

    fn overflow_count(&self) -> u32 {
        self.overflow
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct BusError;

/// SCCB bus with a 256 register sensor behind it.
pub struct MockI2c {
    pub regs: [u8; 256],
    /// Register that ignores writes.
    pub read_only: Option<u8>,
    /// Fail every transaction.
    pub fail: bool,
    pub address: Option<u8>,
    pointer: u8,
}

impl MockI2c {
    /// An OV7692 with its identification registers set.
    pub fn ov7692() -> Self {
        let mut regs = [0; 256];
        regs[0x0A] = 0x76;
        regs[0x0B] = 0x92;
        regs[0x1C] = 0x7F;
        regs[0x1D] = 0xA2;
        MockI2c {
            regs,
            read_only: None,
            fail: false,
            address: None,
            pointer: 0,
        }
    }
}

impl i2c::Write for MockI2c {
    type Error = BusError;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        if self.fail {
            return Err(BusError);
        }
        self.address = Some(address);
        match *bytes {
            [reg] => self.pointer = reg,
            [reg, val] => {
                self.pointer = reg;
                if self.read_only != Some(reg) {
                    self.regs[reg as usize] = val;
                }
            }
            _ => return Err(BusError),
        }
        Ok(())
    }
}

impl i2c::Read for MockI2c {
    type Error = BusError;

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), BusError> {
        if self.fail {
            return Err(BusError);
        }
        self.address = Some(address);
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = self.regs[self.pointer.wrapping_add(i as u8) as usize];
        }
        Ok(())
    }
}

/// Vendor CNN library call, as recorded by `MockEngine`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Call {
    Enable,
    Init,
    LoadWeights,
    LoadBias,
    Configure,
    Start,
    Stop,
    Unload,
    Disable,
    ClockEnable,
}

/// CNN library that records calls and unloads scripted outputs.
pub struct MockEngine {
    pub calls: Vec<Call>,
    pub outputs: Vec<i32>,
    /// This call returns `EngineFault(-1)`.
    pub fail_on: Option<Call>,
}

impl MockEngine {
    pub fn new(outputs: &[i32]) -> Self {
        MockEngine {
            calls: Vec::new(),
            outputs: outputs.to_vec(),
            fail_on: None,
        }
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    fn record(&mut self, call: Call) -> EngineResult {
        self.calls.push(call);
        if self.fail_on == Some(call) {
            Err(EngineFault(-1))
        } else {
            Ok(())
        }
    }
}

impl CnnEngine for MockEngine {
    fn enable(&mut self) -> EngineResult {
        self.record(Call::Enable)
    }

    fn init(&mut self) -> EngineResult {
        self.record(Call::Init)
    }

    fn load_weights(&mut self) -> EngineResult {
        self.record(Call::LoadWeights)
    }

    fn load_bias(&mut self) -> EngineResult {
        self.record(Call::LoadBias)
    }

    fn configure(&mut self) -> EngineResult {
        self.record(Call::Configure)
    }

    fn start(&mut self) -> EngineResult {
        self.record(Call::Start)
    }

    fn stop(&mut self) -> EngineResult {
        self.record(Call::Stop)
    }

    fn unload(&mut self, out: &mut [i32]) -> EngineResult {
        self.record(Call::Unload)?;
        for (dst, src) in out.iter_mut().zip(self.outputs.iter()) {
            *dst = *src;
        }
        Ok(())
    }

    fn disable(&mut self) -> EngineResult {
        self.record(Call::Disable)
    }

    fn clock_enable(&mut self) {
        self.calls.push(Call::ClockEnable);
    }
}

/// Input FIFO with scripted back-pressure.
pub struct MockFifo {
    pub written: Vec<u32>,
    /// Number of upcoming `is_full` polls that report full.
    pub full_polls: Cell<u32>,
    /// Stuck full once this many words are in.
    pub full_after: Option<usize>,
}

impl MockFifo {
    pub fn new() -> Self {
        MockFifo {
            written: Vec::new(),
            full_polls: Cell::new(0),
            full_after: None,
        }
    }
}

impl FifoPort for MockFifo {
    fn is_full(&self) -> bool {
        if let Some(limit) = self.full_after {
            if self.written.len() >= limit {
                return true;
            }
        }
        match self.full_polls.get() {
            0 => false,
            n => {
                self.full_polls.set(n - 1);
                true
            }
        }
    }

    fn write(&mut self, word: u32) {
        self.written.push(word);
    }
}

/// Plays the CNN interrupt: signals the timer after every `after` sleeps.
pub struct SignalAfter<'t> {
    timer: &'t InferenceTimer,
    after: u32,
    elapsed_us: u32,
    since: u32,
    pub sleeps: u32,
    /// Times the wakeup was armed.
    pub arms: u32,
    pub armed: bool,
}

impl<'t> SignalAfter<'t> {
    pub fn new(timer: &'t InferenceTimer, after: u32, elapsed_us: u32) -> Self {
        SignalAfter {
            timer,
            after,
            elapsed_us,
            since: 0,
            sleeps: 0,
            arms: 0,
            armed: false,
        }
    }
}

impl<'t> Idle for SignalAfter<'t> {
    fn arm_wakeup(&mut self) {
        self.arms += 1;
        self.armed = true;
    }

    fn wait_for_interrupt(&mut self) {
        assert!(self.armed, "slept without a wakeup armed");
        self.sleeps += 1;
        self.since += 1;
        if self.since >= self.after {
            self.since = 0;
            self.timer.signal(self.elapsed_us);
        }
    }

    fn disarm_wakeup(&mut self) {
        self.armed = false;
    }
}

/// Push button reading a script of levels (`true` = pressed), then `rest`.
pub struct MockButton {
    script: Vec<bool>,
    pos: Cell<usize>,
    pub rest: bool,
}

impl MockButton {
    pub fn new(script: &[bool]) -> Self {
        MockButton {
            script: script.to_vec(),
            pos: Cell::new(0),
            rest: false,
        }
    }

    /// Number of reads so far.
    pub fn reads(&self) -> usize {
        self.pos.get()
    }
}

impl InputPin for MockButton {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Infallible> {
        let pos = self.pos.get();
        self.pos.set(pos + 1);
        Ok(self.script.get(pos).copied().unwrap_or(self.rest))
    }

    fn is_low(&self) -> Result<bool, Infallible> {
        self.is_high().map(|high| !high)
    }
}

/// Records requested delays instead of sleeping.
#[derive(Default)]
pub struct MockDelay {
    pub delays: Vec<u32>,
}

impl DelayMs<u32> for MockDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.delays.push(ms);
    }
}
