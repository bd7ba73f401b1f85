//! Support for the MAX78000 board: the SDK camera and CNN behind the library traits, the SCCB
//! bus, the push button, delays and RTT logging.
//! * Note: Everything here calls into the SDK, so nothing is usable before `init`.

pub mod msdk;
mod rtt;

pub use rtt::init_logging;

use core::convert::Infallible;
use core::ptr;
use core::slice;

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};
use cortex_m_rt::exception;
use embedded_hal::blocking::{delay::DelayMs, i2c};
use embedded_hal::digital::v2::InputPin;

use crate::camera::{CameraSettings, StreamCamera, BYTES_PER_PIXEL};
use crate::cnn::{CnnEngine, EngineResult, Idle, InferenceTimer};
use crate::error::EngineFault;

/// Completion time of the last inference, written by the SDK's `CNN_ISR`.
#[no_mangle]
#[allow(non_upper_case_globals)]
pub static cnn_time: InferenceTimer = InferenceTimer::new();

/// Index of the capture push button (PB1 / SW1).
pub const CAPTURE_BUTTON: u32 = 0;

/// SysTick reload for a 1 ms wakeup at the 100 MHz core clock.
const WAKEUP_RELOAD: u32 = 100_000 - 1;

/// System bring-up: cache, 100 MHz internal oscillator, board peripherals.
pub fn init() {
    unsafe {
        msdk::MXC_ICC_Enable(msdk::ICC0);
        msdk::MXC_SYS_Clock_Select(msdk::SYS_CLOCK_IPO);
        msdk::SystemCoreClockUpdate();
        msdk::Board_Init();
    }
}

/// The SDK camera driver in streaming DMA mode.
pub struct MsdkCamera {
    line: *const u8,
    width: u16,
    height: u16,
}

impl MsdkCamera {
    pub fn new() -> Self {
        MsdkCamera {
            line: ptr::null(),
            width: 0,
            height: 0,
        }
    }
}

impl StreamCamera for MsdkCamera {
    fn setup(&mut self, settings: &CameraSettings) -> Result<(), i32> {
        let channel = unsafe {
            msdk::MXC_DMA_Init();
            msdk::MXC_DMA_AcquireChannel()
        };
        if channel < 0 {
            return Err(channel);
        }

        let ret = unsafe {
            msdk::camera_init(settings.freq_hz);
            msdk::camera_setup(
                settings.width.into(),
                settings.height.into(),
                msdk::PIXFORMAT_RGB888,
                msdk::FIFO_THREE_BYTE,
                msdk::STREAMING_DMA,
                channel,
            )
        };
        match ret {
            0 => {
                self.width = settings.width;
                self.height = settings.height;
                Ok(())
            }
            code => Err(code),
        }
    }

    fn start_frame(&mut self) {
        let (mut raw, mut len, mut w, mut h) = (ptr::null_mut(), 0, 0, 0);
        unsafe {
            msdk::camera_start_capture_image();
            msdk::camera_get_image(&mut raw, &mut len, &mut w, &mut h);
        }
        self.width = w as u16;
        self.height = h as u16;
        self.line = ptr::null();
    }

    fn dimensions(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    fn acquire_line_buffer(&mut self) -> bool {
        self.line = unsafe { msdk::get_camera_stream_buffer() };
        !self.line.is_null()
    }

    fn line_buffer(&self) -> &[u8] {
        if self.line.is_null() {
            return &[];
        }
        // The DMA leaves the buffer alone until it is released
        unsafe { slice::from_raw_parts(self.line, self.width as usize * BYTES_PER_PIXEL) }
    }

    fn release_line_buffer(&mut self) {
        unsafe { msdk::release_camera_stream_buffer() };
        self.line = ptr::null();
    }

    fn is_frame_complete(&self) -> bool {
        unsafe { msdk::camera_is_image_rcv() != 0 }
    }

    fn overflow_count(&self) -> u32 {
        let stat = unsafe { msdk::get_camera_stream_statistic() };
        if stat.is_null() {
            return 0;
        }
        unsafe { ptr::read_volatile(&(*stat).overflow_count) }
    }
}

/// The CNN code generated with the network.
pub struct MsdkCnn;

fn check(ret: i32) -> EngineResult {
    if ret == msdk::CNN_OK {
        Ok(())
    } else {
        Err(EngineFault(ret))
    }
}

impl CnnEngine for MsdkCnn {
    fn enable(&mut self) -> EngineResult {
        check(unsafe { msdk::cnn_enable(msdk::CNNCLKSEL_PCLK, msdk::CNNCLKDIV_DIV1) })
    }

    fn init(&mut self) -> EngineResult {
        check(unsafe { msdk::cnn_init() })
    }

    fn load_weights(&mut self) -> EngineResult {
        check(unsafe { msdk::cnn_load_weights() })
    }

    fn load_bias(&mut self) -> EngineResult {
        check(unsafe { msdk::cnn_load_bias() })
    }

    fn configure(&mut self) -> EngineResult {
        check(unsafe { msdk::cnn_configure() })
    }

    fn start(&mut self) -> EngineResult {
        check(unsafe { msdk::cnn_start() })
    }

    fn stop(&mut self) -> EngineResult {
        check(unsafe { msdk::cnn_stop() })
    }

    fn unload(&mut self, out: &mut [i32]) -> EngineResult {
        check(unsafe { msdk::cnn_unload(out.as_mut_ptr() as *mut u32) })
    }

    fn disable(&mut self) -> EngineResult {
        check(unsafe { msdk::cnn_disable() })
    }

    fn clock_enable(&mut self) {
        unsafe { msdk::MXC_SYS_ClockEnable(msdk::PERIPH_CLOCK_CNN) }
    }
}

/// `wfi` with SLEEPDEEP cleared, so the CNN keeps its clock while the core sleeps. SysTick
/// wakes the core every millisecond while armed, a sleep is never longer than that.
pub struct WfiIdle {
    scb: SCB,
    syst: SYST,
}

impl WfiIdle {
    pub fn new(scb: SCB, mut syst: SYST) -> Self {
        syst.disable_interrupt();
        syst.disable_counter();
        syst.set_clock_source(SystClkSource::Core);
        syst.set_reload(WAKEUP_RELOAD);
        WfiIdle { scb, syst }
    }
}

impl Idle for WfiIdle {
    fn arm_wakeup(&mut self) {
        self.syst.clear_current();
        self.syst.enable_interrupt();
        self.syst.enable_counter();
    }

    fn wait_for_interrupt(&mut self) {
        self.scb.clear_sleepdeep();
        cortex_m::asm::wfi();
    }

    fn disarm_wakeup(&mut self) {
        self.syst.disable_interrupt();
        self.syst.disable_counter();
    }
}

/// Status of a failed I2C transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct I2cError(pub i32);

/// The I2C master the SDK wires to the camera.
pub struct MsdkI2c;

impl MsdkI2c {
    fn transaction(&mut self, address: u8, tx: &[u8], rx: &mut [u8]) -> Result<(), I2cError> {
        let mut req = msdk::mxc_i2c_req_t {
            i2c: msdk::I2C1,
            addr: address,
            tx_buf: tx.as_ptr() as *mut u8,
            tx_len: tx.len() as u32,
            rx_buf: rx.as_mut_ptr(),
            rx_len: rx.len() as u32,
            restart: 0,
            callback: None,
        };
        match unsafe { msdk::MXC_I2C_MasterTransaction(&mut req) } {
            0 => Ok(()),
            code => Err(I2cError(code)),
        }
    }
}

impl i2c::Write for MsdkI2c {
    type Error = I2cError;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), I2cError> {
        self.transaction(address, bytes, &mut [])
    }
}

impl i2c::Read for MsdkI2c {
    type Error = I2cError;

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), I2cError> {
        self.transaction(address, &[], buffer)
    }
}

/// Busy-wait delays from the SDK.
pub struct MsdkDelay;

impl DelayMs<u32> for MsdkDelay {
    fn delay_ms(&mut self, ms: u32) {
        unsafe { msdk::MXC_Delay(ms.saturating_mul(1000)) };
    }
}

/// A board push button, high while pressed.
pub struct PushButton(pub u32);

impl InputPin for PushButton {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Infallible> {
        Ok(unsafe { msdk::PB_Get(self.0) } != 0)
    }

    fn is_low(&self) -> Result<bool, Infallible> {
        self.is_high().map(|pressed| !pressed)
    }
}

/// Only there to end a `wfi` in `WfiIdle`.
#[exception]
fn SysTick() {}

/// Device interrupts land here, the CNN one goes to the SDK handler.
#[exception]
unsafe fn DefaultHandler(irqn: i16) {
    if irqn == msdk::CNN_IRQN {
        msdk::CNN_ISR();
    }
}
