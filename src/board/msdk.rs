//! Bindings to the MAX78000 SDK (MSDK) and the CNN code generated with the network.

#![allow(non_camel_case_types)]

use core::ffi::c_void;

/// `camera.h` pixel formats.
pub const PIXFORMAT_RGB888: i32 = 4;

/// `camera.h` FIFO modes, three bytes per pixel plus padding.
pub const FIFO_THREE_BYTE: i32 = 1;

/// `camera.h` DMA modes, line-by-line streaming into a buffer ring.
pub const STREAMING_DMA: i32 = 2;

/// CNN clock source and divider for `cnn_enable`: PCLK undivided.
pub const CNNCLKSEL_PCLK: u32 = 0;
pub const CNNCLKDIV_DIV1: u32 = 4 << 14;

/// `cnn.h` status.
pub const CNN_OK: i32 = 1;

/// `mxc_sys_periph_clock_t` bit of the CNN.
pub const PERIPH_CLOCK_CNN: u32 = 25;

/// `mxc_sys_system_clock_t` for the 100 MHz internal oscillator.
pub const SYS_CLOCK_IPO: u32 = 4;

/// Instruction cache controller.
pub const ICC0: *mut c_void = 0x4002_A000 as *mut c_void;

/// I2C1, wired to the camera SCCB pins.
pub const I2C1: *mut c_void = 0x4001_E000 as *mut c_void;

/// Device interrupt number of the CNN.
pub const CNN_IRQN: i16 = 84;

/// `stream_stat_t`
#[repr(C)]
pub struct stream_stat_t {
    pub dma_transfer_count: u32,
    pub dma_frame_time: u32,
    pub overflow_count: u32,
    pub stream_buffer_size: u32,
}

/// `mxc_i2c_req_t`
#[repr(C)]
pub struct mxc_i2c_req_t {
    pub i2c: *mut c_void,
    pub addr: u8,
    pub tx_buf: *mut u8,
    pub tx_len: u32,
    pub rx_buf: *mut u8,
    pub rx_len: u32,
    pub restart: i32,
    pub callback: Option<extern "C" fn(*mut mxc_i2c_req_t, i32)>,
}

extern "C" {
    // Camera
    pub fn camera_init(freq: u32) -> i32;
    pub fn camera_setup(
        xres: i32,
        yres: i32,
        pixformat: i32,
        fifo_mode: i32,
        dma_mode: i32,
        dma_channel: i32,
    ) -> i32;
    pub fn camera_start_capture_image() -> i32;
    pub fn camera_get_image(img: *mut *mut u8, len: *mut u32, w: *mut u32, h: *mut u32);
    pub fn camera_is_image_rcv() -> i32;
    pub fn get_camera_stream_buffer() -> *mut u8;
    pub fn release_camera_stream_buffer();
    pub fn get_camera_stream_statistic() -> *mut stream_stat_t;

    // DMA
    pub fn MXC_DMA_Init() -> i32;
    pub fn MXC_DMA_AcquireChannel() -> i32;

    // CNN, generated with the network
    pub fn cnn_enable(clock_source: u32, clock_divider: u32) -> i32;
    pub fn cnn_init() -> i32;
    pub fn cnn_load_weights() -> i32;
    pub fn cnn_load_bias() -> i32;
    pub fn cnn_configure() -> i32;
    pub fn cnn_start() -> i32;
    pub fn cnn_stop() -> i32;
    pub fn cnn_unload(out_buf: *mut u32) -> i32;
    pub fn cnn_disable() -> i32;
    pub fn CNN_ISR();

    // System
    pub fn MXC_SYS_ClockEnable(clock: u32);
    pub fn MXC_SYS_Clock_Select(clock: u32) -> i32;
    pub fn MXC_ICC_Enable(icc: *mut c_void);
    pub fn SystemCoreClockUpdate();
    pub fn MXC_Delay(us: u32) -> i32;

    // Board
    pub fn Board_Init() -> i32;
    pub fn PB_Get(pb: u32) -> i32;

    // I2C
    pub fn MXC_I2C_MasterTransaction(req: *mut mxc_i2c_req_t) -> i32;
}
