//! Horse / human classifier firmware for the MAX78000.

#![no_main]
#![no_std]

use core::ptr::addr_of_mut;

use cortex_m_rt::entry;
use log::{error, info, warn, LevelFilter};
use max78000_classifier::{
    board::{self, MsdkCamera, MsdkCnn, MsdkDelay, MsdkI2c, PushButton, WfiIdle, CAPTURE_BUTTON},
    camera::{self, CameraSettings},
    cnn::{CnnDriver, MmioFifo},
    config::PipelineConfig,
    pipeline::{FrameArena, Mode, Pipeline, PipelineState},
    report, Error,
};

/// Frame buffers, too large for the stack.
static mut ARENA: FrameArena = FrameArena::new();

#[entry]
fn main() -> ! {
    board::init_logging(LevelFilter::Info);
    board::init();
    info!("MAX78000 horse / human classifier");

    let cm_periph = match cortex_m::Peripherals::take() {
        Some(periph) => periph,
        None => panic!("core peripherals already taken"),
    };

    // Camera: streaming DMA, sensor identification and prescaler
    let mut camera = MsdkCamera::new();
    let mut i2c = MsdkI2c;
    if let Err(err) = camera::init(&mut camera, &mut i2c, &CameraSettings::new()) {
        halt(err);
    }

    // CNN: weights, biases and layers
    let config = PipelineConfig::new();
    let fifo = unsafe { MmioFifo::fifo0() };
    let idle = WfiIdle::new(cm_periph.SCB, cm_periph.SYST);
    let mut cnn = CnnDriver::new(MsdkCnn, fifo, idle, &board::cnn_time, &config);
    if let Err(err) = cnn.initialize() {
        halt(err);
    }

    // The only reference to the arena for the rest of the program
    let arena = unsafe { &mut *addr_of_mut!(ARENA) };
    let mut pipeline = Pipeline::new(camera, cnn, arena, config);
    let button = PushButton(CAPTURE_BUTTON);
    let mut delay = MsdkDelay;

    // Keep the CNN clocked between frames
    pipeline.cnn_mut().enable();

    loop {
        if cfg!(feature = "live-feed") {
            info!("Press PB1 briefly for a single capture, hold it for 1 s for live feed");
        } else {
            info!("Press PB1 to capture an image");
        }

        match pipeline.select_mode(&button, &mut delay) {
            Mode::Single => match pipeline.run_single() {
                Ok(frame) => {
                    info!("*** PASS ***");
                    report::log_result(&frame.result);
                }
                Err(err) if err.is_recoverable() && pipeline.state() != PipelineState::OverflowHalt => {
                    warn!("Capture failed: {}", err);
                }
                Err(err) => halt(err),
            },
            Mode::Live => {
                let frames = pipeline.run_live(&button, &mut delay, |frame, _| {
                    report::log_live_frame(frame);
                });
                match frames {
                    Ok(frames) => info!("Live feed classified {} frames", frames),
                    Err(err) => halt(err),
                }
            }
        }
    }
}

/// Report a fatal error and park the core.
fn halt(err: Error) -> ! {
    error!("Halting: {}", err);
    loop {
        cortex_m::asm::wfi();
    }
}
