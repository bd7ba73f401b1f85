//! RTT output for the `log` facade and for panics.

use core::panic::PanicInfo;
use log::{LevelFilter, Log, Metadata, Record};
use rtt_target::{rprintln, rtt_init, set_print_channel};

/// Prints every enabled record on the RTT terminal channel.
struct RttLogger;

static LOGGER: RttLogger = RttLogger;

impl Log for RttLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            rprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Set up the RTT terminal channel and route `log` records to it.
pub fn init_logging(level: LevelFilter) {
    let channels = rtt_init! {
        up: {
            0: {
                size: 4096
                mode: BlockIfFull
                name: "Terminal"
            }
        }
    };

    set_print_channel(channels.up.0);

    // Only fails if a logger is already installed, which is then kept
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

#[inline(never)]
#[panic_handler]
/// Custom handler to use RTT when a panic occurs.
fn panic(info: &PanicInfo) -> ! {
    rprintln!("Panicked!");
    rprintln!("{}", info);
    loop {}
}
