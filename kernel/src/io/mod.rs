//! Console output and the kernel logger.

pub mod console;
pub mod logging;

pub fn init() {
    logging::init();
}
