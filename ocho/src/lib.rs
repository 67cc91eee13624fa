mod bytecode;
mod clock;
pub mod constants;
mod cpu;
mod devices;
mod display;
mod error;
mod vm;

pub use self::vm::Hz;

use crate::constants::DISPLAY_BUFFER_SIZE;

/// Borrowed read-only view of the display buffer, row-major, as handed
/// to render sinks.
pub type DisplayBuffer<'a> = &'a [bool; DISPLAY_BUFFER_SIZE];

/// Version reported by frontends.
pub const IMPL_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use super::{
        clock::Clock,
        devices::{Devices, KeyCode, NullDevices},
        error::{OchoError, OchoResult},
        vm::{Flow, OchoConf, OchoVm},
    };
}
