#[cfg(feature = "throttle")]
mod clock;
pub mod constants;
mod cpu;
mod decode;
mod devices;
mod disasm;
mod error;
mod vm;

pub use self::vm::Hz;

/// Version of the interpreter implementation.
pub const IMPL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Borrowed view of the 64x32 monochrome display buffer, row-major.
pub type FrameBuffer<'a> = &'a [bool; constants::DISPLAY_BUFFER_SIZE];

pub mod prelude {
    pub use super::{
        decode::{decode, Op},
        devices::{DisplaySink, InvalidKeyCode, KeyCode, KeyEventSource},
        disasm::Disassembler,
        error::{Vip8Error, Vip8Result},
        vm::{Flow, Vip8Conf, Vip8Vm},
    };
}
