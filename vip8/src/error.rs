//! Result and errors.
use std::fmt::{self, Display, Formatter};

use crate::constants::Address;

pub type Vip8Result<T> = std::result::Result<T, Vip8Error>;

/// Faults the engine reports to its host.
///
/// `ImageTooLarge` is recoverable; the machine stays in its pre-load state.
/// The remaining variants are fatal: the machine halts and every further
/// `step` returns the same error until a new program is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vip8Error {
    /// Attempt to load a program image that can't fit in memory.
    ImageTooLarge { size: usize },
    /// Fetched a bit pattern that does not decode to any instruction.
    UnknownOpcode { opcode: u16, pc: Address },
    /// Subroutine return executed with an empty call stack.
    StackUnderflow { pc: Address },
    /// Subroutine call executed with all stack frames in use.
    StackOverflow { pc: Address },
}

impl Display for Vip8Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImageTooLarge { size } => {
                write!(f, "program image of {size} bytes too large for memory")
            }
            Self::UnknownOpcode { opcode, pc } => {
                write!(f, "unknown opcode 0x{opcode:04X} at 0x{pc:03X}")
            }
            Self::StackUnderflow { pc } => {
                write!(f, "return with empty call stack at 0x{pc:03X}")
            }
            Self::StackOverflow { pc } => {
                write!(f, "call nesting exceeds stack capacity at 0x{pc:03X}")
            }
        }
    }
}

impl std::error::Error for Vip8Error {}
