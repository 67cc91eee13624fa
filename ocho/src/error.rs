//! Result and errors.
use std::fmt::{self, Display, Formatter};

use crate::constants::Address;

pub type OchoResult<T> = std::result::Result<T, OchoError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OchoError {
    /// Instruction word that matches no known pattern, along with the
    /// address it was fetched from.
    UnknownOpcode { opcode: u16, addr: Address },
    /// Memory access outside the 4KB address space.
    OutOfBounds { addr: usize },
    /// Subroutine call beyond the architectural nesting limit.
    StackOverflow,
    /// Return with no address on the call stack.
    StackUnderflow,
    /// Attempt to load a ROM image that can't fit in memory.
    LargeProgram,
}

impl Display for OchoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOpcode { opcode, addr } => {
                write!(f, "unknown opcode {opcode:04X} at address {addr:03X}")
            }
            Self::OutOfBounds { addr } => {
                write!(f, "memory access out of bounds: {addr:04X}")
            }
            Self::StackOverflow => write!(f, "call stack overflow"),
            Self::StackUnderflow => write!(f, "call stack underflow"),
            Self::LargeProgram => write!(f, "program too large for VM memory"),
        }
    }
}

impl std::error::Error for OchoError {}
