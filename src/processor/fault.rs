use std::error;
use std::fmt;

use crate::memory::{AccessError, Byte, Word};

/// Register width of a move instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    Bits8,
    Bits32,
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Width::Bits8 => f.write_str("8 bit"),
            Width::Bits32 => f.write_str("32 bit"),
        }
    }
}

/// Conditions that terminate a run unsuccessfully
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The byte at `offset` is neither a known opcode nor a move
    InvalidOpcode { opcode: Byte, offset: Word },
    /// A memory access left the bounds of the memory
    OutOfBoundsAccess(AccessError),
    /// A move instruction at `offset` names a register that does not exist
    UnreachableRegisterIndex {
        index: Byte,
        width: Width,
        offset: Word,
    },
    /// The program executed more instructions than allowed
    StepLimitExceeded { limit: u64 },
}

impl From<AccessError> for Fault {
    fn from(err: AccessError) -> Self {
        Fault::OutOfBoundsAccess(err)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::InvalidOpcode { opcode, offset } => {
                write!(f, "invalid opcode 0x{:02X} at 0x{:08X}", opcode, offset)
            }
            Fault::OutOfBoundsAccess(err) => write!(f, "out of bounds: {}", err),
            Fault::UnreachableRegisterIndex {
                index,
                width,
                offset,
            } => write!(
                f,
                "no {} register with index {} (instruction at 0x{:08X})",
                width, index, offset
            ),
            Fault::StepLimitExceeded { limit } => {
                write!(f, "step limit of {} instructions exceeded", limit)
            }
        }
    }
}

impl error::Error for Fault {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Fault::OutOfBoundsAccess(err) => Some(err),
            _ => None,
        }
    }
}
