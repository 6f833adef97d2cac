use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::memory::{Byte, Word};

/// The register file of the CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Registers {
    /// Accumulator, left operand and result of the ALU instructions
    pub a: Byte,
    /// Right operand of the ALU instructions
    pub b: Byte,
    /// Offset added to `ptr` for indirect memory access
    pub c: Byte,
    pub d: Byte,
    pub e: Byte,
    /// Flags. Holds the result of the last CMP (0 = equal)
    pub f: Byte,
    pub la: Word,
    pub lb: Word,
    pub lc: Word,
    pub ld: Word,
    /// Base address for indirect memory access
    pub ptr: Word,
    /// Program counter
    pub pc: Word,
}

impl Registers {
    /// Effective address of the `(ptr+c)` pseudo register.
    /// Computed in 64 bits so it never wraps back into the memory.
    pub fn indirect_address(&self) -> u64 {
        u64::from(self.ptr) + u64::from(self.c)
    }

    /// Reads an 8 bit register. The `(ptr+c)` pseudo register lives in memory
    /// and has to be resolved by the caller.
    pub fn get8(&self, register: Reg8) -> Option<Byte> {
        match register {
            Reg8::A => Some(self.a),
            Reg8::B => Some(self.b),
            Reg8::C => Some(self.c),
            Reg8::D => Some(self.d),
            Reg8::E => Some(self.e),
            Reg8::F => Some(self.f),
            Reg8::PtrC => None,
        }
    }

    /// Mutable access to an 8 bit register, `None` for `(ptr+c)`
    pub fn get8_mut(&mut self, register: Reg8) -> Option<&mut Byte> {
        match register {
            Reg8::A => Some(&mut self.a),
            Reg8::B => Some(&mut self.b),
            Reg8::C => Some(&mut self.c),
            Reg8::D => Some(&mut self.d),
            Reg8::E => Some(&mut self.e),
            Reg8::F => Some(&mut self.f),
            Reg8::PtrC => None,
        }
    }

    pub fn get32(&self, register: Reg32) -> Word {
        match register {
            Reg32::La => self.la,
            Reg32::Lb => self.lb,
            Reg32::Lc => self.lc,
            Reg32::Ld => self.ld,
            Reg32::Ptr => self.ptr,
            Reg32::Pc => self.pc,
        }
    }

    pub fn set32(&mut self, register: Reg32, value: Word) {
        let slot = match register {
            Reg32::La => &mut self.la,
            Reg32::Lb => &mut self.lb,
            Reg32::Lc => &mut self.lc,
            Reg32::Ld => &mut self.ld,
            Reg32::Ptr => &mut self.ptr,
            Reg32::Pc => &mut self.pc,
        };
        *slot = value;
    }
}

/// Operand of the 8 bit move family, indexed by the 3 bit register field
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(TryFromPrimitive, IntoPrimitive)]
pub enum Reg8 {
    A = 1,
    B = 2,
    C = 3,
    D = 4,
    E = 5,
    F = 6,
    /// The byte in memory at `ptr + c`
    PtrC = 7,
}

impl Reg8 {
    pub const ALL: &'static [Self] = &[
        Self::A,
        Self::B,
        Self::C,
        Self::D,
        Self::E,
        Self::F,
        Self::PtrC,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::A => "a",
            Self::B => "b",
            Self::C => "c",
            Self::D => "d",
            Self::E => "e",
            Self::F => "f",
            Self::PtrC => "(ptr+c)",
        }
    }
}

impl fmt::Display for Reg8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Operand of the 32 bit move family, indexed by the 3 bit register field
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(TryFromPrimitive, IntoPrimitive)]
pub enum Reg32 {
    La = 1,
    Lb = 2,
    Lc = 3,
    Ld = 4,
    Ptr = 5,
    Pc = 6,
}

impl Reg32 {
    pub const ALL: &'static [Self] = &[
        Self::La,
        Self::Lb,
        Self::Lc,
        Self::Ld,
        Self::Ptr,
        Self::Pc,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::La => "la",
            Self::Lb => "lb",
            Self::Lc => "lc",
            Self::Ld => "ld",
            Self::Ptr => "ptr",
            Self::Pc => "pc",
        }
    }
}

impl fmt::Display for Reg32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
