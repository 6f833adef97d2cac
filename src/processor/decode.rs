//! Instruction decoding.
//!
//! An opcode is the byte at `pc`. It is first looked up in the table of
//! exact opcodes. Every other byte is classified by its two most significant
//! bits:
//!
//! ```text
//!   01 ddd sss   MV    (sss = 0: MVI, one immediate byte follows)
//!   10 ddd sss   MV32  (sss = 0: MVI32, four immediate bytes follow)
//! ```
//!
//! `ddd` is the destination and `sss` the source register index. Any other
//! byte is an invalid opcode.

use std::fmt;

use log::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::fault::{Fault, Width};
use super::registers::{Reg32, Reg8};
use crate::memory::{Byte, Memory, Word};

/// Leading bits of the 8 bit move family
pub const MV_FAMILY: Byte = 0b0100_0000;
/// Leading bits of the 32 bit move family
pub const MV32_FAMILY: Byte = 0b1000_0000;

const FAMILY_MASK: Byte = 0b1100_0000;
const DESTINATION_MASK: Byte = 0b0011_1000;
const SOURCE_MASK: Byte = 0b0000_0111;

macro_rules! opcodes {
    ( $( $( #[doc = $doc:expr] )+ $name:ident = $repr:literal => $operands:literal , )+ ) => {
        /// Opcodes that are matched by their whole byte
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[derive(TryFromPrimitive, IntoPrimitive)]
        pub enum Opcode {
            $(
                $( #[doc = $doc] )+
                $name = $repr,
            )+
        }

        impl Opcode {
            pub const ALL: &'static [Self] = &[
                $( Self::$name , )+
            ];

            pub fn name(&self) -> &'static str {
                match self {
                    $( Self::$name => stringify!($name) , )+
                }
            }

            /// Number of operand bytes following the opcode
            pub fn operand_len(&self) -> usize {
                match self {
                    $( Self::$name => $operands , )+
                }
            }
        }

        impl ::std::fmt::Display for Opcode {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.name())
            }
        }
    }
}

opcodes! {
    /// Stop the execution of the program
    HALT = 0x01 => 0,
    /// Append `a` to the output
    OUT = 0x02 => 0,
    /// Set `f` to 0 if `a == b`, to 1 otherwise
    CMP = 0xC1 => 0,
    /// `a = (a + b) mod 255`
    ADD = 0xC2 => 0,
    /// `a = a - b`, adding 255 if the result is negative
    SUB = 0xC3 => 0,
    /// `a = a xor b`
    XOR = 0xC4 => 0,
    /// Jump if `f == 0`
    /// @param target Absolute address (little endian)
    JEZ = 0x21 => 4,
    /// Jump if `f != 0`
    /// @param target Absolute address (little endian)
    JNZ = 0x22 => 4,
    /// Advance `ptr`
    /// @param delta Unsigned byte (0x00 to 0xFF) added to `ptr`, wrapping at 2^32
    APTR = 0xE1 => 1,
}

/// How an opcode byte has to be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Exact(Opcode),
    Move,
    Move32,
}

/// Classifies an opcode byte, `None` if it is not a valid opcode
pub fn classify(opcode: Byte) -> Option<Shape> {
    if let Ok(exact) = Opcode::try_from(opcode) {
        return Some(Shape::Exact(exact));
    }

    match opcode & FAMILY_MASK {
        MV_FAMILY => Some(Shape::Move),
        MV32_FAMILY => Some(Shape::Move32),
        _ => None,
    }
}

/// A decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    Halt,
    Out,
    Cmp,
    Add,
    Sub,
    Xor,
    Jez(Word),
    Jnz(Word),
    Aptr(Byte),
    Mv { dst: Reg8, src: Reg8 },
    Mvi { dst: Reg8, value: Byte },
    Mv32 { dst: Reg32, src: Reg32 },
    Mvi32 { dst: Reg32, value: Word },
}

impl Instruction {
    /// Machine code of the instruction
    pub fn encode(&self) -> Vec<Byte> {
        match *self {
            Instruction::Halt => vec![Opcode::HALT.into()],
            Instruction::Out => vec![Opcode::OUT.into()],
            Instruction::Cmp => vec![Opcode::CMP.into()],
            Instruction::Add => vec![Opcode::ADD.into()],
            Instruction::Sub => vec![Opcode::SUB.into()],
            Instruction::Xor => vec![Opcode::XOR.into()],
            Instruction::Jez(target) => with_word(Opcode::JEZ.into(), target),
            Instruction::Jnz(target) => with_word(Opcode::JNZ.into(), target),
            Instruction::Aptr(delta) => vec![Opcode::APTR.into(), delta],
            Instruction::Mv { dst, src } => {
                vec![MV_FAMILY | Byte::from(dst) << 3 | Byte::from(src)]
            }
            Instruction::Mvi { dst, value } => vec![MV_FAMILY | Byte::from(dst) << 3, value],
            Instruction::Mv32 { dst, src } => {
                vec![MV32_FAMILY | Byte::from(dst) << 3 | Byte::from(src)]
            }
            Instruction::Mvi32 { dst, value } => {
                with_word(MV32_FAMILY | Byte::from(dst) << 3, value)
            }
        }
    }

    /// Length of the instruction in bytes, opcode included
    pub fn encoded_len(&self) -> usize {
        match self {
            Instruction::Jez(_) | Instruction::Jnz(_) | Instruction::Mvi32 { .. } => 5,
            Instruction::Aptr(_) | Instruction::Mvi { .. } => 2,
            _ => 1,
        }
    }
}

fn with_word(opcode: Byte, word: Word) -> Vec<Byte> {
    let mut bytes = vec![opcode];
    bytes.extend_from_slice(&word.to_le_bytes());
    bytes
}

impl fmt::Display for Instruction {
    /// Formats the instruction in assembler syntax
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Halt => f.write_str("HALT"),
            Instruction::Out => f.write_str("OUT"),
            Instruction::Cmp => f.write_str("CMP"),
            Instruction::Add => f.write_str("ADD"),
            Instruction::Sub => f.write_str("SUB"),
            Instruction::Xor => f.write_str("XOR"),
            Instruction::Jez(target) => write!(f, "JEZ 0x{:08X}", target),
            Instruction::Jnz(target) => write!(f, "JNZ 0x{:08X}", target),
            Instruction::Aptr(delta) => write!(f, "APTR 0x{:02X}", delta),
            Instruction::Mv { dst, src } => write!(f, "MV {} <- {}", dst, src),
            Instruction::Mvi { dst, value } => write!(f, "MVI {} <- 0x{:02X}", dst, value),
            Instruction::Mv32 { dst, src } => write!(f, "MV32 {} <- {}", dst, src),
            Instruction::Mvi32 { dst, value } => write!(f, "MVI32 {} <- 0x{:08X}", dst, value),
        }
    }
}

fn reg8(index: Byte, offset: Word) -> Result<Reg8, Fault> {
    Reg8::try_from(index).map_err(|_| Fault::UnreachableRegisterIndex {
        index,
        width: Width::Bits8,
        offset,
    })
}

fn reg32(index: Byte, offset: Word) -> Result<Reg32, Fault> {
    Reg32::try_from(index).map_err(|_| Fault::UnreachableRegisterIndex {
        index,
        width: Width::Bits32,
        offset,
    })
}

fn le_word(bytes: &[Byte]) -> Word {
    Word::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Decodes the instruction at `pc` and advances `pc` past it.
///
/// The whole instruction is consumed at once, so `pc` does not move if
/// decoding fails.
pub fn decode(memory: &Memory, pc: &mut Word) -> Result<Instruction, Fault> {
    let offset = *pc;
    let opcode = memory.peek(offset, 1)?[0];
    let shape = classify(opcode).ok_or(Fault::InvalidOpcode { opcode, offset })?;

    trace!("0x{:08X}: 0x{:02X} is {:?}", offset, opcode, shape);

    let destination = (opcode & DESTINATION_MASK) >> 3;
    let source = opcode & SOURCE_MASK;

    let instruction = match shape {
        Shape::Exact(exact) => {
            let bytes = memory.read(pc, 1 + exact.operand_len())?;
            match exact {
                Opcode::HALT => Instruction::Halt,
                Opcode::OUT => Instruction::Out,
                Opcode::CMP => Instruction::Cmp,
                Opcode::ADD => Instruction::Add,
                Opcode::SUB => Instruction::Sub,
                Opcode::XOR => Instruction::Xor,
                Opcode::JEZ => Instruction::Jez(le_word(&bytes[1..])),
                Opcode::JNZ => Instruction::Jnz(le_word(&bytes[1..])),
                Opcode::APTR => Instruction::Aptr(bytes[1]),
            }
        }
        Shape::Move => {
            let dst = reg8(destination, offset)?;

            // A zero source selects the immediate variant
            if source == 0 {
                let bytes = memory.read(pc, 2)?;
                Instruction::Mvi {
                    dst,
                    value: bytes[1],
                }
            } else {
                let src = reg8(source, offset)?;
                memory.read(pc, 1)?;
                Instruction::Mv { dst, src }
            }
        }
        Shape::Move32 => {
            let dst = reg32(destination, offset)?;

            if source == 0 {
                let bytes = memory.read(pc, 5)?;
                Instruction::Mvi32 {
                    dst,
                    value: le_word(&bytes[1..]),
                }
            } else {
                let src = reg32(source, offset)?;
                memory.read(pc, 1)?;
                Instruction::Mv32 { dst, src }
            }
        }
    };

    Ok(instruction)
}

/// Result of decoding a memory image front to back
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Disassembly {
    /// Decoded instructions with their offsets
    pub lines: Vec<(Word, Instruction)>,
    /// Why decoding stopped before the end of the image, if it did
    pub stopped: Option<Fault>,
}

impl fmt::Display for Disassembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The offset goes into a comment so the text assembles again
        for (offset, instruction) in &self.lines {
            writeln!(f, "{:<28} # 0x{:08X}", instruction.to_string(), offset)?;
        }
        if let Some(fault) = &self.stopped {
            writeln!(f, "# stopped: {}", fault)?;
        }
        Ok(())
    }
}

/// Decodes `memory` linearly from offset 0 until its end or the first byte
/// that does not decode. Jumps are not followed, so data placed between
/// instructions shows up as whatever it happens to decode to.
pub fn disassemble(memory: &Memory) -> Disassembly {
    let mut disassembly = Disassembly::default();
    let mut pc: Word = 0;

    while (pc as usize) < memory.len() {
        let offset = pc;
        match decode(memory, &mut pc) {
            Ok(instruction) => disassembly.lines.push((offset, instruction)),
            Err(fault) => {
                debug!("Disassembly stopped at 0x{:08X}: {}", offset, fault);
                disassembly.stopped = Some(fault);
                break;
            }
        }
    }

    disassembly
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::Result;

    fn decode_all(bytes: &[Byte]) -> Result<Instruction, Fault> {
        let mem = Memory::new(bytes.to_vec());
        let mut pc = 0;
        let instruction = decode(&mem, &mut pc)?;
        assert_eq!(pc as usize, instruction.encoded_len());
        Ok(instruction)
    }

    #[test]
    fn test_exact_opcodes() -> Result<()> {
        assert_eq!(classify(0x01), Some(Shape::Exact(Opcode::HALT)));
        assert_eq!(classify(0xE1), Some(Shape::Exact(Opcode::APTR)));
        assert_eq!(decode_all(&[0xC2])?, Instruction::Add);
        assert_eq!(decode_all(&[0xC3])?, Instruction::Sub);
        assert_eq!(decode_all(&[0xE1, 0x04])?, Instruction::Aptr(4));

        Ok(())
    }

    #[test]
    fn test_jump_target_is_little_endian() -> Result<()> {
        assert_eq!(
            decode_all(&[0x21, 0x78, 0x56, 0x34, 0x12])?,
            Instruction::Jez(0x1234_5678)
        );
        assert_eq!(
            decode_all(&[0x22, 0x10, 0x00, 0x00, 0x00])?,
            Instruction::Jnz(0x10)
        );

        Ok(())
    }

    #[test]
    fn test_zero_source_selects_immediate() -> Result<()> {
        // 01 001 000
        assert_eq!(
            decode_all(&[0x48, 0x05])?,
            Instruction::Mvi {
                dst: Reg8::A,
                value: 5
            }
        );
        // 01 001 010
        assert_eq!(
            decode_all(&[0x4A])?,
            Instruction::Mv {
                dst: Reg8::A,
                src: Reg8::B
            }
        );
        // 10 101 000
        assert_eq!(
            decode_all(&[0xA8, 0x00, 0x10, 0x00, 0x00])?,
            Instruction::Mvi32 {
                dst: Reg32::Ptr,
                value: 0x1000
            }
        );
        // 10 110 001
        assert_eq!(
            decode_all(&[0xB1])?,
            Instruction::Mv32 {
                dst: Reg32::Pc,
                src: Reg32::La
            }
        );

        Ok(())
    }

    #[test]
    fn test_indirect_operands() -> Result<()> {
        // 01 111 001: (ptr+c) <- a
        assert_eq!(
            decode_all(&[0x79])?,
            Instruction::Mv {
                dst: Reg8::PtrC,
                src: Reg8::A
            }
        );
        // 01 010 111: b <- (ptr+c)
        assert_eq!(
            decode_all(&[0x57])?,
            Instruction::Mv {
                dst: Reg8::B,
                src: Reg8::PtrC
            }
        );

        Ok(())
    }

    #[test]
    fn test_invalid_opcodes() {
        for opcode in [0x00, 0x03, 0x20, 0x3F, 0xC0, 0xC5, 0xE0, 0xFF] {
            let mem = Memory::new(vec![opcode, 0, 0, 0, 0]);
            let mut pc = 0;
            assert_eq!(
                decode(&mem, &mut pc),
                Err(Fault::InvalidOpcode { opcode, offset: 0 })
            );
            assert_eq!(pc, 0);
        }
    }

    #[test]
    fn test_unreachable_registers() {
        // 01 000 001: no 8 bit register 0 as destination
        assert_eq!(
            decode_all(&[0x41]),
            Err(Fault::UnreachableRegisterIndex {
                index: 0,
                width: Width::Bits8,
                offset: 0
            })
        );
        // 10 000 001: no 32 bit register 0 as destination
        assert_eq!(
            decode_all(&[0x81]),
            Err(Fault::UnreachableRegisterIndex {
                index: 0,
                width: Width::Bits32,
                offset: 0
            })
        );
        // 10 001 111: 32 bit family has no indirect operand
        assert_eq!(
            decode_all(&[0x8F]),
            Err(Fault::UnreachableRegisterIndex {
                index: 7,
                width: Width::Bits32,
                offset: 0
            })
        );
    }

    #[test]
    fn test_truncated_operand_keeps_pc() {
        let mem = Memory::new(vec![0x02, 0x21, 0x00, 0x00]);
        let mut pc = 1;
        assert!(matches!(
            decode(&mem, &mut pc),
            Err(Fault::OutOfBoundsAccess(_))
        ));
        assert_eq!(pc, 1);
    }

    #[test]
    fn test_encode_matches_decoder() -> Result<()> {
        let program = [
            Instruction::Mvi32 {
                dst: Reg32::Ptr,
                value: 0x20,
            },
            Instruction::Mv {
                dst: Reg8::PtrC,
                src: Reg8::E,
            },
            Instruction::Jnz(0x0102_0304),
            Instruction::Halt,
        ];
        let image: Vec<Byte> = program.iter().flat_map(Instruction::encode).collect();

        let disassembly = disassemble(&Memory::new(image));
        let decoded: Vec<Instruction> = disassembly.lines.iter().map(|(_, i)| *i).collect();
        assert_eq!(decoded, program);
        assert_eq!(disassembly.lines[2].0, 6);
        assert_eq!(disassembly.stopped, None);

        Ok(())
    }

    #[test]
    fn test_disassembly_stops_at_invalid_opcode() {
        let disassembly = disassemble(&Memory::new(vec![0x02, 0x01, 0x00, 0x02]));
        assert_eq!(
            disassembly.lines,
            vec![(0, Instruction::Out), (1, Instruction::Halt)]
        );
        assert_eq!(
            disassembly.stopped,
            Some(Fault::InvalidOpcode {
                opcode: 0,
                offset: 2
            })
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Instruction::Mvi {
                dst: Reg8::PtrC,
                value: 0x2A
            }
            .to_string(),
            "MVI (ptr+c) <- 0x2A"
        );
        assert_eq!(Instruction::Jez(0x1F).to_string(), "JEZ 0x0000001F");
        assert_eq!(
            Instruction::Mv32 {
                dst: Reg32::La,
                src: Reg32::Ptr
            }
            .to_string(),
            "MV32 la <- ptr"
        );
        assert_eq!(Instruction::Aptr(0xFF).to_string(), "APTR 0xFF");
    }

    #[test]
    fn test_disassembly_assembles_again() -> Result<()> {
        let program = [
            Instruction::Mvi {
                dst: Reg8::A,
                value: 5,
            },
            Instruction::Mvi32 {
                dst: Reg32::Ptr,
                value: 0x0000_0020,
            },
            Instruction::Aptr(0xFF),
            Instruction::Mv {
                dst: Reg8::PtrC,
                src: Reg8::A,
            },
            Instruction::Cmp,
            Instruction::Jez(0x0000_0010),
            Instruction::Out,
            Instruction::Halt,
        ];
        let image: Vec<Byte> = program.iter().flat_map(Instruction::encode).collect();

        let text = disassemble(&Memory::new(image.clone())).to_string();
        assert!(text.starts_with("MVI a <- 0x05"));
        assert!(text.lines().next().unwrap_or_default().ends_with("# 0x00000000"));

        let assembled: Memory = text
            .parse()
            .map_err(|errors: Vec<crate::memory::parse::ParseError>| {
                color_eyre::eyre::eyre!("{:?}", errors)
            })?;
        assert_eq!(assembled.data(), image.as_slice());

        Ok(())
    }
}
