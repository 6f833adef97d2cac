//! 0x00:
//!     MVI a <- 0x05
//!     OUT
//!     HALT

use std::borrow::Cow;
use std::error;
use std::{fmt, str::Lines};

use crate::processor::decode::{Instruction, Opcode};
use crate::processor::registers::{Reg32, Reg8};

use super::{Byte, Word};

/// Upper bound for the size of an assembled image
pub const MAX_IMAGE_LEN: usize = 16 * 1024 * 1024;

macro_rules! propagate {
    ( $res:expr ) => {
        match $res {
            Ok(value) => value,
            Err(err) => return Some(Err(err)),
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    InvalidAddress { address: usize },
    InvalidLiteral,
    InvalidMetaCommand,
    InvalidNumber { radix: u32 },
    InvalidInstruction,
    InvalidOperand,
    InvalidAddressLabel,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::InvalidAddress { address } => {
                write!(f, "memory has no address `0x{:x}`", address)
            }
            ParseErrorKind::InvalidLiteral => f.write_str("invalid literal"),
            ParseErrorKind::InvalidMetaCommand => f.write_str("invalid meta command"),
            ParseErrorKind::InvalidNumber { radix } => {
                write!(f, "failed to parse number with radix `{}`", radix)
            }
            ParseErrorKind::InvalidInstruction => f.write_str("failed to resolve instruction"),
            ParseErrorKind::InvalidOperand => f.write_str("invalid operand"),
            ParseErrorKind::InvalidAddressLabel => f.write_str("invalid address label"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    kind: ParseErrorKind,
    context: Option<Cow<'static, str>>,
    line_nr: usize,
}

impl ParseError {
    fn new<C, S>(kind: ParseErrorKind, context: C, line_nr: usize) -> Self
    where
        C: Into<Option<S>>,
        S: Into<Cow<'static, str>>,
    {
        Self {
            kind,
            context: context.into().map(|inner| inner.into()),
            line_nr,
        }
    }

    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }

    pub fn line_nr(&self) -> usize {
        self.line_nr
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(
                f,
                "error [ln: {}]: {} - {}",
                self.line_nr, self.kind, context
            )
        } else {
            write!(f, "error [ln: {}]: {}", self.line_nr, self.kind)
        }
    }
}

impl error::Error for ParseError {}

pub type Result<T, E = ParseError> = std::result::Result<T, E>;

/// Parses a number with an optional `0b`, `0o` or `0x` prefix. Evaluates to
/// `None` for an empty string and to the radix on failure.
macro_rules! parse_number {
    ( $ty:ty: $s:expr ) => {{
        let line = $s.trim();

        if line.is_empty() {
            None
        } else {
            let (radix, offset) = match line.as_bytes() {
                [b'0', b'b', ..] => (2, 2),
                [b'0', b'o', ..] => (8, 2),
                [b'0', b'x', ..] => (16, 2),
                _ => (10, 0),
            };

            Some(<$ty>::from_str_radix(&line[offset..], radix).map_err(|_| radix))
        }
    }};
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianess {
    Little,
    Big,
}

impl Default for Endianess {
    /// The CPU stores words little endian
    fn default() -> Self {
        Self::Little
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ParseSession {
    endianess: Endianess,
}

impl ParseSession {
    fn new(endianess: Endianess) -> Self {
        Self { endianess }
    }
}

/// Assembles source text into a memory image
#[derive(Debug, Clone)]
pub struct Parser<'a> {
    lines: Lines<'a>,
    line_nr: usize,
    position: Word,
    image: Vec<Byte>,
    endianess: Endianess,
    session: ParseSession,
}

impl<'a> Parser<'a> {
    /// Creates a new parser for `data`. `endianess` applies to word literals
    /// until a meta command changes it.
    pub fn new(data: &'a str, endianess: Endianess) -> Self {
        Self {
            lines: data.lines(),
            line_nr: 0,
            position: 0,
            image: Vec::new(),
            endianess,
            session: ParseSession::new(endianess),
        }
    }

    /// Consumes `self` and tries to assemble all lines into an image. The
    /// image is as long as the highest address written to.
    ///
    /// # Errors
    ///
    /// All errors which may occur are collected and returned at the end.
    pub fn parse(mut self) -> Result<Vec<Byte>, Vec<ParseError>> {
        let mut errors = Vec::new();

        while let Some(res) = self.parse_next_line() {
            if let Err(err) = res {
                log::error!("{}", err);
                errors.push(err);
            }
        }

        if errors.is_empty() {
            Ok(self.image)
        } else {
            Err(errors)
        }
    }

    /// Tries to parse the next line. Each instruction should be located on
    /// its own line. Everything after a `#` is a comment.
    fn parse_next_line(&mut self) -> Option<Result<()>> {
        let line = self.lines.next()?;
        self.line_nr += 1;

        let line = match line.split_once('#') {
            Some((code, _comment)) => code,
            None => line,
        }
        .trim();

        if line.is_empty() {
            // Comment or empty line; skip
            Some(Ok(()))
        } else if line.starts_with('%') {
            // Line is a meta command
            self.parse_meta_command(line)
        } else if line.starts_with('!') {
            // Line is a literal
            self.parse_literal(line)
        } else if line.ends_with(':') {
            // Line is a address label.
            self.parse_address_label(line)
        } else {
            // Line is an instruction.
            self.parse_instruction(line)
        }
    }

    /// Tries to parse line a meta command.
    ///
    /// # Examples
    ///
    /// - `%endianess(le)`
    /// - `%endianess(be)`
    fn parse_meta_command(&mut self, line: &str) -> Option<Result<()>> {
        let line = &line[1..];

        log::debug!("[{}] Found meta command", self.line_nr);

        match line {
            "endianess" => {
                self.session.endianess = self.endianess;
            }
            "endianess(le)" => {
                self.session.endianess = Endianess::Little;
            }
            "endianess(be)" => {
                self.session.endianess = Endianess::Big;
            }
            _ => {
                return Some(Err(ParseError::new(
                    ParseErrorKind::InvalidMetaCommand,
                    format!("unknown command `{}`", line),
                    self.line_nr,
                )))
            }
        }

        Some(Ok(()))
    }

    /// Tries to parse line as literal.
    ///
    /// # Examples
    ///
    /// - `! 0x22`
    /// - `!W0xdeadbeef`
    fn parse_literal(&mut self, line: &str) -> Option<Result<()>> {
        let line = &line[1..];

        if let Some(line) = line.strip_prefix('W') {
            // Literal is a word
            log::debug!("[{}] Found word literal", self.line_nr);

            let word = propagate!(self.number::<Word>(line, ParseErrorKind::InvalidLiteral));

            let bytes = match self.session.endianess {
                Endianess::Little => word.to_le_bytes(),
                Endianess::Big => word.to_be_bytes(),
            };
            Some(self.write_bytes(&bytes))
        } else {
            // Literal is a byte
            log::debug!("[{}] Found byte literal", self.line_nr);

            let byte = propagate!(self.number::<Byte>(line, ParseErrorKind::InvalidLiteral));

            Some(self.write_bytes(&[byte]))
        }
    }

    /// Tries to parse line as an address label.
    ///
    /// # Examples
    ///
    /// - `0x22:`
    /// - `0o44:`
    fn parse_address_label(&mut self, line: &str) -> Option<Result<()>> {
        let line = &line[..line.len() - 1];

        log::debug!("[{}] Found address label", self.line_nr);

        // The address is intentionally parsed as a word to detect if it's
        // a valid address.
        let address = propagate!(propagate!(parse_number!(Word: line).ok_or_else(|| {
            ParseError::new(
                ParseErrorKind::InvalidAddressLabel,
                "an address label needs to have an address set",
                self.line_nr,
            )
        }))
        .map_err(|radix| {
            ParseError::new(
                ParseErrorKind::InvalidAddress {
                    address: usize::MAX,
                },
                format!("failed to parse the address with radix `{}`", radix),
                self.line_nr,
            )
        }));

        log::debug!("[{}] Address label `0x{:x}`", self.line_nr, address);

        self.position = address;

        Some(Ok(()))
    }

    /// Tries to parse line as a instruction.
    ///
    /// # Examples
    ///
    /// - `JEZ 0x22`
    /// - `MVI (ptr+c) <- 7`
    /// - `ADD`
    fn parse_instruction(&mut self, line: &str) -> Option<Result<()>> {
        let (mnemonic, operands) = match line.split_once(char::is_whitespace) {
            Some((mnemonic, operands)) => (mnemonic, operands.trim()),
            None => (line, ""),
        };

        let instruction = propagate!(self.resolve_instruction(mnemonic, operands));

        log::debug!("[{}] Found instruction {}", self.line_nr, instruction);

        Some(self.write_bytes(&instruction.encode()))
    }

    fn resolve_instruction(&self, mnemonic: &str, operands: &str) -> Result<Instruction> {
        if let Some(opcode) = Opcode::ALL.iter().find(|opcode| mnemonic == opcode.name()) {
            return self.resolve_exact(*opcode, operands);
        }

        match mnemonic {
            "MV" => {
                let (dst, src) = self.split_move(operands)?;
                Ok(Instruction::Mv {
                    dst: self.reg8(dst)?,
                    src: self.reg8(src)?,
                })
            }
            "MVI" => {
                let (dst, src) = self.split_move(operands)?;
                Ok(Instruction::Mvi {
                    dst: self.reg8(dst)?,
                    value: self.number(src, ParseErrorKind::InvalidOperand)?,
                })
            }
            "MV32" => {
                let (dst, src) = self.split_move(operands)?;
                Ok(Instruction::Mv32 {
                    dst: self.reg32(dst)?,
                    src: self.reg32(src)?,
                })
            }
            "MVI32" => {
                let (dst, src) = self.split_move(operands)?;
                Ok(Instruction::Mvi32 {
                    dst: self.reg32(dst)?,
                    value: self.number(src, ParseErrorKind::InvalidOperand)?,
                })
            }
            _ => Err(ParseError::new(
                ParseErrorKind::InvalidInstruction,
                format!("no instruction named `{}`", mnemonic),
                self.line_nr,
            )),
        }
    }

    fn resolve_exact(&self, opcode: Opcode, operands: &str) -> Result<Instruction> {
        if opcode.operand_len() == 0 && !operands.is_empty() {
            return Err(ParseError::new(
                ParseErrorKind::InvalidOperand,
                format!("`{}` takes no operands", opcode),
                self.line_nr,
            ));
        }

        let instruction = match opcode {
            Opcode::HALT => Instruction::Halt,
            Opcode::OUT => Instruction::Out,
            Opcode::CMP => Instruction::Cmp,
            Opcode::ADD => Instruction::Add,
            Opcode::SUB => Instruction::Sub,
            Opcode::XOR => Instruction::Xor,
            Opcode::JEZ => Instruction::Jez(self.number(operands, ParseErrorKind::InvalidOperand)?),
            Opcode::JNZ => Instruction::Jnz(self.number(operands, ParseErrorKind::InvalidOperand)?),
            Opcode::APTR => {
                Instruction::Aptr(self.number(operands, ParseErrorKind::InvalidOperand)?)
            }
        };

        Ok(instruction)
    }

    /// Splits `dst <- src`
    fn split_move<'o>(&self, operands: &'o str) -> Result<(&'o str, &'o str)> {
        operands
            .split_once("<-")
            .map(|(dst, src)| (dst.trim(), src.trim()))
            .ok_or_else(|| {
                ParseError::new(
                    ParseErrorKind::InvalidOperand,
                    format!("expected `dst <- src`, found `{}`", operands),
                    self.line_nr,
                )
            })
    }

    fn reg8(&self, operand: &str) -> Result<Reg8> {
        let operand: String = operand.split_whitespace().collect();

        Reg8::ALL
            .iter()
            .copied()
            .find(|register| register.name() == operand)
            .ok_or_else(|| {
                ParseError::new(
                    ParseErrorKind::InvalidOperand,
                    format!("no 8 bit register named `{}`", operand),
                    self.line_nr,
                )
            })
    }

    fn reg32(&self, operand: &str) -> Result<Reg32> {
        Reg32::ALL
            .iter()
            .copied()
            .find(|register| register.name() == operand)
            .ok_or_else(|| {
                ParseError::new(
                    ParseErrorKind::InvalidOperand,
                    format!("no 32 bit register named `{}`", operand),
                    self.line_nr,
                )
            })
    }

    fn number<T: Number>(&self, operand: &str, missing: ParseErrorKind) -> Result<T> {
        match T::parse(operand) {
            None => Err(ParseError::new(
                missing,
                "a number is required",
                self.line_nr,
            )),
            Some(Err(radix)) => Err(ParseError::new(
                ParseErrorKind::InvalidNumber { radix },
                format!("`{}` does not fit into {} bit(s)", operand.trim(), T::BITS),
                self.line_nr,
            )),
            Some(Ok(value)) => Ok(value),
        }
    }

    /// Writes `bytes` into the image at [`Parser::position`], growing the
    /// image if needed. Then it advances the position past them.
    ///
    /// # Errors
    ///
    /// This will return an error if the write would end beyond
    /// [`MAX_IMAGE_LEN`].
    fn write_bytes(&mut self, bytes: &[Byte]) -> Result<()> {
        let start = self.position as usize;
        let end = start
            .checked_add(bytes.len())
            .filter(|end| *end <= MAX_IMAGE_LEN)
            .ok_or_else(|| {
                ParseError::new(
                    ParseErrorKind::InvalidAddress { address: start },
                    "address is outside of memory",
                    self.line_nr,
                )
            })?;

        if self.image.len() < end {
            self.image.resize(end, 0);
        }
        self.image[start..end].copy_from_slice(bytes);
        self.position = end as Word;

        Ok(())
    }
}

/// Integer types that can appear as operands
trait Number: Sized {
    const BITS: u32;

    fn parse(s: &str) -> Option<std::result::Result<Self, u32>>;
}

impl Number for Byte {
    const BITS: u32 = 8;

    fn parse(s: &str) -> Option<std::result::Result<Self, u32>> {
        parse_number!(Byte: s)
    }
}

impl Number for Word {
    const BITS: u32 = 32;

    fn parse(s: &str) -> Option<std::result::Result<Self, u32>> {
        parse_number!(Word: s)
    }
}
