use std::error;
use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::str::FromStr;

use color_eyre::eyre::{eyre, Result, WrapErr};
use log::*;

use self::parse::{Endianess, ParseError, Parser};

pub mod parse;

pub type Byte = u8; // 1 byte
pub type Word = u32; // 4 bytes

/// A memory access whose range does not lie inside the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessError {
    /// First byte of the requested range
    pub offset: u64,
    /// Number of bytes requested
    pub size: usize,
    /// Length of the memory at the time of the access
    pub length: usize,
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "access of {} byte(s) at 0x{:08X} exceeds memory of {} bytes",
            self.size, self.offset, self.length
        )
    }
}

impl error::Error for AccessError {}

/// Emulates the byte addressed memory of the CPU.
///
/// The length is fixed when the memory is created. Every access is checked
/// against it and fails with an [`AccessError`] instead of panicking or
/// truncating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Memory {
    data: Vec<Byte>,
}

impl Memory {
    /// Creates a memory holding `image`
    pub fn new(image: Vec<Byte>) -> Self {
        Self { data: image }
    }

    /// Loads an assembler source file and assembles it into a memory image
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read `{}`", path.display()))?;

        source.parse::<Self>().map_err(|errors: Vec<ParseError>| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            eyre!(
                "Failed to assemble `{}`:\n{}",
                path.display(),
                messages.join("\n")
            )
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The raw contents of the memory
    pub fn data(&self) -> &[Byte] {
        &self.data
    }

    fn range(&self, offset: u64, size: usize) -> Result<Range<usize>, AccessError> {
        let error = AccessError {
            offset,
            size,
            length: self.data.len(),
        };

        let end = offset.checked_add(size as u64).ok_or(error)?;
        if end > self.data.len() as u64 {
            return Err(error);
        }

        Ok(offset as usize..end as usize)
    }

    /// Returns `size` bytes starting at `pc` without moving `pc`
    pub fn peek(&self, pc: Word, size: usize) -> Result<&[Byte], AccessError> {
        self.peek_from(u64::from(pc), size)
    }

    /// Returns `size` bytes starting at `pc` and advances `pc` past them.
    /// `pc` is left untouched if the range is out of bounds.
    pub fn read(&self, pc: &mut Word, size: usize) -> Result<&[Byte], AccessError> {
        let range = self.range(u64::from(*pc), size)?;
        *pc += size as Word;

        Ok(&self.data[range])
    }

    /// Reads `size` bytes at an absolute offset
    pub fn peek_from(&self, offset: u64, size: usize) -> Result<&[Byte], AccessError> {
        let range = self.range(offset, size)?;
        Ok(&self.data[range])
    }

    /// Replaces `bytes.len()` bytes at an absolute offset
    pub fn write_at(&mut self, offset: u64, bytes: &[Byte]) -> Result<(), AccessError> {
        let range = self.range(offset, bytes.len())?;
        self.data[range].copy_from_slice(bytes);

        Ok(())
    }

    /// Logs a hex dump of the whole memory
    pub fn dump(&self) {
        debug!("Memory dump ({} bytes):", self.data.len());

        for (row, chunk) in self.data.chunks(16).enumerate() {
            let hex: Vec<String> = chunk.iter().map(|byte| format!("{:02X}", byte)).collect();
            debug!("{:08X}: {}", row * 16, hex.join(" "));
        }
    }
}

impl FromStr for Memory {
    type Err = Vec<ParseError>;

    /// Assembles `s` into a memory image
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Parser::new(s, Endianess::default()).parse().map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::Result;

    #[test]
    fn test_peek() -> Result<()> {
        let mem = Memory::new(vec![0x12, 0x34, 0x56]);
        assert_eq!(mem.peek(1, 2)?, &[0x34, 0x56]);

        Ok(())
    }

    #[test]
    fn test_read_advances_pc() -> Result<()> {
        let mem = Memory::new(vec![0x12, 0x34, 0x56]);
        let mut pc = 0;

        assert_eq!(mem.read(&mut pc, 2)?, &[0x12, 0x34]);
        assert_eq!(pc, 2);
        assert_eq!(mem.read(&mut pc, 1)?, &[0x56]);
        assert_eq!(pc, 3);

        Ok(())
    }

    #[test]
    fn test_write_at() -> Result<()> {
        let mut mem = Memory::new(vec![0; 0x48]);
        mem.write_at(0x44, &[0x12, 0x34, 0x56, 0x78])?;
        assert_eq!(mem.peek_from(0x44, 4)?, &[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(mem.data()[0x43], 0);

        Ok(())
    }

    #[test]
    fn test_read_out_of_bounds_keeps_pc() {
        let mem = Memory::new(vec![0x21, 0x00, 0x00]);
        let mut pc = 1;

        let err = mem.read(&mut pc, 4).unwrap_err();
        assert_eq!(
            err,
            AccessError {
                offset: 1,
                size: 4,
                length: 3
            }
        );
        assert_eq!(pc, 1);
    }

    #[test]
    fn test_peek_past_end() {
        let mem = Memory::new(vec![0x01]);
        assert!(mem.peek(1, 1).is_err());
        assert!(mem.peek(0, 1).is_ok());
    }

    #[test]
    fn test_write_out_of_bounds_is_rejected() {
        let mut mem = Memory::new(vec![0; 4]);
        assert!(mem.write_at(3, &[1, 2]).is_err());
        assert!(mem.write_at(u64::MAX, &[1]).is_err());
        assert_eq!(mem, Memory::new(vec![0; 4]));
    }

    #[test]
    fn test_from_str() -> Result<()> {
        let mem: Memory = "MVI a <- 5\nOUT\nHALT".parse().unwrap();
        assert_eq!(mem.data(), &[0x48, 0x05, 0x02, 0x01]);

        Ok(())
    }
}
