use std::io::Write;

use color_eyre::eyre::Result;

use cpu::memory::{Byte, Memory};
use cpu::processor::{Config, Instruction, Processor, Reg8};
use log::LevelFilter;
use simple_logger::SimpleLogger;

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap(); // logging

    use cpu::processor::Instruction::*;
    let program = [
        Mvi { dst: Reg8::A, value: b'9' },
        // 0x02
        Out,
        Mvi { dst: Reg8::B, value: 1 },
        Sub,
        Mvi { dst: Reg8::B, value: b'0' - 1 },
        Cmp,
        Jnz(0x02),
        Mvi { dst: Reg8::A, value: b'\n' },
        Out,
        Halt,
    ];

    let image: Vec<Byte> = program.iter().flat_map(Instruction::encode).collect();
    let mut mem = Memory::new(image);
    let mut cpu = Processor::new(Config::default());

    let output = cpu.execute_until_halt(&mut mem)?;
    std::io::stdout().write_all(&output)?;

    Ok(())
}
