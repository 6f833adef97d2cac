use color_eyre::eyre::Result;

use cpu::memory::Memory;
use cpu::processor::Processor;
use simple_logger::SimpleLogger;

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new().init().unwrap(); // logging

    let mut mem = Memory::from_file("demos/programs/hello.asm")?;
    mem.dump();
    let mut cpu = Processor::default();

    let output = cpu.execute_until_halt(&mut mem)?;
    print!("{}", String::from_utf8_lossy(&output));

    Ok(())
}
