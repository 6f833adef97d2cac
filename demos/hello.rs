use color_eyre::eyre::Result;

use cpu::layers::{self, bitwise, Layer};
use cpu::memory::Memory;
use cpu::processor::{self, disassemble, Config};
use simple_logger::SimpleLogger;

/// Hides an assembled program in a bitwise layer, peels it again and runs it
fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new().init().unwrap(); // logging

    let program: Memory = r#"
        MVI a <- 0x48
        OUT
        MVI a <- 0x69
        OUT
        MVI a <- 0x0A
        OUT
        HALT
    "#
    .parse()
    .unwrap();

    let document = format!(
        "==[ Layer 1: Bitwise ]==\n\n{}\n",
        layers::ascii85::encode(&bitwise::encode(program.data()))
    );
    println!("{}", document);

    let image = layers::peel(&document, &Layer::Bitwise)?;
    print!("{}", disassemble(&Memory::new(image.clone())));

    let output = processor::run(image, Config::default())?;
    print!("{}", String::from_utf8_lossy(&output));

    Ok(())
}
