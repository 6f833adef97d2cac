use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Result, WrapErr};
use log::*;
use simple_logger::SimpleLogger;

use cpu::layers::{self, packet::PacketFilter, Layer};
use cpu::memory::Memory;
use cpu::processor::{disassemble, Config, Processor, DEFAULT_MAX_STEPS};

#[derive(Debug, Parser)]
#[command(name = "onion-cpu", version, about = "Peel the onion layers and run the program inside")]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a raw memory image and write what it outputs
    Run {
        image: PathBuf,
        /// Fault after this many instructions
        #[arg(long, env = "ONION_MAX_STEPS", default_value_t = DEFAULT_MAX_STEPS)]
        max_steps: u64,
        /// Run without a step limit
        #[arg(long)]
        unbounded: bool,
        /// Write the output here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Log a hex dump of the memory before running (needs -vv)
        #[arg(long)]
        dump: bool,
    },
    /// Assemble a source file into a memory image
    Asm {
        source: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print the disassembly of a memory image
    Disasm { image: PathBuf },
    /// Decode the payload of one layer document
    Peel {
        layer: LayerKind,
        input: PathBuf,
        /// File holding the raw XOR key
        #[arg(long, required_if_eq("layer", "xor"))]
        key: Option<PathBuf>,
        /// Write the decoded bytes here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LayerKind {
    Ascii85,
    Bitwise,
    Parity,
    Xor,
    Packet,
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).wrap_err_with(|| format!("Failed to read `{}`", path.display()))
}

fn write_output(output: Option<&Path>, data: &[u8]) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, data).wrap_err_with(|| format!("Failed to write `{}`", path.display()))
        }
        None => {
            let mut stdout = io::stdout();
            stdout.write_all(data)?;
            stdout.flush()?;
            Ok(())
        }
    }
}

fn run(image: &Path, config: Config, output: Option<&Path>, dump: bool) -> Result<()> {
    let mut memory = Memory::new(read(image)?);
    if dump {
        memory.dump();
    }

    let mut cpu = Processor::new(config);
    let result = cpu.execute_until_halt(&mut memory);

    let written = match result {
        Ok(written) => written,
        Err(fault) => {
            error!("Registers at fault: {:?}", cpu.registers);
            return Err(fault).wrap_err_with(|| format!("Program `{}` faulted", image.display()));
        }
    };

    write_output(output, &written)
}

fn peel(kind: LayerKind, input: &Path, key: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let text = fs::read_to_string(input)
        .wrap_err_with(|| format!("Failed to read `{}`", input.display()))?;

    let layer = match kind {
        LayerKind::Ascii85 => Layer::Ascii85,
        LayerKind::Bitwise => Layer::Bitwise,
        LayerKind::Parity => Layer::Parity,
        LayerKind::Xor => {
            let key = key.ok_or_else(|| eyre!("The xor layer needs --key"))?;
            Layer::Xor(read(key)?)
        }
        LayerKind::Packet => Layer::Packet(PacketFilter::default()),
    };

    let decoded = layers::peel(&text, &layer)
        .wrap_err_with(|| format!("Failed to peel {} layer `{}`", layer.name(), input.display()))?;

    write_output(output, &decoded)
}

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling

    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    SimpleLogger::new()
        .with_level(level)
        .init()
        .map_err(|err| eyre!("Failed to set up logging: {}", err))?;

    match cli.command {
        Command::Run {
            image,
            max_steps,
            unbounded,
            output,
            dump,
        } => {
            let config = if unbounded {
                Config::unbounded()
            } else {
                Config::with_max_steps(max_steps)
            };
            run(&image, config, output.as_deref(), dump)
        }
        Command::Asm { source, output } => {
            let memory = Memory::from_file(&source)?;
            info!("Assembled {} bytes", memory.len());
            write_output(Some(&output), memory.data())
        }
        Command::Disasm { image } => {
            let memory = Memory::new(read(&image)?);
            print!("{}", disassemble(&memory));
            Ok(())
        }
        Command::Peel {
            layer,
            input,
            key,
            output,
        } => peel(layer, &input, key.as_deref(), output.as_deref()),
    }
}
