use crate::memory::{Byte, Memory, Word};
use log::*;

pub mod decode;
pub mod fault;
pub mod registers;

pub use self::decode::{decode, disassemble, Instruction, Opcode};
pub use self::fault::Fault;
pub use self::registers::{Reg32, Reg8, Registers};

/// Number of instructions a run may execute unless configured otherwise
pub const DEFAULT_MAX_STEPS: u64 = 100_000_000;

/// Modulus of the ALU arithmetic
const ALU_MODULUS: u16 = 255;

/// Execution state of the CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Running,
    /// Reached a HALT instruction
    Halted,
    /// Stopped by a [`Fault`]
    Faulted,
}

/// Limits of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Config {
    /// Fault with [`Fault::StepLimitExceeded`] after this many instructions
    pub max_steps: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_steps: Some(DEFAULT_MAX_STEPS),
        }
    }
}

impl Config {
    /// A configuration without a step limit
    pub fn unbounded() -> Self {
        Self { max_steps: None }
    }

    pub fn with_max_steps(max_steps: u64) -> Self {
        Self {
            max_steps: Some(max_steps),
        }
    }
}

/// Emulates a CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Processor {
    pub registers: Registers,
    pub state: State,
    /// Number of instructions executed so far
    pub steps: u64,
    config: Config,
}

impl Default for Processor {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Processor {
    /// Initializes a new CPU. All registers are zero, so execution starts at
    /// the beginning of the memory.
    pub fn new(config: Config) -> Self {
        Self {
            registers: Registers::default(),
            state: State::Running,
            steps: 0,
            config,
        }
    }

    /// Executes a single decoded instruction
    pub fn execute_instruction(
        &mut self,
        instruction: Instruction,
        memory: &mut Memory,
        output: &mut Vec<Byte>,
    ) -> Result<(), Fault> {
        let regs = &mut self.registers;

        match instruction {
            Instruction::Halt => {
                self.state = State::Halted;

                debug!("HALT");
            }
            Instruction::Out => {
                output.push(regs.a);

                debug!("OUT {}", regs.a);
            }
            Instruction::Cmp => {
                regs.f = if regs.a == regs.b { 0x00 } else { 0x01 };

                debug!("CMP {} {}: {}", regs.a, regs.b, regs.f);
            }
            Instruction::Add => {
                let (a, b) = (regs.a, regs.b);
                regs.a = ((u16::from(a) + u16::from(b)) % ALU_MODULUS) as Byte;

                debug!("ADD {} {}: {}", a, b, regs.a);
            }
            Instruction::Sub => {
                let (a, b) = (regs.a, regs.b);
                let mut result = i16::from(a) - i16::from(b);
                if result < 0 {
                    result += ALU_MODULUS as i16;
                }
                regs.a = result as Byte;

                debug!("SUB {} {}: {}", a, b, regs.a);
            }
            Instruction::Xor => {
                let (a, b) = (regs.a, regs.b);
                regs.a = a ^ b;

                debug!("XOR {} {}: {}", a, b, regs.a);
            }
            Instruction::Aptr(delta) => {
                regs.ptr = regs.ptr.wrapping_add(Word::from(delta));

                debug!("APTR {}: 0x{:08X}", delta, regs.ptr);
            }
            Instruction::Jez(target) => {
                if regs.f == 0x00 {
                    regs.pc = target;
                }

                debug!("JEZ 0x{:08X}: {}", target, regs.f);
            }
            Instruction::Jnz(target) => {
                if regs.f != 0x00 {
                    regs.pc = target;
                }

                debug!("JNZ 0x{:08X}: {}", target, regs.f);
            }
            Instruction::Mv { dst, src } => {
                let value = self.load8(src, memory)?;
                self.store8(dst, value, memory)?;

                debug!("MV {} <- {}: {}", dst, src, value);
            }
            Instruction::Mvi { dst, value } => {
                self.store8(dst, value, memory)?;

                debug!("MVI {} <- {}", dst, value);
            }
            Instruction::Mv32 { dst, src } => {
                let value = regs.get32(src);
                regs.set32(dst, value);

                debug!("MV32 {} <- {}: 0x{:08X}", dst, src, value);
            }
            Instruction::Mvi32 { dst, value } => {
                regs.set32(dst, value);

                debug!("MVI32 {} <- 0x{:08X}", dst, value);
            }
        }

        Ok(())
    }

    /// Reads an 8 bit operand, resolving `(ptr+c)` through memory
    fn load8(&self, src: Reg8, memory: &Memory) -> Result<Byte, Fault> {
        match self.registers.get8(src) {
            Some(value) => Ok(value),
            None => {
                let address = self.registers.indirect_address();
                Ok(memory.peek_from(address, 1)?[0])
            }
        }
    }

    /// Writes an 8 bit operand, resolving `(ptr+c)` through memory
    fn store8(&mut self, dst: Reg8, value: Byte, memory: &mut Memory) -> Result<(), Fault> {
        let address = self.registers.indirect_address();

        match self.registers.get8_mut(dst) {
            Some(register) => *register = value,
            None => memory.write_at(address, &[value])?,
        }

        Ok(())
    }

    fn fault(&mut self, fault: Fault) -> Result<State, Fault> {
        self.state = State::Faulted;
        warn!("Fault after {} steps: {}", self.steps, fault);

        Err(fault)
    }

    /// Runs one fetch, decode and execute cycle. Once the CPU halted or
    /// faulted this does nothing and returns the terminal state.
    pub fn execute(&mut self, memory: &mut Memory, output: &mut Vec<Byte>) -> Result<State, Fault> {
        if self.state != State::Running {
            return Ok(self.state);
        }

        if let Some(limit) = self.config.max_steps {
            if self.steps >= limit {
                return self.fault(Fault::StepLimitExceeded { limit });
            }
        }

        let instruction = match decode(memory, &mut self.registers.pc) {
            Ok(instruction) => instruction,
            Err(fault) => return self.fault(fault),
        };
        self.steps += 1;

        if let Err(fault) = self.execute_instruction(instruction, memory, output) {
            return self.fault(fault);
        }

        Ok(self.state)
    }

    /// Run program until it halts and return everything it wrote with OUT
    pub fn execute_until_halt(&mut self, memory: &mut Memory) -> Result<Vec<Byte>, Fault> {
        let mut output = Vec::new();

        while self.execute(memory, &mut output)? == State::Running {}

        info!(
            "Program terminated after {} steps. Output: {} bytes",
            self.steps,
            output.len()
        );

        Ok(output)
    }
}

/// Runs a memory image on a fresh CPU and returns its output
pub fn run(image: Vec<Byte>, config: Config) -> Result<Vec<Byte>, Fault> {
    let mut memory = Memory::new(image);
    let mut cpu = Processor::new(config);

    cpu.execute_until_halt(&mut memory)
}
