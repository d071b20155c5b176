use tracing::{debug, trace, warn};

use crate::memory::Memory;
use crate::opcode::{self, Instruction, Mode, Opcode};

/// The type of a single memory cell, operand and I/O value.
pub type Word = i64;

/// Externally visible execution status of a [`Vm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Running,
  AwaitingInput,
  Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  Running,
  // the pending input instruction has already resolved where its value goes
  AwaitingInput { target: Word },
  Halted,
}

/// The event a [`Vm`] suspends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
  /// An input instruction is pending; exactly one value must be supplied.
  NeedsInput,
  /// An output instruction produced this value.
  Output(Word),
  /// The machine reached the halt opcode. Resuming again yields this again.
  Halt,
}

/// Result of executing a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
  Continue,
  Suspend(Interrupt),
}

/// A word-code machine.
///
/// The machine never runs to completion on its own: [`Vm::resume`] executes
/// instructions until the next [`Interrupt`], and the caller decides what
/// happens next. Drivers of any shape (batch, streaming, several machines
/// talking to each other) are built on top of that one call.
#[derive(Debug, Clone)]
pub struct Vm {
  pc: Word,
  relative_base: Word,
  memory: Memory,
  state: State,
}

impl Vm {
  /// Create a machine over `memory`, starting at address 0
  pub fn new(memory: Memory) -> Self {
    Self {
      pc: 0,
      relative_base: 0,
      memory,
      state: State::Running,
    }
  }

  pub fn pc(&self) -> Word {
    self.pc
  }

  pub fn relative_base(&self) -> Word {
    self.relative_base
  }

  pub fn memory(&self) -> &Memory {
    &self.memory
  }

  pub fn into_memory(self) -> Memory {
    self.memory
  }

  pub fn status(&self) -> Status {
    match self.state {
      State::Running => Status::Running,
      State::AwaitingInput { .. } => Status::AwaitingInput,
      State::Halted => Status::Halted,
    }
  }

  pub fn is_halted(&self) -> bool {
    self.state == State::Halted
  }

  /// Run until the next interrupt.
  ///
  /// `input` must be `Some` exactly when the machine is waiting on an input
  /// instruction; the value completes that instruction before execution
  /// carries on. Any other combination is a [`Error::ProtocolViolation`].
  pub fn resume(&mut self, input: Option<Word>) -> Result<Interrupt, Error> {
    match (self.state, input) {
      (State::AwaitingInput { .. }, Some(value)) => {
        if let Err(err) = self.supply(value) {
          warn!(pc = self.pc, error = %err, "machine faulted");
          return Err(err);
        }
      }
      (State::AwaitingInput { .. }, None) => {
        return Err(Error::ProtocolViolation("an input is pending but none was supplied"));
      }
      (_, Some(_)) => {
        return Err(Error::ProtocolViolation("input supplied while no input is pending"));
      }
      (_, None) => {}
    }
    loop {
      match self.step() {
        Ok(Flow::Continue) => {}
        Ok(Flow::Suspend(interrupt)) => return Ok(interrupt),
        Err(err) => {
          warn!(pc = self.pc, error = %err, "machine faulted");
          return Err(err);
        }
      }
    }
  }

  /// Complete the pending input instruction with `value` without executing
  /// anything past it.
  pub fn supply(&mut self, value: Word) -> Result<(), Error> {
    let State::AwaitingInput { target } = self.state else {
      return Err(Error::ProtocolViolation("input supplied while no input is pending"));
    };
    self.memory.write(target, value)?;
    self.pc = offset(self.pc, 2)?;
    self.state = State::Running;
    trace!(address = target, value, "input supplied");
    Ok(())
  }

  /// Step through a single instruction.
  ///
  /// A suspended machine does not move: stepping while an input is pending
  /// reports [`Interrupt::NeedsInput`] again, and a halted machine keeps
  /// reporting [`Interrupt::Halt`].
  pub fn step(&mut self) -> Result<Flow, Error> {
    match self.state {
      State::Halted => return Ok(Flow::Suspend(Interrupt::Halt)),
      State::AwaitingInput { .. } => return Ok(Flow::Suspend(Interrupt::NeedsInput)),
      State::Running => {}
    }
    let word = self.memory.read(self.pc)?;
    let instruction = opcode::decode(word)?;
    trace!(pc = self.pc, opcode = ?instruction.opcode, "step");
    let mut task = Task::new(self, instruction);
    task.run()
  }
}

/// An error that occurred during execution of instructions
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
  #[error("invalid opcode in instruction word `{0}`")]
  InvalidOpcode(Word),

  #[error("invalid addressing mode digit `{0}`")]
  InvalidMode(Word),

  #[error("negative address `{0}`")]
  InvalidAddress(Word),

  #[error("address `{0}` is past the memory limit")]
  AddressOutOfRange(Word),

  #[error("immediate mode used as a write target at pc {pc}")]
  InvalidWriteTarget { pc: Word },

  #[error("arithmetic overflow at pc {pc}")]
  ArithmeticOverflow { pc: Word },

  #[error("protocol violation: {0}")]
  ProtocolViolation(&'static str),
}

impl Error {
  /// Whether the instruction word itself was malformed.
  pub fn is_encoding(&self) -> bool {
    matches!(self, Self::InvalidOpcode(_) | Self::InvalidMode(_))
  }
}

fn offset(pc: Word, by: usize) -> Result<Word, Error> {
  pc.checked_add(by as Word)
    .ok_or(Error::ArithmeticOverflow { pc })
}

/// The raw literal in parameter slot `k` of the instruction at `pc`.
pub fn literal(memory: &mut Memory, pc: Word, k: usize) -> Result<Word, Error> {
  memory.read(offset(pc, k)?)
}

fn relative(relative_base: Word, literal: Word, pc: Word) -> Result<Word, Error> {
  relative_base
    .checked_add(literal)
    .ok_or(Error::ArithmeticOverflow { pc })
}

/// Resolve parameter `k` of `instruction` as a value to read.
pub fn operand(
  memory: &mut Memory,
  pc: Word,
  relative_base: Word,
  instruction: &Instruction,
  k: usize,
) -> Result<Word, Error> {
  let literal = literal(memory, pc, k)?;
  match instruction.mode(k) {
    Mode::Position => memory.read(literal),
    Mode::Immediate => Ok(literal),
    Mode::Relative => memory.read(relative(relative_base, literal, pc)?),
  }
}

/// Resolve parameter `k` of `instruction` as an address to write.
pub fn target(
  memory: &mut Memory,
  pc: Word,
  relative_base: Word,
  instruction: &Instruction,
  k: usize,
) -> Result<Word, Error> {
  let literal = literal(memory, pc, k)?;
  let address = match instruction.mode(k) {
    Mode::Position => literal,
    Mode::Immediate => return Err(Error::InvalidWriteTarget { pc }),
    Mode::Relative => relative(relative_base, literal, pc)?,
  };
  if address < 0 {
    return Err(Error::InvalidAddress(address));
  }
  Ok(address)
}

struct Task<'vm> {
  vm: &'vm mut Vm,
  instruction: Instruction,
}

impl<'vm> Task<'vm> {
  fn new(vm: &'vm mut Vm, instruction: Instruction) -> Self {
    Self { vm, instruction }
  }

  #[inline]
  fn operand(&mut self, k: usize) -> Result<Word, Error> {
    operand(
      &mut self.vm.memory,
      self.vm.pc,
      self.vm.relative_base,
      &self.instruction,
      k,
    )
  }

  #[inline]
  fn target(&mut self, k: usize) -> Result<Word, Error> {
    target(
      &mut self.vm.memory,
      self.vm.pc,
      self.vm.relative_base,
      &self.instruction,
      k,
    )
  }

  fn advance(&mut self) -> Result<(), Error> {
    self.vm.pc = offset(self.vm.pc, self.instruction.width())?;
    Ok(())
  }

  fn overflow(&self) -> Error {
    Error::ArithmeticOverflow { pc: self.vm.pc }
  }

  fn run(&mut self) -> Result<Flow, Error> {
    match self.instruction.opcode {
      Opcode::Add => add(self),
      Opcode::Multiply => multiply(self),
      Opcode::Input => input(self),
      Opcode::Output => output(self),
      Opcode::JumpIfTrue => jump_if_true(self),
      Opcode::JumpIfFalse => jump_if_false(self),
      Opcode::LessThan => less_than(self),
      Opcode::Equals => equals(self),
      Opcode::AdjustRelativeBase => adjust_relative_base(self),
      Opcode::Halt => halt(self),
    }
  }
}

fn store(task: &mut Task<'_>, value: Word) -> Result<Flow, Error> {
  let c = task.target(3)?;
  task.vm.memory.write(c, value)?;
  task.advance()?;
  Ok(Flow::Continue)
}

// m[c] ← a + b
fn add(task: &mut Task<'_>) -> Result<Flow, Error> {
  let a = task.operand(1)?;
  let b = task.operand(2)?;
  let sum = a.checked_add(b).ok_or_else(|| task.overflow())?;
  store(task, sum)
}

// m[c] ← a × b
fn multiply(task: &mut Task<'_>) -> Result<Flow, Error> {
  let a = task.operand(1)?;
  let b = task.operand(2)?;
  let product = a.checked_mul(b).ok_or_else(|| task.overflow())?;
  store(task, product)
}

// m[a] ← (input)
fn input(task: &mut Task<'_>) -> Result<Flow, Error> {
  let target = task.target(1)?;
  task.vm.state = State::AwaitingInput { target };
  debug!(pc = task.vm.pc, address = target, "awaiting input");
  Ok(Flow::Suspend(Interrupt::NeedsInput))
}

// (output) ← a
fn output(task: &mut Task<'_>) -> Result<Flow, Error> {
  let a = task.operand(1)?;
  task.advance()?;
  trace!(value = a, "output");
  Ok(Flow::Suspend(Interrupt::Output(a)))
}

fn jump_when(task: &mut Task<'_>, condition: fn(Word) -> bool) -> Result<Flow, Error> {
  let a = task.operand(1)?;
  let b = task.operand(2)?;
  if condition(a) {
    task.vm.pc = b;
  } else {
    task.advance()?;
  }
  Ok(Flow::Continue)
}

// if a ≠ 0 : pc ← b
fn jump_if_true(task: &mut Task<'_>) -> Result<Flow, Error> {
  jump_when(task, |a| a != 0)
}

// if a = 0 : pc ← b
fn jump_if_false(task: &mut Task<'_>) -> Result<Flow, Error> {
  jump_when(task, |a| a == 0)
}

// m[c] ← (a < b) ? 1 : 0
fn less_than(task: &mut Task<'_>) -> Result<Flow, Error> {
  let a = task.operand(1)?;
  let b = task.operand(2)?;
  store(task, Word::from(a < b))
}

// m[c] ← (a = b) ? 1 : 0
fn equals(task: &mut Task<'_>) -> Result<Flow, Error> {
  let a = task.operand(1)?;
  let b = task.operand(2)?;
  store(task, Word::from(a == b))
}

// rb ← rb + a
fn adjust_relative_base(task: &mut Task<'_>) -> Result<Flow, Error> {
  let a = task.operand(1)?;
  let base = task
    .vm
    .relative_base
    .checked_add(a)
    .ok_or_else(|| task.overflow())?;
  task.vm.relative_base = base;
  task.advance()?;
  Ok(Flow::Continue)
}

// (stop execution)
fn halt(task: &mut Task<'_>) -> Result<Flow, Error> {
  task.vm.state = State::Halted;
  debug!(pc = task.vm.pc, "halted");
  Ok(Flow::Suspend(Interrupt::Halt))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn machine(words: &[Word]) -> Vm {
    Vm::new(Memory::from(words))
  }

  fn run_to_halt(vm: &mut Vm) {
    assert_eq!(vm.resume(None), Ok(Interrupt::Halt));
  }

  mod vm {
    use super::*;

    #[test]
    fn new() {
      let vm = machine(&[99]);
      assert_eq!(vm.pc(), 0);
      assert_eq!(vm.relative_base(), 0);
      assert_eq!(vm.status(), Status::Running);
    }

    #[test]
    fn halt_only() {
      let mut vm = machine(&[99]);
      run_to_halt(&mut vm);
      assert!(vm.is_halted());
      assert_eq!(vm.memory().as_slice(), &[99]);
      // cant progress
      assert_eq!(vm.resume(None), Ok(Interrupt::Halt));
      assert_eq!(vm.pc(), 0);
    }

    #[test]
    fn step_add() {
      let mut vm = machine(&[1, 5, 6, 7, 99, 20, 22, 0]);
      assert_eq!(vm.step(), Ok(Flow::Continue));
      assert_eq!(vm.pc(), 4);
      assert_eq!(vm.memory().peek(7), 42);
    }

    #[test]
    fn step_multiply_immediate() {
      let mut vm = machine(&[1002, 4, 3, 4, 33]);
      assert_eq!(vm.step(), Ok(Flow::Continue));
      assert_eq!(vm.memory().peek(4), 99);
      assert_eq!(vm.step(), Ok(Flow::Suspend(Interrupt::Halt)));
    }

    #[test]
    fn arithmetic_program() {
      let mut vm = machine(&[1, 9, 10, 3, 2, 3, 11, 0, 99, 30, 40, 50]);
      run_to_halt(&mut vm);
      assert_eq!(
        vm.memory().as_slice(),
        &[3500, 9, 10, 70, 2, 3, 11, 0, 99, 30, 40, 50]
      );
    }

    #[test]
    fn self_modifying_programs() {
      for (program, expected) in [
        (vec![1, 0, 0, 0, 99], vec![2, 0, 0, 0, 99]),
        (vec![2, 3, 0, 3, 99], vec![2, 3, 0, 6, 99]),
        (vec![2, 4, 4, 5, 99, 0], vec![2, 4, 4, 5, 99, 9801]),
        (vec![1, 1, 1, 4, 99, 5, 6, 0, 99], vec![30, 1, 1, 4, 2, 5, 6, 0, 99]),
      ] {
        let mut vm = machine(&program);
        run_to_halt(&mut vm);
        assert_eq!(vm.memory().as_slice(), &expected[..]);
      }
    }

    #[test]
    fn step_input_suspends() {
      let mut vm = machine(&[3, 3, 99, 0]);
      assert_eq!(vm.step(), Ok(Flow::Suspend(Interrupt::NeedsInput)));
      assert_eq!(vm.status(), Status::AwaitingInput);
      assert_eq!(vm.pc(), 0);
      // still pending
      assert_eq!(vm.step(), Ok(Flow::Suspend(Interrupt::NeedsInput)));
      vm.supply(17).unwrap();
      assert_eq!(vm.status(), Status::Running);
      assert_eq!(vm.pc(), 2);
      assert_eq!(vm.memory().peek(3), 17);
    }

    #[test]
    fn step_output() {
      let mut vm = machine(&[4, 2, 99]);
      assert_eq!(vm.step(), Ok(Flow::Suspend(Interrupt::Output(99))));
      assert_eq!(vm.pc(), 2);
      assert_eq!(vm.resume(None), Ok(Interrupt::Halt));
    }

    #[test]
    fn echo() {
      let mut vm = machine(&[3, 0, 4, 0, 99]);
      assert_eq!(vm.resume(None), Ok(Interrupt::NeedsInput));
      assert_eq!(vm.resume(Some(-12)), Ok(Interrupt::Output(-12)));
      assert_eq!(vm.resume(None), Ok(Interrupt::Halt));
    }

    #[test]
    fn step_jump_if_true() {
      let mut vm = machine(&[1105, 1, 7, 99]);
      assert_eq!(vm.step(), Ok(Flow::Continue));
      assert_eq!(vm.pc(), 7);

      let mut vm = machine(&[1105, 0, 7, 99]);
      assert_eq!(vm.step(), Ok(Flow::Continue));
      assert_eq!(vm.pc(), 3);
    }

    #[test]
    fn step_jump_if_false() {
      let mut vm = machine(&[1106, 0, 9, 99]);
      assert_eq!(vm.step(), Ok(Flow::Continue));
      assert_eq!(vm.pc(), 9);

      let mut vm = machine(&[1106, 5, 9, 99]);
      assert_eq!(vm.step(), Ok(Flow::Continue));
      assert_eq!(vm.pc(), 3);
    }

    #[test]
    fn step_less_than_and_equals() {
      let mut vm = machine(&[1107, 3, 4, 9, 1108, 4, 4, 10, 99, -1, -1]);
      assert_eq!(vm.step(), Ok(Flow::Continue));
      assert_eq!(vm.step(), Ok(Flow::Continue));
      assert_eq!(vm.memory().peek(9), 1);
      assert_eq!(vm.memory().peek(10), 1);

      let mut vm = machine(&[1107, 4, 3, 9, 1108, 4, 5, 10, 99, -1, -1]);
      assert_eq!(vm.step(), Ok(Flow::Continue));
      assert_eq!(vm.step(), Ok(Flow::Continue));
      assert_eq!(vm.memory().peek(9), 0);
      assert_eq!(vm.memory().peek(10), 0);
    }

    #[test]
    fn compare_with_eight() {
      // position mode "equal to 8" and immediate mode "less than 8"
      let equal = [3, 9, 8, 9, 10, 9, 4, 9, 99, -1, 8];
      let less = [3, 3, 1107, -1, 8, 3, 4, 3, 99];
      for (input, is_equal, is_less) in [(7, 0, 1), (8, 1, 0), (9, 0, 0)] {
        let mut vm = machine(&equal);
        assert_eq!(vm.resume(None), Ok(Interrupt::NeedsInput));
        assert_eq!(vm.resume(Some(input)), Ok(Interrupt::Output(is_equal)));
        let mut vm = machine(&less);
        assert_eq!(vm.resume(None), Ok(Interrupt::NeedsInput));
        assert_eq!(vm.resume(Some(input)), Ok(Interrupt::Output(is_less)));
      }
    }

    #[test]
    fn step_adjust_relative_base() {
      let mut vm = machine(&[109, 19, 204, -34, 99]);
      vm.relative_base = 2000;
      vm.memory.write(1985, 5).unwrap();
      assert_eq!(vm.step(), Ok(Flow::Continue));
      assert_eq!(vm.relative_base(), 2019);
      assert_eq!(vm.step(), Ok(Flow::Suspend(Interrupt::Output(5))));
    }

    #[test]
    fn addressing_modes_read_same_value() {
      // the value 77 lives at address 10; each output reaches it differently
      let mut memory = Memory::from(vec![
        109, 6, // rb ← 6
        4, 10, // position: m[10]
        104, 77, // immediate: 77
        204, 4, // relative: m[6 + 4]
        99, 0, 77,
      ]);
      memory.write(10, 77).unwrap();
      let mut vm = Vm::new(memory);
      assert_eq!(vm.resume(None), Ok(Interrupt::Output(77)));
      assert_eq!(vm.resume(None), Ok(Interrupt::Output(77)));
      assert_eq!(vm.resume(None), Ok(Interrupt::Output(77)));
      assert_eq!(vm.resume(None), Ok(Interrupt::Halt));
    }

    #[test]
    fn relative_write_target() {
      let mut vm = machine(&[109, 10, 21101, 3, 4, 0, 99]);
      run_to_halt(&mut vm);
      assert_eq!(vm.memory().peek(10), 7);
      assert_eq!(vm.memory().len(), 11);
    }

    #[test]
    fn relative_input_target() {
      let mut vm = machine(&[109, 5, 203, 1, 99]);
      assert_eq!(vm.resume(None), Ok(Interrupt::NeedsInput));
      assert_eq!(vm.resume(Some(8)), Ok(Interrupt::Halt));
      assert_eq!(vm.memory().peek(6), 8);
    }

    #[test]
    fn immediate_write_target() {
      let mut vm = machine(&[11101, 1, 2, 3, 99]);
      assert_eq!(vm.resume(None), Err(Error::InvalidWriteTarget { pc: 0 }));
      assert_eq!(vm.pc(), 0);

      let mut vm = machine(&[103, 0, 99]);
      assert_eq!(vm.resume(None), Err(Error::InvalidWriteTarget { pc: 0 }));
      assert_eq!(vm.status(), Status::Running);
    }

    #[test]
    fn fault_is_reproducible() {
      let mut vm = machine(&[1101, 1, 1, 5, 42]);
      assert_eq!(vm.resume(None), Err(Error::InvalidOpcode(42)));
      assert_eq!(vm.pc(), 4);
      assert_eq!(vm.resume(None), Err(Error::InvalidOpcode(42)));
    }

    #[test]
    fn negative_addresses() {
      let mut vm = machine(&[4, -1, 99]);
      assert_eq!(vm.resume(None), Err(Error::InvalidAddress(-1)));

      let mut vm = machine(&[1101, 1, 1, -3, 99]);
      assert_eq!(vm.resume(None), Err(Error::InvalidAddress(-3)));

      let mut vm = machine(&[1105, 1, -4]);
      assert_eq!(vm.resume(None), Err(Error::InvalidAddress(-4)));
    }

    #[test]
    fn arithmetic_overflow() {
      let mut vm = machine(&[1102, Word::MAX, 2, 0, 99]);
      assert_eq!(vm.resume(None), Err(Error::ArithmeticOverflow { pc: 0 }));
    }

    #[test]
    fn large_numbers() {
      let mut vm = machine(&[1102, 34915192, 34915192, 7, 4, 7, 99, 0]);
      assert_eq!(vm.resume(None), Ok(Interrupt::Output(1219070632396864)));

      let mut vm = machine(&[104, 1125899906842624, 99]);
      assert_eq!(vm.resume(None), Ok(Interrupt::Output(1125899906842624)));
    }

    #[test]
    fn quine() {
      let program = [
        109, 1, 204, -1, 1001, 100, 1, 100, 1008, 100, 16, 101, 1006, 101, 0, 99,
      ];
      let mut vm = machine(&program);
      let mut outputs = vec![];
      loop {
        match vm.resume(None).unwrap() {
          Interrupt::Output(value) => outputs.push(value),
          Interrupt::Halt => break,
          Interrupt::NeedsInput => panic!("quine reads no input"),
        }
      }
      assert_eq!(outputs, program);
    }

    #[test]
    fn protocol_violations() {
      let mut vm = machine(&[3, 0, 99]);
      assert_eq!(
        vm.resume(Some(1)),
        Err(Error::ProtocolViolation("input supplied while no input is pending"))
      );
      assert_eq!(vm.resume(None), Ok(Interrupt::NeedsInput));
      assert!(matches!(vm.resume(None), Err(Error::ProtocolViolation(_))));
      // the pending input survives the violation
      assert_eq!(vm.resume(Some(5)), Ok(Interrupt::Halt));
      assert!(matches!(vm.resume(Some(5)), Err(Error::ProtocolViolation(_))));
      assert!(matches!(vm.supply(5), Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn input_target_out_of_range() {
      let limit = crate::memory::MAX_MEMORY as Word;
      let mut vm = machine(&[109, limit, 203, 0, 99]);
      assert_eq!(vm.resume(None), Ok(Interrupt::NeedsInput));
      assert_eq!(vm.resume(Some(1)), Err(Error::AddressOutOfRange(limit)));
      // the input is still pending at the same instruction
      assert_eq!(vm.status(), Status::AwaitingInput);
      assert_eq!(vm.pc(), 2);
    }
  }

  mod operands {
    use super::*;

    #[test]
    fn pure_resolution() {
      let mut memory = Memory::from(vec![21001, 4, 2, 1, 50, 60]);
      let instruction = opcode::decode(21001).unwrap();
      assert_eq!(operand(&mut memory, 0, 0, &instruction, 1), Ok(50));
      assert_eq!(operand(&mut memory, 0, 0, &instruction, 2), Ok(2));
      assert_eq!(target(&mut memory, 0, 3, &instruction, 3), Ok(4));
      assert_eq!(literal(&mut memory, 0, 3), Ok(1));
    }

    #[test]
    fn relative_target_below_zero() {
      let mut memory = Memory::from(vec![203, -5]);
      let instruction = opcode::decode(203).unwrap();
      assert_eq!(
        target(&mut memory, 0, 2, &instruction, 1),
        Err(Error::InvalidAddress(-3))
      );
    }
  }
}
