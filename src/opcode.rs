use crate::vm::{Error, Word};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
  /// Adds two operands.
  ///
  /// | Operation | Semantics/RTL       | Words |
  /// |-----------|---------------------|-------|
  /// | Add       | `m[c] ← a + b`      | 4     |
  Add = 1,

  /// Multiplies two operands.
  ///
  /// | Operation | Semantics/RTL       | Words |
  /// |-----------|---------------------|-------|
  /// | Multiply  | `m[c] ← a × b`      | 4     |
  Multiply = 2,

  /// Stores one value supplied by the driver. This is where the machine
  /// suspends with [`Interrupt::NeedsInput`](crate::vm::Interrupt).
  ///
  /// | Operation | Semantics/RTL       | Words |
  /// |-----------|---------------------|-------|
  /// | Input     | `m[a] ← (input)`    | 2     |
  Input = 3,

  /// Emits one value to the driver.
  ///
  /// | Operation | Semantics/RTL       | Words |
  /// |-----------|---------------------|-------|
  /// | Output    | `(output) ← a`      | 2     |
  Output = 4,

  /// | Operation    | Semantics/RTL             | Words |
  /// |--------------|---------------------------|-------|
  /// | Jump If True | `if a ≠ 0 : pc ← b`       | 3     |
  JumpIfTrue = 5,

  /// | Operation     | Semantics/RTL            | Words |
  /// |---------------|--------------------------|-------|
  /// | Jump If False | `if a = 0 : pc ← b`      | 3     |
  JumpIfFalse = 6,

  /// | Operation | Semantics/RTL             | Words |
  /// |-----------|---------------------------|-------|
  /// | Less Than | `m[c] ← (a < b) ? 1 : 0`  | 4     |
  LessThan = 7,

  /// | Operation | Semantics/RTL             | Words |
  /// |-----------|---------------------------|-------|
  /// | Equals    | `m[c] ← (a = b) ? 1 : 0`  | 4     |
  Equals = 8,

  /// Moves the relative base used by [`Mode::Relative`] parameters.
  ///
  /// | Operation            | Semantics/RTL  | Words |
  /// |----------------------|----------------|-------|
  /// | Adjust Relative Base | `rb ← rb + a`  | 2     |
  AdjustRelativeBase = 9,

  /// | Operation | Semantics/RTL      | Words |
  /// |-----------|--------------------|-------|
  /// | Halt      | `(stop execution)` | 1     |
  Halt = 99,
}

impl Opcode {
  /// Number of parameters following the instruction word.
  pub fn arity(self) -> usize {
    match self {
      Self::Add | Self::Multiply | Self::LessThan | Self::Equals => 3,
      Self::JumpIfTrue | Self::JumpIfFalse => 2,
      Self::Input | Self::Output | Self::AdjustRelativeBase => 1,
      Self::Halt => 0,
    }
  }
}

impl TryFrom<Word> for Opcode {
  type Error = Error;

  fn try_from(code: Word) -> Result<Self, Self::Error> {
    match code {
      1 => Ok(Self::Add),
      2 => Ok(Self::Multiply),
      3 => Ok(Self::Input),
      4 => Ok(Self::Output),
      5 => Ok(Self::JumpIfTrue),
      6 => Ok(Self::JumpIfFalse),
      7 => Ok(Self::LessThan),
      8 => Ok(Self::Equals),
      9 => Ok(Self::AdjustRelativeBase),
      99 => Ok(Self::Halt),
      _ => Err(Error::InvalidOpcode(code)),
    }
  }
}

/// How a parameter's literal turns into an operand.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
  /// The literal is an address, the operand is `m[literal]`.
  #[default]
  Position = 0,
  /// The literal is the operand. Never valid as a write target.
  Immediate = 1,
  /// The operand is `m[rb + literal]`.
  Relative = 2,
}

impl TryFrom<Word> for Mode {
  type Error = Error;

  fn try_from(digit: Word) -> Result<Self, Self::Error> {
    match digit {
      0 => Ok(Self::Position),
      1 => Ok(Self::Immediate),
      2 => Ok(Self::Relative),
      _ => Err(Error::InvalidMode(digit)),
    }
  }
}

/// A decoded instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
  pub opcode: Opcode,
  pub modes: [Mode; 3],
}

impl Instruction {
  /// Mode of the 1-based parameter `k`.
  pub fn mode(&self, k: usize) -> Mode {
    self.modes[k - 1]
  }

  /// Words occupied by the instruction and its parameters.
  pub fn width(&self) -> usize {
    1 + self.opcode.arity()
  }
}

/// Splits an instruction word into its opcode and parameter modes.
///
/// `opcode = word % 100`, and the mode of parameter `k` is the `k`-th decimal
/// digit of `word / 100` counting from the least significant one. All three
/// mode digits must be valid; slots past the opcode's arity read as
/// `Position`.
pub fn decode(word: Word) -> Result<Instruction, Error> {
  if word < 0 {
    return Err(Error::InvalidOpcode(word));
  }
  let opcode = Opcode::try_from(word % 100)?;
  let mut modes = [Mode::Position; 3];
  let mut digits = word / 100;
  for (k, mode) in modes.iter_mut().enumerate() {
    let decoded = Mode::try_from(digits % 10)?;
    if k < opcode.arity() {
      *mode = decoded;
    }
    digits /= 10;
  }
  Ok(Instruction { opcode, modes })
}
