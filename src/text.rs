//! The text convention several programs speak: every output in `0..=255` is
//! one character, anything else is an out-of-band value such as a score.

use crate::harness::HarnessError;
use crate::vm::{Interrupt, Status, Vm, Word};

/// One output value read as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glyph {
  Char(char),
  Signal(Word),
}

impl From<Word> for Glyph {
  fn from(value: Word) -> Self {
    match u8::try_from(value) {
      Ok(byte) => Self::Char(char::from(byte)),
      Err(_) => Self::Signal(value),
    }
  }
}

/// Outputs split into their text and their out-of-band values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
  pub text: String,
  pub signals: Vec<Word>,
}

impl Transcript {
  pub fn push(&mut self, value: Word) {
    match Glyph::from(value) {
      Glyph::Char(c) => self.text.push(c),
      Glyph::Signal(signal) => self.signals.push(signal),
    }
  }
}

impl From<&[Word]> for Transcript {
  fn from(outputs: &[Word]) -> Self {
    let mut transcript = Self::default();
    for &value in outputs {
      transcript.push(value);
    }
    transcript
  }
}

/// Encode `line` plus a terminating newline as input words.
pub fn encode(line: &str) -> Result<Vec<Word>, HarnessError> {
  line
    .chars()
    .chain(std::iter::once('\n'))
    .map(|c| {
      if c.is_ascii() {
        Ok(Word::from(c as u8))
      } else {
        Err(HarnessError::NonAscii(c))
      }
    })
    .collect()
}

/// Type `line` into the machine and read its reply.
///
/// Output is collected while the command is being consumed and afterwards,
/// until the machine asks for more input than the command provides or halts.
pub fn command(vm: &mut Vm, line: &str) -> Result<Transcript, HarnessError> {
  let inputs = encode(line)?;
  let mut inputs = inputs.into_iter();
  let mut transcript = Transcript::default();
  loop {
    if vm.status() == Status::AwaitingInput {
      match inputs.next() {
        Some(value) => vm.supply(value)?,
        None => return Ok(transcript),
      }
    }
    match vm.resume(None)? {
      Interrupt::NeedsInput => {}
      Interrupt::Output(value) => transcript.push(value),
      Interrupt::Halt => break,
    }
  }
  let remaining = inputs.len();
  if remaining > 0 {
    return Err(HarnessError::UnconsumedInput { remaining });
  }
  Ok(transcript)
}

/// Read everything the machine prints before it first asks for input or halts.
pub fn prompt(vm: &mut Vm) -> Result<Transcript, HarnessError> {
  let mut transcript = Transcript::default();
  if vm.status() == Status::AwaitingInput {
    return Ok(transcript);
  }
  loop {
    match vm.resume(None)? {
      Interrupt::Output(value) => transcript.push(value),
      Interrupt::NeedsInput | Interrupt::Halt => return Ok(transcript),
    }
  }
}
