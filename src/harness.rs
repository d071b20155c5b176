//! Drivers built on top of [`Vm::resume`] and [`Vm::supply`].
//!
//! None of these need anything from the machine beyond the suspension
//! protocol, and none of them are used by the machine itself.

use tracing::debug;

use crate::program::Program;
use crate::vm::{Error, Interrupt, Status, Vm, Word};

/// An error raised by a driver, either on its own or passed up from the machine
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HarnessError {
  #[error(transparent)]
  Machine(#[from] Error),

  #[error("machine needs more input than was supplied")]
  InputStarvation,

  #[error("machine halted with {remaining} input value(s) left unconsumed")]
  UnconsumedInput { remaining: usize },

  #[error("machine halted unexpectedly")]
  UnexpectedHalt,

  #[error("machine produced unexpected output `{0}`")]
  UnexpectedOutput(Word),

  #[error("machine asked for input unexpectedly")]
  UnexpectedInput,

  #[error("expected {expected} output value(s), received {received}")]
  InsufficientOutput { expected: usize, received: usize },

  #[error("`{0}` is not an ASCII character")]
  NonAscii(char),
}

/// Run until the next output or halt, answering every input request from
/// `source`. `None` means the machine halted.
pub fn next_output<I>(vm: &mut Vm, source: &mut I) -> Result<Option<Word>, HarnessError>
where
  I: Iterator<Item = Word>,
{
  loop {
    if vm.status() == Status::AwaitingInput {
      let value = source.next().ok_or(HarnessError::InputStarvation)?;
      vm.supply(value)?;
    }
    match vm.resume(None)? {
      Interrupt::NeedsInput => {}
      Interrupt::Output(value) => return Ok(Some(value)),
      Interrupt::Halt => return Ok(None),
    }
  }
}

/// Feed `inputs` in order, run until halt and collect every output.
///
/// Both running out of input and halting with input left over are errors.
pub fn run(vm: &mut Vm, inputs: &[Word]) -> Result<Vec<Word>, HarnessError> {
  let mut source = inputs.iter().copied();
  let mut outputs = vec![];
  while let Some(value) = next_output(vm, &mut source)? {
    outputs.push(value);
  }
  let remaining = source.len();
  if remaining > 0 {
    return Err(HarnessError::UnconsumedInput { remaining });
  }
  debug!(outputs = outputs.len(), "batch run finished");
  Ok(outputs)
}

/// [`run`] on a fresh machine booted from `program`.
pub fn execute(program: &Program, inputs: &[Word]) -> Result<Vec<Word>, HarnessError> {
  run(&mut program.boot(), inputs)
}

/// Lazily produced outputs of a machine fed from an arbitrary input source.
///
/// Inputs are only pulled when the machine asks for them, so the source may be
/// interactive or unbounded. After the first error the iterator is exhausted.
pub struct Outputs<'vm, I> {
  vm: &'vm mut Vm,
  inputs: I,
  done: bool,
}

impl<I> Iterator for Outputs<'_, I>
where
  I: Iterator<Item = Word>,
{
  type Item = Result<Word, HarnessError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.done {
      return None;
    }
    match next_output(self.vm, &mut self.inputs) {
      Ok(Some(value)) => Some(Ok(value)),
      Ok(None) => {
        self.done = true;
        None
      }
      Err(err) => {
        self.done = true;
        Some(Err(err))
      }
    }
  }
}

impl<I> std::iter::FusedIterator for Outputs<'_, I> where I: Iterator<Item = Word> {}

/// Stream the outputs of `vm`, feeding it from `inputs` on demand
pub fn stream<I>(vm: &mut Vm, inputs: I) -> Outputs<'_, I::IntoIter>
where
  I: IntoIterator<Item = Word>,
{
  Outputs {
    vm,
    inputs: inputs.into_iter(),
    done: false,
  }
}

/// Feed `inputs`, all of which the program must ask for before producing any
/// output. The machine is left right after the last input instruction.
pub fn send(vm: &mut Vm, inputs: &[Word]) -> Result<(), HarnessError> {
  for &value in inputs {
    if vm.status() != Status::AwaitingInput {
      match vm.resume(None)? {
        Interrupt::NeedsInput => {}
        Interrupt::Output(value) => return Err(HarnessError::UnexpectedOutput(value)),
        Interrupt::Halt => return Err(HarnessError::UnexpectedHalt),
      }
    }
    vm.supply(value)?;
  }
  Ok(())
}

/// Collect exactly `count` outputs, with no input requested in between.
pub fn receive(vm: &mut Vm, count: usize) -> Result<Vec<Word>, HarnessError> {
  if vm.status() == Status::AwaitingInput {
    return Err(HarnessError::UnexpectedInput);
  }
  let mut outputs = Vec::with_capacity(count);
  while outputs.len() < count {
    match vm.resume(None)? {
      Interrupt::Output(value) => outputs.push(value),
      Interrupt::NeedsInput => return Err(HarnessError::UnexpectedInput),
      Interrupt::Halt => return Err(HarnessError::UnexpectedHalt),
    }
  }
  Ok(outputs)
}

/// Feed `inputs` and collect outputs until `expected` of them have arrived,
/// or until halt when `expected` is `None`.
///
/// Input left over at the end and falling short of `expected` are errors.
pub fn interact(
  vm: &mut Vm,
  inputs: &[Word],
  expected: Option<usize>,
) -> Result<Vec<Word>, HarnessError> {
  let mut source = inputs.iter().copied();
  let mut outputs = vec![];
  while expected.map_or(true, |count| outputs.len() < count) {
    match next_output(vm, &mut source)? {
      Some(value) => outputs.push(value),
      None => break,
    }
  }
  let remaining = source.len();
  if remaining > 0 {
    return Err(HarnessError::UnconsumedInput { remaining });
  }
  match expected {
    Some(expected) if outputs.len() < expected => Err(HarnessError::InsufficientOutput {
      expected,
      received: outputs.len(),
    }),
    _ => Ok(outputs),
  }
}
