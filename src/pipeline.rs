//! A chain of amplifiers, each a machine running the same program, wired
//! output to input and optionally closed into a ring.

use tracing::debug;

use crate::harness::{self, HarnessError};
use crate::program::Program;
use crate::vm::{Interrupt, Vm, Word};

pub struct Pipeline {
  amplifiers: Vec<Vm>,
}

impl Pipeline {
  /// Boot one amplifier per phase setting and hand each its phase.
  pub fn new(program: &Program, phases: &[Word]) -> Result<Self, HarnessError> {
    let amplifiers = phases
      .iter()
      .map(|&phase| {
        let mut vm = program.boot();
        harness::send(&mut vm, &[phase])?;
        Ok(vm)
      })
      .collect::<Result<Vec<_>, HarnessError>>()?;
    debug!(?phases, "pipeline booted");
    Ok(Self { amplifiers })
  }

  pub fn len(&self) -> usize {
    self.amplifiers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.amplifiers.is_empty()
  }

  /// Pass `signal` through every amplifier once.
  pub fn run_once(&mut self, signal: Word) -> Result<Word, HarnessError> {
    let mut signal = signal;
    for amplifier in &mut self.amplifiers {
      signal = exchange(amplifier, signal)?.ok_or(HarnessError::UnexpectedHalt)?;
    }
    Ok(signal)
  }

  /// Circulate `signal` around the ring until an amplifier halts instead of
  /// taking another one; the last signal produced is the result.
  pub fn run_feedback(&mut self, signal: Word) -> Result<Word, HarnessError> {
    let mut signal = signal;
    if self.amplifiers.is_empty() {
      return Ok(signal);
    }
    let mut rounds = 0usize;
    loop {
      for amplifier in &mut self.amplifiers {
        match exchange(amplifier, signal)? {
          Some(next) => signal = next,
          None => {
            debug!(rounds, signal, "feedback loop settled");
            return Ok(signal);
          }
        }
      }
      rounds += 1;
    }
  }
}

/// Give one amplifier a signal and take the one it produces. `None` when it
/// halted instead of asking.
fn exchange(vm: &mut Vm, signal: Word) -> Result<Option<Word>, HarnessError> {
  match vm.resume(None)? {
    Interrupt::NeedsInput => {}
    Interrupt::Output(value) => return Err(HarnessError::UnexpectedOutput(value)),
    Interrupt::Halt => return Ok(None),
  }
  vm.supply(signal)?;
  match vm.resume(None)? {
    Interrupt::Output(value) => Ok(Some(value)),
    Interrupt::NeedsInput => Err(HarnessError::UnexpectedInput),
    Interrupt::Halt => Err(HarnessError::UnexpectedHalt),
  }
}

/// Run a fresh pipeline from signal 0.
pub fn amplify(program: &Program, phases: &[Word], feedback: bool) -> Result<Word, HarnessError> {
  let mut pipeline = Pipeline::new(program, phases)?;
  if feedback {
    pipeline.run_feedback(0)
  } else {
    pipeline.run_once(0)
  }
}
