use std::str::FromStr;

use crate::memory::Memory;
use crate::vm::{Vm, Word};

/// An immutable word-code program.
///
/// A program is only ever executed through a [`Memory`] copied out of it, so
/// one parsed program can seed any number of independent machines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
  words: Vec<Word>,
}

impl Program {
  pub fn words(&self) -> &[Word] {
    &self.words
  }

  pub fn len(&self) -> usize {
    self.words.len()
  }

  pub fn is_empty(&self) -> bool {
    self.words.is_empty()
  }

  /// A fresh memory holding the program at addresses `0..len`.
  pub fn load(&self) -> Memory {
    Memory::from(self.words.as_slice())
  }

  /// A fresh machine ready to run the program.
  pub fn boot(&self) -> Vm {
    Vm::new(self.load())
  }
}

impl From<Vec<Word>> for Program {
  fn from(words: Vec<Word>) -> Self {
    Self { words }
  }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
  #[error("program is empty")]
  Empty,

  #[error("word {index} is not an integer: `{text}`")]
  InvalidWord { index: usize, text: String },
}

impl FromStr for Program {
  type Err = ParseError;

  /// Parse comma separated decimal words, e.g. `1,0,0,3,99`.
  fn from_str(source: &str) -> Result<Self, Self::Err> {
    let source = source.trim();
    if source.is_empty() {
      return Err(ParseError::Empty);
    }
    let words = source
      .split(',')
      .enumerate()
      .map(|(index, cell)| {
        let cell = cell.trim();
        cell.parse::<Word>().map_err(|_| ParseError::InvalidWord {
          index,
          text: cell.to_string(),
        })
      })
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Self { words })
  }
}
