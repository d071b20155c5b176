use crate::vm::{Error, Word};

/// Largest number of words a single machine may materialize.
pub const MAX_MEMORY: usize = 1 << 24;

/// The word store of one machine.
///
/// Every address starts out as `0`. Touching an address past the current
/// extent, for reading or writing, grows the store up to and including that
/// address. Nothing is ever reclaimed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Memory {
  words: Vec<Word>,
}

impl Memory {
  pub fn new() -> Self {
    Self::default()
  }

  /// Read the word at `address`, growing the store if needed
  pub fn read(&mut self, address: Word) -> Result<Word, Error> {
    let index = self.materialize(address)?;
    Ok(self.words[index])
  }

  /// Write `value` at `address`, growing the store if needed
  pub fn write(&mut self, address: Word, value: Word) -> Result<(), Error> {
    let index = self.materialize(address)?;
    self.words[index] = value;
    Ok(())
  }

  /// Inspect a word without growing the store.
  pub fn peek(&self, address: usize) -> Word {
    self.words.get(address).copied().unwrap_or(0)
  }

  /// An independent copy of the current contents.
  pub fn snapshot(&self) -> Self {
    self.clone()
  }

  pub fn len(&self) -> usize {
    self.words.len()
  }

  pub fn is_empty(&self) -> bool {
    self.words.is_empty()
  }

  pub fn as_slice(&self) -> &[Word] {
    &self.words
  }

  fn materialize(&mut self, address: Word) -> Result<usize, Error> {
    let index: usize = address
      .try_into()
      .map_err(|_| Error::InvalidAddress(address))?;
    if index >= MAX_MEMORY {
      return Err(Error::AddressOutOfRange(address));
    }
    if index >= self.words.len() {
      self.words.resize(index + 1, 0);
    }
    Ok(index)
  }
}

impl From<Vec<Word>> for Memory {
  fn from(words: Vec<Word>) -> Self {
    Self { words }
  }
}

impl From<&[Word]> for Memory {
  fn from(words: &[Word]) -> Self {
    Self {
      words: words.to_vec(),
    }
  }
}
