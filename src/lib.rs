//! A word-code machine: programs are flat sequences of integers, instructions
//! are decimal-encoded (two digit opcode, one mode digit per parameter), and
//! execution suspends on every input and output so that the caller drives it.
//!
//! [`vm`] is the machine itself. [`harness`], [`text`], [`pipeline`] and
//! [`network`] are drivers built only on [`Vm::resume`] and [`Vm::supply`].

pub mod harness;
pub mod memory;
pub mod network;
pub mod opcode;
pub mod pipeline;
pub mod program;
pub mod text;
pub mod vm;

pub use memory::Memory;
pub use program::Program;
pub use vm::{Error, Interrupt, Status, Vm, Word};
