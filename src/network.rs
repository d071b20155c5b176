//! A fixed set of machines exchanging packets by address.
//!
//! Every node runs the same program and is told its own address as its first
//! input. A node sends a packet by emitting three outputs: the destination
//! address, then `x`, then `y`. Packets to the monitor address leave the
//! network and are kept by the monitor instead.

use std::collections::VecDeque;

use tracing::{debug, info};

use crate::harness::{self, HarnessError};
use crate::program::Program;
use crate::vm::{Interrupt, Vm, Word};

/// Shape and scheduling policy of a [`Network`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig {
  /// Number of nodes, addressed `0..size`.
  pub size: usize,
  /// Destination whose packets go to the monitor.
  pub monitor_address: Word,
  /// Input given to a node asking for input while its queue is empty.
  pub idle_sentinel: Word,
  /// Consecutive passes without activity before the network counts as idle.
  pub idle_passes: usize,
  /// Give up after this many passes.
  pub max_passes: Option<usize>,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      size: 50,
      monitor_address: 255,
      idle_sentinel: -1,
      idle_passes: 1,
      max_passes: None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
  pub x: Word,
  pub y: Word,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
  #[error(transparent)]
  Harness(#[from] HarnessError),

  #[error("node {address} halted")]
  Halted { address: usize },

  #[error("node {address} sent a packet to unknown address {destination}")]
  InvalidDestination { address: usize, destination: Word },

  #[error("no node has address {0}")]
  NoSuchNode(usize),

  #[error("network went idle before the monitor received anything")]
  NothingToRecover,

  #[error("network gave up after {passes} passes")]
  Stalled { passes: usize },
}

impl From<crate::vm::Error> for NetworkError {
  fn from(err: crate::vm::Error) -> Self {
    Self::Harness(HarnessError::Machine(err))
  }
}

pub struct Network {
  config: NetworkConfig,
  nodes: Vec<Vm>,
  queues: Vec<VecDeque<Word>>,
  monitor: Option<Packet>,
  passes: usize,
}

impl Network {
  /// Boot `config.size` nodes, each told its own address.
  pub fn new(program: &Program, config: NetworkConfig) -> Result<Self, NetworkError> {
    let mut nodes = Vec::with_capacity(config.size);
    for address in 0..config.size {
      let mut vm = program.boot();
      harness::send(&mut vm, &[address as Word])?;
      nodes.push(vm);
    }
    debug!(size = config.size, "network booted");
    Ok(Self {
      config,
      nodes,
      queues: vec![VecDeque::new(); config.size],
      monitor: None,
      passes: 0,
    })
  }

  pub fn config(&self) -> &NetworkConfig {
    &self.config
  }

  /// The last packet the monitor received.
  pub fn monitor(&self) -> Option<Packet> {
    self.monitor
  }

  /// Passes run so far.
  pub fn passes(&self) -> usize {
    self.passes
  }

  /// Queue `packet` for the node at `address`.
  pub fn inject(&mut self, address: usize, packet: Packet) -> Result<(), NetworkError> {
    let queue = self
      .queues
      .get_mut(address)
      .ok_or(NetworkError::NoSuchNode(address))?;
    queue.extend([packet.x, packet.y]);
    Ok(())
  }

  /// Visit every node once, in address order. Returns whether anything
  /// happened: a node consumed a queued value or sent a packet.
  pub fn pass(&mut self) -> Result<bool, NetworkError> {
    if let Some(max) = self.config.max_passes {
      if self.passes >= max {
        return Err(NetworkError::Stalled {
          passes: self.passes,
        });
      }
    }
    self.passes += 1;
    let mut active = false;
    for address in 0..self.nodes.len() {
      active |= self.visit(address)?;
    }
    Ok(active)
  }

  fn visit(&mut self, address: usize) -> Result<bool, NetworkError> {
    let vm = &mut self.nodes[address];
    match vm.resume(None)? {
      Interrupt::NeedsInput => match self.queues[address].pop_front() {
        Some(value) => {
          vm.supply(value)?;
          Ok(true)
        }
        None => {
          vm.supply(self.config.idle_sentinel)?;
          Ok(false)
        }
      },
      Interrupt::Output(destination) => {
        let payload = harness::receive(vm, 2)?;
        let packet = Packet {
          x: payload[0],
          y: payload[1],
        };
        self.route(address, destination, packet)?;
        Ok(true)
      }
      Interrupt::Halt => Err(NetworkError::Halted { address }),
    }
  }

  fn route(&mut self, address: usize, destination: Word, packet: Packet) -> Result<(), NetworkError> {
    if destination == self.config.monitor_address {
      debug!(from = address, x = packet.x, y = packet.y, "monitor received packet");
      self.monitor = Some(packet);
      return Ok(());
    }
    let queue = usize::try_from(destination)
      .ok()
      .and_then(|index| self.queues.get_mut(index))
      .ok_or(NetworkError::InvalidDestination {
        address,
        destination,
      })?;
    queue.extend([packet.x, packet.y]);
    Ok(())
  }

  /// Run passes until `config.idle_passes` of them in a row were quiet.
  fn settle(&mut self) -> Result<(), NetworkError> {
    let mut quiet = 0;
    while quiet < self.config.idle_passes.max(1) {
      if self.pass()? {
        quiet = 0;
      } else {
        quiet += 1;
      }
    }
    Ok(())
  }

  /// Run until the monitor receives its first packet.
  pub fn first_monitor_packet(&mut self) -> Result<Packet, NetworkError> {
    loop {
      if let Some(packet) = self.monitor {
        return Ok(packet);
      }
      self.pass()?;
    }
  }

  /// Run, waking node 0 with the monitor's last packet whenever the network
  /// goes idle, until the same `y` would be delivered twice in a row.
  pub fn run_with_recovery(&mut self) -> Result<Word, NetworkError> {
    let mut last: Option<Packet> = None;
    loop {
      self.settle()?;
      let packet = self.monitor.ok_or(NetworkError::NothingToRecover)?;
      if last.is_some_and(|last| last.y == packet.y) {
        return Ok(packet.y);
      }
      info!(passes = self.passes, x = packet.x, y = packet.y, "network idle, waking node 0");
      self.inject(0, packet)?;
      last = Some(packet);
    }
  }
}
