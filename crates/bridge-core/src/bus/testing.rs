//! Shared doubles for bus adapter tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use super::MemoryAccess;
use crate::clock::Evaluator;
use crate::error::{BusError, ChannelError};
use crate::protocol::AccessWidth;
use crate::signal::{Signal, Wire};

/// One relayed memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOp {
    Push(AccessWidth, u64, u64),
    Request(AccessWidth, u64),
}

/// Byte-addressed memory that records every access.
#[derive(Debug, Default)]
pub struct SparseMemory {
    pub bytes: HashMap<u64, u8>,
    pub ops: Vec<MemoryOp>,
}

impl SparseMemory {
    pub fn store(&mut self, width: AccessWidth, address: u64, value: u64) {
        let lanes = value.to_le_bytes();
        for (lane, byte) in (0..u64::from(width.bytes())).zip(lanes) {
            self.bytes.insert(address + lane, byte);
        }
    }

    pub fn load(&self, width: AccessWidth, address: u64) -> u64 {
        (0..u64::from(width.bytes())).fold(0, |value, lane| {
            let byte = self.bytes.get(&(address + lane)).copied().unwrap_or(0);
            value | (u64::from(byte) << (lane * 8))
        })
    }
}

impl MemoryAccess for SparseMemory {
    fn push(&mut self, width: AccessWidth, address: u64, value: u64) -> Result<(), BusError> {
        self.ops.push(MemoryOp::Push(width, address, value));
        self.store(width, address, value);
        Ok(())
    }

    fn request(&mut self, width: AccessWidth, address: u64) -> Result<u64, BusError> {
        self.ops.push(MemoryOp::Request(width, address));
        Ok(self.load(width, address))
    }
}

/// Memory whose driver has gone away.
#[derive(Debug, Default)]
pub struct ClosedMemory;

impl MemoryAccess for ClosedMemory {
    fn push(&mut self, _width: AccessWidth, _address: u64, _value: u64) -> Result<(), BusError> {
        Err(ChannelError::Closed.into())
    }

    fn request(&mut self, _width: AccessWidth, _address: u64) -> Result<u64, BusError> {
        Err(ChannelError::Closed.into())
    }
}

/// Evaluator running `model` once per rising edge of `clk`.
pub fn on_rising_edge(clk: &Wire, model: impl FnMut() + 'static) -> Evaluator {
    let clk = clk.clone();
    let last = Cell::new(0);
    let model = RefCell::new(model);
    Evaluator::new(move || {
        let now = clk.get();
        if now == 1 && last.get() == 0 {
            (model.borrow_mut())();
        }
        last.set(now);
    })
}
