use super::AxiLiteSignals;
use crate::bus::{contiguous_run, push_lanes, InitiatorBus, MemoryAccess, RESP_OKAY, RESP_SLVERR};
use crate::clock::{Clock, TickCounter};
use crate::config::AxiLiteConfig;
use crate::error::{BusError, Violation};
use crate::protocol::AccessWidth;
use crate::signal::{Signal, Wire};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Address,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    Address,
    Data,
    Response,
}

#[derive(Debug, Clone, Copy, Default)]
struct Outputs {
    arready: u64,
    rvalid: u64,
    rdata: u64,
    awready: u64,
    wready: u64,
    bvalid: u64,
    bresp: u64,
}

/// AXI4-Lite subordinate answering single-beat transactions of the model.
///
/// Write strobes must select one contiguous run of byte lanes. A write with a
/// sparse strobe fails the tick once and is then answered with SLVERR.
#[derive(Debug)]
pub struct AxiLiteInitiator<S = Wire> {
    clock: Clock<S>,
    signals: AxiLiteSignals<S>,
    config: AxiLiteConfig,
    read_state: ReadState,
    write_state: WriteState,
    next: Outputs,
    write_address: u64,
    fault: Option<Violation>,
}

impl<S: Signal> AxiLiteInitiator<S> {
    /// Binds the adapter to its clock and lines.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unsupported`] for a data bus other than 4 or 8
    /// bytes wide.
    pub fn new(
        clock: Clock<S>,
        signals: AxiLiteSignals<S>,
        config: AxiLiteConfig,
    ) -> Result<Self, BusError> {
        config.validate()?;
        Ok(Self {
            clock,
            signals,
            config,
            read_state: ReadState::Address,
            write_state: WriteState::Address,
            next: Outputs::default(),
            write_address: 0,
            fault: None,
        })
    }

    /// Lines shared with the model.
    #[must_use]
    pub const fn signals(&self) -> &AxiLiteSignals<S> {
        &self.signals
    }

    /// Clock driving the model.
    #[must_use]
    pub const fn clock(&self) -> &Clock<S> {
        &self.clock
    }

    fn aligned(&self, address: u64) -> u64 {
        address & !(u64::from(self.config.bus_bytes) - 1)
    }

    fn read_handler(&mut self, memory: &mut dyn MemoryAccess) -> Result<(), BusError> {
        match self.read_state {
            ReadState::Address => {
                self.next.arready = 1;
                if self.signals.arready.is_high() && self.signals.arvalid.is_high() {
                    self.next.arready = 0;
                    let address = self.aligned(self.signals.araddr.get());
                    tracing::debug!(address, "axi-lite read");
                    self.next.rdata = self.read_word(memory, address, u64::MAX)?;
                    self.read_state = ReadState::Data;
                }
            }
            ReadState::Data => {
                self.next.rvalid = 1;
                if self.signals.rready.is_high() && self.signals.rvalid.is_high() {
                    self.next.rvalid = 0;
                    self.read_state = ReadState::Address;
                }
            }
        }
        Ok(())
    }

    fn write_handler(&mut self, memory: &mut dyn MemoryAccess) -> Result<(), BusError> {
        match self.write_state {
            WriteState::Address => {
                self.next.awready = 1;
                if self.signals.awready.is_high() && self.signals.awvalid.is_high() {
                    self.next.awready = 0;
                    self.write_address = self.aligned(self.signals.awaddr.get());
                    self.write_state = WriteState::Data;
                }
            }
            WriteState::Data => {
                self.next.wready = 1;
                if self.signals.wready.is_high() && self.signals.wvalid.is_high() {
                    self.next.wready = 0;
                    let (data, strobe) = (self.signals.wdata.get(), self.signals.wstrb.get());
                    tracing::debug!(address = self.write_address, data, strobe, "axi-lite write");
                    self.write_state = WriteState::Response;
                    self.next.bresp = RESP_OKAY;
                    match self.write_word(memory, self.write_address, data, strobe) {
                        Ok(()) => {}
                        Err(BusError::Protocol(violation)) => {
                            tracing::warn!(%violation, "axi-lite write refused");
                            self.next.bresp = RESP_SLVERR;
                            self.fault = Some(violation);
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
            WriteState::Response => {
                self.next.bvalid = 1;
                if self.signals.bready.is_high() && self.signals.bvalid.is_high() {
                    self.next.bvalid = 0;
                    self.next.bresp = RESP_OKAY;
                    self.write_state = WriteState::Address;
                }
            }
        }
        Ok(())
    }

    fn update_signals(&self) {
        let s = &self.signals;
        s.arready.set(self.next.arready);
        s.rvalid.set(self.next.rvalid);
        s.rdata.set(self.next.rdata);
        s.awready.set(self.next.awready);
        s.wready.set(self.next.wready);
        s.bvalid.set(self.next.bvalid);
        s.bresp.set(self.next.bresp);
    }

    fn clear_signals(&mut self) {
        let s = &self.signals;
        self.next.arready = s.arready.get();
        self.next.rvalid = s.rvalid.get();
        self.next.rdata = s.rdata.get();
        self.next.awready = s.awready.get();
        self.next.wready = s.wready.get();
        self.next.bvalid = s.bvalid.get();
        for line in [&s.arready, &s.rvalid, &s.rdata, &s.awready, &s.wready, &s.bvalid] {
            line.set(0);
        }
    }

    fn step(&mut self, memory: &mut dyn MemoryAccess) -> Result<(), BusError> {
        self.read_handler(memory)?;
        self.write_handler(memory)?;
        self.clock.rise();
        self.update_signals();
        self.clock.fall();
        Ok(())
    }
}

impl<S: Signal> InitiatorBus for AxiLiteInitiator<S> {
    fn name(&self) -> &'static str {
        "axi-lite-initiator"
    }

    fn attach_counter(&mut self, counter: TickCounter) {
        self.clock.attach_counter(counter);
    }

    fn bus_bytes(&self) -> u8 {
        self.config.bus_bytes
    }

    fn tick(
        &mut self,
        memory: &mut dyn MemoryAccess,
        count: bool,
        steps: u64,
    ) -> Result<(), BusError> {
        let mut applied = 0;
        let mut result = Ok(());
        while applied < steps {
            if let Err(err) = self.step(memory) {
                result = Err(err);
                break;
            }
            applied += 1;
            if let Some(violation) = self.fault.take() {
                result = Err(violation.into());
                break;
            }
        }
        self.clear_signals();
        if count {
            self.clock.count(applied);
        }
        result
    }

    fn reset(&mut self, memory: &mut dyn MemoryAccess) -> Result<(), BusError> {
        self.read_state = ReadState::Address;
        self.write_state = WriteState::Address;
        self.next = Outputs::default();
        self.fault = None;
        self.signals.rvalid.set(0);
        self.signals.bvalid.set(0);

        let reset = self.config.bus.reset;
        self.signals.reset.set(reset.active.asserted());
        self.tick(memory, true, reset.assert_cycles)?;
        self.signals.reset.set(reset.active.released());
        self.tick(memory, true, reset.release_cycles)
    }

    fn write_word(
        &mut self,
        memory: &mut dyn MemoryAccess,
        address: u64,
        value: u64,
        strobe: u64,
    ) -> Result<(), BusError> {
        let lanes = strobe & AccessWidth::from_bytes(u64::from(self.config.bus_bytes))?.strobe();
        if lanes != 0 && contiguous_run(lanes).is_none() {
            return Err(Violation::SparseStrobe { strobe }.into());
        }
        push_lanes(memory, address, self.config.bus_bytes, value, lanes)
    }

    fn has_address(&self) -> bool {
        self.signals.arvalid.is_high() || self.signals.awvalid.is_high()
    }

    fn address(&self) -> u64 {
        if self.signals.awvalid.is_high() {
            self.signals.awaddr.get()
        } else {
            self.signals.araddr.get()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use rstest::rstest;

    use super::AxiLiteInitiator;
    use crate::bus::axilite::AxiLiteSignals;
    use crate::bus::testing::{on_rising_edge, MemoryOp, SparseMemory};
    use crate::bus::{InitiatorBus, RESP_OKAY, RESP_SLVERR};
    use crate::clock::Clock;
    use crate::config::AxiLiteConfig;
    use crate::error::{BusError, Violation};
    use crate::protocol::AccessWidth;
    use crate::signal::{Signal, Wire};

    /// Manager issuing one write of `data` with `strobe`, then one read.
    fn manager(address: u64, data: u64, strobe: u64) -> (AxiLiteInitiator, Rc<RefCell<Vec<u64>>>) {
        let clk = Wire::bit();
        let s = AxiLiteSignals::<Wire>::default();
        let reads = Rc::new(RefCell::new(Vec::new()));

        s.awaddr.set(address);
        s.awvalid.set(1);
        s.wdata.set(data);
        s.wstrb.set(strobe);
        s.wvalid.set(1);
        let (m, seen) = (s.clone(), Rc::clone(&reads));
        let evaluator = on_rising_edge(&clk, move || {
            if m.awvalid.is_high() && m.awready.is_high() {
                m.awvalid.set(0);
            }
            if m.wvalid.is_high() && m.wready.is_high() {
                m.wvalid.set(0);
                m.bready.set(1);
            } else if m.bvalid.is_high() && m.bready.is_high() {
                m.bready.set(0);
                m.araddr.set(address);
                m.arvalid.set(1);
            } else if m.arvalid.is_high() && m.arready.is_high() {
                m.arvalid.set(0);
                m.rready.set(1);
            } else if m.rvalid.is_high() && m.rready.is_high() {
                m.rready.set(0);
                seen.borrow_mut().push(m.rdata.get());
            }
        });

        let axi = AxiLiteInitiator::new(Clock::new(clk, evaluator), s, AxiLiteConfig::default())
            .expect("valid width");
        (axi, reads)
    }

    #[test]
    fn write_then_read_back() {
        let mut memory = SparseMemory::default();
        let (mut axi, reads) = manager(0x400, 0xFEED_FACE, 0xF);

        axi.tick(&mut memory, true, 16).expect("transactions");

        assert_eq!(memory.load(AccessWidth::DoubleWord, 0x400), 0xFEED_FACE);
        assert_eq!(reads.borrow().as_slice(), &[0xFEED_FACE]);
        assert_eq!(axi.clock().counter().get(), 16);
    }

    #[rstest]
    #[case(0b0001, MemoryOp::Push(AccessWidth::Byte, 0x400, 0x44))]
    #[case(0b0110, MemoryOp::Request(AccessWidth::DoubleWord, 0x400))]
    #[case(0b1100, MemoryOp::Push(AccessWidth::Word, 0x402, 0x1122))]
    fn contiguous_strobes_are_relayed(#[case] strobe: u64, #[case] first: MemoryOp) {
        let mut memory = SparseMemory::default();
        let (mut axi, _) = manager(0x400, 0x1122_3344, strobe);

        axi.tick(&mut memory, true, 4).expect("write");

        assert_eq!(memory.ops.first(), Some(&first));
    }

    #[test]
    fn sparse_strobe_is_a_violation() {
        let mut memory = SparseMemory::default();
        let (mut axi, _) = manager(0x400, 0x1122_3344, 0b0101);

        let err = axi.tick(&mut memory, true, 4).expect_err("sparse");

        assert!(matches!(
            err,
            BusError::Protocol(Violation::SparseStrobe { strobe: 0b0101 })
        ));
        assert!(memory.ops.is_empty());
    }

    #[test]
    fn refused_write_is_answered_with_slverr_and_read_follows() {
        let mut memory = SparseMemory::default();
        let (mut axi, reads) = manager(0x400, 0x1122_3344, 0b0101);

        axi.tick(&mut memory, true, 4).expect_err("sparse");
        axi.tick(&mut memory, true, 1).expect("response presented");
        assert_eq!(axi.signals().bresp.get(), RESP_SLVERR);
        axi.tick(&mut memory, true, 8).expect("read after refusal");

        assert_eq!(axi.signals().bresp.get(), RESP_OKAY);
        assert_eq!(reads.borrow().as_slice(), &[0]);
        assert_eq!(
            memory.ops,
            vec![MemoryOp::Request(AccessWidth::DoubleWord, 0x400)]
        );
    }

    #[test]
    fn unaligned_address_uses_its_bus_word() {
        let mut memory = SparseMemory::default();
        let (mut axi, _) = manager(0x403, 0x5500_0000, 0b1000);

        axi.tick(&mut memory, true, 4).expect("write");

        assert_eq!(memory.ops[0], MemoryOp::Push(AccessWidth::Byte, 0x403, 0x55));
    }

    #[test]
    fn reset_drops_valid_lines() {
        let mut memory = SparseMemory::default();
        let (mut axi, _) = manager(0, 0, 0);
        axi.signals().awvalid.set(0);
        axi.signals().wvalid.set(0);
        axi.signals().rvalid.set(1);

        axi.reset(&mut memory).expect("reset");

        assert!(!axi.signals().rvalid.is_high());
        assert_eq!(axi.signals().reset.get(), 1);
        assert_eq!(axi.clock().counter().get(), 3);
    }
}
