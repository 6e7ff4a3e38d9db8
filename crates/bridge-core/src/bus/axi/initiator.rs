use super::{check_burst, AxiSignals};
use crate::bus::{fetch_lanes, push_lanes, InitiatorBus, MemoryAccess, RESP_OKAY, RESP_SLVERR};
use crate::clock::{Clock, TickCounter};
use crate::config::AxiConfig;
use crate::error::{BusError, Violation};
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

/// Values the subordinate side presents after the next rising edge.
#[derive(Debug, Clone, Copy, Default)]
struct Outputs {
    arready: u64,
    rvalid: u64,
    rlast: u64,
    rdata: u64,
    rresp: u64,
    awready: u64,
    wready: u64,
    bvalid: u64,
    bresp: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    address: u64,
    remaining: u64,
    /// Burst broke the bus rules; beats are answered with SLVERR and never
    /// reach memory.
    refused: bool,
}

/// AXI4 subordinate answering bursts the model starts.
///
/// Every beat is relayed to the driver's memory. Handshake outputs are
/// computed before each rising edge and applied right after it. A burst that
/// breaks the bus rules fails the tick once, then is drained with SLVERR so
/// the next burst starts from idle.
#[derive(Debug)]
pub struct AxiInitiator<S = Wire> {
    clock: Clock<S>,
    signals: AxiSignals<S>,
    config: AxiConfig,
    read_state: ReadState,
    write_state: WriteState,
    next: Outputs,
    read: Cursor,
    write: Cursor,
    fault: Option<Violation>,
}

impl<S: Signal> AxiInitiator<S> {
    /// Binds the adapter to its clock and lines.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unsupported`] for data or address widths other
    /// than 32 or 64 bits.
    pub fn new(
        clock: Clock<S>,
        signals: AxiSignals<S>,
        config: AxiConfig,
    ) -> Result<Self, BusError> {
        config.validate()?;
        Ok(Self {
            clock,
            signals,
            config,
            read_state: ReadState::Address,
            write_state: WriteState::Address,
            next: Outputs::default(),
            read: Cursor::default(),
            write: Cursor::default(),
            fault: None,
        })
    }

    /// Lines shared with the model.
    #[must_use]
    pub const fn signals(&self) -> &AxiSignals<S> {
        &self.signals
    }

    /// Clock driving the model.
    #[must_use]
    pub const fn clock(&self) -> &Clock<S> {
        &self.clock
    }

    fn bus_width(&self) -> u8 {
        // Validated to 32 or 64 bits at construction.
        u8::try_from(self.config.data_width / 8).unwrap_or(u8::MAX)
    }

    fn read_handler(&mut self, memory: &mut dyn MemoryAccess) -> Result<(), BusError> {
        let bus_width = self.bus_width();
        let bus_bytes = self.config.bus_bytes();
        let s = &self.signals;
        match self.read_state {
            ReadState::Address => {
                self.next.arready = 1;
                if s.arready.is_high() && s.arvalid.is_high() {
                    self.next.arready = 0;
                    let address = s.araddr.get();
                    let checked = check_burst(s.arburst.get(), address, s.arsize.get(), bus_bytes);
                    self.read = Cursor {
                        address,
                        remaining: s.arlen.get(),
                        refused: checked.is_err(),
                    };
                    self.next.rlast = u64::from(self.read.remaining == 0);
                    self.read_state = ReadState::Data;
                    if let Err(violation) = checked {
                        tracing::warn!(address, %violation, "axi read burst refused");
                        self.next.rdata = 0;
                        self.next.rresp = RESP_SLVERR;
                        self.fault = Some(violation);
                        return Ok(());
                    }
                    tracing::debug!(address, len = s.arlen.get(), "axi read burst start");
                    self.next.rresp = RESP_OKAY;
                    self.next.rdata = fetch_lanes(memory, address, bus_width, u64::MAX)?;
                }
            }
            ReadState::Data => {
                self.next.rvalid = 1;
                if s.rready.is_high() && s.rvalid.is_high() {
                    if self.read.remaining == 0 {
                        tracing::debug!("axi read burst complete");
                        self.read_state = ReadState::Address;
                        self.next.rvalid = 0;
                        self.next.rlast = 0;
                        self.next.rresp = RESP_OKAY;
                    } else {
                        self.read.remaining -= 1;
                        self.read.address += bus_bytes;
                        if !self.read.refused {
                            self.next.rdata =
                                fetch_lanes(memory, self.read.address, bus_width, u64::MAX)?;
                        }
                        self.next.rlast = u64::from(self.read.remaining == 0);
                    }
                }
            }
        }
        Ok(())
    }

    fn write_handler(&mut self, memory: &mut dyn MemoryAccess) -> Result<(), BusError> {
        let bus_width = self.bus_width();
        let bus_bytes = self.config.bus_bytes();
        let s = &self.signals;
        match self.write_state {
            WriteState::Address => {
                self.next.awready = 1;
                if s.awready.is_high() && s.awvalid.is_high() {
                    self.next.awready = 0;
                    let address = s.awaddr.get();
                    let checked = check_burst(s.awburst.get(), address, s.awsize.get(), bus_bytes);
                    self.write = Cursor {
                        address,
                        remaining: s.awlen.get(),
                        refused: checked.is_err(),
                    };
                    self.write_state = WriteState::Data;
                    if let Err(violation) = checked {
                        tracing::warn!(address, %violation, "axi write burst refused");
                        self.fault = Some(violation);
                    } else {
                        tracing::debug!(address, len = s.awlen.get(), "axi write burst start");
                    }
                }
            }
            WriteState::Data => {
                self.next.wready = 1;
                if s.wready.is_high() && s.wvalid.is_high() {
                    tracing::trace!(
                        address = self.write.address,
                        data = s.wdata.get(),
                        "axi write beat"
                    );
                    if !self.write.refused {
                        push_lanes(
                            memory,
                            self.write.address,
                            bus_width,
                            s.wdata.get(),
                            s.wstrb.get(),
                        )?;
                    }
                    if s.wlast.is_high() {
                        if self.write.remaining != 0 {
                            tracing::warn!(
                                remaining = self.write.remaining,
                                "axi manager ended the write burst early"
                            );
                        }
                        self.write_state = WriteState::Response;
                        self.next.wready = 0;
                        self.next.bresp = if self.write.refused {
                            RESP_SLVERR
                        } else {
                            RESP_OKAY
                        };
                    } else {
                        self.write.address += bus_bytes;
                        self.write.remaining = self.write.remaining.saturating_sub(1);
                    }
                }
            }
            WriteState::Response => {
                self.next.bvalid = 1;
                if s.bready.is_high() && s.bvalid.is_high() {
                    tracing::debug!("axi write burst complete");
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
        s.rlast.set(self.next.rlast);
        s.rdata.set(self.next.rdata);
        s.rresp.set(self.next.rresp);
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

impl<S: Signal> InitiatorBus for AxiInitiator<S> {
    fn name(&self) -> &'static str {
        "axi-initiator"
    }

    fn attach_counter(&mut self, counter: TickCounter) {
        self.clock.attach_counter(counter);
    }

    fn bus_bytes(&self) -> u8 {
        self.bus_width()
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
        self.signals.rresp.set(0);
        self.signals.bresp.set(0);

        let reset = self.config.bus.reset;
        self.signals.reset.set(reset.active.asserted());
        self.tick(memory, true, reset.assert_cycles)?;
        self.signals.reset.set(reset.active.released());
        self.tick(memory, true, reset.release_cycles)
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
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::AxiInitiator;
    use crate::bus::axi::{burst_len, AxiSignals, BurstType};
    use crate::bus::testing::{on_rising_edge, ClosedMemory, MemoryOp, SparseMemory};
    use crate::bus::{InitiatorBus, RESP_OKAY, RESP_SLVERR};
    use crate::clock::Clock;
    use crate::config::AxiConfig;
    use crate::error::{BusError, Violation};
    use crate::protocol::AccessWidth;
    use crate::signal::{Signal, Wire};

    /// Manager reading `len + 1` beats from `address`, recording each one.
    fn reading_manager(
        address: u64,
        len: u64,
        size: u64,
    ) -> (AxiInitiator, Rc<RefCell<Vec<u64>>>) {
        let clk = Wire::bit();
        let s = AxiSignals::<Wire>::default();
        let seen = Rc::new(RefCell::new(Vec::new()));

        s.araddr.set(address);
        s.arlen.set(len);
        s.arsize.set(size);
        s.arburst.set(BurstType::Incr.bits());
        s.arvalid.set(1);
        let (m, beats) = (s.clone(), Rc::clone(&seen));
        let evaluator = on_rising_edge(&clk, move || {
            if m.arvalid.is_high() && m.arready.is_high() {
                m.arvalid.set(0);
                m.rready.set(1);
            } else if m.rvalid.is_high() && m.rready.is_high() {
                beats.borrow_mut().push(m.rdata.get());
                if m.rlast.is_high() {
                    m.rready.set(0);
                }
            }
        });

        let axi = AxiInitiator::new(Clock::new(clk, evaluator), s, AxiConfig::default())
            .expect("valid widths");
        (axi, seen)
    }

    /// Manager writing `data` as one burst, counting write responses.
    fn writing_manager(
        address: u64,
        data: Vec<u64>,
        strobe: u64,
    ) -> (AxiInitiator, Rc<Cell<u32>>) {
        let clk = Wire::bit();
        let s = AxiSignals::<Wire>::default();
        let responses = Rc::new(Cell::new(0));

        s.awaddr.set(address);
        s.awlen.set(burst_len(data.len()));
        s.awsize.set(2);
        s.awburst.set(BurstType::Incr.bits());
        s.awvalid.set(1);
        let (m, done) = (s.clone(), Rc::clone(&responses));
        let beat = Cell::new(0usize);
        let present = move |index: usize| {
            m.wdata.set(data[index]);
            m.wstrb.set(strobe);
            m.wlast.set(u64::from(index + 1 == data.len()));
            m.wvalid.set(1);
            index + 1 == data.len()
        };
        let m = s.clone();
        let evaluator = on_rising_edge(&clk, move || {
            if m.awvalid.is_high() && m.awready.is_high() {
                m.awvalid.set(0);
                present(0);
            } else if m.wvalid.is_high() && m.wready.is_high() {
                if m.wlast.is_high() {
                    m.wvalid.set(0);
                    m.bready.set(1);
                } else {
                    beat.set(beat.get() + 1);
                    present(beat.get());
                }
            } else if m.bvalid.is_high() && m.bready.is_high() {
                m.bready.set(0);
                done.set(done.get() + 1);
            }
        });

        let axi = AxiInitiator::new(Clock::new(clk, evaluator), s, AxiConfig::default())
            .expect("valid widths");
        (axi, responses)
    }

    #[test]
    fn read_burst_relays_each_beat() {
        let mut memory = SparseMemory::default();
        memory.store(AccessWidth::DoubleWord, 0x100, 0x1111_1111);
        memory.store(AccessWidth::DoubleWord, 0x104, 0x2222_2222);
        let (mut axi, beats) = reading_manager(0x100, 1, 2);

        axi.tick(&mut memory, true, 10).expect("burst");

        assert_eq!(beats.borrow().as_slice(), &[0x1111_1111, 0x2222_2222]);
        assert_eq!(
            memory.ops,
            vec![
                MemoryOp::Request(AccessWidth::DoubleWord, 0x100),
                MemoryOp::Request(AccessWidth::DoubleWord, 0x104),
            ]
        );
        assert_eq!(axi.clock().counter().get(), 10);
    }

    #[test]
    fn write_burst_pushes_each_beat_and_responds() {
        let mut memory = SparseMemory::default();
        let (mut axi, responses) = writing_manager(0x200, vec![0xA, 0xB, 0xC], 0xF);

        axi.tick(&mut memory, true, 12).expect("burst");

        assert_eq!(responses.get(), 1);
        assert_eq!(memory.load(AccessWidth::DoubleWord, 0x200), 0xA);
        assert_eq!(memory.load(AccessWidth::DoubleWord, 0x204), 0xB);
        assert_eq!(memory.load(AccessWidth::DoubleWord, 0x208), 0xC);
    }

    #[test]
    fn partial_strobe_pushes_only_selected_lanes() {
        let mut memory = SparseMemory::default();
        let (mut axi, _) = writing_manager(0x10, vec![0x1122_3344], 0b1100);

        axi.tick(&mut memory, true, 8).expect("burst");

        assert_eq!(
            memory.ops,
            vec![MemoryOp::Push(AccessWidth::Word, 0x12, 0x1122)]
        );
    }

    #[test]
    fn budget_split_transaction_resumes() {
        let mut memory = SparseMemory::default();
        memory.store(AccessWidth::DoubleWord, 0x100, 7);
        memory.store(AccessWidth::DoubleWord, 0x104, 8);
        let (mut axi, beats) = reading_manager(0x100, 1, 2);

        for _ in 0..4 {
            axi.tick(&mut memory, true, 3).expect("step");
            assert!(!axi.signals().rvalid.is_high(), "outputs dropped between calls");
        }

        assert_eq!(beats.borrow().as_slice(), &[7, 8]);
    }

    #[test]
    fn narrow_burst_is_rejected_without_memory_traffic() {
        let mut memory = SparseMemory::default();
        let (mut axi, beats) = reading_manager(0x100, 0, 1);

        let err = axi.tick(&mut memory, true, 4).expect_err("narrow");

        assert!(matches!(
            err,
            BusError::Protocol(Violation::NarrowBurst {
                beat_bytes: 2,
                bus_bytes: 4
            })
        ));
        assert!(memory.ops.is_empty());
        assert!(beats.borrow().is_empty());
    }

    #[test]
    fn refused_burst_drains_with_slverr_then_bus_is_idle() {
        let mut memory = SparseMemory::default();
        memory.store(AccessWidth::DoubleWord, 0x200, 0x55);
        let (mut axi, beats) = reading_manager(0x100, 0, 1);

        axi.tick(&mut memory, true, 4).expect_err("narrow");
        axi.tick(&mut memory, true, 1).expect("error beat presented");
        assert_eq!(axi.signals().rresp.get(), RESP_SLVERR);
        axi.tick(&mut memory, true, 3).expect("error beat taken");
        assert_eq!(beats.borrow().as_slice(), &[0]);
        assert!(memory.ops.is_empty());

        axi.signals().araddr.set(0x200);
        axi.signals().arsize.set(2);
        axi.signals().arvalid.set(1);
        axi.tick(&mut memory, true, 8).expect("next burst");

        assert_eq!(beats.borrow().as_slice(), &[0, 0x55]);
        assert_eq!(axi.signals().rresp.get(), RESP_OKAY);
        assert_eq!(
            memory.ops,
            vec![MemoryOp::Request(AccessWidth::DoubleWord, 0x200)]
        );
    }

    #[test]
    fn unaligned_burst_is_rejected() {
        let mut memory = SparseMemory::default();
        let (mut axi, _) = reading_manager(0x102, 0, 2);
        let err = axi.tick(&mut memory, true, 4).expect_err("unaligned");
        assert!(matches!(err, BusError::Protocol(Violation::Unaligned { .. })));
    }

    #[test]
    fn transport_failure_surfaces() {
        let (mut axi, _) = reading_manager(0x100, 0, 2);
        let err = axi.tick(&mut ClosedMemory, true, 4).expect_err("closed");
        assert!(err.ends_session());
    }

    #[test]
    fn presented_address_is_visible() {
        let (axi, _) = reading_manager(0x340, 0, 2);
        assert!(axi.has_address());
        assert_eq!(axi.address(), 0x340);
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut memory = SparseMemory::default();
        let (mut axi, _) = reading_manager(0x100, 0, 2);
        axi.signals().arvalid.set(0);
        axi.reset(&mut memory).expect("reset");
        assert_eq!(axi.clock().counter().get(), 2);
        assert!(!axi.signals().rvalid.is_high());
        assert!(memory.ops.is_empty());
    }
}
