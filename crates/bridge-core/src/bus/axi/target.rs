use super::{burst_len, check_burst, size_of_beat, AxiSignals, BurstType};
use crate::bus::TargetBus;
use crate::clock::{Clock, TickCounter};
use crate::config::AxiConfig;
use crate::error::{BusError, Unsupported, Violation};
use crate::protocol::AccessWidth;
use crate::signal::{Signal, Wire};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Address,
    Data { remaining: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    Address,
    Data { beat: usize },
    Response,
}

/// AXI4 manager driving a subordinate in the model.
///
/// Single accesses become one full-width beat with byte strobes selecting
/// the requested lanes; [`AxiTarget::read_burst`] and
/// [`AxiTarget::write_burst`] issue multi-beat INCR bursts.
#[derive(Debug)]
pub struct AxiTarget<S = Wire> {
    clock: Clock<S>,
    signals: AxiSignals<S>,
    config: AxiConfig,
}

impl<S: Signal> AxiTarget<S> {
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
        })
    }

    /// Lines driven by the adapter.
    #[must_use]
    pub const fn signals(&self) -> &AxiSignals<S> {
        &self.signals
    }

    /// Clock driving the subordinate.
    #[must_use]
    pub const fn clock(&self) -> &Clock<S> {
        &self.clock
    }

    /// Reads `beats` consecutive beats of `1 << size` bytes.
    ///
    /// The burst is checked before any line is driven.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Protocol`] for a burst the bus rules forbid and
    /// [`BusError::Timeout`] when the subordinate stops answering.
    pub fn read_burst(
        &mut self,
        address: u64,
        beats: usize,
        burst: BurstType,
        size: u64,
    ) -> Result<Vec<u64>, BusError> {
        self.check(address, beats, burst, size)?;
        let mut data = Vec::with_capacity(beats);
        let result = self.run_read(address, beats, burst, size, &mut data);
        if result.is_err() {
            self.release();
        }
        result.map(|()| data)
    }

    /// Writes one beat per element of `data`, each with byte strobe `strobe`.
    ///
    /// # Errors
    ///
    /// Same as [`AxiTarget::read_burst`].
    pub fn write_burst(
        &mut self,
        address: u64,
        data: &[u64],
        strobe: u64,
        burst: BurstType,
        size: u64,
    ) -> Result<(), BusError> {
        self.check(address, data.len(), burst, size)?;
        let result = self.run_write(address, data, strobe, burst, size);
        if result.is_err() {
            self.release();
        }
        result
    }

    fn check(
        &self,
        address: u64,
        beats: usize,
        burst: BurstType,
        size: u64,
    ) -> Result<(), BusError> {
        check_burst(burst.bits(), address, size, self.config.bus_bytes())?;
        if beats == 0 || beats > 256 {
            return Err(Unsupported::Operation("bursts outside 1 to 256 beats").into());
        }
        Ok(())
    }

    fn lane_offset(&self, width: AccessWidth, address: u64) -> Result<u64, BusError> {
        let bus_bytes = self.config.bus_bytes();
        let offset = address % bus_bytes;
        if offset + u64::from(width.bytes()) > bus_bytes {
            return Err(Violation::LaneOverflow {
                offset,
                width: width.bytes(),
            }
            .into());
        }
        Ok(offset)
    }

    fn run_read(
        &self,
        address: u64,
        beats: usize,
        burst: BurstType,
        size: u64,
        data: &mut Vec<u64>,
    ) -> Result<(), BusError> {
        let s = &self.signals;
        let timeout = self.config.bus.timeout_cycles;
        let mut state = ReadState::Address;
        loop {
            state = match state {
                ReadState::Address => {
                    tracing::debug!(address, beats, "axi read address phase");
                    s.araddr.set(address);
                    s.arlen.set(burst_len(beats));
                    s.arsize.set(size);
                    s.arburst.set(burst.bits());
                    s.arvalid.set(1);
                    self.clock.evaluate();
                    self.clock.wait_high(&s.arready, timeout)?;
                    self.clock.tick(true, 1);
                    s.arvalid.set(0);
                    s.rready.set(1);
                    ReadState::Data { remaining: beats }
                }
                ReadState::Data { remaining } => {
                    self.clock.wait_high(&s.rvalid, timeout)?;
                    data.push(s.rdata.get());
                    let last = s.rlast.is_high();
                    if s.rresp.get() != 0 {
                        tracing::warn!(rresp = s.rresp.get(), "axi read response is not OKAY");
                    }
                    self.clock.tick(true, 1);
                    if remaining == 1 {
                        if !last {
                            tracing::warn!("axi subordinate did not flag the final read beat");
                        }
                        s.rready.set(0);
                        self.clock.evaluate();
                        return Ok(());
                    }
                    ReadState::Data {
                        remaining: remaining - 1,
                    }
                }
            };
        }
    }

    fn run_write(
        &self,
        address: u64,
        data: &[u64],
        strobe: u64,
        burst: BurstType,
        size: u64,
    ) -> Result<(), BusError> {
        let s = &self.signals;
        let timeout = self.config.bus.timeout_cycles;
        let mut state = WriteState::Address;
        loop {
            state = match state {
                WriteState::Address => {
                    tracing::debug!(address, beats = data.len(), "axi write address phase");
                    s.awaddr.set(address);
                    s.awlen.set(burst_len(data.len()));
                    s.awsize.set(size);
                    s.awburst.set(burst.bits());
                    s.awvalid.set(1);
                    self.clock.evaluate();
                    self.clock.wait_high(&s.awready, timeout)?;
                    self.clock.tick(true, 1);
                    s.awvalid.set(0);
                    WriteState::Data { beat: 0 }
                }
                WriteState::Data { beat } => {
                    let last = beat + 1 == data.len();
                    s.wdata.set(data[beat]);
                    s.wstrb.set(strobe);
                    s.wlast.set(u64::from(last));
                    s.wvalid.set(1);
                    self.clock.evaluate();
                    self.clock.wait_high(&s.wready, timeout)?;
                    self.clock.tick(true, 1);
                    if last {
                        s.wvalid.set(0);
                        s.wlast.set(0);
                        s.bready.set(1);
                        WriteState::Response
                    } else {
                        WriteState::Data { beat: beat + 1 }
                    }
                }
                WriteState::Response => {
                    self.clock.evaluate();
                    self.clock.wait_high(&s.bvalid, timeout)?;
                    if s.bresp.get() != 0 {
                        tracing::warn!(bresp = s.bresp.get(), "axi write response is not OKAY");
                    }
                    self.clock.tick(true, 1);
                    s.bready.set(0);
                    self.clock.evaluate();
                    return Ok(());
                }
            };
        }
    }

    fn release(&self) {
        let s = &self.signals;
        for line in [&s.arvalid, &s.rready, &s.awvalid, &s.wvalid, &s.wlast, &s.bready] {
            line.set(0);
        }
        self.clock.evaluate();
    }
}

impl<S: Signal> TargetBus for AxiTarget<S> {
    fn name(&self) -> &'static str {
        "axi"
    }

    fn attach_counter(&mut self, counter: TickCounter) {
        self.clock.attach_counter(counter);
    }

    fn tick(&mut self, count: bool, steps: u64) {
        self.clock.tick(count, steps);
    }

    fn reset(&mut self) {
        self.clock
            .pulse_reset(&self.signals.reset, self.config.bus.reset);
    }

    fn read(&mut self, width: AccessWidth, address: u64) -> Result<u64, BusError> {
        let offset = self.lane_offset(width, address)?;
        let size = size_of_beat(self.config.bus_bytes());
        let beat = self.read_burst(address - offset, 1, BurstType::Incr, size)?;
        Ok((beat[0] >> (offset * 8)) & width.mask())
    }

    fn write(&mut self, width: AccessWidth, address: u64, value: u64) -> Result<(), BusError> {
        let offset = self.lane_offset(width, address)?;
        let size = size_of_beat(self.config.bus_bytes());
        let data = (value & width.mask()) << (offset * 8);
        let strobe = crate::bus::lane_strobe(width, offset);
        self.write_burst(address - offset, &[data], strobe, BurstType::Incr, size)
    }
}
