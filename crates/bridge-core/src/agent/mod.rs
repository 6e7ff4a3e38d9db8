//! Request dispatch, tick scheduling and nested driver requests.
//!
//! An [`Agent`] serves one driver session. Every frame goes through
//! [`Agent::handle_request`]; replies follow the driver's conventions:
//! target accesses answer on the main leg, tick acknowledgements, log
//! records and interrupts travel on the asynchronous leg.

mod cfu;

pub use cfu::CfuAgent;

use std::collections::VecDeque;
use std::fmt;

use crate::bus::{InitiatorBus, MemoryAccess, TargetBus};
use crate::channel::{Channel, SocketChannel};
use crate::clock::TickCounter;
use crate::config::{AgentConfig, SessionConfig};
use crate::error::{BusError, ChannelError, Violation};
use crate::protocol::{AccessWidth, Action, Frame, LogLevel};
use crate::signal::Signal;

/// Handler for actions the agent gives no built-in meaning.
///
/// The extension is taken out of the agent while it runs, so nested driver
/// requests it triggers are dispatched normally; custom frames arriving in
/// the meantime are logged and dropped.
pub trait AgentExtension<C: Channel> {
    /// Handles one custom frame.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] when the driver can no longer be reached.
    fn handle(&mut self, agent: &mut Agent<C>, frame: Frame) -> Result<(), ChannelError>;
}

struct Interrupt {
    line: Box<dyn Signal>,
    previous: u64,
    address: u64,
}

/// Work served for the initiators while they were checked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    Tick { count: bool, steps: u64 },
    Reset,
}

/// Bus set serving one driver session.
pub struct Agent<C> {
    channel: C,
    config: AgentConfig,
    counter: TickCounter,
    targets: Vec<Box<dyn TargetBus>>,
    initiators: Vec<Box<dyn InitiatorBus>>,
    initiators_out: bool,
    deferred: VecDeque<Deferred>,
    interrupts: Vec<Interrupt>,
    extension: Option<Box<dyn AgentExtension<C>>>,
}

impl Agent<SocketChannel> {
    /// Connects to the driver described by `session` and completes the
    /// handshake.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] when the driver cannot be reached or opens
    /// the session with anything but a handshake.
    pub fn connect(session: &SessionConfig, config: AgentConfig) -> Result<Self, ChannelError> {
        Ok(Self::new(SocketChannel::connect(session)?, config))
    }
}

impl<C: Channel> Agent<C> {
    /// Creates an agent with no buses.
    pub fn new(channel: C, config: AgentConfig) -> Self {
        Self {
            channel,
            config,
            counter: TickCounter::new(),
            targets: Vec::new(),
            initiators: Vec::new(),
            initiators_out: false,
            deferred: VecDeque::new(),
            interrupts: Vec::new(),
            extension: None,
        }
    }

    /// Attaches a bus the driver reads and writes; returns its peripheral index.
    pub fn add_target(&mut self, mut bus: impl TargetBus + 'static) -> usize {
        bus.attach_counter(self.counter.clone());
        tracing::debug!(bus = bus.name(), index = self.targets.len(), "target bus attached");
        self.targets.push(Box::new(bus));
        self.targets.len() - 1
    }

    /// Attaches a bus that relays the model's transactions to the driver.
    pub fn add_initiator(&mut self, mut bus: impl InitiatorBus + 'static) {
        bus.attach_counter(self.counter.clone());
        tracing::debug!(bus = bus.name(), "initiator bus attached");
        self.initiators.push(Box::new(bus));
    }

    /// Reports changes of `line` as interrupts at `address`.
    pub fn register_interrupt(&mut self, line: impl Signal + 'static, address: u64) {
        self.interrupts.push(Interrupt {
            line: Box::new(line),
            previous: 0,
            address,
        });
    }

    /// Installs the handler for custom actions.
    pub fn set_extension(&mut self, extension: Box<dyn AgentExtension<C>>) {
        self.extension = Some(extension);
    }

    /// Transport to the driver.
    #[must_use]
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    /// Transport to the driver, mutably.
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Counter shared by every attached bus.
    #[must_use]
    pub const fn counter(&self) -> &TickCounter {
        &self.counter
    }

    /// Current settings.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Number of attached target buses.
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Records `message` locally and forwards it when at or above the remote level.
    pub fn log(&mut self, level: LogLevel, message: &str) {
        forward_log(&mut self.channel, &self.config, level, message);
    }

    /// Resets every bus, then serves frames until the driver disconnects.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] when the transport fails mid-session.
    pub fn simulate(&mut self) -> Result<(), ChannelError> {
        match self.reset() {
            Ok(()) => self.serve(),
            Err(ChannelError::SessionEnded) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Serves frames until the driver disconnects.
    ///
    /// # Errors
    ///
    /// Same as [`Agent::simulate`].
    pub fn serve(&mut self) -> Result<(), ChannelError> {
        while self.channel.is_connected() {
            let frame = self.channel.receive()?;
            match self.handle_request(frame) {
                Ok(()) => {}
                Err(ChannelError::SessionEnded) => {
                    tracing::info!("driver ended the session during a nested request");
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Dispatches one frame from the driver.
    ///
    /// Bus failures are answered with an `error` frame and the session goes
    /// on; only transport failures are returned.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] when the driver can no longer be reached,
    /// and [`ChannelError::SessionEnded`] when it disconnected while a nested
    /// request was waiting.
    pub fn handle_request(&mut self, frame: Frame) -> Result<(), ChannelError> {
        tracing::trace!(
            action = ?frame.action,
            address = frame.address,
            value = frame.value,
            "request"
        );
        if let Some(width) = frame.action.write_width() {
            return self.write_to_bus(frame, width);
        }
        if let Some(width) = frame.action.read_width() {
            return self.read_from_bus(frame, width);
        }
        match frame.action {
            Action::InvalidAction => Ok(()),
            Action::TickClock => self.tick_clock(frame.value),
            Action::ResetPeripheral => self.reset(),
            Action::Disconnect => {
                self.channel.send_async(Frame::ok())?;
                self.channel.disconnect();
                tracing::info!("driver ended the session");
                Ok(())
            }
            Action::SetAccessAlignment => self.set_access_alignment(frame.value),
            _ => self.handle_custom(frame),
        }
    }

    /// Applies `steps` edges to every bus.
    ///
    /// Called from inside an initiator's memory request, the initiators
    /// receive the edges once they are back in the agent.
    ///
    /// # Errors
    ///
    /// Returns the first error an initiator bus reports.
    pub fn tick(&mut self, count: bool, steps: u64) -> Result<(), BusError> {
        for bus in &mut self.targets {
            bus.tick(count, steps);
        }
        if self.initiators_out {
            self.deferred.push_back(Deferred::Tick { count, steps });
            return Ok(());
        }
        self.run_initiators(|bus, memory| bus.tick(memory, count, steps))
    }

    /// Runs the reset sequence of every bus.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] when an initiator's reset loses the driver.
    pub fn reset(&mut self) -> Result<(), ChannelError> {
        for bus in &mut self.targets {
            bus.reset();
        }
        if self.initiators_out {
            self.deferred.push_back(Deferred::Reset);
            return Ok(());
        }
        match self.run_initiators(|bus, memory| bus.reset(memory)) {
            Ok(()) => Ok(()),
            Err(BusError::Transport(err)) => Err(err),
            Err(err) => {
                self.log(LogLevel::Error, &format!("reset failed: {err}"));
                Ok(())
            }
        }
    }

    /// Runs `op` on every initiator, then replays what nested requests
    /// served in the meantime.
    fn run_initiators(
        &mut self,
        op: impl FnMut(&mut dyn InitiatorBus, &mut Self) -> Result<(), BusError>,
    ) -> Result<(), BusError> {
        let result = self.each_initiator(op).and_then(|()| self.catch_up());
        if result.is_err() && !self.deferred.is_empty() {
            tracing::warn!(pending = self.deferred.len(), "initiator catch-up abandoned");
            self.deferred.clear();
        }
        result
    }

    /// Runs `op` on each initiator while it is checked out of the agent.
    fn each_initiator(
        &mut self,
        mut op: impl FnMut(&mut dyn InitiatorBus, &mut Self) -> Result<(), BusError>,
    ) -> Result<(), BusError> {
        let mut initiators = std::mem::take(&mut self.initiators);
        self.initiators_out = true;
        let mut result = Ok(());
        for bus in &mut initiators {
            result = op(bus.as_mut(), self);
            if result.is_err() {
                break;
            }
        }
        self.initiators_out = false;
        initiators.append(&mut self.initiators);
        self.initiators = initiators;
        result
    }

    /// Applies deferred edges and resets to the initiators, oldest first.
    fn catch_up(&mut self) -> Result<(), BusError> {
        while let Some(pending) = self.deferred.pop_front() {
            tracing::debug!(?pending, "initiators catching up");
            match pending {
                Deferred::Tick { count, steps } => {
                    self.each_initiator(|bus, memory| bus.tick(memory, count, steps))?;
                }
                Deferred::Reset => self.each_initiator(|bus, memory| bus.reset(memory))?,
            }
        }
        Ok(())
    }

    fn tick_clock(&mut self, target: u64) -> Result<(), ChannelError> {
        let debt = self.counter.get();
        let steps = target.saturating_sub(debt);
        self.counter.set(debt.saturating_sub(target));
        if steps == 0 {
            tracing::debug!(debt, target, "model ahead of the driver, carrying the difference");
        }

        match self.tick(false, steps) {
            Ok(()) => {
                self.handle_interrupts()?;
                self.channel
                    .send_async(Frame::new(Action::TickClock, 0, steps))
            }
            Err(BusError::Transport(err)) => Err(err),
            Err(err) => {
                self.log(LogLevel::Error, &format!("tick of {steps} cycles failed: {err}"));
                self.channel.send_async(Frame::error())
            }
        }
    }

    fn handle_interrupts(&mut self) -> Result<(), ChannelError> {
        let Self {
            interrupts,
            channel,
            ..
        } = self;
        for irq in interrupts.iter_mut() {
            let value = irq.line.get();
            if value != irq.previous {
                tracing::debug!(address = irq.address, value, "interrupt changed");
                channel.send_async(Frame::new(Action::Interrupt, irq.address, value))?;
                irq.previous = value;
            }
        }
        Ok(())
    }

    fn with_target<T>(
        &mut self,
        frame: &Frame,
        op: impl FnOnce(&mut dyn TargetBus) -> Result<T, BusError>,
    ) -> Result<T, BusError> {
        let alignment = self.config.access_alignment;
        if frame.address % alignment != 0 {
            return Err(Violation::Unaligned {
                address: frame.address,
                alignment,
            }
            .into());
        }
        let index = frame.peripheral_index;
        let slot = usize::try_from(index).unwrap_or(0);
        let bus = self
            .targets
            .get_mut(slot)
            .ok_or(Violation::UnknownPeripheral { index })?;
        op(bus.as_mut())
    }

    fn write_to_bus(&mut self, frame: Frame, width: AccessWidth) -> Result<(), ChannelError> {
        match self.with_target(&frame, |bus| bus.write(width, frame.address, frame.value)) {
            Ok(()) => self
                .channel
                .send_main(Frame::ok().with_peripheral_index(frame.peripheral_index)),
            Err(err) => self.fail_request(&frame, err),
        }
    }

    fn read_from_bus(&mut self, frame: Frame, width: AccessWidth) -> Result<(), ChannelError> {
        match self.with_target(&frame, |bus| bus.read(width, frame.address)) {
            Ok(value) => self.channel.send_main(
                Frame::new(Action::ReadRequest, frame.address, value)
                    .with_peripheral_index(frame.peripheral_index),
            ),
            Err(err) => self.fail_request(&frame, err),
        }
    }

    fn fail_request(&mut self, frame: &Frame, err: BusError) -> Result<(), ChannelError> {
        if let BusError::Transport(err) = err {
            return Err(err);
        }
        self.log(
            LogLevel::Error,
            &format!("{:?} at {:#x} failed: {err}", frame.action, frame.address),
        );
        self.channel.send_main(Frame::error())
    }

    fn set_access_alignment(&mut self, alignment: u64) -> Result<(), ChannelError> {
        if alignment.is_power_of_two() && alignment <= 8 {
            tracing::debug!(alignment, "access alignment changed");
            self.config.access_alignment = alignment;
            return self.channel.send_main(Frame::ok());
        }
        let err = BusError::from(Violation::InvalidAlignment { alignment });
        self.log(LogLevel::Error, &err.to_string());
        self.channel.send_main(Frame::error())
    }

    fn handle_custom(&mut self, frame: Frame) -> Result<(), ChannelError> {
        let Some(mut extension) = self.extension.take() else {
            self.log(
                LogLevel::Warning,
                &format!("Unhandled request type: {}", frame.action.as_i32()),
            );
            return Ok(());
        };
        let result = extension.handle(self, frame);
        self.extension = Some(extension);
        result
    }

    /// Receives frames, serving everything else, until `expected` arrives.
    fn await_reply(&mut self, expected: Action) -> Result<Frame, ChannelError> {
        loop {
            let frame = self.channel.receive()?;
            if frame.action == expected {
                return Ok(frame);
            }
            self.handle_request(frame)?;
            if !self.channel.is_connected() {
                return Err(ChannelError::SessionEnded);
            }
        }
    }
}

impl<C: Channel> MemoryAccess for Agent<C> {
    fn push(&mut self, width: AccessWidth, address: u64, value: u64) -> Result<(), BusError> {
        let value = value & width.mask();
        tracing::trace!(address, value, width = width.bytes(), "push to driver");
        self.channel
            .send_async(Frame::new(width.push_action(), address, value))?;
        self.await_reply(Action::PushConfirmation)?;
        Ok(())
    }

    fn request(&mut self, width: AccessWidth, address: u64) -> Result<u64, BusError> {
        tracing::trace!(address, width = width.bytes(), "request from driver");
        self.channel
            .send_async(Frame::new(width.get_action(), address, 0))?;
        let reply = self.await_reply(Action::WriteRequest)?;
        Ok(reply.value & width.mask())
    }
}

impl<C: fmt::Debug> fmt::Debug for Agent<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("channel", &self.channel)
            .field("config", &self.config)
            .field("counter", &self.counter.get())
            .field("targets", &self.targets.len())
            .field("initiators", &self.initiators.len())
            .field("deferred", &self.deferred)
            .field("interrupts", &self.interrupts.len())
            .finish_non_exhaustive()
    }
}

fn forward_log<C: Channel>(channel: &mut C, config: &AgentConfig, level: LogLevel, message: &str) {
    match level {
        LogLevel::Noisy => tracing::trace!("{message}"),
        LogLevel::Debug => tracing::debug!("{message}"),
        LogLevel::Info => tracing::info!("{message}"),
        LogLevel::Warning => tracing::warn!("{message}"),
        LogLevel::Error => tracing::error!("{message}"),
    }
    if level < config.remote_log_level || !channel.is_connected() {
        return;
    }
    if let Err(err) = channel.log(level, message) {
        tracing::debug!(%err, "log record not forwarded");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    use rstest::rstest;

    use super::{Agent, AgentExtension};
    use crate::bus::{InitiatorBus, MemoryAccess, TargetBus};
    use crate::channel::{Channel, DirectChannel, DirectHost};
    use crate::clock::TickCounter;
    use crate::config::AgentConfig;
    use crate::error::{BusError, ChannelError, Violation};
    use crate::protocol::{AccessWidth, Action, Frame, LogLevel, ProtocolVersion};
    use crate::signal::{Signal, Wire};

    #[derive(Default)]
    struct Host {
        inbox: VecDeque<Frame>,
        main: Vec<Frame>,
        sender: Vec<Frame>,
        logs: Vec<(LogLevel, String)>,
    }

    impl DirectHost for Host {
        fn main_message(&mut self, frame: Frame) {
            self.main.push(frame);
        }

        fn sender_message(&mut self, frame: Frame) {
            self.sender.push(frame);
        }

        fn receive(&mut self) -> Option<Frame> {
            self.inbox.pop_front()
        }

        fn log(&mut self, level: LogLevel, message: &str) {
            self.logs.push((level, message.to_owned()));
        }
    }

    /// Register file target; every access costs `cost` counted edges.
    struct Registers {
        values: Rc<RefCell<Vec<u64>>>,
        counter: TickCounter,
        cost: u64,
        edges: Rc<RefCell<u64>>,
    }

    impl Registers {
        fn new(cost: u64) -> (Self, Rc<RefCell<Vec<u64>>>, Rc<RefCell<u64>>) {
            let values = Rc::new(RefCell::new(vec![0; 16]));
            let edges = Rc::new(RefCell::new(0));
            let bus = Self {
                values: Rc::clone(&values),
                counter: TickCounter::new(),
                cost,
                edges: Rc::clone(&edges),
            };
            (bus, values, edges)
        }

        fn slot(address: u64) -> Result<usize, BusError> {
            usize::try_from(address / 4)
                .ok()
                .filter(|slot| *slot < 16)
                .ok_or(BusError::Timeout { cycles: 4 })
        }
    }

    impl TargetBus for Registers {
        fn name(&self) -> &'static str {
            "registers"
        }

        fn attach_counter(&mut self, counter: TickCounter) {
            self.counter = counter;
        }

        fn tick(&mut self, count: bool, steps: u64) {
            *self.edges.borrow_mut() += steps;
            if count {
                self.counter.add(steps);
            }
        }

        fn reset(&mut self) {
            self.values.borrow_mut().fill(0);
        }

        fn read(&mut self, width: AccessWidth, address: u64) -> Result<u64, BusError> {
            let slot = Self::slot(address)?;
            self.tick(true, self.cost);
            Ok(self.values.borrow()[slot] & width.mask())
        }

        fn write(&mut self, width: AccessWidth, address: u64, value: u64) -> Result<(), BusError> {
            let slot = Self::slot(address)?;
            self.tick(true, self.cost);
            self.values.borrow_mut()[slot] = value & width.mask();
            Ok(())
        }
    }

    /// Initiator whose first edge fetches a word from the driver.
    struct Relay {
        counter: TickCounter,
        fetch_pending: bool,
        fail_after_fetch: bool,
        edges: Rc<Cell<u64>>,
        resets: Rc<Cell<u32>>,
    }

    impl Relay {
        fn new(fail_after_fetch: bool) -> (Self, Rc<Cell<u64>>, Rc<Cell<u32>>) {
            let edges = Rc::new(Cell::new(0));
            let resets = Rc::new(Cell::new(0));
            let relay = Self {
                counter: TickCounter::new(),
                fetch_pending: true,
                fail_after_fetch,
                edges: Rc::clone(&edges),
                resets: Rc::clone(&resets),
            };
            (relay, edges, resets)
        }
    }

    impl InitiatorBus for Relay {
        fn name(&self) -> &'static str {
            "relay"
        }

        fn attach_counter(&mut self, counter: TickCounter) {
            self.counter = counter;
        }

        fn bus_bytes(&self) -> u8 {
            4
        }

        fn tick(
            &mut self,
            memory: &mut dyn MemoryAccess,
            count: bool,
            steps: u64,
        ) -> Result<(), BusError> {
            for _ in 0..steps {
                if self.fetch_pending {
                    self.fetch_pending = false;
                    memory.request(AccessWidth::Word, 0x80)?;
                    if self.fail_after_fetch {
                        return Err(BusError::Timeout { cycles: 1 });
                    }
                }
                self.edges.set(self.edges.get() + 1);
            }
            if count {
                self.counter.add(steps);
            }
            Ok(())
        }

        fn reset(&mut self, _memory: &mut dyn MemoryAccess) -> Result<(), BusError> {
            self.resets.set(self.resets.get() + 1);
            Ok(())
        }

        fn has_address(&self) -> bool {
            self.fetch_pending
        }

        fn address(&self) -> u64 {
            0x80
        }
    }

    fn agent(cost: u64) -> (Agent<DirectChannel<Host>>, Rc<RefCell<Vec<u64>>>, Rc<RefCell<u64>>) {
        let mut agent = Agent::new(
            DirectChannel::new(Host::default(), ProtocolVersion::V1),
            AgentConfig::default(),
        );
        let (bus, values, edges) = Registers::new(cost);
        agent.add_target(bus);
        (agent, values, edges)
    }

    fn host(agent: &mut Agent<DirectChannel<Host>>) -> &mut Host {
        agent.channel_mut().host_mut()
    }

    #[rstest]
    #[case(Action::WriteRequestByte, 0x01)]
    #[case(Action::WriteRequestWord, 0xEF01)]
    #[case(Action::WriteRequest, 0xABCD_EF01)]
    #[case(Action::WriteRequestDoubleWord, 0xABCD_EF01)]
    #[case(Action::WriteRequestQuadWord, 0x0123_4567_ABCD_EF01)]
    fn write_is_acknowledged_on_main(#[case] action: Action, #[case] stored: u64) {
        let (mut agent, values, _) = agent(0);
        agent
            .handle_request(Frame::new(action, 8, 0x0123_4567_ABCD_EF01))
            .expect("dispatch");
        assert_eq!(values.borrow()[2], stored);
        assert_eq!(host(&mut agent).main, vec![Frame::ok()]);
    }

    #[test]
    fn read_replies_with_read_request_frame() {
        let (mut agent, values, _) = agent(0);
        values.borrow_mut()[1] = 0x55AA;
        agent
            .handle_request(Frame::new(Action::ReadRequestWord, 4, 0))
            .expect("dispatch");
        assert_eq!(
            host(&mut agent).main,
            vec![Frame::new(Action::ReadRequest, 4, 0x55AA)]
        );
    }

    #[test]
    fn bus_failure_becomes_error_frame_and_session_continues() {
        let (mut agent, _, _) = agent(0);
        agent
            .handle_request(Frame::new(Action::ReadRequestDoubleWord, 0x1000, 0))
            .expect("dispatch");
        assert_eq!(host(&mut agent).main, vec![Frame::error()]);
        assert!(agent.channel().is_connected());
        assert!(host(&mut agent)
            .logs
            .iter()
            .any(|(level, _)| *level == LogLevel::Error));
    }

    #[test]
    fn tick_clock_reports_advanced_cycles_on_async() {
        let (mut agent, _, edges) = agent(0);
        agent
            .handle_request(Frame::new(Action::TickClock, 0, 10))
            .expect("dispatch");
        assert_eq!(*edges.borrow(), 10);
        assert_eq!(host(&mut agent).sender, vec![Frame::new(Action::TickClock, 0, 10)]);
        assert_eq!(agent.counter().get(), 0);
    }

    #[test]
    fn internal_ticks_are_carried_as_debt() {
        let (mut agent, _, edges) = agent(7);
        agent
            .handle_request(Frame::new(Action::WriteRequestDoubleWord, 0, 1))
            .expect("write");
        assert_eq!(agent.counter().get(), 7);

        agent
            .handle_request(Frame::new(Action::TickClock, 0, 5))
            .expect("tick");
        assert_eq!(agent.counter().get(), 2);
        agent
            .handle_request(Frame::new(Action::TickClock, 0, 5))
            .expect("tick");
        assert_eq!(agent.counter().get(), 0);

        assert_eq!(*edges.borrow(), 7 + 3);
        assert_eq!(
            host(&mut agent).sender,
            vec![
                Frame::new(Action::TickClock, 0, 0),
                Frame::new(Action::TickClock, 0, 3)
            ]
        );
    }

    #[test]
    fn interrupts_are_reported_on_change() {
        let (mut agent, _, _) = agent(0);
        let irq = Wire::bit();
        agent.register_interrupt(irq.clone(), 3);

        agent.handle_request(Frame::new(Action::TickClock, 0, 1)).expect("tick");
        irq.set(1);
        agent.handle_request(Frame::new(Action::TickClock, 0, 1)).expect("tick");
        agent.handle_request(Frame::new(Action::TickClock, 0, 1)).expect("tick");
        irq.set(0);
        agent.handle_request(Frame::new(Action::TickClock, 0, 1)).expect("tick");

        let interrupts: Vec<_> = host(&mut agent)
            .sender
            .iter()
            .filter(|f| f.action == Action::Interrupt)
            .copied()
            .collect();
        assert_eq!(
            interrupts,
            vec![
                Frame::new(Action::Interrupt, 3, 1),
                Frame::new(Action::Interrupt, 3, 0)
            ]
        );
    }

    #[rstest]
    #[case(4, 0x6, false)]
    #[case(4, 0x8, true)]
    #[case(2, 0x6, true)]
    fn access_alignment_is_enforced(#[case] alignment: u64, #[case] address: u64, #[case] ok: bool) {
        let (mut agent, _, edges) = agent(1);
        agent
            .handle_request(Frame::new(Action::SetAccessAlignment, 0, alignment))
            .expect("alignment");
        agent
            .handle_request(Frame::new(Action::WriteRequestByte, address, 1))
            .expect("write");
        let expected = if ok { Frame::ok() } else { Frame::error() };
        assert_eq!(host(&mut agent).main, vec![Frame::ok(), expected]);
        assert_eq!(*edges.borrow(), u64::from(ok));
    }

    #[rstest]
    #[case(0)]
    #[case(3)]
    #[case(16)]
    fn invalid_alignment_is_refused(#[case] alignment: u64) {
        let (mut agent, _, _) = agent(0);
        agent
            .handle_request(Frame::new(Action::SetAccessAlignment, 0, alignment))
            .expect("dispatch");
        assert_eq!(host(&mut agent).main, vec![Frame::error()]);
        assert_eq!(agent.config().access_alignment, 1);
    }

    #[test]
    fn peripheral_index_selects_target() {
        let (mut agent, first, _) = agent(0);
        let (second_bus, second, _) = Registers::new(0);
        assert_eq!(agent.add_target(second_bus), 1);

        agent
            .handle_request(Frame::new(Action::WriteRequestByte, 0, 9).with_peripheral_index(1))
            .expect("write");
        agent
            .handle_request(Frame::new(Action::WriteRequestByte, 0, 9).with_peripheral_index(5))
            .expect("write");

        assert_eq!(first.borrow()[0], 0);
        assert_eq!(second.borrow()[0], 9);
        assert_eq!(host(&mut agent).main[1], Frame::error());
        assert!(host(&mut agent).logs.iter().any(|(_, text)| text
            .contains(&Violation::UnknownPeripheral { index: 5 }.to_string())));
    }

    #[test]
    fn disconnect_acknowledges_on_async_and_ends_serving() {
        let (mut agent, _, _) = agent(0);
        host(&mut agent)
            .inbox
            .extend([Frame::new(Action::Disconnect, 0, 0), Frame::ok()]);
        agent.serve().expect("serve");
        assert!(!agent.channel().is_connected());
        assert_eq!(host(&mut agent).sender, vec![Frame::ok()]);
        assert_eq!(host(&mut agent).inbox.len(), 1);
    }

    #[test]
    fn unknown_action_is_logged_and_dropped() {
        let (mut agent, _, _) = agent(0);
        agent
            .handle_request(Frame::new(Action::Custom(77), 0, 0))
            .expect("dispatch");
        assert!(host(&mut agent).main.is_empty());
        assert_eq!(
            host(&mut agent).logs,
            vec![(LogLevel::Warning, "Unhandled request type: 77".to_owned())]
        );
    }

    #[test]
    fn remote_log_level_filters_forwarding() {
        let (mut agent, _, _) = agent(0);
        agent.log(LogLevel::Debug, "quiet");
        agent.log(LogLevel::Info, "loud");
        assert_eq!(host(&mut agent).logs, vec![(LogLevel::Info, "loud".to_owned())]);
    }

    #[test]
    fn nested_request_serves_interleaved_frames() {
        let (mut agent, values, _) = agent(0);
        host(&mut agent).inbox.extend([
            Frame::new(Action::WriteRequestDoubleWord, 4, 0x77),
            Frame::new(Action::WriteRequest, 0, 0xDEAD_BEEF),
        ]);

        let value = agent.request(AccessWidth::Word, 0x2000).expect("request");

        assert_eq!(value, 0xBEEF);
        assert_eq!(values.borrow()[1], 0x77);
        let host = host(&mut agent);
        assert_eq!(host.sender, vec![Frame::new(Action::GetWord, 0x2000, 0)]);
        assert_eq!(host.main, vec![Frame::ok()]);
    }

    #[test]
    fn nested_push_waits_for_confirmation() {
        let (mut agent, _, _) = agent(0);
        host(&mut agent)
            .inbox
            .extend([Frame::new(Action::PushConfirmation, 0, 0)]);
        agent
            .push(AccessWidth::Byte, 0x10, 0x1FF)
            .expect("push");
        assert_eq!(
            host(&mut agent).sender,
            vec![Frame::new(Action::PushByte, 0x10, 0xFF)]
        );
    }

    #[test]
    fn tick_served_inside_initiator_request_reaches_every_bus() {
        let (mut agent, _, target_edges) = agent(0);
        let (relay, relay_edges, _) = Relay::new(false);
        agent.add_initiator(relay);
        host(&mut agent).inbox.extend([
            Frame::new(Action::TickClock, 0, 5),
            Frame::new(Action::WriteRequest, 0, 1),
        ]);

        agent
            .handle_request(Frame::new(Action::TickClock, 0, 1))
            .expect("tick");

        assert_eq!(*target_edges.borrow(), 6);
        assert_eq!(relay_edges.get(), 6);
        assert_eq!(
            host(&mut agent).sender,
            vec![
                Frame::new(Action::GetWord, 0x80, 0),
                Frame::new(Action::TickClock, 0, 5),
                Frame::new(Action::TickClock, 0, 1)
            ]
        );
    }

    #[test]
    fn reset_served_inside_initiator_request_reaches_initiators() {
        let (mut agent, _, _) = agent(0);
        let (relay, _, resets) = Relay::new(false);
        agent.add_initiator(relay);
        host(&mut agent).inbox.extend([
            Frame::new(Action::ResetPeripheral, 0, 0),
            Frame::new(Action::WriteRequest, 0, 1),
        ]);

        agent
            .handle_request(Frame::new(Action::TickClock, 0, 1))
            .expect("tick");

        assert_eq!(resets.get(), 1);
    }

    #[test]
    fn failed_tick_keeps_debt_charged_by_nested_requests() {
        let (mut agent, _, target_edges) = agent(7);
        let (relay, relay_edges, _) = Relay::new(true);
        agent.add_initiator(relay);
        host(&mut agent).inbox.extend([
            Frame::new(Action::WriteRequestDoubleWord, 4, 1),
            Frame::new(Action::WriteRequest, 0, 9),
        ]);

        agent
            .handle_request(Frame::new(Action::TickClock, 0, 5))
            .expect("failed tick is answered");
        assert_eq!(agent.counter().get(), 7);
        agent
            .handle_request(Frame::new(Action::TickClock, 0, 10))
            .expect("tick");

        assert_eq!(agent.counter().get(), 0);
        assert_eq!(*target_edges.borrow(), 5 + 7 + 3);
        assert_eq!(relay_edges.get(), 3);
        assert_eq!(
            host(&mut agent).sender,
            vec![
                Frame::new(Action::GetWord, 0x80, 0),
                Frame::error(),
                Frame::new(Action::TickClock, 0, 3)
            ]
        );
    }

    #[test]
    fn disconnect_during_nested_request_ends_session_cleanly() {
        let (mut agent, _, _) = agent(0);
        let (relay, _, _) = Relay::new(false);
        agent.add_initiator(relay);
        host(&mut agent).inbox.extend([
            Frame::new(Action::TickClock, 0, 2),
            Frame::new(Action::Disconnect, 0, 0),
        ]);

        agent.serve().expect("clean end");

        assert!(!agent.channel().is_connected());
        assert_eq!(
            host(&mut agent).sender,
            vec![Frame::new(Action::GetWord, 0x80, 0), Frame::ok()]
        );
    }

    #[test]
    fn nested_request_reports_session_end() {
        let (mut agent, _, _) = agent(0);
        host(&mut agent)
            .inbox
            .extend([Frame::new(Action::Disconnect, 0, 0)]);
        let err = agent.request(AccessWidth::Word, 0).expect_err("ended");
        assert!(matches!(
            err,
            BusError::Transport(ChannelError::SessionEnded)
        ));
    }

    #[test]
    fn driver_loss_during_nested_request_unwinds() {
        let (mut agent, _, _) = agent(0);
        let err = agent.request(AccessWidth::DoubleWord, 0).expect_err("closed");
        assert!(err.ends_session());
        assert!(matches!(err, BusError::Transport(ChannelError::Closed)));
    }

    struct Echo;

    impl AgentExtension<DirectChannel<Host>> for Echo {
        fn handle(
            &mut self,
            agent: &mut Agent<DirectChannel<Host>>,
            frame: Frame,
        ) -> Result<(), ChannelError> {
            agent
                .channel_mut()
                .send_main(Frame::new(frame.action, frame.address, frame.value + 1))
        }
    }

    #[test]
    fn extension_handles_custom_actions() {
        let (mut agent, _, _) = agent(0);
        agent.set_extension(Box::new(Echo));
        agent
            .handle_request(Frame::new(Action::IsHalted, 0, 41))
            .expect("dispatch");
        agent
            .handle_request(Frame::new(Action::Custom(200), 0, 1))
            .expect("dispatch");
        assert_eq!(
            host(&mut agent).main,
            vec![
                Frame::new(Action::IsHalted, 0, 42),
                Frame::new(Action::Custom(200), 0, 2)
            ]
        );
    }

    #[test]
    fn reset_reaches_every_target() {
        let (mut agent, values, _) = agent(0);
        values.borrow_mut()[0] = 5;
        agent
            .handle_request(Frame::new(Action::ResetPeripheral, 0, 0))
            .expect("reset");
        assert_eq!(values.borrow()[0], 0);
    }
}
