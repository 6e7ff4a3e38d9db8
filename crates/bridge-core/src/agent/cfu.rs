use super::forward_log;
use crate::bus::cfu::{Cfu, CfuResult};
use crate::channel::Channel;
use crate::config::AgentConfig;
use crate::error::ChannelError;
use crate::protocol::{Action, Frame, LogLevel};
use crate::signal::{Signal, Wire};

/// Session serving a single custom function unit.
///
/// Instructions arrive from the host processor through [`CfuAgent::execute`];
/// the driver only paces the clock and resets the unit. Unlike [`super::Agent`]
/// no tick debt is carried: cycles spent inside an instruction are forgotten
/// at the next clock request.
#[derive(Debug)]
pub struct CfuAgent<C, S = Wire> {
    channel: C,
    cfu: Cfu<S>,
    config: AgentConfig,
}

impl<C: Channel, S: Signal> CfuAgent<C, S> {
    /// Binds the unit to the driver session.
    pub const fn new(channel: C, cfu: Cfu<S>, config: AgentConfig) -> Self {
        Self {
            channel,
            cfu,
            config,
        }
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

    /// The served unit.
    #[must_use]
    pub const fn cfu(&self) -> &Cfu<S> {
        &self.cfu
    }

    /// Runs one instruction, folding failures into the status code.
    pub fn execute(&self, function_id: u32, data0: u32, data1: u32) -> CfuResult {
        let result = self.cfu.execute(function_id, data0, data1);
        if let Err(err) = &result {
            tracing::warn!(function_id, %err, "cfu instruction failed");
        }
        CfuResult::from(result)
    }

    /// Runs the unit's reset sequence.
    pub fn reset(&self) {
        self.cfu.reset();
    }

    /// Dispatches one frame from the driver.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] when the reply cannot be sent.
    pub fn handle_request(&mut self, frame: Frame) -> Result<(), ChannelError> {
        match frame.action {
            Action::InvalidAction => Ok(()),
            Action::TickClock => {
                let counter = self.cfu.clock().counter();
                let steps = frame.value.saturating_sub(counter.get());
                if steps > 0 {
                    self.cfu.tick(false, steps);
                }
                counter.set(0);
                self.channel
                    .send_async(Frame::new(Action::TickClock, 0, steps))
            }
            Action::ResetPeripheral => {
                self.reset();
                Ok(())
            }
            other => {
                forward_log(
                    &mut self.channel,
                    &self.config,
                    LogLevel::Warning,
                    &format!("Unhandled request type: {}", other.as_i32()),
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CfuAgent;
    use crate::bus::cfu::{Cfu, CfuSignals, CfuStatus};
    use crate::bus::testing::on_rising_edge;
    use crate::channel::{DirectChannel, DirectHost};
    use crate::clock::Clock;
    use crate::config::{AgentConfig, BusConfig};
    use crate::protocol::{Action, Frame, LogLevel, ProtocolVersion};
    use crate::signal::{Signal, Wire};

    #[derive(Default)]
    struct Host {
        sender: Vec<Frame>,
        logs: Vec<(LogLevel, String)>,
    }

    impl DirectHost for Host {
        fn main_message(&mut self, _frame: Frame) {}

        fn sender_message(&mut self, frame: Frame) {
            self.sender.push(frame);
        }

        fn receive(&mut self) -> Option<Frame> {
            None
        }

        fn log(&mut self, level: LogLevel, message: &str) {
            self.logs.push((level, message.to_owned()));
        }
    }

    /// Multiplier answering one edge after the request.
    fn agent() -> CfuAgent<DirectChannel<Host>> {
        let clk = Wire::bit();
        let signals = CfuSignals::<Wire>::default();
        let s = signals.clone();
        s.req_ready.set(1);
        let evaluator = on_rising_edge(&clk, move || {
            let valid = s.req_valid.is_high() && !s.resp_valid.is_high();
            s.resp_valid.set(u64::from(valid));
            if valid {
                s.resp_data.set(s.req_data0.get() * s.req_data1.get());
            }
        });
        let cfu = Cfu::new(
            Clock::new(clk, evaluator),
            signals,
            BusConfig::default().with_timeout(4),
        );
        CfuAgent::new(
            DirectChannel::new(Host::default(), ProtocolVersion::V1),
            cfu,
            AgentConfig::default(),
        )
    }

    #[test]
    fn execute_reports_value_and_status() {
        let agent = agent();
        let result = agent.execute(3, 6, 7);
        assert_eq!(result.value, 42);
        assert_eq!(result.status, CfuStatus::Ok);
    }

    #[test]
    fn tick_clock_discards_instruction_cycles() {
        let mut agent = agent();
        let _ = agent.execute(0, 2, 2);
        assert!(agent.cfu().clock().counter().get() > 0);

        agent
            .handle_request(Frame::new(Action::TickClock, 0, 100))
            .expect("tick");
        agent
            .handle_request(Frame::new(Action::TickClock, 0, 10))
            .expect("tick");

        let sender = &agent.channel().host().sender;
        assert!(sender[0].value < 100);
        assert_eq!(sender[1], Frame::new(Action::TickClock, 0, 10));
        assert_eq!(agent.cfu().clock().counter().get(), 0);
    }

    #[test]
    fn other_actions_are_logged() {
        let mut agent = agent();
        agent
            .handle_request(Frame::new(Action::WriteRequestByte, 0, 1))
            .expect("dispatch");
        assert_eq!(
            agent.channel().host().logs,
            vec![(LogLevel::Warning, "Unhandled request type: 25".to_owned())]
        );
        assert!(agent.channel().host().sender.is_empty());
    }
}
