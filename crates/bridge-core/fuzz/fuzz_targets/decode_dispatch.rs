#![no_main]

use std::collections::VecDeque;

use bridge_core::{
    AccessWidth, Action, Agent, AgentConfig, BusError, DirectChannel, DirectHost, Frame, LogLevel,
    ProtocolVersion, TargetBus, TickCounter,
};
use libfuzzer_sys::fuzz_target;

#[derive(Default)]
struct Driver {
    frames: VecDeque<Frame>,
}

impl DirectHost for Driver {
    fn main_message(&mut self, _frame: Frame) {}

    fn sender_message(&mut self, _frame: Frame) {}

    fn receive(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    fn log(&mut self, _level: LogLevel, _message: &str) {}
}

struct Scratch {
    counter: TickCounter,
    word: u64,
}

impl TargetBus for Scratch {
    fn name(&self) -> &'static str {
        "scratch"
    }

    fn attach_counter(&mut self, counter: TickCounter) {
        self.counter = counter;
    }

    fn tick(&mut self, count: bool, steps: u64) {
        if count {
            self.counter.add(steps);
        }
    }

    fn reset(&mut self) {
        self.word = 0;
    }

    fn read(&mut self, width: AccessWidth, _address: u64) -> Result<u64, BusError> {
        self.tick(true, 1);
        Ok(self.word & width.mask())
    }

    fn write(&mut self, width: AccessWidth, _address: u64, value: u64) -> Result<(), BusError> {
        self.tick(true, 1);
        self.word = value & width.mask();
        Ok(())
    }
}

fuzz_target!(|data: &[u8]| {
    let Some((&selector, body)) = data.split_first() else {
        return;
    };
    let version = if selector & 1 == 0 {
        ProtocolVersion::V1
    } else {
        ProtocolVersion::V2
    };

    let frames: VecDeque<Frame> = body
        .chunks_exact(version.frame_len())
        .filter_map(|chunk| Frame::decode(chunk, version).ok())
        .collect();
    for frame in &frames {
        assert_eq!(Action::from_i32(frame.action.as_i32()), frame.action);
        let _ = LogLevel::from_wire(frame.value);
    }

    let mut agent = Agent::new(
        DirectChannel::new(Driver { frames }, version),
        AgentConfig::default(),
    );
    agent.add_target(Scratch {
        counter: TickCounter::new(),
        word: 0,
    });
    let _ = agent.serve();
});
