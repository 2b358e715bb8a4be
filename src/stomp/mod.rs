// STOMP 1.2 framing and heartbeat negotiation

mod frame;

pub use frame::{negotiate_heartbeats, Frame, FrameCommand, FrameError, HeartbeatPlan};
