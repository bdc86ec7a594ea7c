//! Multi-tab test fixtures: an in-process project server, a hand-driven clock
//! and tabs that share a store and a signal channel.

pub mod clock;
pub mod fixtures;
pub mod network;
pub mod server;
pub mod tab;

pub use clock::ManualClock;
pub use network::TestNetwork;
pub use server::FakeServer;
pub use tab::{TabEngine, TestTab};

/// Midday on 2026-02-16, the default start of every manual clock.
pub const START_MS: u64 = 1_771_243_200_000;
