//! Live strategy execution: ticks a `SignalMachine` once per minute
//! against wall-clock time, forever, persisting every transition so a
//! crash resumes exactly where it left off.

mod facade;
mod orchestrator;

pub use facade::Live;
pub use orchestrator::{LiveOrchestrator, DEFAULT_TICK_INTERVAL};
