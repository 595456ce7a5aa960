mod client;
mod clock;
mod connection;
mod context;
mod counters;
mod driver;
mod pool;
mod samples;
mod signal;
mod stream;
mod summary;

pub use client::{LatencyClient, RunEndReason, RunResults};
pub use connection::ConnectionPhase;
pub use context::EventSink;
pub use counters::{CounterSnapshot, RunCounters};
pub use samples::{LatencySampleStore, Recorded, SampleWriter};
pub use signal::StopSignal;
pub use summary::{LatencySummary, percentile};

pub(crate) use signal::Signal;
