#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

//! Building blocks of a receive-throughput benchmark.
//!
//! ```text
//! Attacker ──(Pacer)──► target ──► EventRecorder ──► Quiescence
//!                                       │                 │
//!                                       └──► QueueProfiler └──► Throughput ──► SampleSink
//! ```

pub mod attack;
pub mod pacer;
pub mod profiler;
pub mod quiescence;
pub mod recorder;
pub mod sample;
pub mod throughput;
pub mod utils;
