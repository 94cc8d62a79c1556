//! Concurrent module: Agent execution model
//!
//! Satu [`Agent`] dijalankan oleh satu [`AgentRunner`] di satu thread OS
//! khusus. Tidak ada scheduling kooperatif di dalam modul ini; pembatalan
//! hanya diamati di batas iterasi loop.

mod affinity;
mod agent;
mod error_handler;
mod idle;
mod runner;

pub use agent::Agent;
pub use error_handler::{CountedErrorHandler, ErrorCounter, ErrorHandler, LoggingErrorHandler};
pub use idle::{BackoffIdle, BusySpinIdle, IdleStrategy, YieldingIdle};
pub use runner::{AgentRunner, AgentThread, ThreadBinding, ThreadConfig};
