//! Conduit - Lock-Free Transport & Agent Runtime
//!
//! Arsitektur:
//! - Lock-Free: Ring buffer SPSC dan MPSC, hanya atomic operations
//! - No-Allocation: Slot pre-allocated, claim/commit di tempat
//! - Agent Runner: Satu thread per agent, lifecycle dan fault handling seragam

pub mod concurrent;
pub mod core;
pub mod error;

pub use crate::concurrent::{Agent, AgentRunner, AgentThread, ErrorHandler};
pub use crate::core::{Consumer, ManyToOneRingBuffer, OneToOneRingBuffer, Producer, RingBuffer};
pub use crate::error::{AgentError, RingBufferError};
