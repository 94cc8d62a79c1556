//! Core module: Lock-Free Ring Buffers
//!
//! Prinsip desain:
//! - Lock-Free: Hanya atomic operations, tidak ada Mutex/RwLock
//! - No-Allocation: Semua slot pre-allocated saat init, dipakai ulang
//! - Claim/Commit: Payload ditulis di tempat, publish dengan satu store
//! - Split: Producer/Consumer handle menegakkan disiplin SPSC/MPSC di type system

mod many_to_one;
mod one_to_one;
mod ring_buffer;
mod slots;

pub use many_to_one::{ManyToOneConsumer, ManyToOneProducer, ManyToOneRingBuffer};
pub use one_to_one::{OneToOneConsumer, OneToOneProducer, OneToOneRingBuffer};
pub use ring_buffer::{Claim, Consumer, MultiProducer, Producer, Resettable, RingBuffer};
pub use slots::is_valid_capacity;
