//! Error types untuk ring buffer dan agent runner.
//!
//! Buffer penuh BUKAN error: `try_claim` mengembalikan `None` supaya
//! producer yang spin di hot path tidak pernah membuat objek error.

use thiserror::Error;

/// Error saat konstruksi ring buffer.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingBufferError {
    /// Kapasitas harus power of 2 dan lebih besar dari nol.
    #[error("capacity must be a positive power of 2, got {capacity}")]
    InvalidCapacity {
        /// Kapasitas yang diminta.
        capacity: usize,
    },
}

/// Fault yang dilaporkan oleh agent atau ditangkap oleh runner.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum AgentError {
    /// Permintaan berhenti dari luar (atau dari dalam `do_work`).
    #[error("agent cancelled")]
    Cancelled,

    /// Panic yang ditangkap dari callback agent.
    #[error("agent panicked: {0}")]
    Panicked(String),

    /// Fault dengan pesan teks saja.
    #[error("{0}")]
    Message(String),

    /// Catch-all untuk error dari kode agent.
    #[error(transparent)]
    Failed(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl AgentError {
    /// Membungkus error apa pun sebagai [`AgentError::Failed`].
    pub fn failed<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failed(Box::new(error))
    }

    /// `true` jika ini sinyal pembatalan.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<String> for AgentError {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<&str> for AgentError {
    fn from(message: &str) -> Self {
        Self::Message(message.to_owned())
    }
}
