//! Error handler - satu-satunya jalur fault keluar dari runner
//!
//! Handler dipanggil dari thread mana pun yang mengalami fault, jadi harus
//! `Send + Sync`, dan tidak boleh gagal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::error;

use crate::error::AgentError;

/// Callback untuk fault yang tidak ditangani agent.
pub trait ErrorHandler: Send + Sync {
    /// Laporkan satu fault.
    fn on_error(&self, error: &AgentError);
}

impl<F> ErrorHandler for F
where
    F: Fn(&AgentError) + Send + Sync,
{
    #[inline]
    fn on_error(&self, error: &AgentError) {
        self(error)
    }
}

/// Log setiap fault lewat `tracing::error!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn on_error(&self, err: &AgentError) {
        let thread = std::thread::current();
        error!(
            thread = thread.name().unwrap_or("<unnamed>"),
            error = %err,
            "agent fault"
        );
    }
}

/// Hitungan fault yang dibagi antara handler dan operator.
#[derive(Debug, Default, Clone)]
pub struct ErrorCounter(Arc<AtomicU64>);

impl ErrorCounter {
    /// Jumlah fault sejauh ini.
    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

/// Menghitung fault lalu meneruskan ke handler lain.
pub struct CountedErrorHandler<H> {
    inner: H,
    errors: ErrorCounter,
}

impl<H: ErrorHandler> CountedErrorHandler<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            errors: ErrorCounter::default(),
        }
    }

    /// Counter yang tetap bisa dibaca setelah handler dipindah ke runner.
    pub fn counter(&self) -> ErrorCounter {
        self.errors.clone()
    }
}

impl<H: ErrorHandler> ErrorHandler for CountedErrorHandler<H> {
    fn on_error(&self, error: &AgentError) {
        self.errors.0.fetch_add(1, Ordering::AcqRel);
        self.inner.on_error(error);
    }
}
