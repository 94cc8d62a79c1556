//! Kontrak Agent - unit kerja berulang yang dijalankan satu thread khusus

use crate::error::AgentError;

/// Unit kerja yang disupervisi oleh [`AgentRunner`](super::AgentRunner).
///
/// Semua method menerima `&self`: agent dibagi antara thread worker dan
/// pemanggil `close()`, jadi state internal memakai atomics atau cell.
/// Runner menjamin `on_start`/`do_work`/`on_close` tidak pernah dipanggil
/// bersamaan.
pub trait Agent: Send + Sync + 'static {
    /// Dipanggil sekali sebelum loop. Error di sini membatalkan loop, tapi
    /// `on_close` tetap dipanggil.
    fn on_start(&self) -> Result<(), AgentError> {
        Ok(())
    }

    /// Dipanggil setiap iterasi. Mengembalikan jumlah item yang dikerjakan.
    ///
    /// Return `Err(AgentError::Cancelled)` untuk minta berhenti dari dalam.
    fn do_work(&self) -> Result<usize, AgentError>;

    /// Dipanggil sekali setelah loop selesai. Best-effort: error hanya
    /// dilaporkan ke error handler.
    fn on_close(&self) -> Result<(), AgentError> {
        Ok(())
    }

    /// Nama role, dipakai sebagai nama thread worker.
    fn role_name(&self) -> String {
        short_type_name(std::any::type_name::<Self>()).to_owned()
    }
}

/// `crate::feed::MarketDataAgent<u64>` -> `MarketDataAgent`
fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
