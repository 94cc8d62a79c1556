//! Idle strategies untuk producer/consumer yang spin
//!
//! Ring buffer tidak pernah blocking: `try_claim` langsung `None` saat penuh
//! dan `read` langsung 0 saat kosong. Kebijakan menunggu (spin, yield, park)
//! ada di sisi caller, lewat strategi di sini.

use std::hint;
use std::thread;
use std::time::Duration;

/// Kebijakan menunggu saat tidak ada kerja.
pub trait IdleStrategy {
    /// Dipanggil setelah setiap iterasi dengan jumlah kerja yang dilakukan.
    /// `work_count > 0` mereset backoff.
    fn idle(&mut self, work_count: usize);

    /// Kembali ke fase paling agresif.
    fn reset(&mut self);
}

/// Spin terus - latency minimum, satu core penuh.
#[derive(Debug, Default, Clone, Copy)]
pub struct BusySpinIdle;

impl IdleStrategy for BusySpinIdle {
    #[inline(always)]
    fn idle(&mut self, work_count: usize) {
        if work_count == 0 {
            hint::spin_loop();
        }
    }

    #[inline(always)]
    fn reset(&mut self) {}
}

/// Yield ke scheduler OS setiap kali idle.
#[derive(Debug, Default, Clone, Copy)]
pub struct YieldingIdle;

impl IdleStrategy for YieldingIdle {
    #[inline]
    fn idle(&mut self, work_count: usize) {
        if work_count == 0 {
            thread::yield_now();
        }
    }

    #[inline]
    fn reset(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackoffPhase {
    Spinning,
    Yielding,
    Parking,
}

/// Spin -> yield -> park dengan durasi park yang naik dua kali lipat.
#[derive(Debug, Clone)]
pub struct BackoffIdle {
    max_spins: u32,
    max_yields: u32,
    min_park: Duration,
    max_park: Duration,
    phase: BackoffPhase,
    spins: u32,
    yields: u32,
    park: Duration,
}

impl BackoffIdle {
    pub fn new(max_spins: u32, max_yields: u32, min_park: Duration, max_park: Duration) -> Self {
        Self {
            max_spins,
            max_yields,
            min_park,
            max_park: max_park.max(min_park),
            phase: BackoffPhase::Spinning,
            spins: 0,
            yields: 0,
            park: min_park,
        }
    }
}

impl Default for BackoffIdle {
    fn default() -> Self {
        Self::new(100, 10, Duration::from_micros(1), Duration::from_millis(1))
    }
}

impl IdleStrategy for BackoffIdle {
    fn idle(&mut self, work_count: usize) {
        if work_count > 0 {
            self.reset();
            return;
        }

        match self.phase {
            BackoffPhase::Spinning => {
                hint::spin_loop();
                self.spins += 1;
                if self.spins >= self.max_spins {
                    self.phase = BackoffPhase::Yielding;
                }
            }
            BackoffPhase::Yielding => {
                thread::yield_now();
                self.yields += 1;
                if self.yields >= self.max_yields {
                    self.phase = BackoffPhase::Parking;
                }
            }
            BackoffPhase::Parking => {
                thread::park_timeout(self.park);
                self.park = next_park(self.park, self.max_park);
            }
        }
    }

    fn reset(&mut self) {
        self.phase = BackoffPhase::Spinning;
        self.spins = 0;
        self.yields = 0;
        self.park = self.min_park;
    }
}

/// Durasi park berikutnya: dua kali lipat, dibatasi `max`.
#[inline]
fn next_park(park: Duration, max: Duration) -> Duration {
    park.saturating_mul(2).min(max)
}
