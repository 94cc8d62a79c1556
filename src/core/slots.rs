//! Slot array - storage pre-allocated untuk ring buffer
//!
//! Semua slot dibuat sekali saat inisialisasi lewat factory, lalu dipakai
//! ulang selamanya. Tidak ada alokasi setelah konstruksi.

use std::cell::UnsafeCell;
use std::ops::Deref;

use crate::error::RingBufferError;

/// Slot dalam ring buffer - satu elemen reusable di posisi tetap
#[repr(C, align(64))] // Cache line alignment untuk menghindari false sharing
struct Slot<T> {
    data: UnsafeCell<T>,
}

/// Padding untuk cache line isolation (64 bytes pada x86-64)
#[repr(C, align(64))]
pub(crate) struct CacheLinePadded<T> {
    value: T,
}

impl<T> CacheLinePadded<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self { value }
    }

    #[inline(always)]
    pub(crate) fn get_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> Deref for CacheLinePadded<T> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        &self.value
    }
}

/// Array slot dengan kapasitas power of 2.
///
/// Tidak melakukan sinkronisasi sendiri: ring buffer di atasnya yang
/// menentukan siapa boleh menyentuh slot mana.
pub(crate) struct SlotArray<T> {
    slots: Box<[Slot<T>]>,
    mask: usize,
}

impl<T> SlotArray<T> {
    /// Validasi kapasitas lalu isi setiap slot dari `factory`.
    pub(crate) fn new<F>(capacity: usize, mut factory: F) -> Result<Self, RingBufferError>
    where
        F: FnMut() -> T,
    {
        if !is_valid_capacity(capacity) {
            return Err(RingBufferError::InvalidCapacity { capacity });
        }

        // Alokasi di heap untuk menghindari stack overflow
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(Slot {
                data: UnsafeCell::new(factory()),
            });
        }

        Ok(Self {
            slots: slots.into_boxed_slice(),
            mask: capacity - 1,
        })
    }

    #[inline(always)]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Index slot untuk sebuah sequence.
    #[inline(always)]
    pub(crate) fn index_of(&self, sequence: u64) -> usize {
        (sequence as usize) & self.mask
    }

    /// # Safety
    /// Tidak boleh ada `&mut` aktif ke slot yang sama.
    #[inline(always)]
    pub(crate) unsafe fn get(&self, index: usize) -> &T {
        &*self.slots[index].data.get()
    }

    /// # Safety
    /// Caller harus punya akses eksklusif ke slot ini (claim yang belum
    /// di-commit).
    #[inline(always)]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn get_mut(&self, index: usize) -> &mut T {
        &mut *self.slots[index].data.get()
    }
}

/// Kapasitas valid: lebih dari nol dan power of 2.
#[inline]
pub fn is_valid_capacity(capacity: usize) -> bool {
    capacity > 0 && capacity.is_power_of_two()
}
