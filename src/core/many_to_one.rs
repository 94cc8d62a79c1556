//! Lock-Free Multi-Producer Single-Consumer (MPSC) Ring Buffer
//!
//! `tail` di-claim lewat CAS retry loop. Karena `tail` maju saat claim
//! (bukan saat commit), visibility dilacak per slot dengan tag atomic:
//! EMPTY -> CLAIMED -> PUBLISHED -> EMPTY.
//!
//! Consumer berjalan dari `head` selama slot PUBLISHED dan berhenti di slot
//! pertama yang belum, walaupun slot sesudahnya sudah PUBLISHED. Producer
//! boleh commit tidak berurutan satu sama lain, consumer tetap melihat
//! urutan claim.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use super::ring_buffer::{Consumer, MultiProducer, Producer, Resettable, RingBuffer};
use super::slots::{CacheLinePadded, SlotArray};
use crate::error::RingBufferError;

const EMPTY: u8 = 0;
const CLAIMED: u8 = 1;
const PUBLISHED: u8 = 2;

/// Handle producer hasil [`RingBuffer::split`], boleh di-clone per thread.
pub type ManyToOneProducer<T> = Producer<T, ManyToOneRingBuffer<T>>;

/// Handle consumer hasil [`RingBuffer::split`].
pub type ManyToOneConsumer<T> = Consumer<T, ManyToOneRingBuffer<T>>;

/// Lock-Free MPSC Ring Buffer
pub struct ManyToOneRingBuffer<T> {
    // Hanya consumer yang menulis head, tidak perlu CAS
    head: CacheLinePadded<AtomicU64>,
    // Semua producer berebut tail lewat CAS
    tail: CacheLinePadded<AtomicU64>,
    // Tag state per slot (arena, index sama dengan slot)
    states: Box<[AtomicU8]>,
    slots: SlotArray<T>,
}

// SAFETY: ManyToOneRingBuffer aman untuk Send/Sync karena:
// - CAS pada tail menjamin setiap slot di-claim tepat satu producer
// - Hanya satu consumer (kontrak unsafe `read_limit`, atau ManyToOneConsumer)
// - Tag PUBLISHED dengan Release/Acquire menjamin visibility payload
unsafe impl<T: Send> Send for ManyToOneRingBuffer<T> {}
unsafe impl<T: Send> Sync for ManyToOneRingBuffer<T> {}

// SAFETY: CAS pada tail memberi setiap sequence ke tepat satu pemanggil
unsafe impl<T: Send> MultiProducer for ManyToOneRingBuffer<T> {}

impl<T> ManyToOneRingBuffer<T> {
    /// Membuat ring buffer baru. `capacity` HARUS power of 2.
    pub fn new<F>(capacity: usize, factory: F) -> Result<Self, RingBufferError>
    where
        F: FnMut() -> T,
    {
        let slots = SlotArray::new(capacity, factory)?;
        let states: Box<[AtomicU8]> = (0..capacity).map(|_| AtomicU8::new(EMPTY)).collect();

        Ok(Self {
            head: CacheLinePadded::new(AtomicU64::new(0)),
            tail: CacheLinePadded::new(AtomicU64::new(0)),
            states,
            slots,
        })
    }

    /// Sama dengan [`new`](Self::new), slot diisi `T::default()`.
    pub fn with_default(capacity: usize) -> Result<Self, RingBufferError>
    where
        T: Default,
    {
        Self::new(capacity, T::default)
    }
}

impl<T: Send> RingBuffer<T> for ManyToOneRingBuffer<T> {
    #[inline(always)]
    fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Claim slot (Producer side, boleh dari banyak thread)
    #[inline]
    unsafe fn try_claim(&self) -> Option<usize> {
        let capacity = self.slots.capacity() as u64;

        loop {
            // head dibaca sebelum tail supaya tail >= head selalu berlaku
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Acquire);
            if tail.wrapping_sub(head) >= capacity {
                return None;
            }

            if self
                .tail
                .compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                let index = self.slots.index_of(tail);
                self.states[index].store(CLAIMED, Ordering::Relaxed);
                return Some(index);
            }
            // Producer lain menang, coba lagi
        }
    }

    #[inline(always)]
    unsafe fn index_at(&self, index: usize) -> &mut T {
        debug_assert!(index < self.slots.capacity());
        self.slots.get_mut(index)
    }

    #[inline(always)]
    unsafe fn commit(&self, index: usize) {
        debug_assert!(index < self.slots.capacity());
        self.states[index].store(PUBLISHED, Ordering::Release);
    }

    /// Drain pesan PUBLISHED berurutan (Consumer side)
    ///
    /// `tail` hanya di-snapshot sekali per panggilan: commit yang terjadi
    /// di tengah scan baru terlihat di panggilan berikutnya.
    unsafe fn read_limit<F>(&self, mut consumer: F, limit: usize) -> usize
    where
        F: FnMut(&T),
    {
        let start = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        let available = tail.wrapping_sub(start);
        let to_read = available.min(limit as u64);

        let mut head = start;
        while head.wrapping_sub(start) < to_read {
            let index = self.slots.index_of(head);
            if self.states[index].load(Ordering::Acquire) != PUBLISHED {
                break;
            }

            // SAFETY: slot PUBLISHED milik consumer sampai head di-update
            consumer(unsafe { self.slots.get(index) });
            self.states[index].store(EMPTY, Ordering::Relaxed);
            head = head.wrapping_add(1);
        }

        self.head.store(head, Ordering::Release);
        head.wrapping_sub(start) as usize
    }

    #[inline(always)]
    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head) as usize
    }
}

impl<T> Resettable for ManyToOneRingBuffer<T> {
    fn reset(&mut self) {
        *self.head.get_mut().get_mut() = 0;
        *self.tail.get_mut().get_mut() = 0;
        for state in self.states.iter_mut() {
            *state.get_mut() = EMPTY;
        }
    }
}
