//! Lock-Free Single-Producer Single-Consumer (SPSC) Ring Buffer
//!
//! Varian Lamport queue dengan claim/commit terpisah. Hanya producer yang
//! menulis `tail`, hanya consumer yang menulis `head`, jadi counter tidak
//! butuh CAS. Flag commit per slot tetap dibutuhkan karena producer boleh
//! claim beberapa slot ke depan dan commit dengan urutan bebas.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::ring_buffer::{Consumer, Producer, Resettable, RingBuffer};
use super::slots::{CacheLinePadded, SlotArray};
use crate::error::RingBufferError;

/// Handle producer hasil [`RingBuffer::split`].
pub type OneToOneProducer<T> = Producer<T, OneToOneRingBuffer<T>>;

/// Handle consumer hasil [`RingBuffer::split`].
pub type OneToOneConsumer<T> = Consumer<T, OneToOneRingBuffer<T>>;

/// Lock-Free SPSC Ring Buffer
///
/// Menggunakan separate cache lines untuk head dan tail
/// untuk menghindari false sharing antara producer dan consumer.
pub struct OneToOneRingBuffer<T> {
    // Consumer side - next sequence untuk dibaca
    head: CacheLinePadded<AtomicU64>,
    // Producer side - next sequence untuk di-claim
    tail: CacheLinePadded<AtomicU64>,
    // Flag commit per slot, di-set producer (Release), dibaca consumer (Acquire)
    committed: Box<[AtomicBool]>,
    slots: SlotArray<T>,
}

// SAFETY: OneToOneRingBuffer aman untuk Send/Sync karena:
// - Hanya satu producer (kontrak unsafe `try_claim`, atau OneToOneProducer
//   yang tidak Sync dan tidak Clone)
// - Hanya satu consumer (kontrak unsafe `read_limit`, atau OneToOneConsumer)
// - Flag commit dengan Release/Acquire menjamin visibility payload
unsafe impl<T: Send> Send for OneToOneRingBuffer<T> {}
unsafe impl<T: Send> Sync for OneToOneRingBuffer<T> {}

impl<T> OneToOneRingBuffer<T> {
    /// Membuat ring buffer baru. `capacity` HARUS power of 2.
    ///
    /// Alokasi hanya terjadi sekali saat inisialisasi.
    /// Setelah itu, tidak ada alokasi di hot path.
    pub fn new<F>(capacity: usize, factory: F) -> Result<Self, RingBufferError>
    where
        F: FnMut() -> T,
    {
        let slots = SlotArray::new(capacity, factory)?;
        let committed: Box<[AtomicBool]> =
            (0..capacity).map(|_| AtomicBool::new(false)).collect();

        Ok(Self {
            head: CacheLinePadded::new(AtomicU64::new(0)),
            tail: CacheLinePadded::new(AtomicU64::new(0)),
            committed,
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

impl<T: Send> RingBuffer<T> for OneToOneRingBuffer<T> {
    #[inline(always)]
    fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Claim slot berikutnya (Producer side)
    ///
    /// Zero-allocation, lock-free, tanpa CAS.
    #[inline(always)]
    unsafe fn try_claim(&self) -> Option<usize> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        // Cek apakah buffer penuh
        if tail.wrapping_sub(head) >= self.slots.capacity() as u64 {
            return None;
        }

        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(self.slots.index_of(tail))
    }

    #[inline(always)]
    unsafe fn index_at(&self, index: usize) -> &mut T {
        debug_assert!(index < self.slots.capacity());
        self.slots.get_mut(index)
    }

    #[inline(always)]
    unsafe fn commit(&self, index: usize) {
        debug_assert!(index < self.slots.capacity());
        // Release: payload yang ditulis terlihat sebelum flag
        self.committed[index].store(true, Ordering::Release);
    }

    /// Drain pesan yang sudah di-commit (Consumer side)
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
            // Berhenti di gap pertama, jangan pernah lompat
            if !self.committed[index].load(Ordering::Acquire) {
                break;
            }

            // SAFETY: slot sudah di-commit dan producer tidak bisa claim ulang
            // sebelum head di-update di bawah
            consumer(unsafe { self.slots.get(index) });
            self.committed[index].store(false, Ordering::Relaxed);
            head = head.wrapping_add(1);
        }

        // Release: slot yang sudah dibaca boleh dipakai ulang producer
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

impl<T> Resettable for OneToOneRingBuffer<T> {
    fn reset(&mut self) {
        *self.head.get_mut().get_mut() = 0;
        *self.tail.get_mut().get_mut() = 0;
        for flag in self.committed.iter_mut() {
            *flag.get_mut() = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct TestMessage {
        value: u64,
    }

    fn split(capacity: usize) -> (OneToOneProducer<TestMessage>, OneToOneConsumer<TestMessage>) {
        OneToOneRingBuffer::with_default(capacity).unwrap().split()
    }

    fn publish(producer: &OneToOneProducer<TestMessage>, value: u64) -> usize {
        let mut slot = producer.claim().expect("buffer full");
        slot.value = value;
        let index = slot.index();
        slot.commit();
        index
    }

    fn drain(consumer: &mut OneToOneConsumer<TestMessage>) -> Vec<u64> {
        let mut values = Vec::new();
        consumer.read(|msg| values.push(msg.value));
        values
    }

    #[test]
    fn test_invalid_capacity() {
        assert!(OneToOneRingBuffer::<TestMessage>::with_default(7).is_err());
        assert!(OneToOneRingBuffer::<TestMessage>::with_default(0).is_err());
    }

    #[test]
    fn test_claim_until_full_every_capacity() {
        for shift in 0..=10 {
            let capacity = 1usize << shift;
            let (producer, mut consumer) = split(capacity);
            assert_eq!(producer.capacity(), capacity);

            for expected in 0..capacity {
                assert_eq!(publish(&producer, expected as u64), expected);
            }
            assert!(producer.claim().is_none(), "capacity {}", capacity);

            assert_eq!(consumer.read(|_| {}), capacity);
            assert_eq!(producer.claim().map(|c| c.index()), Some(0));
        }
    }

    #[test]
    fn test_claim_sequential_indices() {
        let (producer, _consumer) = split(4);
        let claims: Vec<_> = (0..3).map(|_| producer.claim().unwrap()).collect();
        let indices: Vec<usize> = claims.iter().map(|c| c.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(producer.len(), 3);
    }

    #[test]
    fn test_claim_without_commit_is_invisible() {
        let (producer, mut consumer) = split(4);
        let _pending = producer.claim().unwrap();

        assert_eq!(consumer.read(|_| {}), 0);
        assert!(!consumer.is_empty());
    }

    #[test]
    fn test_commit_out_of_order() {
        let (producer, mut consumer) = split(4);

        let first = producer.claim().unwrap();
        let second = producer.claim().unwrap();
        let third = producer.claim().unwrap();

        // Commit out of order: 1, 0, 2
        second.commit();
        assert_eq!(consumer.read(|_| {}), 0, "waiting for index 0");

        first.commit();
        assert_eq!(consumer.read(|_| {}), 2);

        third.commit();
        assert_eq!(consumer.read(|_| {}), 1);
    }

    #[test]
    fn test_commit_multiple_gaps() {
        let rb = OneToOneRingBuffer::<TestMessage>::with_default(8).unwrap();
        // SAFETY: test single-threaded, index hanya di-commit sekali
        unsafe {
            let indices: Vec<usize> = (0..5).map(|_| rb.try_claim().unwrap()).collect();

            // Commit in order: 2, 4, 1, 0, 3
            for (step, &i) in [2usize, 4, 1].iter().enumerate() {
                rb.commit(indices[i]);
                assert_eq!(rb.read(|_| {}), 0, "step {}", step);
            }

            rb.commit(indices[0]);
            assert_eq!(rb.read(|_| {}), 3);

            rb.commit(indices[3]);
            assert_eq!(rb.read(|_| {}), 2);
        }
    }

    #[test]
    fn test_read_with_limit() {
        let (producer, mut consumer) = split(8);
        for i in 0..6 {
            publish(&producer, i);
        }

        let mut values = Vec::new();
        assert_eq!(consumer.read_limit(|m| values.push(m.value), 4), 4);
        assert_eq!(values, vec![0, 1, 2, 3]);
        assert_eq!(drain(&mut consumer), vec![4, 5]);
    }

    #[test]
    fn test_wraparound() {
        let (producer, mut consumer) = split(4);

        // Fill and drain multiple times to test wraparound
        for round in 0..10u64 {
            for i in 0..4 {
                publish(&producer, round * 4 + i);
            }
            let expected: Vec<u64> = (0..4).map(|i| round * 4 + i).collect();
            assert_eq!(drain(&mut consumer), expected);
        }
    }

    #[test]
    fn test_out_of_order_commit_with_wraparound() {
        let (producer, mut consumer) = split(4);
        for i in 0..4 {
            publish(&producer, i);
        }
        assert_eq!(drain(&mut consumer).len(), 4);

        let mut a = producer.claim().unwrap();
        let mut b = producer.claim().unwrap();
        let mut c = producer.claim().unwrap();
        assert_eq!((a.index(), b.index(), c.index()), (0, 1, 2));
        a.value = 10;
        b.value = 11;
        c.value = 12;

        c.commit();
        assert!(drain(&mut consumer).is_empty());

        a.commit();
        assert_eq!(drain(&mut consumer), vec![10]);

        b.commit();
        assert_eq!(drain(&mut consumer), vec![11, 12]);
    }

    #[test]
    fn test_reset_discards_unread() {
        let (producer, mut consumer) = split(8);
        for i in 0..5 {
            publish(&producer, i);
        }
        assert_eq!(consumer.read_limit(|_| {}, 2), 2);

        let mut rb = consumer.reunite(producer).ok().unwrap();
        rb.reset();

        assert!(rb.is_empty());
        let (producer, mut consumer) = rb.split();
        assert_eq!(consumer.read(|_| {}), 0);
        assert_eq!(publish(&producer, 99), 0);
        assert_eq!(drain(&mut consumer), vec![99]);
    }

    #[test]
    fn test_single_capacity_buffer() {
        let (producer, mut consumer) = split(1);
        for i in 0..3 {
            assert_eq!(publish(&producer, i), 0);
            assert!(producer.claim().is_none());
            assert_eq!(drain(&mut consumer), vec![i]);
        }
    }

    #[test]
    fn test_producer_moves_to_another_thread() {
        let (producer, mut consumer) = split(64);

        let handle = std::thread::spawn(move || {
            for i in 0..32 {
                publish(&producer, i);
            }
        });
        handle.join().unwrap();

        assert_eq!(drain(&mut consumer), (0..32).collect::<Vec<_>>());
    }
}
