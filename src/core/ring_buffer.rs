//! Kontrak bersama ring buffer: claim -> tulis -> commit -> read
//!
//! Producer melakukan claim atas slot, mengisi payload di tempat, lalu
//! commit. Consumer hanya melihat slot yang sudah di-commit, dan tidak pernah
//! melompati gap: slot yang lebih baru tetap tersembunyi sampai semua slot
//! sebelumnya ikut di-commit.
//!
//! API mentah di trait [`RingBuffer`] bersifat `unsafe` karena disiplin
//! producer/consumer tidak bisa dicek oleh buffer sendiri. Jalur aman adalah
//! [`RingBuffer::split`]: [`Producer`] dan [`Consumer`] membawa disiplin itu
//! di type system.

use std::cell::Cell;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::Arc;

/// Komponen yang bisa dikembalikan ke state awal tanpa alokasi ulang.
pub trait Resettable {
    /// Kembalikan ke state awal.
    fn reset(&mut self);
}

/// Ring buffer dengan slot pre-allocated dan protokol claim/commit/read.
///
/// Buffer penuh ditandai dengan `None` dari [`try_claim`](Self::try_claim),
/// bukan error, karena producer diharapkan retry dengan frekuensi tinggi.
pub trait RingBuffer<T>: Resettable + Send + Sync {
    /// Jumlah slot.
    fn capacity(&self) -> usize;

    /// Claim satu slot. `None` jika buffer penuh. Tidak pernah blocking.
    ///
    /// # Safety
    /// Buffer single-producer: hanya satu thread yang boleh claim pada satu
    /// waktu. Buffer yang mengimplementasikan [`MultiProducer`] aman
    /// dipanggil dari thread mana pun.
    unsafe fn try_claim(&self) -> Option<usize>;

    /// Slot pada `index` untuk diisi sebelum commit.
    ///
    /// # Safety
    /// `index` harus berasal dari `try_claim` milik caller dan belum
    /// di-commit. Tidak boleh ada referensi lain ke slot yang sama.
    #[allow(clippy::mut_from_ref)]
    unsafe fn index_at(&self, index: usize) -> &mut T;

    /// Publish slot yang sudah diisi ke consumer.
    ///
    /// # Safety
    /// `index` harus berasal dari `try_claim` milik caller, belum di-commit,
    /// dan semua referensi dari `index_at` untuk slot ini sudah tidak dipakai.
    unsafe fn commit(&self, index: usize);

    /// Baca maksimal `limit` pesan yang berurutan dan sudah terlihat.
    /// Mengembalikan jumlah pesan yang diberikan ke `consumer`.
    ///
    /// # Safety
    /// Hanya satu thread yang boleh membaca pada satu waktu, dan `consumer`
    /// tidak boleh memanggil read lagi pada buffer yang sama.
    unsafe fn read_limit<F>(&self, consumer: F, limit: usize) -> usize
    where
        F: FnMut(&T);

    /// Baca semua pesan yang saat ini terlihat.
    ///
    /// # Safety
    /// Sama dengan [`read_limit`](Self::read_limit).
    #[inline]
    unsafe fn read<F>(&self, consumer: F) -> usize
    where
        F: FnMut(&T),
    {
        self.read_limit(consumer, usize::MAX)
    }

    /// Jumlah slot yang sudah di-claim tapi belum dikonsumsi (snapshot).
    fn len(&self) -> usize;

    /// `true` jika tidak ada slot yang di-claim.
    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pecah buffer menjadi handle producer dan consumer.
    fn split(self) -> (Producer<T, Self>, Consumer<T, Self>)
    where
        Self: Sized,
    {
        let shared = Arc::new(self);
        (
            Producer {
                buffer: Arc::clone(&shared),
                _marker: PhantomData,
            },
            Consumer {
                buffer: shared,
                _marker: PhantomData,
            },
        )
    }
}

/// Buffer yang `try_claim`-nya aman dipanggil bersamaan dari banyak thread.
///
/// # Safety
/// Implementor menjamin dua `try_claim` konkuren tidak pernah mengembalikan
/// index yang sama.
pub unsafe trait MultiProducer {}

/// Sisi producer dari buffer yang sudah di-[`split`](RingBuffer::split).
///
/// Untuk buffer single-producer handle ini `Send` tapi tidak `Sync` dan
/// tidak `Clone`, jadi claim hanya bisa terjadi dari satu thread:
///
/// ```compile_fail
/// use conduit::core::{OneToOneRingBuffer, RingBuffer};
///
/// fn shared<S: Sync>(_: &S) {}
///
/// let (producer, _consumer) = OneToOneRingBuffer::<u64>::with_default(4).unwrap().split();
/// shared(&producer);
/// ```
///
/// ```compile_fail
/// use conduit::core::{OneToOneRingBuffer, RingBuffer};
///
/// let (producer, _consumer) = OneToOneRingBuffer::<u64>::with_default(4).unwrap().split();
/// let _second = producer.clone();
/// ```
///
/// Buffer [`MultiProducer`] memberi handle yang `Sync` dan `Clone`.
pub struct Producer<T, R: RingBuffer<T>> {
    buffer: Arc<R>,
    // Cell: tidak Sync kecuali R: MultiProducer (impl di bawah)
    _marker: PhantomData<(fn(T) -> T, Cell<()>)>,
}

// SAFETY: claim di buffer MultiProducer tidak pernah memberi index ganda,
// jadi &Producer boleh dipakai dari banyak thread
unsafe impl<T, R: RingBuffer<T> + MultiProducer> Sync for Producer<T, R> {}

impl<T, R: RingBuffer<T> + MultiProducer> Clone for Producer<T, R> {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
            _marker: PhantomData,
        }
    }
}

impl<T, R: RingBuffer<T>> Producer<T, R> {
    /// Claim satu slot. `None` jika buffer penuh.
    ///
    /// Beberapa claim boleh aktif bersamaan dan di-commit dengan urutan bebas.
    #[inline]
    pub fn claim(&self) -> Option<Claim<'_, T, R>> {
        // SAFETY: handle single-producer tidak Sync dan tidak Clone, jadi
        // hanya thread pemilik yang sampai di sini; buffer MultiProducer aman
        // dari thread mana pun
        let index = unsafe { self.buffer.try_claim() }?;
        // SAFETY: index baru saja di-claim, belum ada referensi lain ke slot
        let slot = NonNull::from(unsafe { self.buffer.index_at(index) });
        Some(Claim {
            buffer: &*self.buffer,
            index,
            slot,
        })
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Sisi consumer dari buffer yang sudah di-[`split`](RingBuffer::split).
///
/// Hanya ada satu per buffer. `read` meminta `&mut self`, jadi dua read
/// tidak pernah berjalan bersamaan atau bersarang:
///
/// ```compile_fail
/// use conduit::core::{ManyToOneRingBuffer, RingBuffer};
///
/// let (_producer, consumer) = ManyToOneRingBuffer::<u64>::with_default(4).unwrap().split();
/// consumer.read(|_| {});
/// ```
pub struct Consumer<T, R: RingBuffer<T>> {
    buffer: Arc<R>,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T, R: RingBuffer<T>> Consumer<T, R> {
    /// Baca maksimal `limit` pesan yang sudah terlihat, berurutan.
    #[inline]
    pub fn read_limit<F>(&mut self, consumer: F, limit: usize) -> usize
    where
        F: FnMut(&T),
    {
        // SAFETY: Consumer unik per buffer dan `&mut self` mencegah read
        // bersarang dari dalam `consumer`
        unsafe { self.buffer.read_limit(consumer, limit) }
    }

    /// Baca semua pesan yang saat ini terlihat.
    #[inline]
    pub fn read<F>(&mut self, consumer: F) -> usize
    where
        F: FnMut(&T),
    {
        self.read_limit(consumer, usize::MAX)
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Gabungkan kembali dengan producer, misalnya untuk `reset`.
    ///
    /// Gagal jika `producer` milik buffer lain atau masih ada clone
    /// producer yang hidup; consumer dikembalikan utuh.
    pub fn reunite(self, producer: Producer<T, R>) -> Result<R, Self> {
        if !Arc::ptr_eq(&self.buffer, &producer.buffer) {
            return Err(self);
        }
        drop(producer);
        Arc::try_unwrap(self.buffer).map_err(|buffer| Self {
            buffer,
            _marker: PhantomData,
        })
    }
}

/// Slot yang sedang di-claim oleh producer.
///
/// Guard yang di-drop tanpa `commit` meninggalkan slot dalam keadaan
/// claimed, dan consumer akan berhenti di slot itu.
#[must_use = "a claimed slot stays invisible to the consumer until committed"]
pub struct Claim<'a, T, R: RingBuffer<T>> {
    buffer: &'a R,
    index: usize,
    slot: NonNull<T>,
}

impl<'a, T, R: RingBuffer<T>> Claim<'a, T, R> {
    /// Index slot yang di-claim.
    #[inline(always)]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Publish slot ke consumer.
    #[inline(always)]
    pub fn commit(self) {
        // SAFETY: guard memegang claim eksklusif atas index ini, dan
        // `self` dikonsumsi sehingga tidak ada borrow slot yang tersisa
        unsafe { self.buffer.commit(self.index) }
    }
}

impl<T, R: RingBuffer<T>> Deref for Claim<'_, T, R> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        // SAFETY: slot ini milik guard sampai commit
        unsafe { self.slot.as_ref() }
    }
}

impl<T, R: RingBuffer<T>> DerefMut for Claim<'_, T, R> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: slot ini milik guard sampai commit, `&mut self` eksklusif
        unsafe { self.slot.as_mut() }
    }
}
