//! AgentRunner - satu Agent, satu thread, lifecycle seragam
//!
//! State: UNSTARTED -> RUNNING -> STOPPING -> CLOSED. Jika `close()`
//! dipanggil sebelum `run()`, runner langsung CLOSED tanpa pernah jalan.
//!
//! Kebijakan fault: error dari `do_work` dilaporkan ke [`ErrorHandler`] dan
//! loop tetap jalan. Hanya pembatalan (lewat [`AgentRunner::cancel`] atau
//! `Err(AgentError::Cancelled)`) atau `close()` yang menghentikan loop.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};
use std::thread::{self, JoinHandle, Thread};

use tracing::{debug, warn};

use super::affinity;
use super::agent::Agent;
use super::error_handler::ErrorHandler;
use crate::error::AgentError;

const UNBOUND: u8 = 0;
const BOUND: u8 = 1;
const TOMBSTONE: u8 = 2;

/// Status binding thread sebuah runner.
#[derive(Debug, Clone)]
pub enum ThreadBinding {
    /// Belum pernah `run()`.
    Unbound,
    /// Sedang (atau pernah) dijalankan oleh thread ini.
    Bound(Thread),
    /// Sudah `close()`, tidak akan pernah jalan lagi.
    Closed,
}

/// Cell binding: tag atomic + handle thread yang di-set sekali.
struct BindingCell {
    state: AtomicU8,
    thread: OnceLock<Thread>,
}

impl BindingCell {
    const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNBOUND),
            thread: OnceLock::new(),
        }
    }

    /// CAS dari UNBOUND. Hanya satu thread yang pernah menang.
    fn bind(&self, thread: Thread) -> bool {
        if self
            .state
            .compare_exchange(UNBOUND, BOUND, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let _ = self.thread.set(thread);
        true
    }

    /// Tukar ke tombstone, kembalikan tag sebelumnya.
    fn tombstone(&self) -> u8 {
        self.state.swap(TOMBSTONE, Ordering::AcqRel)
    }

    fn is_current_thread(&self) -> bool {
        self.thread
            .get()
            .is_some_and(|bound| bound.id() == thread::current().id())
    }

    /// Handle thread untuk tag BOUND. Pemenang CAS men-set handle tepat
    /// sesudahnya, jadi pembaca yang jatuh di antara keduanya cukup menunggu.
    fn bound_thread(&self) -> Thread {
        loop {
            if let Some(bound) = self.thread.get() {
                return bound.clone();
            }
            thread::yield_now();
        }
    }

    fn snapshot(&self) -> ThreadBinding {
        match self.state.load(Ordering::Acquire) {
            BOUND => ThreadBinding::Bound(self.bound_thread()),
            TOMBSTONE => ThreadBinding::Closed,
            _ => ThreadBinding::Unbound,
        }
    }
}

/// Latch untuk `close()` yang menunggu worker selesai.
struct Termination {
    done: Mutex<bool>,
    signal: Condvar,
}

impl Termination {
    const fn new() -> Self {
        Self {
            done: Mutex::new(false),
            signal: Condvar::new(),
        }
    }

    fn complete(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        *done = true;
        self.signal.notify_all();
    }

    fn wait(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        while !*done {
            done = self
                .signal
                .wait(done)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Konfigurasi thread worker untuk [`AgentRunner::start_on_thread_with`].
#[derive(Debug, Clone, Default)]
pub struct ThreadConfig {
    /// Nama thread. Default: `Agent::role_name()`.
    pub name: Option<String>,
    /// Ukuran stack. Default: default platform.
    pub stack_size: Option<usize>,
    /// Core CPU tujuan pinning (Linux). Gagal pin hanya di-log.
    pub cpu_core: Option<usize>,
}

impl ThreadConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    pub fn pinned_to(mut self, core: usize) -> Self {
        self.cpu_core = Some(core);
        self
    }
}

/// Menjalankan satu [`Agent`] di satu thread dengan supervisi.
pub struct AgentRunner<A: Agent> {
    agent: A,
    role: String,
    error_handler: Box<dyn ErrorHandler>,
    running: AtomicBool,
    closed: AtomicBool,
    cancelled: AtomicBool,
    binding: BindingCell,
    termination: Termination,
}

/// Tandai runner closed walaupun terjadi panic di tengah jalan.
struct CloseOnDrop<'a, A: Agent>(&'a AgentRunner<A>);

impl<A: Agent> Drop for CloseOnDrop<'_, A> {
    fn drop(&mut self) {
        self.0.closed.store(true, Ordering::Release);
        self.0.termination.complete();
    }
}

impl<A: Agent> AgentRunner<A> {
    pub fn new(agent: A, error_handler: impl ErrorHandler + 'static) -> Self {
        let role = agent.role_name();
        Self {
            agent,
            role,
            error_handler: Box::new(error_handler),
            running: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            binding: BindingCell::new(),
            termination: Termination::new(),
        }
    }

    /// Spawn thread bernama `role_name()` yang menjalankan [`run`](Self::run).
    pub fn start_on_thread(runner: &Arc<Self>) -> io::Result<AgentThread<A>> {
        Self::start_on_thread_with(runner, ThreadConfig::default())
    }

    /// Seperti [`start_on_thread`](Self::start_on_thread) dengan nama, stack
    /// size dan CPU pinning dari `config`.
    pub fn start_on_thread_with(
        runner: &Arc<Self>,
        config: ThreadConfig,
    ) -> io::Result<AgentThread<A>> {
        let name = config.name.unwrap_or_else(|| runner.role.clone());
        let mut builder = thread::Builder::new().name(name);
        if let Some(bytes) = config.stack_size {
            builder = builder.stack_size(bytes);
        }

        let worker = Arc::clone(runner);
        let core = config.cpu_core;
        let handle = builder.spawn(move || {
            if let Some(core) = core {
                if let Err(err) = affinity::pin_current_thread(core) {
                    warn!(role = %worker.role, core, error = %err, "failed to pin agent thread");
                }
            }
            worker.run();
        })?;

        Ok(AgentThread {
            handle,
            runner: Arc::clone(runner),
        })
    }

    /// Jalankan agent di thread pemanggil sampai berhenti.
    ///
    /// No-op jika runner sudah pernah di-bind ke thread lain atau sudah
    /// di-close.
    pub fn run(&self) {
        if !self.binding.bind(thread::current()) {
            debug!(role = %self.role, "runner already bound or closed, ignoring run");
            return;
        }

        let _closed = CloseOnDrop(self);
        debug!(role = %self.role, "agent starting");

        if let Err(err) = self.invoke(|agent| agent.on_start()) {
            self.handle_error(&err);
            self.running.store(false, Ordering::Release);
        }

        self.work_loop();

        if let Err(err) = self.invoke(|agent| agent.on_close()) {
            self.handle_error(&err);
        }
        debug!(role = %self.role, "agent closed");
    }

    fn work_loop(&self) {
        while self.running.load(Ordering::Acquire) {
            self.do_work();
        }
    }

    #[inline]
    fn do_work(&self) {
        match self.invoke(|agent| agent.do_work()) {
            Ok(work_count) => {
                // Stop graceful hanya setelah kerja yang tersisa habis
                if work_count == 0 && self.is_cancelled() {
                    self.running.store(false, Ordering::Release);
                }
            }
            Err(AgentError::Cancelled) => {
                self.running.store(false, Ordering::Release);
                self.cancelled.store(true, Ordering::Release);
            }
            Err(err) => {
                self.handle_error(&err);
                if self.is_cancelled() {
                    self.running.store(false, Ordering::Release);
                }
            }
        }
    }

    /// Panggil callback agent, panic dikonversi jadi `AgentError::Panicked`.
    #[inline]
    fn invoke<R>(&self, f: impl FnOnce(&A) -> Result<R, AgentError>) -> Result<R, AgentError> {
        match panic::catch_unwind(AssertUnwindSafe(|| f(&self.agent))) {
            Ok(result) => result,
            Err(payload) => Err(AgentError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    fn handle_error(&self, err: &AgentError) {
        self.error_handler.on_error(err);
    }

    /// Hentikan runner dan tunggu sampai closed.
    ///
    /// - Belum pernah `run()`: `on_close` dipanggil di thread ini.
    /// - Sedang jalan di thread lain: blocking sampai thread itu selesai.
    /// - Sudah di-close: no-op.
    ///
    /// Idempotent, `on_close` hanya pernah dipanggil sekali.
    pub fn close(&self) {
        self.running.store(false, Ordering::Release);

        match self.binding.tombstone() {
            UNBOUND => {
                let _closed = CloseOnDrop(self);
                debug!(role = %self.role, "closing runner that never started");
                if let Err(err) = self.invoke(|agent| agent.on_close()) {
                    self.handle_error(&err);
                }
            }
            BOUND => {
                // closed di-set oleh worker; close dari worker sendiri tidak
                // boleh menunggu dirinya
                if self.is_closed() || self.binding.is_current_thread() {
                    return;
                }
                if let Some(worker) = self.binding.thread.get() {
                    worker.unpark();
                }
                self.termination.wait();
            }
            _ => {}
        }
    }

    /// Sinyal pembatalan independen (padanan interrupt thread).
    ///
    /// Loop berhenti setelah `do_work` berikutnya mengembalikan 0 atau
    /// error.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(worker) = self.binding.thread.get() {
            worker.unpark();
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.is_closed()
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn role_name(&self) -> &str {
        &self.role
    }

    /// Thread yang pernah di-bind ke runner ini, jika ada.
    pub fn thread(&self) -> Option<Thread> {
        match self.binding.snapshot() {
            ThreadBinding::Bound(bound) => Some(bound),
            _ => self.binding.thread.get().cloned(),
        }
    }

    pub fn binding(&self) -> ThreadBinding {
        self.binding.snapshot()
    }
}

impl<A: Agent> Drop for AgentRunner<A> {
    fn drop(&mut self) {
        self.close();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle thread yang dibuat oleh [`AgentRunner::start_on_thread`].
pub struct AgentThread<A: Agent> {
    handle: JoinHandle<()>,
    runner: Arc<AgentRunner<A>>,
}

impl<A: Agent> AgentThread<A> {
    pub fn thread(&self) -> &Thread {
        self.handle.thread()
    }

    pub fn name(&self) -> Option<&str> {
        self.handle.thread().name()
    }

    pub fn runner(&self) -> &Arc<AgentRunner<A>> {
        &self.runner
    }

    /// Lihat [`AgentRunner::cancel`].
    pub fn cancel(&self) {
        self.runner.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Tunggu thread selesai. `Err` hanya jika error handler sendiri panic.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}
