//! Lifecycle AgentRunner dari sisi API publik
//!
//! Usage:
//!   cargo test --test runner_lifecycle -- --nocapture

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use conduit::concurrent::{
    Agent, AgentRunner, CountedErrorHandler, ErrorHandler, LoggingErrorHandler, ThreadBinding,
};
use conduit::core::{ManyToOneConsumer, ManyToOneRingBuffer, RingBuffer};
use conduit::error::AgentError;

/// Agent yang selalu melaporkan kerja, atau selalu gagal.
#[derive(Default)]
struct Busy {
    failing: bool,
    starts: AtomicUsize,
    works: AtomicUsize,
    closes: AtomicUsize,
}

impl Agent for Busy {
    fn on_start(&self) -> Result<(), AgentError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn do_work(&self) -> Result<usize, AgentError> {
        self.works.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(AgentError::Message("feed disconnected".to_string()));
        }
        Ok(1)
    }

    fn on_close(&self) -> Result<(), AgentError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[test]
fn test_concurrent_close_calls_on_close_once() {
    let runner = Arc::new(AgentRunner::new(Busy::default(), LoggingErrorHandler));
    let worker = AgentRunner::start_on_thread(&runner).unwrap();
    assert_eq!(worker.name(), Some("Busy"));

    thread::sleep(Duration::from_millis(100));
    assert!(runner.is_running());

    const CLOSERS: usize = 8;
    let barrier = Arc::new(Barrier::new(CLOSERS));
    let closers: Vec<_> = (0..CLOSERS)
        .map(|_| {
            let runner = Arc::clone(&runner);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                // Hanya satu yang menunggu worker, sisanya no-op
                runner.close();
            })
        })
        .collect();

    for closer in closers {
        closer.join().unwrap();
    }
    worker.join().unwrap();
    assert!(runner.is_closed());

    let agent = runner.agent();
    assert_eq!(agent.starts.load(Ordering::SeqCst), 1);
    assert_eq!(agent.closes.load(Ordering::SeqCst), 1);
    assert!(agent.works.load(Ordering::SeqCst) > 0);
    assert!(matches!(runner.binding(), ThreadBinding::Closed));
}

#[test]
fn test_failures_counted_until_cancel() {
    let agent = Busy {
        failing: true,
        ..Busy::default()
    };
    let handler = CountedErrorHandler::new(LoggingErrorHandler);
    let faults = handler.counter();
    let runner = Arc::new(AgentRunner::new(agent, handler));
    let worker = AgentRunner::start_on_thread(&runner).unwrap();

    assert!(wait_until(|| faults.get() >= 100));
    assert!(!runner.is_closed());
    assert!(!worker.is_finished());

    worker.cancel();
    assert!(wait_until(|| runner.is_closed()));
    worker.join().unwrap();

    assert_eq!(
        faults.get(),
        runner.agent().works.load(Ordering::SeqCst) as u64
    );
    assert_eq!(runner.agent().closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_close_before_run_never_starts() {
    let runner = Arc::new(AgentRunner::new(Busy::default(), |_: &AgentError| {}));
    runner.close();
    assert!(runner.is_closed());

    let worker = AgentRunner::start_on_thread(&runner).unwrap();
    worker.join().unwrap();

    let agent = runner.agent();
    assert_eq!(agent.starts.load(Ordering::SeqCst), 0);
    assert_eq!(agent.works.load(Ordering::SeqCst), 0);
    assert_eq!(agent.closes.load(Ordering::SeqCst), 1);
}

/// Consumer agent yang drain ManyToOne buffer.
struct Drain {
    consumer: Mutex<ManyToOneConsumer<u64>>,
    total: AtomicUsize,
}

impl Agent for Drain {
    fn do_work(&self) -> Result<usize, AgentError> {
        let read = self.consumer.lock().unwrap().read(|_| {});
        self.total.fetch_add(read, Ordering::SeqCst);
        Ok(read)
    }

    fn role_name(&self) -> String {
        "drain".to_string()
    }
}

#[test]
fn test_runner_drains_producers() {
    const PRODUCERS: usize = 3;
    const PER_PRODUCER: usize = 10_000;

    let (producer, consumer) = ManyToOneRingBuffer::<u64>::with_default(256)
        .unwrap()
        .split();
    let runner = Arc::new(AgentRunner::new(
        Drain {
            consumer: Mutex::new(consumer),
            total: AtomicUsize::new(0),
        },
        LoggingErrorHandler,
    ));
    let worker = AgentRunner::start_on_thread(&runner).unwrap();
    assert_eq!(worker.name(), Some("drain"));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let producer = producer.clone();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    loop {
                        if let Some(mut slot) = producer.claim() {
                            *slot = (p * PER_PRODUCER + i) as u64;
                            slot.commit();
                            break;
                        }
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    for handle in producers {
        handle.join().unwrap();
    }

    let total = PRODUCERS * PER_PRODUCER;
    assert!(wait_until(|| runner.agent().total.load(Ordering::SeqCst) == total));

    // Cancel dengan buffer kosong: loop berhenti sendiri
    worker.cancel();
    worker.join().unwrap();
    assert!(runner.is_closed());
    assert!(producer.is_empty());
}

#[test]
fn test_closure_error_handler() {
    let seen = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&seen);
    let handler = move |err: &AgentError| {
        assert!(!err.is_cancelled());
        sink.fetch_add(1, Ordering::SeqCst);
    };
    handler.on_error(&AgentError::Message("direct".to_string()));
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    let agent = Busy {
        failing: true,
        ..Busy::default()
    };
    let runner = Arc::new(AgentRunner::new(agent, handler));
    let worker = AgentRunner::start_on_thread(&runner).unwrap();
    assert!(wait_until(|| seen.load(Ordering::SeqCst) > 10));

    runner.close();
    worker.join().unwrap();
    assert!(runner.is_closed());
}
