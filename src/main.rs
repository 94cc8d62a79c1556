//! Conduit Bench - benchmark ring buffer dan pipeline agent
//!
//! Usage:
//!   cargo run --release --bin conduit_bench -- [OPTIONS]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use conduit::concurrent::{
    Agent, AgentRunner, BackoffIdle, CountedErrorHandler, IdleStrategy, LoggingErrorHandler,
    ThreadConfig,
};
use conduit::core::{ManyToOneConsumer, ManyToOneRingBuffer, OneToOneRingBuffer, RingBuffer};
use conduit::error::AgentError;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Benchmark configuration
struct BenchConfig {
    iterations: usize,
    capacity: usize,
    producers: usize,
    pin: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            iterations: 1_000_000,
            capacity: 65536,
            producers: 4,
            pin: false,
        }
    }
}

/// Pesan fixed-shape yang dipakai ulang di setiap slot
#[derive(Default, Clone, Copy)]
struct Tick {
    producer: u32,
    sequence: u64,
    price: i64,
}

/// Consumer agent: drain MPSC buffer dan hitung checksum
///
/// Mutex hanya dipegang thread worker, jadi tidak pernah contended.
struct TickConsumer {
    consumer: Mutex<ManyToOneConsumer<Tick>>,
    consumed: AtomicU64,
    checksum: AtomicU64,
}

impl Agent for TickConsumer {
    fn on_start(&self) -> Result<(), AgentError> {
        let consumer = self.consumer.lock().unwrap_or_else(PoisonError::into_inner);
        info!(capacity = consumer.capacity(), "tick consumer started");
        Ok(())
    }

    fn do_work(&self) -> Result<usize, AgentError> {
        let mut consumer = self.consumer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut sum = 0u64;
        let read = consumer.read_limit(
            |tick| {
                sum = sum
                    .wrapping_add(tick.sequence)
                    .wrapping_add(tick.price as u64)
                    .wrapping_add(tick.producer as u64);
            },
            1024,
        );
        if read > 0 {
            self.consumed.fetch_add(read as u64, Ordering::Release);
            self.checksum.fetch_add(sum, Ordering::Relaxed);
        }
        Ok(read)
    }

    fn on_close(&self) -> Result<(), AgentError> {
        info!(
            consumed = self.consumed.load(Ordering::Acquire),
            "tick consumer closed"
        );
        Ok(())
    }

    fn role_name(&self) -> String {
        "tick-consumer".to_string()
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("conduit=info")),
        )
        .init();

    let config = parse_args();

    println!("🚀 Conduit - Lock-Free Transport Benchmarks");
    println!("===========================================\n");

    benchmark_one_to_one(&config);
    benchmark_many_to_one(&config);

    if let Err(e) = benchmark_pipeline(&config) {
        eprintln!("❌ Pipeline benchmark failed: {}", e);
        std::process::exit(1);
    }

    println!("\n✅ All benchmarks complete!");
}

fn benchmark_one_to_one(config: &BenchConfig) {
    println!("📊 OneToOne Ring Buffer (Lock-Free SPSC)");
    println!("----------------------------------------");

    let rb = match OneToOneRingBuffer::<Tick>::with_default(config.capacity) {
        Ok(rb) => rb,
        Err(e) => {
            eprintln!("  Skipped: {}\n", e);
            return;
        }
    };
    let (producer, mut consumer) = rb.split();

    let start = Instant::now();
    let mut checksum = 0u64;
    for i in 0..config.iterations {
        loop {
            if let Some(mut slot) = producer.claim() {
                slot.sequence = i as u64;
                slot.commit();
                break;
            }
            // Penuh: drain dulu lalu claim ulang
            consumer.read(|t| checksum = checksum.wrapping_add(t.sequence));
        }
    }
    consumer.read(|t| checksum = checksum.wrapping_add(t.sequence));
    let duration = start.elapsed();

    print_latency("Claim+commit+read", config.iterations, duration);
    println!("  Checksum:     {}\n", checksum);
}

fn benchmark_many_to_one(config: &BenchConfig) {
    println!("📊 ManyToOne Ring Buffer (Lock-Free MPSC, single thread)");
    println!("--------------------------------------------------------");

    let rb = match ManyToOneRingBuffer::<Tick>::with_default(config.capacity) {
        Ok(rb) => rb,
        Err(e) => {
            eprintln!("  Skipped: {}\n", e);
            return;
        }
    };
    let (producer, mut consumer) = rb.split();

    let start = Instant::now();
    for i in 0..config.iterations {
        loop {
            if let Some(mut slot) = producer.claim() {
                slot.sequence = i as u64;
                slot.commit();
                break;
            }
            consumer.read(|_| {});
        }
    }
    consumer.read(|_| {});
    let duration = start.elapsed();

    print_latency("CAS claim+commit", config.iterations, duration);
    println!();
}

/// N producer thread -> MPSC -> consumer agent di thread sendiri
fn benchmark_pipeline(config: &BenchConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "📊 Pipeline: {} producers -> ManyToOne -> AgentRunner",
        config.producers
    );
    println!("----------------------------------------------------");

    let (producer, consumer) = ManyToOneRingBuffer::<Tick>::with_default(config.capacity)?.split();
    let handler = CountedErrorHandler::new(LoggingErrorHandler);
    let faults = handler.counter();

    let runner = Arc::new(AgentRunner::new(
        TickConsumer {
            consumer: Mutex::new(consumer),
            consumed: AtomicU64::new(0),
            checksum: AtomicU64::new(0),
        },
        handler,
    ));

    let mut thread_config = ThreadConfig::default();
    if config.pin {
        thread_config = thread_config.pinned_to(0);
    }
    let consumer = AgentRunner::start_on_thread_with(&runner, thread_config)?;

    let per_producer = config.iterations / config.producers.max(1);
    let total = (per_producer * config.producers) as u64;
    let start = Instant::now();

    let producers: Vec<_> = (0..config.producers)
        .map(|p| {
            let producer = producer.clone();
            thread::Builder::new()
                .name(format!("producer-{}", p))
                .spawn(move || {
                    let mut idle = BackoffIdle::default();
                    for i in 0..per_producer {
                        loop {
                            if let Some(mut slot) = producer.claim() {
                                slot.producer = p as u32;
                                slot.sequence = i as u64;
                                slot.price = 10_000 + (i % 50) as i64;
                                slot.commit();
                                idle.reset();
                                break;
                            }
                            idle.idle(0);
                        }
                    }
                })
        })
        .collect::<Result<_, _>>()?;

    for producer in producers {
        producer.join().map_err(|_| "producer thread panicked")?;
    }

    let deadline = Instant::now() + Duration::from_secs(30);
    while runner.agent().consumed.load(Ordering::Acquire) < total && Instant::now() < deadline {
        thread::yield_now();
    }
    let duration = start.elapsed();

    runner.close();
    consumer.join().map_err(|_| "consumer thread panicked")?;

    let consumed = runner.agent().consumed.load(Ordering::Acquire);
    println!("  Produced:     {}", total);
    println!("  Consumed:     {}", consumed);
    println!("  Faults:       {}", faults.get());
    println!(
        "  Checksum:     {}",
        runner.agent().checksum.load(Ordering::Relaxed)
    );
    println!(
        "  Throughput:   {:.2} M msgs/sec",
        consumed as f64 / duration.as_secs_f64() / 1_000_000.0
    );

    if consumed != total {
        return Err(format!("lost messages: {} of {}", total - consumed, total).into());
    }
    Ok(())
}

fn print_latency(label: &str, iterations: usize, duration: Duration) {
    let ns = duration.as_nanos() as f64 / iterations as f64;
    println!("  Operations:   {}", iterations);
    println!("  {}: {:.2} ns/op ({:.3} μs/op)", label, ns, ns / 1000.0);
    println!(
        "  Throughput:   {:.2} M ops/sec",
        iterations as f64 / duration.as_secs_f64() / 1_000_000.0
    );
}

fn parse_args() -> BenchConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = BenchConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--iterations" | "-n" => {
                if i + 1 < args.len() {
                    config.iterations = args[i + 1].parse().unwrap_or(config.iterations);
                    i += 1;
                }
            }
            "--capacity" | "-c" => {
                if i + 1 < args.len() {
                    config.capacity = args[i + 1].parse().unwrap_or(config.capacity);
                    i += 1;
                }
            }
            "--producers" | "-p" => {
                if i + 1 < args.len() {
                    config.producers = args[i + 1].parse().unwrap_or(config.producers);
                    i += 1;
                }
            }
            "--pin" => {
                config.pin = true;
            }
            "--help" | "-h" => {
                println!("Conduit Bench - lock-free ring buffer benchmarks\n");
                println!("Usage: conduit_bench [OPTIONS]\n");
                println!("Options:");
                println!("  -n, --iterations <N>  Messages per benchmark (default: 1000000)");
                println!("  -c, --capacity <N>    Ring capacity, power of 2 (default: 65536)");
                println!("  -p, --producers <N>   Producer threads for pipeline (default: 4)");
                println!("      --pin             Pin consumer agent to core 0");
                println!("  -h, --help            Show this help");
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    config
}
