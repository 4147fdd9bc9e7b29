//! Queue dispatcher: one background worker delivering records to sinks
//!
//! Producers call [`QueueDispatcher::enqueue`] from any thread. A single
//! drain worker owns the sinks and forwards every record to each of them in
//! registration order. Sink failures and panics are reported on stderr and
//! never reach the producer.

use super::error::{LogError, Result};
use super::log_record::LogRecord;
use super::metrics::DispatcherMetrics;
use crate::sinks::Sink;
use crossbeam_channel::{bounded, select, unbounded, Receiver, SendTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Name of the drain worker thread
pub const WORKER_THREAD_NAME: &str = "axum-structlog-drain";

/// Default queue capacity
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Default time allowed for draining on stop
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Extra time the worker gets to finish its last write after the drain deadline
const JOIN_GRACE: Duration = Duration::from_millis(500);

/// How often a blocked producer re-checks whether the dispatcher is closing
const BLOCK_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueCapacity {
    Bounded(usize),
    Unbounded,
}

impl Default for QueueCapacity {
    fn default() -> Self {
        QueueCapacity::Bounded(DEFAULT_CAPACITY)
    }
}

/// What a producer does when a bounded queue is full
///
/// Records are never dropped silently: `Block` waits for the worker to make
/// room, `BlockWithTimeout` waits at most the given duration and then
/// rejects the record with an alert on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    #[default]
    Block,
    BlockWithTimeout(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub capacity: QueueCapacity,
    pub overflow: OverflowPolicy,
    pub drain_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: QueueCapacity::default(),
            overflow: OverflowPolicy::default(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl QueueConfig {
    #[must_use = "builder methods return a new value"]
    pub fn capacity(mut self, capacity: QueueCapacity) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Stopped,
    Running,
    Stopping,
}

/// Outcome of [`QueueDispatcher::stop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    /// Records delivered between the stop request and worker exit
    pub delivered: u64,
    /// Records still queued when draining ended
    pub discarded: u64,
    /// Whether the worker missed the drain deadline
    pub timed_out: bool,
}

enum Message {
    Record(Arc<LogRecord>),
    Purge {
        ttl_days: u32,
        reply: Sender<Result<u64>>,
    },
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Write `record` to every sink, isolating failures per sink
///
/// The record counts as delivered when at least one sink accepted it and
/// as failed when every sink refused it.
pub(crate) fn deliver(sinks: &mut [Sink], record: &LogRecord, metrics: &DispatcherMetrics) -> bool {
    let mut failures = 0;
    for sink in sinks.iter_mut() {
        let name = sink.name();
        match catch_unwind(AssertUnwindSafe(|| sink.write(record))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                eprintln!("[LOGGER ERROR] Sink '{}' failed: {}", name, e);
                metrics.record_sink_failure();
                failures += 1;
            }
            Err(panic) => {
                eprintln!(
                    "[LOGGER CRITICAL] Sink '{}' panicked: {}. Other sinks continue to function.",
                    name,
                    panic_message(panic.as_ref())
                );
                metrics.record_sink_failure();
                failures += 1;
            }
        }
    }
    let delivered = sinks.is_empty() || failures < sinks.len();
    if delivered {
        metrics.record_delivered();
    } else {
        metrics.record_failed();
    }
    delivered
}

pub(crate) fn flush_all(sinks: &mut [Sink]) {
    for sink in sinks.iter_mut() {
        let name = sink.name();
        match catch_unwind(AssertUnwindSafe(|| sink.flush())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => eprintln!("[LOGGER ERROR] Sink '{}' flush failed: {}", name, e),
            Err(panic) => eprintln!(
                "[LOGGER CRITICAL] Sink '{}' panicked during flush: {}",
                name,
                panic_message(panic.as_ref())
            ),
        }
    }
}

pub(crate) fn purge_sinks(sinks: &[Sink], ttl_days: u32) -> Result<u64> {
    let mut total = 0;
    for sink in sinks {
        if let Sink::Database(db) = sink {
            total += db.purge_expired(ttl_days)?;
        }
    }
    Ok(total)
}

fn handle_message(message: Message, sinks: &mut [Sink], metrics: &DispatcherMetrics) {
    match message {
        Message::Record(record) => {
            deliver(sinks, &record, metrics);
        }
        Message::Purge { ttl_days, reply } => {
            let result = catch_unwind(AssertUnwindSafe(|| purge_sinks(sinks, ttl_days)))
                .unwrap_or_else(|panic| {
                    Err(LogError::sink_write("internal", panic_message(panic.as_ref())))
                });
            let _ = reply.send(result);
        }
    }
}

fn drain_loop(
    receiver: Receiver<Message>,
    stop: Receiver<()>,
    mut sinks: Vec<Sink>,
    metrics: Arc<DispatcherMetrics>,
    drain_timeout: Duration,
) -> Vec<Sink> {
    loop {
        select! {
            recv(receiver) -> message => match message {
                Ok(message) => {
                    handle_message(message, &mut sinks, &metrics);
                    if receiver.is_empty() {
                        flush_all(&mut sinks);
                    }
                }
                Err(_) => break,
            },
            recv(stop) -> _ => break,
        }
    }

    // Drain whatever was accepted before the stop request, up to the deadline
    let deadline = Instant::now() + drain_timeout;
    while Instant::now() < deadline {
        match receiver.try_recv() {
            Ok(message) => handle_message(message, &mut sinks, &metrics),
            Err(_) => break,
        }
    }
    flush_all(&mut sinks);
    sinks
}

/// Single-consumer queue in front of the configured sinks
///
/// Records enqueued before [`start`](Self::start) are buffered and delivered
/// once the worker runs. After [`stop`](Self::stop) new records are rejected
/// with [`LogError::DispatcherStopped`] until the dispatcher is started again.
///
/// # Example
///
/// ```
/// use axum_structlog::{LogLevel, LogRecord, QueueConfig, QueueDispatcher};
/// use axum_structlog::sinks::{ConsoleSink, Sink};
/// use axum_structlog::Renderer;
/// use std::sync::Arc;
///
/// let sinks = vec![Sink::from(ConsoleSink::with_writer(Renderer::json(), Vec::new()))];
/// let dispatcher = QueueDispatcher::new(sinks, QueueConfig::default());
/// dispatcher.start().unwrap();
/// dispatcher
///     .enqueue(Arc::new(LogRecord::new("app", LogLevel::Info, "hello")))
///     .unwrap();
///
/// let report = dispatcher.stop();
/// assert_eq!(report.delivered + report.discarded, 1);
/// ```
pub struct QueueDispatcher {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    config: QueueConfig,
    /// `true` while producers may enqueue; held for reading during a send
    gate: RwLock<bool>,
    /// Set while `stop` is waiting to close the gate, so blocked producers give up
    closing: AtomicBool,
    status: Mutex<WorkerStatus>,
    sinks: Mutex<Option<Vec<Sink>>>,
    worker: Mutex<Option<(JoinHandle<Vec<Sink>>, Sender<()>)>>,
    metrics: Arc<DispatcherMetrics>,
}

impl QueueDispatcher {
    pub fn new(sinks: Vec<Sink>, config: QueueConfig) -> Self {
        let (sender, receiver) = match config.capacity {
            QueueCapacity::Bounded(n) => bounded(n.max(1)),
            QueueCapacity::Unbounded => unbounded(),
        };
        Self {
            sender,
            receiver,
            config,
            gate: RwLock::new(true),
            closing: AtomicBool::new(false),
            status: Mutex::new(WorkerStatus::Stopped),
            sinks: Mutex::new(Some(sinks)),
            worker: Mutex::new(None),
            metrics: Arc::new(DispatcherMetrics::new()),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn status(&self) -> WorkerStatus {
        *self.status.lock()
    }

    pub fn metrics(&self) -> &DispatcherMetrics {
        &self.metrics
    }

    /// Records currently waiting in the queue
    pub fn queue_len(&self) -> usize {
        self.sender.len()
    }

    /// Number of live drain workers (0 or 1)
    pub fn worker_count(&self) -> usize {
        match self.worker.lock().as_ref() {
            Some((handle, _)) if !handle.is_finished() => 1,
            _ => 0,
        }
    }

    /// Spawn the drain worker; no-op when it is already running
    pub fn start(&self) -> Result<()> {
        let mut status = self.status.lock();
        if *status != WorkerStatus::Stopped {
            return Ok(());
        }
        let sinks = self.sinks.lock().take().ok_or_else(|| {
            LogError::config("dispatcher", "sinks were lost by a worker that failed to stop")
        })?;

        let (stop_tx, stop_rx) = bounded(1);
        let receiver = self.receiver.clone();
        let metrics = Arc::clone(&self.metrics);
        let drain_timeout = self.config.drain_timeout;
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || drain_loop(receiver, stop_rx, sinks, metrics, drain_timeout))
            .map_err(|e| LogError::io_operation("spawn drain worker", "thread spawn failed", e))?;

        *self.worker.lock() = Some((handle, stop_tx));
        self.closing.store(false, Ordering::SeqCst);
        if !*self.gate.read() {
            *self.gate.write() = true;
        }
        *status = WorkerStatus::Running;
        Ok(())
    }

    /// Queue a record for delivery
    ///
    /// With a full bounded queue this blocks according to the overflow policy.
    ///
    /// # Errors
    ///
    /// [`LogError::DispatcherStopped`] after `stop`, and
    /// [`LogError::QueueTimeout`] when `BlockWithTimeout` runs out.
    pub fn enqueue(&self, record: Arc<LogRecord>) -> Result<()> {
        let gate = self.gate.read();
        if !*gate {
            self.metrics.record_rejected();
            return Err(LogError::DispatcherStopped);
        }

        let mut message = Message::Record(record);
        match self.sender.try_send(message) {
            Ok(()) => {
                self.metrics.record_enqueued();
                return Ok(());
            }
            Err(e) => message = e.into_inner(),
        }

        self.metrics.record_block();
        let started = Instant::now();
        loop {
            let wait = match self.config.overflow {
                OverflowPolicy::Block => BLOCK_POLL,
                OverflowPolicy::BlockWithTimeout(limit) => {
                    let left = limit.saturating_sub(started.elapsed());
                    if left.is_zero() {
                        return Err(self.overflow_timeout(limit));
                    }
                    left.min(BLOCK_POLL)
                }
            };
            match self.sender.send_timeout(message, wait) {
                Ok(()) => {
                    self.metrics.record_enqueued();
                    return Ok(());
                }
                Err(SendTimeoutError::Timeout(m)) => {
                    if self.closing.load(Ordering::SeqCst) {
                        self.metrics.record_rejected();
                        return Err(LogError::DispatcherStopped);
                    }
                    message = m;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    self.metrics.record_rejected();
                    return Err(LogError::DispatcherStopped);
                }
            }
        }
    }

    fn overflow_timeout(&self, waited: Duration) -> LogError {
        let rejected = self.metrics.record_rejected();
        if rejected == 0 || (rejected + 1) % 1000 == 0 {
            eprintln!(
                "[LOGGER WARNING] Queue full, {} records rejected after waiting {:?}. \
                 Consider a larger capacity or the Block policy.",
                rejected + 1,
                waited
            );
        }
        let capacity = match self.config.capacity {
            QueueCapacity::Bounded(n) => n,
            QueueCapacity::Unbounded => usize::MAX,
        };
        LogError::QueueTimeout {
            capacity,
            waited_ms: waited.as_millis() as u64,
        }
    }

    /// Delete expired rows from every database sink
    ///
    /// Runs on the drain worker when it is active, so the request is ordered
    /// after all records queued before it.
    pub fn purge_expired(&self, ttl_days: u32) -> Result<u64> {
        if let Some(sinks) = self.sinks.lock().as_ref() {
            return purge_sinks(sinks, ttl_days);
        }

        let (reply_tx, reply_rx) = bounded(1);
        {
            let gate = self.gate.read();
            if !*gate {
                return Err(LogError::DispatcherStopped);
            }
            self.sender
                .send(Message::Purge { ttl_days, reply: reply_tx })
                .map_err(|_| LogError::DispatcherStopped)?;
        }
        reply_rx
            .recv_timeout(self.config.drain_timeout + JOIN_GRACE)
            .map_err(|_| LogError::sink_write("internal", "purge did not complete in time"))?
    }

    /// Stop accepting records, drain the queue and join the worker
    ///
    /// Records still queued when the drain deadline passes are discarded and
    /// counted in the report and in [`DispatcherMetrics::discarded`].
    pub fn stop(&self) -> DrainReport {
        let mut status = self.status.lock();

        self.closing.store(true, Ordering::SeqCst);
        *self.gate.write() = false;

        let mut report = DrainReport::default();
        if *status == WorkerStatus::Running {
            *status = WorkerStatus::Stopping;
            let delivered_before = self.metrics.delivered();

            if let Some((handle, stop_tx)) = self.worker.lock().take() {
                let _ = stop_tx.send(());
                match self.join_worker(handle) {
                    Some(sinks) => *self.sinks.lock() = Some(sinks),
                    None => report.timed_out = true,
                }
            }
            report.delivered = self.metrics.delivered().saturating_sub(delivered_before);
        }

        let mut leftover = 0u64;
        while let Ok(message) = self.receiver.try_recv() {
            match message {
                Message::Record(_) => leftover += 1,
                Message::Purge { reply, .. } => {
                    let _ = reply.send(Err(LogError::DispatcherStopped));
                }
            }
        }
        if leftover > 0 {
            self.metrics.record_discarded(leftover);
            eprintln!(
                "[LOGGER WARNING] Dispatcher stopped with {} undelivered records discarded",
                leftover
            );
        }
        report.discarded = leftover;

        *status = WorkerStatus::Stopped;
        report
    }

    fn join_worker(&self, handle: JoinHandle<Vec<Sink>>) -> Option<Vec<Sink>> {
        let timeout = self.config.drain_timeout + JOIN_GRACE;
        let start = Instant::now();
        loop {
            if handle.is_finished() {
                return match handle.join() {
                    Ok(sinks) => Some(sinks),
                    Err(panic) => {
                        eprintln!(
                            "[LOGGER ERROR] Drain worker panicked during shutdown: {}",
                            panic_message(panic.as_ref())
                        );
                        None
                    }
                };
            }
            if start.elapsed() >= timeout {
                eprintln!(
                    "[LOGGER WARNING] Drain worker did not finish within {:?}. \
                     Some records may be lost.",
                    timeout
                );
                return None;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for QueueDispatcher {
    fn drop(&mut self) {
        if *self.status.get_mut() == WorkerStatus::Running {
            self.stop();
        }
    }
}

impl std::fmt::Debug for QueueDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueDispatcher")
            .field("config", &self.config)
            .field("status", &self.status())
            .field("queue_len", &self.queue_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LogLevel, Renderer};
    use crate::sinks::{ConsoleSink, DatabaseSink, LogRow, LogStore, LogTable};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::io::Write;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock())
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    struct FailingStore;

    #[async_trait]
    impl LogStore for FailingStore {
        async fn insert(&self, _table: &LogTable, _row: &LogRow) -> Result<()> {
            Err(LogError::connection("db", "connection refused", 1))
        }

        async fn purge_older_than(&self, _table: &LogTable, _cutoff: DateTime<Utc>) -> Result<u64> {
            Ok(3)
        }
    }

    fn record(msg: &str) -> Arc<LogRecord> {
        Arc::new(LogRecord::new("test", LogLevel::Info, msg))
    }

    fn console(captured: &Captured) -> Sink {
        Sink::from(ConsoleSink::with_writer(Renderer::logfmt(), captured.clone()))
    }

    #[test]
    fn test_fifo_delivery() {
        let captured = Captured::default();
        let dispatcher = QueueDispatcher::new(vec![console(&captured)], QueueConfig::default());
        dispatcher.start().unwrap();
        for i in 0..100 {
            dispatcher.enqueue(record(&format!("msg-{}", i))).unwrap();
        }
        let report = dispatcher.stop();

        assert!(!report.timed_out);
        assert_eq!(dispatcher.metrics().delivered(), 100);
        let lines = captured.lines();
        assert_eq!(lines.len(), 100);
        for (i, line) in lines.iter().enumerate() {
            assert!(line.contains(&format!("msg-{}", i)), "line {} out of order", i);
        }
    }

    #[test]
    fn test_records_before_start_are_buffered() {
        let captured = Captured::default();
        let dispatcher = QueueDispatcher::new(vec![console(&captured)], QueueConfig::default());
        dispatcher.enqueue(record("early")).unwrap();
        assert_eq!(dispatcher.queue_len(), 1);

        dispatcher.start().unwrap();
        dispatcher.stop();
        assert_eq!(captured.lines().len(), 1);
    }

    #[test]
    fn test_start_is_idempotent() {
        let dispatcher = QueueDispatcher::new(Vec::new(), QueueConfig::default());
        dispatcher.start().unwrap();
        dispatcher.start().unwrap();
        assert_eq!(dispatcher.worker_count(), 1);
        assert_eq!(dispatcher.status(), WorkerStatus::Running);

        dispatcher.stop();
        assert_eq!(dispatcher.worker_count(), 0);
        assert_eq!(dispatcher.status(), WorkerStatus::Stopped);
    }

    #[test]
    fn test_enqueue_after_stop_is_rejected() {
        let dispatcher = QueueDispatcher::new(Vec::new(), QueueConfig::default());
        dispatcher.start().unwrap();
        dispatcher.stop();

        let err = dispatcher.enqueue(record("late")).unwrap_err();
        assert!(matches!(err, LogError::DispatcherStopped));
        assert_eq!(dispatcher.metrics().rejected(), 1);
    }

    #[test]
    fn test_restart_after_stop() {
        let captured = Captured::default();
        let dispatcher = QueueDispatcher::new(vec![console(&captured)], QueueConfig::default());
        dispatcher.start().unwrap();
        dispatcher.enqueue(record("first")).unwrap();
        dispatcher.stop();

        dispatcher.start().unwrap();
        dispatcher.enqueue(record("second")).unwrap();
        dispatcher.stop();

        assert_eq!(captured.lines().len(), 2);
    }

    #[test]
    fn test_failing_sink_does_not_affect_others() {
        let captured = Captured::default();
        let db = DatabaseSink::new(Arc::new(FailingStore), LogTable::base("logs")).unwrap();
        let dispatcher = QueueDispatcher::new(
            vec![Sink::from(db), console(&captured)],
            QueueConfig::default(),
        );
        dispatcher.start().unwrap();
        for i in 0..20 {
            dispatcher.enqueue(record(&format!("r{}", i))).unwrap();
        }
        dispatcher.stop();

        assert_eq!(captured.lines().len(), 20);
        assert_eq!(dispatcher.metrics().sink_failures(), 20);
        assert_eq!(dispatcher.metrics().delivered(), 20);
    }

    #[test]
    fn test_record_refused_by_every_sink_is_failed() {
        let db = DatabaseSink::new(Arc::new(FailingStore), LogTable::base("logs")).unwrap();
        let dispatcher = QueueDispatcher::new(vec![Sink::from(db)], QueueConfig::default());
        dispatcher.start().unwrap();
        for i in 0..3 {
            dispatcher.enqueue(record(&format!("r{}", i))).unwrap();
        }
        dispatcher.stop();

        let metrics = dispatcher.metrics();
        assert_eq!(metrics.delivered(), 0);
        assert_eq!(metrics.failed(), 3);
        assert_eq!(metrics.sink_failures(), 3);
        assert_eq!(metrics.pending(), 0);
    }

    #[test]
    fn test_stop_without_start_discards_buffered() {
        let dispatcher = QueueDispatcher::new(Vec::new(), QueueConfig::default());
        dispatcher.enqueue(record("never")).unwrap();
        let report = dispatcher.stop();

        assert_eq!(report.discarded, 1);
        assert_eq!(dispatcher.metrics().discarded(), 1);
        assert_eq!(dispatcher.metrics().pending(), 0);
    }

    #[test]
    fn test_block_with_timeout_rejects_when_full() {
        let config = QueueConfig::default()
            .capacity(QueueCapacity::Bounded(1))
            .overflow(OverflowPolicy::BlockWithTimeout(Duration::from_millis(20)));
        let dispatcher = QueueDispatcher::new(Vec::new(), config);
        dispatcher.enqueue(record("fills")).unwrap();

        let err = dispatcher.enqueue(record("overflow")).unwrap_err();
        assert!(matches!(err, LogError::QueueTimeout { capacity: 1, .. }));
        assert_eq!(dispatcher.metrics().block_events(), 1);
        assert_eq!(dispatcher.metrics().rejected(), 1);
    }

    #[test]
    fn test_blocked_producer_resumes_when_worker_drains() {
        let captured = Captured::default();
        let config = QueueConfig::default().capacity(QueueCapacity::Bounded(2));
        let dispatcher = Arc::new(QueueDispatcher::new(vec![console(&captured)], config));
        for i in 0..2 {
            dispatcher.enqueue(record(&format!("pre-{}", i))).unwrap();
        }

        let producer = {
            let dispatcher = Arc::clone(&dispatcher);
            thread::spawn(move || dispatcher.enqueue(record("blocked")))
        };
        thread::sleep(Duration::from_millis(30));
        dispatcher.start().unwrap();

        producer.join().unwrap().unwrap();
        dispatcher.stop();
        assert_eq!(captured.lines().len(), 3);
        assert!(dispatcher.metrics().block_events() >= 1);
    }

    #[test]
    fn test_purge_runs_on_worker() {
        let db = DatabaseSink::new(Arc::new(FailingStore), LogTable::base("logs")).unwrap();
        let dispatcher = QueueDispatcher::new(vec![Sink::from(db)], QueueConfig::default());
        assert_eq!(dispatcher.purge_expired(90).unwrap(), 3);

        dispatcher.start().unwrap();
        assert_eq!(dispatcher.purge_expired(90).unwrap(), 3);
        dispatcher.stop();
    }
}
