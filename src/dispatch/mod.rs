//! Stock decrease notification dispatch.
//!
//! Resolved crossings are handed to a fixed pool of worker threads through a
//! bounded queue, so the frame loop never waits on the network. When the
//! queue is full the configured `Backpressure` policy either rejects the
//! notification or blocks the caller until a slot frees up.
//!
//! Delivery is best effort: no retries, no deduplication. Failures are logged
//! and counted inside the worker and never reach the frame loop.

mod payload;
mod transport;

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{anyhow, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::config::CashierCredentials;

pub use payload::{normalize_item_name, NotificationRequest, PLURAL_LOOKING_ITEMS};
pub use transport::{validate_endpoint, HttpTransport, LogTransport, StockTransport};

pub const DEFAULT_DISPATCH_WORKERS: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// What to do with a notification when the queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backpressure {
    /// Drop the notification and count it as rejected.
    #[default]
    Reject,
    /// Block the caller until a worker frees a slot.
    Block,
}

impl FromStr for Backpressure {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(Backpressure::Reject),
            "block" => Ok(Backpressure::Block),
            other => Err(anyhow!(
                "unknown backpressure policy '{}'; expected 'reject' or 'block'",
                other
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub backpressure: Backpressure,
    /// Apply `normalize_item_name` before sending.
    pub normalize_plurals: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_DISPATCH_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backpressure: Backpressure::Reject,
            normalize_plurals: true,
        }
    }
}

/// Dispatch failure. Only `QueueFull` and `Closed` are ever returned to the
/// caller of `Dispatcher::dispatch`; the rest stay inside the workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Backend answered with something other than 200.
    Status { code: u16, body: String },
    /// Connection, TLS or I/O failure.
    Transport(String),
    /// Queue at capacity under `Backpressure::Reject`.
    QueueFull,
    /// Dispatcher already shut down.
    Closed,
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Status { code, body } => {
                write!(f, "backend returned status {}: {}", code, body)
            }
            DispatchError::Transport(msg) => write!(f, "transport failure: {}", msg),
            DispatchError::QueueFull => write!(f, "dispatch queue full"),
            DispatchError::Closed => write!(f, "dispatcher closed"),
        }
    }
}

impl std::error::Error for DispatchError {}

#[derive(Debug, Default)]
pub struct DispatchStats {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            submitted: self.submitted.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            rejected: self.rejected.load(Ordering::SeqCst),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rejected: u64,
}

/// Bounded pool of notification workers.
pub struct Dispatcher {
    sender: Option<Sender<NotificationRequest>>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<DispatchStats>,
    credentials: CashierCredentials,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        credentials: CashierCredentials,
        transport: Arc<dyn StockTransport>,
    ) -> Result<Self> {
        if config.workers == 0 {
            return Err(anyhow!("dispatcher needs at least one worker"));
        }
        if config.queue_capacity == 0 {
            return Err(anyhow!("dispatch queue capacity must be greater than zero"));
        }

        let (sender, receiver) = crossbeam_channel::bounded(config.queue_capacity);
        let stats = Arc::new(DispatchStats::default());
        let mut workers = Vec::with_capacity(config.workers);
        for idx in 0..config.workers {
            let receiver = receiver.clone();
            let transport = transport.clone();
            let stats = stats.clone();
            let handle = std::thread::Builder::new()
                .name(format!("dispatch-{}", idx))
                .spawn(move || run_worker(receiver, transport, stats))?;
            workers.push(handle);
        }
        log::info!(
            "dispatcher started: transport={} workers={} queue={} backpressure={:?}",
            transport.name(),
            config.workers,
            config.queue_capacity,
            config.backpressure
        );

        Ok(Self {
            sender: Some(sender),
            workers,
            stats,
            credentials,
            config,
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Queue a stock decrease for `item_name`. Returns once the request is
    /// queued, not once it is delivered.
    pub fn dispatch(&self, item_name: &str) -> Result<(), DispatchError> {
        let sender = self.sender.as_ref().ok_or(DispatchError::Closed)?;
        let item_name = if self.config.normalize_plurals {
            normalize_item_name(item_name)
        } else {
            item_name.to_string()
        };
        let request = NotificationRequest::new(
            self.credentials.cashier_id(),
            item_name,
            self.credentials.token(),
        );

        let queued = match self.config.backpressure {
            Backpressure::Reject => sender.try_send(request).map_err(|e| match e {
                TrySendError::Full(_) => DispatchError::QueueFull,
                TrySendError::Disconnected(_) => DispatchError::Closed,
            }),
            Backpressure::Block => sender.send(request).map_err(|_| DispatchError::Closed),
        };
        match queued {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                if e == DispatchError::QueueFull {
                    self.stats.rejected.fetch_add(1, Ordering::SeqCst);
                }
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> DispatchSnapshot {
        self.stats.snapshot()
    }

    /// Number of notifications queued but not yet picked up by a worker.
    pub fn pending(&self) -> usize {
        self.sender.as_ref().map_or(0, |s| s.len())
    }

    /// Close the queue, let workers drain it, and wait for them.
    pub fn shutdown(mut self) -> Result<DispatchSnapshot> {
        self.close()?;
        Ok(self.stats.snapshot())
    }

    fn close(&mut self) -> Result<()> {
        self.sender.take();
        let mut panicked = 0usize;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            log::error!("{} dispatch worker(s) panicked", panicked);
            return Err(anyhow!("{} dispatch worker(s) panicked", panicked));
        }
        Ok(())
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn run_worker(
    receiver: Receiver<NotificationRequest>,
    transport: Arc<dyn StockTransport>,
    stats: Arc<DispatchStats>,
) {
    for request in receiver.iter() {
        log::info!("'{}' is detected. Sending request...", request.item_name);
        match transport.send(&request) {
            Ok(()) => {
                stats.succeeded.fetch_add(1, Ordering::SeqCst);
                log::info!("stock decreased for '{}'", request.item_name);
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::SeqCst);
                log::warn!("stock decrease for '{}' failed: {}", request.item_name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Condvar, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(i64, String, String)>>,
    }

    impl StockTransport for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn send(&self, request: &NotificationRequest) -> Result<(), DispatchError> {
            self.sent.lock().unwrap().push((
                request.cashier_id,
                request.item_name.clone(),
                request.bearer(),
            ));
            Ok(())
        }
    }

    struct Failing;

    impl StockTransport for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn send(&self, _request: &NotificationRequest) -> Result<(), DispatchError> {
            Err(DispatchError::Status {
                code: 401,
                body: "unauthorized".to_string(),
            })
        }
    }

    /// Holds every send until released.
    #[derive(Default)]
    struct Gate {
        open: Mutex<bool>,
        cv: Condvar,
    }

    impl Gate {
        fn release(&self) {
            *self.open.lock().unwrap() = true;
            self.cv.notify_all();
        }
    }

    impl StockTransport for Gate {
        fn name(&self) -> &'static str {
            "gate"
        }

        fn send(&self, _request: &NotificationRequest) -> Result<(), DispatchError> {
            let mut open = self.open.lock().unwrap();
            while !*open {
                open = self.cv.wait(open).unwrap();
            }
            Ok(())
        }
    }

    fn creds() -> CashierCredentials {
        CashierCredentials::new(17, "tok-123").expect("credentials")
    }

    #[test]
    fn delivers_normalized_names_with_bearer_token() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher =
            Dispatcher::new(DispatcherConfig::default(), creds(), recorder.clone()).unwrap();
        dispatcher.dispatch("Rexona Roll Ons").unwrap();
        dispatcher.dispatch("Capri-Sun Safari Fruits").unwrap();
        let stats = dispatcher.shutdown().unwrap();

        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.succeeded, 2);
        let mut sent = recorder.sent.lock().unwrap().clone();
        sent.sort();
        assert_eq!(
            sent,
            vec![
                (17, "Capri-Sun Safari Fruits".to_string(), "Bearer tok-123".to_string()),
                (17, "Rexona Roll On".to_string(), "Bearer tok-123".to_string()),
            ]
        );
    }

    #[test]
    fn normalization_can_be_disabled() {
        let recorder = Arc::new(Recorder::default());
        let config = DispatcherConfig {
            normalize_plurals: false,
            ..DispatcherConfig::default()
        };
        let dispatcher = Dispatcher::new(config, creds(), recorder.clone()).unwrap();
        dispatcher.dispatch("Rexona Roll On").unwrap();
        dispatcher.shutdown().unwrap();
        assert_eq!(recorder.sent.lock().unwrap()[0].1, "Rexona Roll On");
    }

    #[test]
    fn failures_are_counted_not_returned() {
        let dispatcher =
            Dispatcher::new(DispatcherConfig::default(), creds(), Arc::new(Failing)).unwrap();
        assert!(dispatcher.dispatch("Rexona Roll On").is_ok());
        let stats = dispatcher.shutdown().unwrap();
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.succeeded, 0);
    }

    #[test]
    fn rejects_when_queue_is_full() {
        let gate = Arc::new(Gate::default());
        let config = DispatcherConfig {
            workers: 1,
            queue_capacity: 1,
            backpressure: Backpressure::Reject,
            normalize_plurals: false,
        };
        let dispatcher = Dispatcher::new(config, creds(), gate.clone()).unwrap();

        // First request occupies the worker, second fills the queue.
        dispatcher.dispatch("a").unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while dispatcher.pending() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        dispatcher.dispatch("b").unwrap();
        assert_eq!(dispatcher.dispatch("c"), Err(DispatchError::QueueFull));

        gate.release();
        let stats = dispatcher.shutdown().unwrap();
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.succeeded, 2);
    }

    #[test]
    fn block_policy_waits_for_room_instead_of_rejecting() {
        let gate = Arc::new(Gate::default());
        let config = DispatcherConfig {
            workers: 1,
            queue_capacity: 1,
            backpressure: Backpressure::Block,
            normalize_plurals: false,
        };
        let dispatcher = Arc::new(Dispatcher::new(config, creds(), gate.clone()).unwrap());

        dispatcher.dispatch("a").unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while dispatcher.pending() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        dispatcher.dispatch("b").unwrap();

        let blocked = {
            let dispatcher = dispatcher.clone();
            std::thread::spawn(move || dispatcher.dispatch("c"))
        };
        std::thread::sleep(Duration::from_millis(100));
        assert!(!blocked.is_finished());
        assert_eq!(dispatcher.stats().submitted, 2);

        gate.release();
        assert_eq!(blocked.join().unwrap(), Ok(()));
        let dispatcher = Arc::try_unwrap(dispatcher)
            .ok()
            .expect("sole dispatcher owner");
        let stats = dispatcher.shutdown().unwrap();
        assert_eq!(stats.submitted, 3);
        assert_eq!(stats.rejected, 0);
        assert_eq!(stats.succeeded, 3);
    }

    #[test]
    fn rejects_zero_sized_pool() {
        let config = DispatcherConfig {
            workers: 0,
            ..DispatcherConfig::default()
        };
        assert!(Dispatcher::new(config, creds(), Arc::new(LogTransport)).is_err());
    }

    #[test]
    fn parses_backpressure_policy() {
        assert_eq!("reject".parse::<Backpressure>().unwrap(), Backpressure::Reject);
        assert_eq!(" Block ".parse::<Backpressure>().unwrap(), Backpressure::Block);
        assert!("drop".parse::<Backpressure>().is_err());
    }
}
