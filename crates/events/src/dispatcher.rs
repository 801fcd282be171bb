//! Background delivery loop for an [`InMemorySink`].

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info};

use crate::topic::InMemorySink;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How often to look for due deliveries
    pub poll_interval: Duration,
    /// Thread name, also used in logs
    pub name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "sink-dispatcher".to_string(),
        }
    }
}

impl DispatcherConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Running totals of a dispatcher thread.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatcherStats {
    pub passes: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dead_lettered: u64,
    pub uptime_secs: u64,
}

/// Handle to control a running dispatcher.
#[derive(Debug)]
pub struct DispatcherHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<DispatcherStats>>,
}

impl DispatcherHandle {
    /// Request shutdown and wait for the loop to exit.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> DispatcherStats {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

/// Drives deliveries of a sink on its own thread.
pub struct SinkDispatcher;

impl SinkDispatcher {
    pub fn spawn(sink: Arc<InMemorySink>, config: DispatcherConfig) -> std::io::Result<DispatcherHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(DispatcherStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || dispatch_loop(sink, config, shutdown_rx, stats_clone))?;

        Ok(DispatcherHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

fn dispatch_loop(
    sink: Arc<InMemorySink>,
    config: DispatcherConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<DispatcherStats>>,
) {
    info!(dispatcher = %config.name, "sink dispatcher started");
    let start_time = Instant::now();

    loop {
        match shutdown_rx.recv_timeout(config.poll_interval) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }

        match sink.dispatch_pending() {
            Ok(report) => {
                if report.delivered + report.failed + report.dead_lettered > 0 {
                    debug!(dispatcher = %config.name, ?report, "dispatch pass");
                }
                if let Ok(mut s) = stats.lock() {
                    s.passes += 1;
                    s.delivered += report.delivered as u64;
                    s.failed += report.failed as u64;
                    s.dead_lettered += report.dead_lettered as u64;
                    s.uptime_secs = start_time.elapsed().as_secs();
                }
            }
            Err(e) => {
                error!(dispatcher = %config.name, error = %e, "dispatch pass failed");
            }
        }
    }

    info!(dispatcher = %config.name, "sink dispatcher stopped");
}
