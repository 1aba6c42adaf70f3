//! Async bind loader with priority-ordered, bounded concurrency

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::model::ModelNode;
use super::source::AnimSource;
use crate::bind::BindAnimRequest;
use crate::core::{ChanConfig, Error};

/// Runs [`BindAnimRequest`]s in the background.
///
/// Requests queue up and are started highest priority first, at most
/// `max_concurrent` at a time. File reads and binds are blocking work, so
/// each runs on the runtime's blocking pool.
pub struct Loader {
    /// Channel for sending bind requests to the worker task
    request_tx: mpsc::UnboundedSender<BindAnimRequest>,
    source: Arc<dyn AnimSource>,
    /// Requests queued or running
    in_flight: Arc<AtomicUsize>,
    /// Owned runtime (None when spawned on the caller's runtime)
    #[allow(dead_code)]
    runtime: Option<Runtime>,
}

impl Loader {
    /// Create a loader with its own runtime
    pub fn new(source: impl AnimSource + 'static, config: &ChanConfig) -> Result<Self, Error> {
        let threads = config.async_bind_threads.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(threads)
            .thread_name("chanbind-loader")
            .enable_all()
            .build()?;

        let source: Arc<dyn AnimSource> = Arc::new(source);
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let in_flight = Arc::new(AtomicUsize::new(0));

        runtime.spawn(Self::worker_loop(
            Arc::clone(&source),
            threads,
            request_rx,
            Arc::clone(&in_flight),
        ));

        Ok(Self {
            request_tx,
            source,
            in_flight,
            runtime: Some(runtime),
        })
    }

    /// Create a loader on the current tokio runtime.
    ///
    /// Panics if called outside a tokio runtime context.
    pub fn new_with_current_runtime(source: impl AnimSource + 'static, config: &ChanConfig) -> Self {
        let threads = config.async_bind_threads.max(1);
        let source: Arc<dyn AnimSource> = Arc::new(source);
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let in_flight = Arc::new(AtomicUsize::new(0));

        tokio::spawn(Self::worker_loop(
            Arc::clone(&source),
            threads,
            request_rx,
            Arc::clone(&in_flight),
        ));

        Self {
            request_tx,
            source,
            in_flight,
            runtime: None,
        }
    }

    async fn worker_loop(
        source: Arc<dyn AnimSource>,
        max_concurrent: usize,
        mut request_rx: mpsc::UnboundedReceiver<BindAnimRequest>,
        in_flight: Arc<AtomicUsize>,
    ) {
        let mut active_tasks = JoinSet::new();
        let mut pending_requests: Vec<BindAnimRequest> = Vec::new();

        loop {
            tokio::select! {
                Some(request) = request_rx.recv() => {
                    pending_requests.push(request);
                }

                Some(result) = active_tasks.join_next(), if !active_tasks.is_empty() => {
                    in_flight.fetch_sub(1, Ordering::AcqRel);
                    if let Err(e) = result {
                        log::error!("Bind task panicked: {e}");
                    }
                }

                else => {
                    if pending_requests.is_empty() && active_tasks.is_empty() {
                        break;
                    }
                }
            }

            while active_tasks.len() < max_concurrent && !pending_requests.is_empty() {
                // Stable sort keeps submission order within a priority
                pending_requests.sort_by(|a, b| b.priority().cmp(&a.priority()));
                let request = pending_requests.remove(0);
                let source = Arc::clone(&source);
                active_tasks.spawn_blocking(move || request.run(&*source));
            }
        }
        log::debug!("Loader worker exiting");
    }

    /// Load a model on the calling thread
    pub fn load_sync(&self, path: impl AsRef<Path>) -> Result<Arc<ModelNode>, Error> {
        Ok(Arc::new(self.source.load(path.as_ref())?))
    }

    /// Queue a request. If the worker is gone the request's control fails
    /// immediately.
    pub fn load_async(&self, request: BindAnimRequest) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        if let Err(mpsc::error::SendError(request)) = self.request_tx.send(request) {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            log::error!("Loader stopped; failing {}", request.name());
            request.fail();
        }
    }

    /// Requests queued or still running
    pub fn pending_count(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn source(&self) -> &Arc<dyn AnimSource> {
        &self.source
    }
}
