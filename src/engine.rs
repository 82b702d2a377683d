//! Engine: a standing worker pool behind a reusable `parallel_for`
//!
//! The per-run executors spawn their tasks on every call. The [`Engine`]
//! spawns `workers` long-lived Tokio tasks once, at construction, and feeds
//! every later [`Engine::parallel_for`] call to those same tasks.
//!
//! # High-level flow
//! 1. Construction spawns one worker per configured slot. Each worker owns the
//!    receiving end of its own job channel and a clone of the shutdown
//!    signal, and idles on both.
//! 2. `parallel_for(n, body)` builds one shared batch: the body, the range
//!    length, a chunk size (`grain`) and an atomic cursor starting at zero.
//!    One job pointing at the batch is sent to every worker, each carrying a
//!    unit of a [`WaitGroup`].
//! 3. A worker that receives a job claims chunks with `fetch_add(grain)` on
//!    the cursor and runs the body over each claimed `[start, start + grain)`
//!    until the cursor passes `n`. Then it drops the job, releasing its unit.
//! 4. The caller waits on the group. When it resolves every chunk has been
//!    claimed and run, and all writes made by the body are visible.
//!
//! Each index is claimed by exactly one `fetch_add`, so no index runs twice,
//! and workers only stop once the cursor is past `n`, so none is skipped.
//! Because claiming is dynamic a slow worker simply claims fewer chunks.
//!
//! # Grain
//! `grain` defaults to `ceil(n / (4 * workers))`: roughly four chunks per
//! worker, enough to absorb some imbalance while keeping cursor traffic low.
//!
//! # Failure
//! A panic inside the body is caught at chunk granularity. The first one
//! cancels the batch: no further chunks are claimed, chunks already running
//! finish, and the call returns [`Error::TaskPanicked`] once. Workers survive
//! and the engine stays usable.
//!
//! # Shutdown
//! [`Engine::shutdown`] signals every worker, joins them, and makes later
//! calls fail with [`Error::EngineShutdown`]. Dropping the engine signals the
//! workers without waiting for them.
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
};

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use typed_builder::TypedBuilder;

use crate::{
    Error,
    Result,
    executor::{Executor, Strategy, check_workers},
    sync::{WaitGroup, WaitGuard},
};

/// Construction options. `build()` spawns the workers and yields an
/// [`Engine`], so it must run inside a Tokio runtime.
#[derive(Clone, Debug, TypedBuilder)]
#[builder(build_method(into = Engine))]
pub struct EngineOptions {
    /// Number of long-lived workers.
    #[builder(default = num_cpus::get())]
    pub workers: usize,
    /// Indices claimed per cursor step. `None` derives it from `n` per call.
    #[builder(default)]
    pub grain: Option<usize>,
}

/// Reusable parallel-for over a fixed pool of workers.
pub struct Engine {
    workers: usize,
    grain: Option<usize>,
    jobs: Vec<mpsc::UnboundedSender<Job>>,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    submissions: AtomicU64,
}

impl Engine {
    /// Engine with `workers` workers and the default grain.
    pub fn new(workers: usize) -> Self {
        EngineOptions::builder().workers(workers).build()
    }

    /// Runs `body(i)` once for every `i` in `[0, n)` on the pool and waits
    /// for all of it.
    ///
    /// Calls may come from any task, one after another; concurrent calls are
    /// queued behind each other per worker.
    pub async fn parallel_for<F>(&self, n: usize, body: F) -> Result<()>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        check_workers(self.workers)?;
        if self.is_shut_down() {
            return Err(Error::EngineShutdown);
        }
        if n == 0 {
            return Ok(());
        }

        let submission = self.submissions.fetch_add(1, Ordering::Relaxed);
        let grain = self.grain_for(n);
        tracing::debug!("Engine submission {submission}: {n} items, grain {grain}");

        let batch = Arc::new(Batch::new(n, grain, body));
        let wg = WaitGroup::new();
        for jobs in &self.jobs {
            let job = Job {
                batch: Arc::clone(&batch),
                _done: wg.enter(),
            };
            // a closed channel hands the job back; dropping it releases its unit
            if let Err(mpsc::error::SendError(job)) = jobs.send(job) {
                tracing::warn!("Engine worker gone before submission {submission}");
                drop(job);
            }
        }
        wg.wait().await;

        let panicked = batch.panicked.load(Ordering::Acquire);
        if panicked > 0 {
            return Err(Error::TaskPanicked {
                strategy: Strategy::Engine,
                tasks: panicked,
            });
        }
        if batch.processed.load(Ordering::Acquire) != n {
            return Err(Error::EngineShutdown);
        }
        Ok(())
    }

    /// Signals every worker to stop and waits until they have.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let handles = std::mem::take(&mut *self.handles.lock());
        if handles.is_empty() {
            return;
        }
        tracing::info!("Shutting down {} engine workers...", handles.len());
        for res in join_all(handles).await {
            if let Err(e) = res {
                tracing::error!("Engine worker ended abnormally: {e}");
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Workers spawned at construction and not yet joined.
    pub fn live_workers(&self) -> usize {
        self.handles.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Number of `parallel_for` calls that dispatched work.
    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::Relaxed)
    }

    /// Chunk size used for a call over `n` items.
    pub fn grain_for(&self, n: usize) -> usize {
        self.grain
            .unwrap_or_else(|| n.div_ceil(4 * self.workers.max(1)))
            .max(1)
    }
}

impl From<EngineOptions> for Engine {
    fn from(options: EngineOptions) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut jobs = Vec::with_capacity(options.workers);
        let mut handles = Vec::with_capacity(options.workers);

        tracing::info!("Spawning {} engine workers...", options.workers);
        for id in 0..options.workers {
            let (tx, rx) = mpsc::unbounded_channel();
            jobs.push(tx);
            handles.push(tokio::spawn(worker_loop(id, rx, shutdown_rx.clone())));
        }

        Self {
            workers: options.workers,
            grain: options.grain,
            jobs,
            shutdown_tx,
            handles: Mutex::new(handles),
            submissions: AtomicU64::new(0),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

impl Executor for Engine {
    fn strategy(&self) -> Strategy {
        Strategy::Engine
    }

    fn workers(&self) -> usize {
        self.workers
    }

    async fn for_each<F>(&self, n: usize, body: F) -> Result<()>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.parallel_for(n, body).await
    }
}

/// One submission, shared by every worker.
struct Batch {
    n: usize,
    grain: usize,
    cursor: AtomicUsize,
    processed: AtomicUsize,
    cancelled: AtomicBool,
    panicked: AtomicUsize,
    body: Box<dyn Fn(usize) + Send + Sync>,
}

impl Batch {
    fn new<F>(n: usize, grain: usize, body: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        Self {
            n,
            grain,
            cursor: AtomicUsize::new(0),
            processed: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            panicked: AtomicUsize::new(0),
            body: Box::new(body),
        }
    }

    /// Claims and runs chunks until the range is exhausted or the batch is
    /// cancelled. Returns the number of indices this caller ran.
    fn drain(&self) -> usize {
        let mut ran = 0;
        while !self.cancelled.load(Ordering::Relaxed) {
            let start = self.cursor.fetch_add(self.grain, Ordering::Relaxed);
            if start >= self.n {
                break;
            }
            let end = start.saturating_add(self.grain).min(self.n);

            let chunk = catch_unwind(AssertUnwindSafe(|| {
                for i in start..end {
                    (self.body)(i);
                }
            }));
            if chunk.is_err() {
                self.panicked.fetch_add(1, Ordering::Relaxed);
                self.cancelled.store(true, Ordering::Relaxed);
                break;
            }
            ran += end - start;
        }
        self.processed.fetch_add(ran, Ordering::Relaxed);
        ran
    }
}

/// A worker's share of one submission. Dropping it marks the worker done.
struct Job {
    batch: Arc<Batch>,
    _done: WaitGuard,
}

async fn worker_loop(
    id: usize,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!("Engine worker {id} started.");
    loop {
        tokio::select! {
            job = jobs.recv() => match job {
                Some(job) => {
                    let ran = tracing::trace_span!("worker", strategy = "engine", id)
                        .in_scope(|| job.batch.drain());
                    tracing::trace!("Engine worker {id} ran {ran} items");
                }
                None => break,
            },
            _ = shutdown.wait_for(|stop| *stop) => break,
        }
    }
    tracing::debug!("Engine worker {id} shutting down.");
}
