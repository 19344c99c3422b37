//! Dedicated worker threads.
//!
//! Each worker is one named OS thread driving a current-thread tokio runtime. Jobs are
//! drained from a FIFO queue one at a time; futures spawned on the worker make progress
//! between jobs.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use log::{debug, error, warn};
use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle};
use tokio::sync::mpsc;

use super::task_queue::TaskQueuePriority;
use crate::error::{Result, RtcError};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Grace period for engine tasks when a worker's runtime is torn down
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Number of worker threads currently running in this process
static LIVE_WORKERS: AtomicUsize = AtomicUsize::new(0);

/// Number of worker threads currently alive in the process.
pub fn live_worker_threads() -> usize {
    LIVE_WORKERS.load(Ordering::SeqCst)
}

/// A named worker thread with its own task queue.
pub struct WorkerThread {
    name: Arc<str>,
    thread_id: ThreadId,
    runtime: Handle,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerThread {
    /// Start a worker thread.
    ///
    /// Returns once the thread's runtime is running, so a successful return means the
    /// worker can accept work immediately.
    pub fn spawn(name: &str, priority: TaskQueuePriority) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<std::io::Result<Handle>>(1);
        let thread_name = name.to_string();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                priority.apply();

                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                LIVE_WORKERS.fetch_add(1, Ordering::SeqCst);
                let _ = ready_tx.send(Ok(runtime.handle().clone()));
                debug!("worker {} started", thread_name);

                let job_name = thread_name.clone();
                runtime.block_on(async move {
                    while let Some(job) = rx.recv().await {
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            error!("task panicked on worker {}", job_name);
                        }
                    }
                });

                runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
                LIVE_WORKERS.fetch_sub(1, Ordering::SeqCst);
                debug!("worker {} stopped", thread_name);
            })
            .map_err(|source| RtcError::ThreadStart {
                role: name.to_string(),
                source,
            })?;

        let thread_id = join.thread().id();
        let runtime = match ready_rx.recv() {
            Ok(Ok(handle)) => handle,
            Ok(Err(source)) => {
                let _ = join.join();
                return Err(RtcError::ThreadStart {
                    role: name.to_string(),
                    source,
                });
            }
            Err(_) => {
                let _ = join.join();
                return Err(RtcError::ThreadStart {
                    role: name.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "worker exited during startup",
                    ),
                });
            }
        };

        Ok(Self {
            name: Arc::from(name),
            thread_id,
            runtime,
            sender: Mutex::new(Some(tx)),
            join: Mutex::new(Some(join)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the calling thread is this worker.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Whether the worker still accepts work.
    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Queue a job without waiting for it.
    pub fn post<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        match self.sender.lock().as_ref() {
            Some(tx) => tx
                .send(Box::new(f))
                .map_err(|_| RtcError::WorkerStopped(self.name.to_string())),
            None => Err(RtcError::WorkerStopped(self.name.to_string())),
        }
    }

    /// Run `f` on this worker and block until it returns its value.
    ///
    /// Called from the worker itself, `f` runs inline.
    pub fn invoke<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_current() {
            return Ok(f());
        }

        let (tx, rx) = std_mpsc::sync_channel(1);
        self.post(move || {
            let _ = tx.send(f());
        })?;
        rx.recv()
            .map_err(|_| RtcError::WorkerStopped(self.name.to_string()))
    }

    /// Drive `fut` on this worker's runtime and block until it completes.
    pub fn block_on<F>(&self, fut: F) -> Result<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.is_current() {
            return Err(RtcError::InvalidArgument(format!(
                "re-entrant block_on on worker {}",
                self.name
            )));
        }
        if !self.is_running() {
            return Err(RtcError::WorkerStopped(self.name.to_string()));
        }

        let (tx, rx) = std_mpsc::sync_channel(1);
        self.runtime.spawn(async move {
            let _ = tx.send(fut.await);
        });
        rx.recv()
            .map_err(|_| RtcError::WorkerStopped(self.name.to_string()))
    }

    /// Start `fut` on this worker's runtime without waiting for it.
    pub fn spawn_task<F>(&self, fut: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.is_running() {
            return Err(RtcError::WorkerStopped(self.name.to_string()));
        }
        self.runtime.spawn(fut);
        Ok(())
    }

    /// A non-owning handle that can post jobs without keeping the worker alive.
    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            name: Arc::clone(&self.name),
            sender: self.sender.lock().as_ref().map(|tx| tx.downgrade()),
        }
    }

    /// Stop accepting work, drain queued jobs and join the thread.
    ///
    /// From the worker's own thread the queue is closed but the thread is not joined.
    pub fn stop(&self) {
        drop(self.sender.lock().take());

        if self.is_current() {
            warn!("worker {} stopped from its own thread, not joining", self.name);
            return;
        }

        if let Some(join) = self.join.lock().take() {
            if join.join().is_err() {
                error!("worker {} panicked", self.name);
            }
        }
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Posts jobs to a worker without owning it. Posting fails once the worker stops.
#[derive(Clone)]
pub struct WorkerHandle {
    name: Arc<str>,
    sender: Option<mpsc::WeakUnboundedSender<Job>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn post<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .and_then(|weak| weak.upgrade())
            .ok_or_else(|| RtcError::WorkerStopped(self.name.to_string()))?;
        sender
            .send(Box::new(f))
            .map_err(|_| RtcError::WorkerStopped(self.name.to_string()))
    }
}
