//! Execution context: the engine's dedicated threads.
//!
//! - network: owns the engine and its socket I/O
//! - signaling: delivers observer callbacks to the host
//! - worker: owns device construction and other worker-affine work

pub mod task_queue;
pub mod worker;

use std::sync::Arc;

use log::{debug, info};

pub use task_queue::{TaskQueue, TaskQueueFactory, TaskQueuePriority};
pub use worker::{live_worker_threads, WorkerHandle, WorkerThread};

use crate::config::FactoryOptions;
use crate::error::Result;

/// The three engine threads plus the shared task queue factory.
pub struct ExecutionContext {
    network: WorkerThread,
    signaling: WorkerThread,
    worker: WorkerThread,
    task_queue_factory: Arc<TaskQueueFactory>,
}

impl ExecutionContext {
    /// Start all three threads. If one fails to start, the ones already running are
    /// stopped (dropping a started worker stops it) and the error is returned.
    pub fn start(options: &FactoryOptions) -> Result<Self> {
        let network = WorkerThread::spawn(&options.network_thread_name, TaskQueuePriority::Normal)?;
        let signaling =
            WorkerThread::spawn(&options.signaling_thread_name, TaskQueuePriority::Normal)?;
        let worker = WorkerThread::spawn(&options.worker_thread_name, TaskQueuePriority::Normal)?;

        info!(
            "created and started threads: {}, {}, {}",
            network.name(),
            signaling.name(),
            worker.name()
        );

        Ok(Self {
            network,
            signaling,
            worker,
            task_queue_factory: Arc::new(TaskQueueFactory::new()),
        })
    }

    pub fn network(&self) -> &WorkerThread {
        &self.network
    }

    pub fn signaling(&self) -> &WorkerThread {
        &self.signaling
    }

    pub fn worker(&self) -> &WorkerThread {
        &self.worker
    }

    pub fn task_queue_factory(&self) -> &Arc<TaskQueueFactory> {
        &self.task_queue_factory
    }

    /// Stop signaling, worker and network threads, in that order. Each stop blocks until
    /// the thread has drained its queue.
    pub fn stop(&self) {
        self.signaling.stop();
        self.worker.stop();
        self.network.stop();
        debug!("execution context stopped");
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.stop();
    }
}
