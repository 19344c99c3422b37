//! Task queues created on demand by engine components.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use super::worker::WorkerThread;
use crate::error::Result;

/// Scheduling priority for a task queue thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskQueuePriority {
    Low,
    #[default]
    Normal,
    High,
}

impl TaskQueuePriority {
    /// Apply this priority to the calling thread. Best effort: failures (for example
    /// missing privileges to raise priority) are ignored.
    pub(crate) fn apply(self) {
        match self {
            TaskQueuePriority::Normal => {}
            TaskQueuePriority::High => {
                #[cfg(windows)]
                unsafe {
                    use windows_sys::Win32::System::Threading::{
                        GetCurrentThread, SetThreadPriority, THREAD_PRIORITY_HIGHEST,
                    };
                    SetThreadPriority(GetCurrentThread(), THREAD_PRIORITY_HIGHEST);
                }

                #[cfg(unix)]
                unsafe {
                    libc::nice(-10);
                }
            }
            TaskQueuePriority::Low => {
                #[cfg(windows)]
                unsafe {
                    use windows_sys::Win32::System::Threading::{
                        GetCurrentThread, SetThreadPriority, THREAD_PRIORITY_BELOW_NORMAL,
                    };
                    SetThreadPriority(GetCurrentThread(), THREAD_PRIORITY_BELOW_NORMAL);
                }

                #[cfg(unix)]
                unsafe {
                    libc::nice(5);
                }
            }
        }
    }
}

/// A serial queue backed by its own thread. Stops when dropped.
pub struct TaskQueue {
    worker: WorkerThread,
}

impl TaskQueue {
    pub fn name(&self) -> &str {
        self.worker.name()
    }

    pub fn post<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.worker.post(f)
    }

    pub fn spawn<F>(&self, fut: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.worker.spawn_task(fut)
    }

    pub fn invoke<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.worker.invoke(f)
    }

    pub fn is_current(&self) -> bool {
        self.worker.is_current()
    }

    pub fn stop(&self) {
        self.worker.stop();
    }
}

/// Creates task queues. Shared by every component of one engine factory.
#[derive(Default)]
pub struct TaskQueueFactory {
    created: AtomicU64,
}

impl TaskQueueFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue named `name-N`, N being this factory's running count.
    pub fn create_task_queue(&self, name: &str, priority: TaskQueuePriority) -> Result<TaskQueue> {
        let index = self.created.fetch_add(1, Ordering::Relaxed);
        let queue_name = format!("{}-{}", name, index);
        debug!("creating task queue {} ({:?})", queue_name, priority);
        Ok(TaskQueue {
            worker: WorkerThread::spawn(&queue_name, priority)?,
        })
    }

    /// Number of queues created so far.
    pub fn queues_created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_queue_names_are_unique() {
        let factory = TaskQueueFactory::new();
        let a = factory.create_task_queue("encoder", TaskQueuePriority::High).unwrap();
        let b = factory.create_task_queue("encoder", TaskQueuePriority::Low).unwrap();
        assert_eq!(a.name(), "encoder-0");
        assert_eq!(b.name(), "encoder-1");
        assert_eq!(factory.queues_created(), 2);
    }

    #[test]
    fn test_spawned_future_runs_on_queue() {
        let factory = TaskQueueFactory::new();
        let queue = factory.create_task_queue("io", TaskQueuePriority::Normal).unwrap();
        let (tx, rx) = mpsc::channel();
        queue
            .spawn(async move {
                tx.send(std::thread::current().name().map(str::to_string)).unwrap();
            })
            .unwrap();
        assert_eq!(rx.recv().unwrap().as_deref(), Some("io-0"));
        queue.stop();
        assert!(queue.post(|| ()).is_err());
    }
}
