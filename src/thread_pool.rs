//! Fixed-size worker pool for row-parallel numerical work
//!
//! The training loop fans short numerical tasks out to the pool (one per row of
//! a loss or gradient matrix) and blocks until every task of the batch has
//! completed. Tasks never share mutable state: they read `Arc`-shared inputs and
//! hand their result back through their [`TaskHandle`].
//!
//! # Example
//!
//! ```
//! use neural_trainer::thread_pool::ThreadPool;
//!
//! let pool = ThreadPool::new(4).unwrap();
//! let squares = pool.fan_out(8, |i| i * i).unwrap();
//! assert_eq!(squares[3], 9);
//! ```

use crate::error::{Error, Result};
use futures::channel::oneshot;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Queue {
    jobs: VecDeque<Job>,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
}

/// Fixed-size thread pool with a mutex/condvar protected task queue.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawns `threads` workers.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for zero threads, `Io` if the OS refuses to spawn a thread.
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(Error::InvalidConfig(
                "thread count must be at least 1, got 0".to_string(),
            ));
        }

        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                jobs: VecDeque::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(threads),
        };
        for index in 0..threads {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("trainer-worker-{index}"))
                .spawn(move || worker_loop(&shared))?;
            pool.workers.push(handle);
        }
        Ok(pool)
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queues a task and returns a handle resolving to its result.
    ///
    /// # Errors
    ///
    /// `PoolShutDown` once [`shutdown`](Self::shutdown) has been called.
    pub fn enqueue<F, T>(&self, task: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let job: Job = Box::new(move || {
            // the receiver may already be gone, nothing to report then
            let _ = sender.send(task());
        });

        {
            let mut queue = self.shared.queue.lock();
            if queue.shutdown {
                return Err(Error::PoolShutDown);
            }
            queue.jobs.push_back(job);
        }
        self.shared.available.notify_one();

        Ok(TaskHandle { receiver })
    }

    /// Runs `task(0..count)` on the pool and waits for all of them.
    ///
    /// Results are returned in index order whatever the completion order was.
    /// The call returns only after every task has finished, so a partially
    /// filled result is never observable.
    pub fn fan_out<T, F>(&self, count: usize, task: F) -> Result<Vec<T>>
    where
        F: Fn(usize) -> T + Send + Sync + 'static,
        T: Send + 'static,
    {
        let task = Arc::new(task);
        let handles = (0..count)
            .map(|index| {
                let task = Arc::clone(&task);
                self.enqueue(move || task(index))
            })
            .collect::<Result<Vec<_>>>()?;

        // join every handle before reporting the first failure
        let results: Vec<Result<T>> = handles.into_iter().map(TaskHandle::join).collect();
        results.into_iter().collect()
    }

    /// Stops accepting tasks, lets the workers drain the queue and joins them.
    pub fn shutdown(&mut self) {
        {
            let mut queue = self.shared.queue.lock();
            queue.shutdown = true;
        }
        self.shared.available.notify_all();

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("thread pool worker terminated abnormally");
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.workers.len())
            .finish()
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(job) = queue.jobs.pop_front() {
                    break job;
                }
                if queue.shutdown {
                    return;
                }
                shared.available.wait(&mut queue);
            }
        };

        // a panicking task drops its sender, its handle reports the failure
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            log::error!("thread pool task panicked");
        }
    }
}

/// Pending result of a pool task.
///
/// Await it as a future or block on it with [`join`](Self::join).
#[derive(Debug)]
pub struct TaskHandle<T> {
    receiver: oneshot::Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the task has run.
    pub fn join(self) -> Result<T> {
        futures::executor::block_on(self)
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|result| {
            result.map_err(|_| {
                Error::TaskFailed("task panicked before producing its result".to_string())
            })
        })
    }
}
