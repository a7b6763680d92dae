//! Bounded fan-out.
//!
//! [`WorkerPool`] runs submitted futures on a fixed number of tokio tasks fed
//! by one bounded queue, so a fast producer is slowed down instead of
//! buffering the whole address space. The pool does not know when work is
//! done; a [`CompletionBarrier`] does. [`Scatter`] bundles the two.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::warn;

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub struct WorkerPool {
    queue: mpsc::Sender<Task>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `size` workers sharing a queue of `capacity` pending tasks.
    /// Both are clamped to at least one.
    pub fn new(size: usize, capacity: usize) -> Self {
        let (queue, rx) = mpsc::channel::<Task>(capacity.max(1));
        let rx: Arc<Mutex<mpsc::Receiver<Task>>> = Arc::new(Mutex::new(rx));

        let workers: Vec<JoinHandle<()>> = (0..size.max(1))
            .map(|_| {
                let rx = rx.clone();
                tokio::spawn(async move {
                    loop {
                        // lock is released before the task runs
                        let task: Option<Task> = rx.lock().await.recv().await;
                        match task {
                            Some(task) => task.await,
                            None => break,
                        }
                    }
                })
            })
            .collect();

        Self { queue, workers }
    }

    /// Queues `task`, waiting while the queue is full.
    pub async fn submit<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // receiver lives as long as the workers, which outlive `self.queue`
        if self.queue.send(Box::pin(task)).await.is_err() {
            warn!("worker pool closed, task dropped");
        }
    }

    /// Closes the queue, lets the workers finish what is queued, and joins them.
    pub async fn shutdown(self) {
        drop(self.queue);
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!("worker task failed: {e}");
            }
        }
    }
}

#[derive(Default)]
struct BarrierState {
    pending: AtomicUsize,
    done: Notify,
}

/// Counts outstanding units of work.
#[derive(Clone, Default)]
pub struct CompletionBarrier {
    state: Arc<BarrierState>,
}

/// Marks one unit of work as finished when dropped, including on panic.
pub struct CompletionToken {
    state: Arc<BarrierState>,
}

impl CompletionBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self) -> CompletionToken {
        self.state.pending.fetch_add(1, Ordering::AcqRel);
        CompletionToken {
            state: self.state.clone(),
        }
    }

    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    /// Returns once every token handed out so far has been dropped.
    pub async fn wait(&self) {
        loop {
            let notified = self.state.done.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for CompletionToken {
    fn drop(&mut self) {
        if self.state.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.state.done.notify_waiters();
        }
    }
}

/// A worker pool paired with a completion barrier.
pub struct Scatter {
    pool: WorkerPool,
    barrier: CompletionBarrier,
}

impl Scatter {
    /// `workers` tasks with a queue of the same depth.
    pub fn new(workers: usize) -> Self {
        Self::with_capacity(workers, workers)
    }

    pub fn with_capacity(workers: usize, capacity: usize) -> Self {
        Self {
            pool: WorkerPool::new(workers, capacity),
            barrier: CompletionBarrier::new(),
        }
    }

    pub async fn submit<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token: CompletionToken = self.barrier.add();
        self.pool
            .submit(async move {
                task.await;
                drop(token);
            })
            .await;
    }

    /// Waits for submitted work, then tears the pool down.
    pub async fn join(self) {
        self.barrier.wait().await;
        self.pool.shutdown().await;
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_task_runs_exactly_once() {
        let hits: Arc<Vec<AtomicUsize>> = Arc::new((0..500).map(|_| AtomicUsize::new(0)).collect());
        let scatter = Scatter::new(8);

        for i in 0..500 {
            let hits = hits.clone();
            scatter
                .submit(async move {
                    hits[i].fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }
        scatter.join().await;

        assert!(hits.iter().all(|h| h.load(Ordering::SeqCst) == 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_never_exceeds_pool_size() {
        const SIZE: usize = 3;
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let scatter = Scatter::new(SIZE);

        for _ in 0..30 {
            let running = running.clone();
            let peak = peak.clone();
            scatter
                .submit(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
        }
        scatter.join().await;

        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= SIZE, "peak concurrency {peak}");
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn barrier_without_tokens_returns_immediately() {
        let barrier = CompletionBarrier::new();
        tokio::time::timeout(Duration::from_secs(1), barrier.wait())
            .await
            .expect("barrier should be open");
    }

    #[tokio::test]
    async fn barrier_opens_when_last_token_drops() {
        let barrier = CompletionBarrier::new();
        let a = barrier.add();
        let b = barrier.add();
        assert_eq!(barrier.pending(), 2);

        let waiter = {
            let barrier = barrier.clone();
            tokio::spawn(async move { barrier.wait().await })
        };
        drop(a);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(b);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("barrier should open")
            .unwrap();
        assert_eq!(barrier.pending(), 0);
    }

    #[tokio::test]
    async fn submit_applies_backpressure_when_queue_is_full() {
        let pool = WorkerPool::new(1, 1);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        // occupies the only worker
        pool.submit(async move {
            let _ = release_rx.await;
        })
        .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        // fills the queue
        pool.submit(async {}).await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), pool.submit(async {})).await;
        assert!(blocked.is_err(), "third submit should wait for room");

        release_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), pool.submit(async {}))
            .await
            .expect("queue should drain");
        pool.shutdown().await;
    }
}
