//! Fixed-size worker pool with round-robin dispatch.
//!
//! Each worker is an OS thread draining its own channel. A request id is
//! taken and a worker chosen under one lock, so ids grow strictly and task
//! `n` always lands on worker `n % size`. Completions are matched back to
//! their request through a pending map of one-shot senders.

use super::tasks::{TaskOutput, WorkerTask};
use crate::{
    core::constants::{DEFAULT_WORKER_POOL_MAX, FALLBACK_HARDWARE_CONCURRENCY},
    prelude::{Arc, Future, HashMap, Mutex},
    MapError, Result,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use futures::channel::oneshot;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Result of one pool task
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub request_id: u64,
    /// Index of the worker that ran the task
    pub worker: usize,
    pub output: TaskOutput,
}

struct Envelope {
    request_id: u64,
    task: WorkerTask,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Completion>>>>;

struct Dispatch {
    senders: Vec<Sender<Envelope>>,
    next_worker: usize,
    next_request_id: u64,
}

pub struct WorkerPool {
    size: usize,
    dispatch: Mutex<Dispatch>,
    pending: PendingMap,
    handles: Mutex<Vec<std::thread::JoinHandle<()>>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl WorkerPool {
    /// Starts `size` workers (at least one)
    pub fn new(size: usize) -> Result<Self> {
        let size = size.max(1);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::default()));
        let mut senders = Vec::with_capacity(size);
        let mut handles = Vec::with_capacity(size);

        for index in 0..size {
            let (tx, rx) = unbounded();
            let worker_pending = pending.clone();
            let handle = std::thread::Builder::new()
                .name(format!("tile-worker-{}", index))
                .spawn(move || worker_loop(index, rx, worker_pending))?;
            senders.push(tx);
            handles.push(handle);
        }

        log::debug!("started worker pool with {} workers", size);
        Ok(Self {
            size,
            dispatch: Mutex::new(Dispatch {
                senders,
                next_worker: 0,
                next_request_id: 0,
            }),
            pending,
            handles: Mutex::new(handles),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of tasks posted but not completed yet
    pub fn in_flight(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Sends a task to the next worker in round-robin order. The returned
    /// future resolves with the completion matched to this request's id, or
    /// [`MapError::PoolTerminated`] if the pool shut down first.
    pub fn post_task(
        &self,
        task: WorkerTask,
    ) -> impl Future<Output = Result<Completion>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let posted = {
            let mut dispatch = lock(&self.dispatch);
            if dispatch.senders.is_empty() {
                Err(MapError::PoolTerminated)
            } else {
                let request_id = dispatch.next_request_id;
                dispatch.next_request_id += 1;
                let worker = dispatch.next_worker;
                dispatch.next_worker = (worker + 1) % dispatch.senders.len();

                log::trace!("request {} ({}) -> worker {}", request_id, task.kind(), worker);
                lock(&self.pending).insert(request_id, tx);
                match dispatch.senders[worker].send(Envelope { request_id, task }) {
                    Ok(()) => Ok(()),
                    Err(_) => {
                        lock(&self.pending).remove(&request_id);
                        Err(MapError::PoolTerminated)
                    }
                }
            }
        };

        async move {
            posted?;
            rx.await.map_err(|_| MapError::PoolTerminated)
        }
    }

    /// Stops accepting work and waits for the workers to drain their queues
    pub fn terminate(&self) {
        lock(&self.dispatch).senders.clear();
        let handles: Vec<_> = lock(&self.handles).drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                log::warn!("worker thread panicked during shutdown");
            }
        }
        lock(&self.pending).clear();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn worker_loop(index: usize, rx: Receiver<Envelope>, pending: PendingMap) {
    for Envelope { request_id, task } in rx.iter() {
        let output = match catch_unwind(AssertUnwindSafe(|| task.execute())) {
            Ok(output) => output,
            Err(_) => {
                log::warn!("{} task {} panicked on worker {}", task.kind(), request_id, index);
                task.empty_output()
            }
        };
        let callback = lock(&pending).remove(&request_id);
        if let Some(callback) = callback {
            let _ = callback.send(Completion {
                request_id,
                worker: index,
                output,
            });
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `min(hardware concurrency, max)`, never below one
pub fn pool_size(worker_pool_max: usize) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_HARDWARE_CONCURRENCY);
    let max = if worker_pool_max == 0 {
        DEFAULT_WORKER_POOL_MAX
    } else {
        worker_pool_max
    };
    cpus.min(max).max(1)
}

static SHARED_POOLS: Lazy<Mutex<HashMap<String, Arc<WorkerPool>>>> =
    Lazy::new(|| Mutex::new(HashMap::default()));

/// Returns the process-wide pool for a layer type, creating it on first use.
/// Later callers share the first pool whatever size they ask for, and the
/// pool lives until the process exits.
pub fn shared_pool(kind: &str, worker_pool_max: usize) -> Result<Arc<WorkerPool>> {
    let mut pools = lock(&*SHARED_POOLS);
    if let Some(pool) = pools.get(kind) {
        return Ok(pool.clone());
    }
    let pool = Arc::new(WorkerPool::new(pool_size(worker_pool_max))?);
    pools.insert(kind.to_string(), pool.clone());
    Ok(pool)
}

/// Whether a layer borrows a shared pool or owns one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolBinding {
    /// Share the pool registered under this layer type
    Shared(String),
    /// A pool owned by the layer and shut down with it
    Dedicated,
}

impl Default for PoolBinding {
    fn default() -> Self {
        PoolBinding::Shared("tile_layer".to_string())
    }
}

impl PoolBinding {
    pub fn resolve(&self, worker_pool_max: usize) -> Result<Arc<WorkerPool>> {
        match self {
            PoolBinding::Shared(kind) => shared_pool(kind, worker_pool_max),
            PoolBinding::Dedicated => Ok(Arc::new(WorkerPool::new(pool_size(worker_pool_max))?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::tasks::UrlRequest;
    use crate::core::geo::TileCoord;
    use futures::executor::block_on;

    fn url_task(x: i32) -> WorkerTask {
        WorkerTask::ComputeUrl(UrlRequest {
            coords: TileCoord::new(x, 0, 4),
            template: "{x}".to_string(),
            subdomains: vec!["a".to_string()],
            max_zoom: 18.0,
            zoom_reverse: false,
            zoom_offset: 0,
            tms: false,
            retina: false,
            infinite: true,
            global_tile_range: None,
            params: Default::default(),
        })
    }

    #[test]
    fn test_pool_size_bounds() {
        assert_eq!(pool_size(1), 1);
        assert!(pool_size(0) >= 1);
        assert!(pool_size(0) <= DEFAULT_WORKER_POOL_MAX);
    }

    #[test]
    fn test_single_task_round_trip() {
        let pool = WorkerPool::new(1).unwrap();
        let completion = block_on(pool.post_task(url_task(9))).unwrap();
        assert_eq!(completion.request_id, 0);
        assert_eq!(completion.output, TaskOutput::Url(Some("9".to_string())));
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn test_terminated_pool_rejects_tasks() {
        let pool = WorkerPool::new(2).unwrap();
        pool.terminate();
        let err = block_on(pool.post_task(url_task(1))).unwrap_err();
        assert!(matches!(err, MapError::PoolTerminated));
    }

    #[test]
    fn test_shared_pool_is_reused_per_kind() {
        let a = shared_pool("pool-test-kind", 2).unwrap();
        let b = shared_pool("pool-test-kind", 4).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let other = PoolBinding::Dedicated.resolve(2).unwrap();
        assert!(!Arc::ptr_eq(&a, &other));
    }
}
