//! Runtime abstraction layer for async operations
//!
//! Tile pipelines are plain futures. This module decides where they run:
//! on the ambient Tokio runtime when there is one, otherwise on a small
//! thread pool shared by every layer.

use crate::prelude::{Arc, Future, Pin};
use std::sync::atomic::{AtomicBool, Ordering};

/// A trait for spawning async tasks (object-safe version)
pub trait AsyncSpawner: Send + Sync + 'static {
    /// Spawn a future and return a handle to it
    fn spawn_boxed(
        &self,
        future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
    ) -> Box<dyn AsyncHandle>;
}

/// Handle to a spawned async task
pub trait AsyncHandle: Send + Sync {
    /// Check if the task is finished
    fn is_finished(&self) -> bool;
}

/// Convenience function for spawning with type safety
pub fn spawn<F>(future: F) -> Box<dyn AsyncHandle>
where
    F: Future<Output = ()> + Send + 'static,
{
    log::trace!("runtime::spawn");
    runtime().spawn_boxed(Box::pin(future))
}

/// Default spawner implementations
pub mod spawners {
    use super::*;
    use futures::executor::ThreadPool;
    use once_cell::sync::Lazy;

    #[cfg(feature = "tokio-runtime")]
    pub mod tokio_impl {
        use super::*;
        use ::tokio::{runtime::Handle, task::JoinHandle};

        /// Spawns onto a specific Tokio runtime
        pub struct TokioSpawner(pub Handle);

        impl TokioSpawner {
            /// Captures the runtime the caller is running inside, if any
            pub fn current() -> Option<Self> {
                Handle::try_current().ok().map(TokioSpawner)
            }
        }

        impl AsyncSpawner for TokioSpawner {
            fn spawn_boxed(
                &self,
                future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
            ) -> Box<dyn AsyncHandle> {
                let handle = self.0.spawn(future);
                Box::new(TokioHandle(handle))
            }
        }

        struct TokioHandle(JoinHandle<()>);

        impl AsyncHandle for TokioHandle {
            fn is_finished(&self) -> bool {
                self.0.is_finished()
            }
        }
    }

    /// Pipeline executor shared by every layer when no Tokio runtime is
    /// around; `None` if its threads could not be started
    static PIPELINE_POOL: Lazy<Option<ThreadPool>> = Lazy::new(|| {
        ThreadPool::builder()
            .pool_size(crate::background::pool_size(0))
            .name_prefix("tile-pipeline-")
            .create()
            .map_err(|e| log::warn!("failed to start pipeline thread pool: {}", e))
            .ok()
    });

    /// Runs futures on a shared `futures` thread pool, falling back to a
    /// dedicated thread per future when the pool is unavailable
    pub struct ThreadSpawner;

    impl AsyncSpawner for ThreadSpawner {
        fn spawn_boxed(
            &self,
            future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
        ) -> Box<dyn AsyncHandle> {
            let finished = Arc::new(AtomicBool::new(false));
            let flag = finished.clone();
            let task = async move {
                future.await;
                flag.store(true, Ordering::Release);
            };

            if let Some(pool) = PIPELINE_POOL.as_ref() {
                pool.spawn_ok(task);
                return Box::new(ThreadHandle(finished));
            }

            let spawned = std::thread::Builder::new()
                .name("tile-pipeline".to_string())
                .spawn(move || futures::executor::block_on(task));
            if let Err(e) = spawned {
                log::warn!("failed to spawn pipeline thread: {}", e);
                finished.store(true, Ordering::Release);
            }
            Box::new(ThreadHandle(finished))
        }
    }

    struct ThreadHandle(Arc<AtomicBool>);

    impl AsyncHandle for ThreadHandle {
        fn is_finished(&self) -> bool {
            self.0.load(Ordering::Acquire)
        }
    }

    /// Picks Tokio when called from inside a runtime, threads otherwise
    pub struct AmbientSpawner;

    impl AsyncSpawner for AmbientSpawner {
        fn spawn_boxed(
            &self,
            future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
        ) -> Box<dyn AsyncHandle> {
            #[cfg(feature = "tokio-runtime")]
            if let Some(spawner) = tokio_impl::TokioSpawner::current() {
                return spawner.spawn_boxed(future);
            }
            ThreadSpawner.spawn_boxed(future)
        }
    }
}

/// Global runtime instance
static RUNTIME: std::sync::OnceLock<Box<dyn AsyncSpawner>> = std::sync::OnceLock::new();

/// Initialize the runtime with a specific spawner. Only the first call wins.
pub fn init_runtime(spawner: Box<dyn AsyncSpawner>) {
    if RUNTIME.set(spawner).is_err() {
        log::debug!("runtime already initialised, keeping the existing spawner");
    }
}

/// Get the global runtime spawner
pub fn runtime() -> &'static dyn AsyncSpawner {
    RUNTIME
        .get_or_init(|| Box::new(spawners::AmbientSpawner))
        .as_ref()
}
