//! Background computation: the worker pool and the task kinds it runs

pub mod pool;
pub mod tasks;

pub use pool::{pool_size, shared_pool, Completion, PoolBinding, WorkerPool};
pub use tasks::{RenderOutput, RenderRequest, TaskOutput, UrlRequest, WorkerTask};
