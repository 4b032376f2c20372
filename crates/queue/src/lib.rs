pub mod client;
pub mod error;
pub mod memory;
pub mod redis;

pub use client::{JobQueue, QueueHealth};
pub use error::QueueError;
pub use memory::MemoryQueue;
pub use redis::RedisQueue;
