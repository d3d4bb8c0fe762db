//! Session-layer utilities: the bounded, time-limited session cache.

pub mod cache;

pub use cache::{Cache, MemoryCache, MemoryPressure, NullCache};
