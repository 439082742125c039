//! Connection module - handles and the pool that recycles them.
//!
//! Provides:
//! - [`ConnectionHandle`] - one transport plus write exclusion and pool state
//! - [`ConnectionPool`] - fixed number of reusable handles

mod handle;
mod pool;

pub use handle::ConnectionHandle;
pub use pool::{ConnectionPool, PoolExhausted};
