//! UCI engine process management: a single-process wrapper and a bounded
//! pool of pre-spawned engines.

pub mod pool;
pub mod uci;

pub use pool::{EnginePool, PoolError};
pub use uci::{EngineError, UciEngine};
