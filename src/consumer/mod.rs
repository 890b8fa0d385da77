// ============================================================================
// Consumer - consumption loops over the primary and retry channels
// ============================================================================

mod pool;
mod worker;

pub use pool::WorkerPool;
pub use worker::WorkerContext;
