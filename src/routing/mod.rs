// ============================================================================
// Routing - failure classification and retry/dead-letter destinations
// ============================================================================

mod errors;
mod router;

pub use errors::{FailureClass, ProcessingError};
pub use router::Router;
