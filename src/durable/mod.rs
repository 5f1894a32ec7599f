//! Durable execution primitives: journaled activities with retry, the batch
//! executor, and the paginated continuation loop.

pub mod batch;
pub mod context;
pub mod pagination;
pub mod retry;

pub use batch::Batch;
pub use context::WorkflowContext;
pub use retry::{Backoff, RetryPolicy};
