//! Access logging: one templated line per request, written to rotating files
//! by a single background task.

mod layer;
mod pool;
mod record;
mod writer;

pub use layer::{AuditLayer, AuditService};
pub use pool::BufferPool;
pub use record::{LogRecord, TIME_FORMAT};
pub use writer::{AuditError, AuditLogger};
