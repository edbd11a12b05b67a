//! Observability for the access engine
//!
//! Prometheus counters for the self-healing paths and administrative writes,
//! the recorder that backs them, and the `/metrics` endpoint that renders it.
//! Structured logging lives in [`crate::logging`].

pub mod endpoint;
pub mod metrics;
pub mod recorder;

pub use endpoint::metrics_endpoint;
pub use metrics::{AdminOperation, SelfHealKind, WriteStatus, record_admin_write, record_self_heal};
pub use recorder::{MetricsManager, init_metrics};
