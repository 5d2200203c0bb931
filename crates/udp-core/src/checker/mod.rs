pub mod batch;
pub mod retry;
pub mod verdict;

pub use batch::{check_all, check_stream, run_check_cycle};
pub use retry::{check_with_retry, RetryOutcome};
pub use verdict::{CheckReport, FailureKind, StreamConfig, StreamStatus, StreamVerdict};
