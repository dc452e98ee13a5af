pub mod error;
pub mod retry;
pub mod synchronizer;

pub use error::{ConfigurationError, SyncError};
pub use retry::{RetryPolicy, RetryReport};
pub use synchronizer::{ConflictPolicy, SyncOptions, Synchronizer, DEFAULT_TRANSPORT_TIMEOUT};
