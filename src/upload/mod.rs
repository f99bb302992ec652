pub mod backoff;
pub mod coordinator;
pub mod scheduler;
pub mod types;

pub use backoff::{BackoffPolicy, BackoffState};
pub use coordinator::{PublishOutcome, UploadCoordinator};
pub use scheduler::TokioRetryScheduler;
pub use types::{
    AccountContext, AccountProvider, DirectoryClient, PublishError, PublishRequest,
    PublishResponse, RetryScheduler, ScheduledRetry, StaticAccount,
};
