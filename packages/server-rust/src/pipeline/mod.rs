//! The read-only filtering stage and its building blocks.
//!
//! 1. **Queue** (`queue`): unbounded FIFO between producers and the consumer
//! 2. **Rejection** (`reject`): `NotReadOnly` replies for state-changing requests
//! 3. **Filtering loop** (`read_only`): classify, reject or forward, shut down
//! 4. **Lifecycle** (`lifecycle`): finished flag, loop state, exit notification
//! 5. **Async downstream** (`worker`): tokio-backed next stage

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod queue;
pub mod read_only;
pub mod reject;
pub mod worker;

pub use config::ProcessorConfig;
pub use error::StageError;
pub use lifecycle::{StageLifecycle, StageState};
pub use queue::{QueueEntry, RequestQueue};
pub use read_only::{CriticalErrorListener, ReadOnlyRequestProcessor};
pub use reject::RejectionResponder;
pub use worker::{AsyncStage, StageRunnable};
