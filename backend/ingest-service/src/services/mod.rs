pub mod dispatch;
pub mod event_processor;
pub mod worker_pool;

pub use dispatch::{dispatch_channel, DispatchClosed, DispatchReceiver, DispatchSender};
pub use event_processor::{EventProcessor, ProcessOutcome};
pub use worker_pool::WorkerPool;
