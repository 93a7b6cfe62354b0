pub mod cancel;
pub mod worker;

pub use cancel::CancelToken;
pub use worker::{Executor, FailFastWorker};
