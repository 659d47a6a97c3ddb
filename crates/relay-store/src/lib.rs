pub mod batch;
pub mod liveness;
pub mod lock;
pub mod paths;
pub mod workflow;

pub use batch::{BatchError, BatchState, BatchStatus, BatchStore, CompletedItem};
pub use liveness::{FakeProbe, ProcessProbe, SignalProbe};
pub use lock::{Lock, LockError, LockKey, LockStore};
pub use paths::StoreLayout;
pub use workflow::{AdvanceRequest, Phase, WorkflowError, WorkflowState, WorkflowStore};
