pub mod events;
pub mod hook;
pub mod registry;

pub use events::{HookContext, HookEvent, HookResult};
pub use hook::{handler_fn, FnHandler, Hook, HookHandler, MAX_PRIORITY, MIN_PRIORITY};
pub use registry::{
    ExecuteOptions, HookExecutionResult, HookRegistry, HookRunRecord, HookStatus,
    DEFAULT_HOOK_TIMEOUT,
};
